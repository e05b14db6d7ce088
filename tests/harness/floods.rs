// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: Apache-2.0

//! Flood patterns for rate limiter testing.

use std::time::Duration;

/// Flood pattern configuration.
#[derive(Debug, Clone)]
pub struct FloodConfig {
    /// Total number of requests to send
    pub total_requests: usize,
    /// Simulated gap between consecutive requests
    pub interval: Duration,
    /// Number of distinct client keys, used round-robin
    pub unique_clients: usize,
}

impl Default for FloodConfig {
    fn default() -> Self {
        Self {
            total_requests: 100,
            interval: Duration::from_millis(10),
            unique_clients: 1,
        }
    }
}

/// Predefined flood patterns.
impl FloodConfig {
    /// One client hammering the endpoint.
    pub fn single_client_burst() -> Self {
        Self {
            total_requests: 200,
            interval: Duration::ZERO,
            unique_clients: 1,
        }
    }

    /// Many clients, each well under its limit.
    pub fn distributed_trickle() -> Self {
        Self {
            total_requests: 500,
            interval: Duration::from_millis(5),
            unique_clients: 100,
        }
    }

    /// One client sending steadily for several windows.
    pub fn sustained(interval: Duration, total_requests: usize) -> Self {
        Self {
            total_requests,
            interval,
            unique_clients: 1,
        }
    }
}
