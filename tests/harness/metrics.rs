// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Outcome collection for flood simulation.

use std::collections::HashMap;
use std::time::Duration;

/// Admission log gathered during a flood.
#[derive(Debug, Default)]
pub struct FloodMetrics {
    /// Admission offsets from the start of the flood, by client key
    admissions: HashMap<String, Vec<Duration>>,
    /// Rejections by client key
    rejections: HashMap<String, usize>,
}

impl FloodMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one check outcome at `offset` from the start of the flood.
    pub fn record(&mut self, client: &str, admitted: bool, offset: Duration) {
        if admitted {
            self.admissions
                .entry(client.to_string())
                .or_default()
                .push(offset);
        } else {
            *self.rejections.entry(client.to_string()).or_insert(0) += 1;
        }
    }

    pub fn admitted(&self) -> usize {
        self.admissions.values().map(Vec::len).sum()
    }

    pub fn rejected(&self) -> usize {
        self.rejections.values().sum()
    }

    pub fn total_requests(&self) -> usize {
        self.admitted() + self.rejected()
    }

    /// Clients that had at least one request rejected.
    pub fn limited_clients(&self) -> usize {
        self.rejections.len()
    }

    /// Largest number of admissions any one client got inside a trailing
    /// `window` (timestamps exactly `window` apart fall in different windows).
    pub fn max_admitted_in_window(&self, window: Duration) -> usize {
        self.admissions
            .values()
            .map(|offsets| {
                let mut start = 0;
                let mut best = 0;
                for end in 0..offsets.len() {
                    while offsets[end] - offsets[start] >= window {
                        start += 1;
                    }
                    best = best.max(end - start + 1);
                }
                best
            })
            .max()
            .unwrap_or(0)
    }
}
