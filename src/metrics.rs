// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Prometheus metrics for the gateway.

use prometheus::{Encoder, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};

/// Gateway metrics, registered on a registry owned by the application state.
pub struct Metrics {
    registry: Registry,
    /// Requests received, by endpoint
    pub requests: IntCounterVec,
    /// Requests rejected by the rate limiter, by endpoint
    pub rate_limited: IntCounterVec,
    /// Partner API calls that failed, by endpoint
    pub upstream_failures: IntCounterVec,
    /// Client keys currently tracked, by endpoint
    pub tracked_clients: IntGaugeVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("fleet_gateway".to_string()), None)?;

        let requests = IntCounterVec::new(
            Opts::new("requests_total", "Total requests by endpoint"),
            &["endpoint"],
        )?;
        let rate_limited = IntCounterVec::new(
            Opts::new("rate_limited_total", "Requests rejected by the rate limiter"),
            &["endpoint"],
        )?;
        let upstream_failures = IntCounterVec::new(
            Opts::new("upstream_failures_total", "Failed partner API calls"),
            &["endpoint"],
        )?;
        let tracked_clients = IntGaugeVec::new(
            Opts::new("tracked_clients", "Client keys held by each rate limiter"),
            &["endpoint"],
        )?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(rate_limited.clone()))?;
        registry.register(Box::new(upstream_failures.clone()))?;
        registry.register(Box::new(tracked_clients.clone()))?;

        Ok(Self {
            registry,
            requests,
            rate_limited,
            upstream_failures,
            tracked_clients,
        })
    }

    /// Encode all metrics in the Prometheus text format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
