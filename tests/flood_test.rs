// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Flood tests for the rate limiter.
//!
//! These drive the limiter with simulated clocks and check that no client
//! ever gets more than `limit` admissions inside any trailing window.

mod harness;

use axum::http::{HeaderMap, HeaderValue};
use fleet_key_gateway::client_key::ClientKeyPolicy;
use fleet_key_gateway::limiter::{LimiterConfig, RateLimiter};
use harness::{floods::FloodConfig, generators, metrics::FloodMetrics};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::Instant;

/// Run a flood against a limiter on a simulated timeline.
fn run_flood(flood: &FloodConfig, limiter: &RateLimiter) -> FloodMetrics {
    let clients = generators::generate_client_keys(flood.unique_clients);
    let start = Instant::now();
    let mut metrics = FloodMetrics::new();

    for i in 0..flood.total_requests {
        let client = &clients[i % clients.len()];
        let offset = flood.interval * i as u32;
        let admitted = limiter.decide_at(client, start + offset).is_admitted();
        metrics.record(client, admitted, offset);
    }

    metrics
}

#[test]
fn test_single_client_burst() {
    let limiter = RateLimiter::new(LimiterConfig::from_millis(5, 60_000).unwrap());
    let metrics = run_flood(&FloodConfig::single_client_burst(), &limiter);

    assert_eq!(metrics.admitted(), 5);
    assert_eq!(metrics.rejected(), 195);
    assert_eq!(metrics.limited_clients(), 1);
}

#[test]
fn test_distributed_trickle_is_not_limited() {
    let limiter = RateLimiter::new(LimiterConfig::from_millis(20, 60_000).unwrap());
    let metrics = run_flood(&FloodConfig::distributed_trickle(), &limiter);

    // 500 requests over 100 clients is 5 each, well under 20.
    assert_eq!(metrics.admitted(), 500);
    assert_eq!(metrics.limited_clients(), 0);
    assert_eq!(limiter.len(), 100);
}

#[test]
fn test_sustained_flood_never_exceeds_window_bound() {
    let window = Duration::from_millis(1000);
    let limiter = RateLimiter::new(LimiterConfig::new(10, window).unwrap());

    // 37ms spacing does not divide the window evenly, exercising many offsets.
    let metrics = run_flood(&FloodConfig::sustained(Duration::from_millis(37), 400), &limiter);

    assert_eq!(metrics.total_requests(), 400);
    assert_eq!(metrics.max_admitted_in_window(window), 10);
    // ~14.8s of traffic at 10 per second admits about 148.
    assert!(
        (140..=150).contains(&metrics.admitted()),
        "admitted {}",
        metrics.admitted()
    );
}

#[test]
fn test_slow_client_is_always_admitted() {
    let limiter = RateLimiter::new(LimiterConfig::from_millis(1, 100).unwrap());
    let metrics = run_flood(&FloodConfig::sustained(Duration::from_millis(100), 50), &limiter);

    // Each earlier admission is exactly one window old, hence expired.
    assert_eq!(metrics.admitted(), 50);
}

#[test]
fn test_spoofed_forwarded_chains_split_buckets() {
    let limiter = RateLimiter::new(LimiterConfig::from_millis(1, 60_000).unwrap());
    let peer: SocketAddr = "198.51.100.9:55000".parse().unwrap();
    let chains = generators::generate_spoofed_chains("203.0.113.7", 20);

    let admitted_for = |policy: ClientKeyPolicy, limiter: &RateLimiter| {
        chains
            .iter()
            .filter(|chain| {
                let mut headers = HeaderMap::new();
                headers.insert("x-forwarded-for", HeaderValue::from_str(chain).unwrap());
                limiter.check(&policy.client_key(&headers, Some(peer)))
            })
            .count()
    };

    // Forwarded headers are trusted verbatim, so every chain is a new client.
    assert_eq!(admitted_for(ClientKeyPolicy::Forwarded, &limiter), 20);

    // The peer policy sees one client.
    let limiter = RateLimiter::new(LimiterConfig::from_millis(1, 60_000).unwrap());
    assert_eq!(admitted_for(ClientKeyPolicy::Peer, &limiter), 1);
}
