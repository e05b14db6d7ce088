// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: Apache-2.0

//! Integration tests for the sliding-window rate limiter.

use fleet_key_gateway::limiter::{Decision, LimiterConfig, RateLimiter};
use std::sync::Arc;
use std::time::Duration;

fn limiter(limit: u32, window_ms: u64) -> RateLimiter {
    RateLimiter::new(LimiterConfig::from_millis(limit, window_ms).unwrap())
}

#[test]
fn test_token_endpoint_scenario() {
    let limiter = limiter(5, 60_000);

    for i in 0..5 {
        assert!(limiter.check("1.2.3.4"), "Request {} should be admitted", i + 1);
    }
    assert!(!limiter.check("1.2.3.4"));
}

#[test]
fn test_verify_endpoint_scenario() {
    let limiter = limiter(20, 60_000);

    for i in 0..20 {
        assert!(limiter.check("A"));
        if i == 10 {
            assert!(limiter.check("B"), "Other clients must not be affected");
        }
    }
    assert!(!limiter.check("A"));
    assert!(limiter.check("B"));
}

#[test]
fn test_bound_holds_in_call_order() {
    let limiter = limiter(7, 60_000);

    let results: Vec<bool> = (0..25).map(|_| limiter.check("client")).collect();

    assert!(results[..7].iter().all(|&admitted| admitted));
    assert!(results[7..].iter().all(|&admitted| !admitted));
}

#[tokio::test]
async fn test_window_expiry_with_real_clock() {
    let limiter = limiter(1, 100);

    assert!(limiter.check("k"));
    assert!(!limiter.check("k"));

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(limiter.check("k"));
}

#[tokio::test(start_paused = true)]
async fn test_full_window_reopens_after_window_from_first_admission() {
    let limiter = limiter(3, 1000);

    for _ in 0..3 {
        assert!(limiter.check("k"));
        tokio::time::advance(Duration::from_millis(100)).await;
    }
    assert!(!limiter.check("k"));

    // 1000ms after the first admission only that admission has expired.
    tokio::time::advance(Duration::from_millis(700)).await;
    assert_eq!(limiter.decide("k"), Decision::Admitted { remaining: 0 });
    assert!(!limiter.check("k"));
}

#[test]
fn test_instances_with_same_key_are_independent() {
    let token_limiter = limiter(5, 60_000);
    let verify_limiter = limiter(20, 60_000);

    for _ in 0..5 {
        assert!(token_limiter.check("10.0.0.1"));
    }
    assert!(!token_limiter.check("10.0.0.1"));

    for _ in 0..20 {
        assert!(verify_limiter.check("10.0.0.1"));
    }
    assert!(!verify_limiter.check("10.0.0.1"));
}

#[test]
fn test_parallel_clients_each_get_their_limit() {
    let limiter = Arc::new(limiter(10, 60_000));

    let per_client: Vec<usize> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|client| {
                let limiter = Arc::clone(&limiter);
                scope.spawn(move || {
                    let key = format!("client-{client}");
                    (0..50).filter(|_| limiter.check(&key)).count()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(per_client, vec![10, 10, 10, 10]);
    assert_eq!(limiter.len(), 4);
}
