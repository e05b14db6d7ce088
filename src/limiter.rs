// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Sliding-window rate limiter for the partner API proxy endpoints.
//!
//! Every protected endpoint owns its own [`RateLimiter`]. A check:
//! 1. Drops the client's timestamps that are `window` old or older
//! 2. Rejects without recording if `limit` timestamps remain
//! 3. Otherwise records the current instant and admits
//!
//! The whole sequence runs under the client key's shard guard, so concurrent
//! checks for one key never both see room for a final slot.

use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// A new key at capacity frees `max_keys / EVICTION_DIVISOR` slots.
const EVICTION_DIVISOR: usize = 10;

/// Invalid limiter configuration.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LimiterError {
    #[error("rate limit must allow at least one request per window")]
    ZeroLimit,

    #[error("rate limit window must be longer than zero")]
    ZeroWindow,

    #[error("client capacity must be at least one key when set")]
    ZeroCapacity,
}

/// Immutable limiter configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterConfig {
    limit: u32,
    window: Duration,
    max_keys: Option<usize>,
}

impl LimiterConfig {
    /// Allow `limit` admissions per client within any trailing `window`.
    pub fn new(limit: u32, window: Duration) -> Result<Self, LimiterError> {
        if limit == 0 {
            return Err(LimiterError::ZeroLimit);
        }
        if window.is_zero() {
            return Err(LimiterError::ZeroWindow);
        }
        Ok(Self {
            limit,
            window,
            max_keys: None,
        })
    }

    pub fn from_millis(limit: u32, window_ms: u64) -> Result<Self, LimiterError> {
        Self::new(limit, Duration::from_millis(window_ms))
    }

    /// Cap the number of tracked client keys.
    ///
    /// When a new key arrives at capacity, clients with no live admissions
    /// are dropped, then the least recently seen keys are forgotten until a
    /// tenth of the capacity is free. The cap is soft: distinct new keys
    /// inserted concurrently may overshoot it by the number of racing callers.
    pub fn with_max_keys(mut self, max_keys: usize) -> Result<Self, LimiterError> {
        if max_keys == 0 {
            return Err(LimiterError::ZeroCapacity);
        }
        self.max_keys = Some(max_keys);
        Ok(self)
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn max_keys(&self) -> Option<usize> {
        self.max_keys
    }
}

/// Outcome of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request may proceed and has been recorded.
    Admitted {
        /// Admissions left in the current window
        remaining: u32,
    },
    /// The request must not proceed. Nothing was recorded.
    Rejected {
        /// Time until the oldest retained admission leaves the window
        retry_after: Duration,
    },
}

impl Decision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Admitted { .. })
    }
}

/// Admission history for one client key.
#[derive(Debug, Default)]
struct ClientHistory {
    /// Admission instants, oldest first
    admitted: VecDeque<Instant>,
    /// Last time this key was checked, admitted or not
    last_seen: Option<Instant>,
}

impl ClientHistory {
    /// Drop admissions that are `window` old or older at `now`.
    fn evict_expired(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.admitted.front() {
            if now.saturating_duration_since(oldest) < window {
                break;
            }
            self.admitted.pop_front();
        }
    }
}

/// Per-client sliding-window rate limiter.
#[derive(Debug)]
pub struct RateLimiter {
    config: LimiterConfig,
    clients: DashMap<String, ClientHistory>,
}

impl RateLimiter {
    pub fn new(config: LimiterConfig) -> Self {
        Self {
            config,
            clients: DashMap::new(),
        }
    }

    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    /// Admit (`true`) or reject (`false`) a request from `client_key`.
    ///
    /// The key is used verbatim, so an empty key is a bucket like any other.
    pub fn check(&self, client_key: &str) -> bool {
        self.decide(client_key).is_admitted()
    }

    /// Same as [`check`](Self::check) with the remaining budget or retry delay.
    pub fn decide(&self, client_key: &str) -> Decision {
        self.decide_with(client_key, Instant::now)
    }

    /// Decide as if the current time were `now`.
    ///
    /// An instant earlier than the key's last check is treated as that last
    /// check, keeping each history ordered.
    pub fn decide_at(&self, client_key: &str, now: Instant) -> Decision {
        self.decide_with(client_key, || now)
    }

    fn decide_with(&self, client_key: &str, clock: impl Fn() -> Instant) -> Decision {
        if let Some(max_keys) = self.config.max_keys {
            // Must run before `entry`: scanning the map while holding a shard
            // guard would deadlock.
            if !self.clients.contains_key(client_key) && self.clients.len() >= max_keys {
                self.make_room(max_keys, clock());
            }
        }

        let window = self.config.window;
        let limit = self.config.limit as usize;

        let mut history = self.clients.entry(client_key.to_owned()).or_default();

        // Read the clock under the guard so admissions for a key stay ordered.
        let now = match history.last_seen {
            Some(last_seen) => clock().max(last_seen),
            None => clock(),
        };
        history.last_seen = Some(now);
        history.evict_expired(now, window);

        if history.admitted.len() >= limit {
            let retry_after = history
                .admitted
                .front()
                .map(|&oldest| {
                    oldest
                        .checked_add(window)
                        .map_or(Duration::MAX, |expiry| expiry.saturating_duration_since(now))
                })
                .unwrap_or(Duration::ZERO);
            return Decision::Rejected { retry_after };
        }

        history.admitted.push_back(now);
        Decision::Admitted {
            remaining: (limit - history.admitted.len()) as u32,
        }
    }

    /// Sweep idle clients, then evict the least recently seen keys until
    /// `max_keys / EVICTION_DIVISOR` slots are free.
    fn make_room(&self, max_keys: usize, now: Instant) {
        self.sweep_at(now);

        let target = max_keys - (max_keys / EVICTION_DIVISOR).max(1);
        let excess = self.clients.len().saturating_sub(target);
        if excess == 0 {
            return;
        }

        let mut by_recency: Vec<(Option<Instant>, String)> = self
            .clients
            .iter()
            .map(|entry| (entry.value().last_seen, entry.key().clone()))
            .collect();
        if excess < by_recency.len() {
            by_recency.select_nth_unstable_by_key(excess, |(last_seen, _)| *last_seen);
            by_recency.truncate(excess);
        }

        for (last_seen, key) in by_recency {
            // Keys checked since the snapshot stay.
            self.clients
                .remove_if(&key, |_, history| history.last_seen == last_seen);
        }
    }

    /// Forget every client whose history is empty once expired admissions are
    /// dropped. Returns the number of keys removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    fn sweep_at(&self, now: Instant) -> usize {
        let window = self.config.window;
        let mut removed = 0;

        self.clients.retain(|_, history| {
            history.evict_expired(now, window);
            let keep = !history.admitted.is_empty();
            if !keep {
                removed += 1;
            }
            keep
        });

        removed
    }

    /// Number of tracked client keys.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
