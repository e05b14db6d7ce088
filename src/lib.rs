// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Fleet Key Gateway
//!
//! Hosts a partner public key at its well-known path and proxies a few
//! partner fleet API calls behind per-client rate limits:
//!
//! - Token exchange (5 requests per minute per client by default)
//! - Domain verification (20 per minute)
//! - Domain registration (5 per minute)
//!
//! Each endpoint owns a sliding-window [`RateLimiter`]; see [`limiter`].

pub mod client_key;
pub mod config;
pub mod error;
pub mod fleet;
pub mod handlers;
pub mod limiter;
pub mod metrics;
pub mod public_key;

pub use client_key::ClientKeyPolicy;
pub use config::Config;
pub use error::AppError;
pub use handlers::{router, AppState};
pub use limiter::{Decision, LimiterConfig, LimiterError, RateLimiter};
