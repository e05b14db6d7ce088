// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Configuration for the fleet key gateway.
//!
//! Default limits match the deployed service: 5 token exchanges, 20
//! verifications and 5 registrations per client per minute.

use crate::client_key::ClientKeyPolicy;
use crate::limiter::{LimiterConfig, LimiterError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Configuration for the gateway service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address (default: 0.0.0.0:8080)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// How requests are mapped to rate limit buckets
    #[serde(default)]
    pub client_key_policy: ClientKeyPolicy,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Partner API endpoints
    #[serde(default)]
    pub fleet: FleetConfig,

    /// Sources for the hosted public key
    #[serde(default)]
    pub public_key: PublicKeyConfig,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Limit for one protected endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointLimit {
    /// Maximum admitted requests per client within the window
    pub limit: u32,
    /// Window length in milliseconds
    pub window_ms: u64,
}

impl EndpointLimit {
    pub const fn new(limit: u32, window_ms: u64) -> Self {
        Self { limit, window_ms }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// `/api/get-token` (default: 5 per 60s)
    #[serde(default = "default_get_token_limit")]
    pub get_token: EndpointLimit,

    /// `/api/verify` (default: 20 per 60s)
    #[serde(default = "default_verify_limit")]
    pub verify: EndpointLimit,

    /// `/api/register` (default: 5 per 60s)
    #[serde(default = "default_register_limit")]
    pub register: EndpointLimit,

    /// Maximum client keys tracked per endpoint (default: 100000, None = unbounded)
    #[serde(default = "default_max_tracked_keys")]
    pub max_tracked_keys: Option<usize>,

    /// Seconds between idle-client sweeps (default: 60, 0 = never)
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

/// Partner API endpoints and OAuth parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetConfig {
    /// North America fleet API base URL
    #[serde(default = "default_na_url")]
    pub na_url: String,

    /// Europe fleet API base URL
    #[serde(default = "default_eu_url")]
    pub eu_url: String,

    /// OAuth token endpoint
    #[serde(default = "default_auth_url")]
    pub auth_url: String,

    /// Audience requested for partner tokens
    #[serde(default = "default_audience")]
    pub audience: String,

    /// Scopes requested for partner tokens
    #[serde(default = "default_scope")]
    pub scope: String,

    /// Upstream request timeout in seconds (default: 30)
    #[serde(default = "default_upstream_timeout_secs")]
    pub timeout_secs: u64,
}

/// Where the hosted public key comes from. The first usable source wins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublicKeyConfig {
    /// PEM text; `\n` escapes are accepted
    #[serde(default)]
    pub pem: Option<String>,

    /// Base64-encoded PEM
    #[serde(default)]
    pub pem_base64: Option<String>,

    /// Path to a PEM file, read on every request
    #[serde(default)]
    pub pem_file: Option<PathBuf>,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable Prometheus metrics endpoint (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics endpoint path (default: /metrics)
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

// Default value functions
fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_get_token_limit() -> EndpointLimit {
    EndpointLimit::new(5, 60_000)
}

fn default_verify_limit() -> EndpointLimit {
    EndpointLimit::new(20, 60_000)
}

fn default_register_limit() -> EndpointLimit {
    EndpointLimit::new(5, 60_000)
}

fn default_max_tracked_keys() -> Option<usize> {
    Some(100_000)
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_na_url() -> String {
    "https://fleet-api.prd.na.vn.cloud.tesla.com".to_string()
}

fn default_eu_url() -> String {
    "https://fleet-api.prd.eu.vn.cloud.tesla.com".to_string()
}

fn default_auth_url() -> String {
    "https://fleet-auth.prd.vn.cloud.tesla.com/oauth2/v3/token".to_string()
}

fn default_audience() -> String {
    default_na_url()
}

fn default_scope() -> String {
    "openid user_data vehicle_device_data vehicle_cmds vehicle_charging_cmds energy_device_data energy_cmds offline_access"
        .to_string()
}

fn default_upstream_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            client_key_policy: ClientKeyPolicy::default(),
            rate_limit: RateLimitConfig::default(),
            fleet: FleetConfig::default(),
            public_key: PublicKeyConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            get_token: default_get_token_limit(),
            verify: default_verify_limit(),
            register: default_register_limit(),
            max_tracked_keys: default_max_tracked_keys(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            na_url: default_na_url(),
            eu_url: default_eu_url(),
            auth_url: default_auth_url(),
            audience: default_audience(),
            scope: default_scope(),
            timeout_secs: default_upstream_timeout_secs(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            path: default_metrics_path(),
        }
    }
}

impl RateLimitConfig {
    /// Build the limiter configuration for one endpoint.
    pub fn limiter_config(&self, endpoint: EndpointLimit) -> Result<LimiterConfig, LimiterError> {
        let config = LimiterConfig::from_millis(endpoint.limit, endpoint.window_ms)?;
        match self.max_tracked_keys {
            Some(max_keys) => config.with_max_keys(max_keys),
            None => Ok(config),
        }
    }

    /// Get the sweep interval, if sweeping is enabled
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }
}

impl FleetConfig {
    /// Base URL for a region name (`na` or `eu`).
    pub fn region_url(&self, region: &str) -> Option<&str> {
        match region {
            "na" => Some(self.na_url.as_str()),
            "eu" => Some(self.eu_url.as_str()),
            _ => None,
        }
    }

    /// Get the upstream request timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from any variable source. Unset or unparseable
    /// values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |name: &str| text_var(&lookup, name);

        let defaults = RateLimitConfig::default();
        let endpoint = |prefix: &str, fallback: EndpointLimit| EndpointLimit {
            limit: parsed_var(&lookup, &format!("{prefix}_LIMIT")).unwrap_or(fallback.limit),
            window_ms: parsed_var(&lookup, &format!("{prefix}_WINDOW_MS"))
                .unwrap_or(fallback.window_ms),
        };

        // 0 disables the cap
        let max_tracked_keys = match parsed_var(&lookup, "RATE_LIMIT_MAX_KEYS") {
            Some(0) => None,
            Some(max_keys) => Some(max_keys),
            None => defaults.max_tracked_keys,
        };

        let fleet_defaults = FleetConfig::default();

        Config {
            bind_addr: text("BIND_ADDR").unwrap_or_else(default_bind_addr),
            client_key_policy: parsed_var(&lookup, "CLIENT_KEY_POLICY").unwrap_or_default(),
            rate_limit: RateLimitConfig {
                get_token: endpoint("GET_TOKEN", defaults.get_token),
                verify: endpoint("VERIFY", defaults.verify),
                register: endpoint("REGISTER", defaults.register),
                max_tracked_keys,
                sweep_interval_secs: parsed_var(&lookup, "RATE_LIMIT_SWEEP_SECS")
                    .unwrap_or(defaults.sweep_interval_secs),
            },
            fleet: FleetConfig {
                na_url: text("FLEET_API_NA_URL").unwrap_or(fleet_defaults.na_url),
                eu_url: text("FLEET_API_EU_URL").unwrap_or(fleet_defaults.eu_url),
                auth_url: text("FLEET_AUTH_URL").unwrap_or(fleet_defaults.auth_url),
                audience: text("FLEET_AUDIENCE").unwrap_or(fleet_defaults.audience),
                scope: text("FLEET_SCOPE").unwrap_or(fleet_defaults.scope),
                timeout_secs: parsed_var(&lookup, "UPSTREAM_TIMEOUT_SECS")
                    .unwrap_or(fleet_defaults.timeout_secs),
            },
            public_key: PublicKeyConfig {
                pem: lookup("TESLA_PUBLIC_KEY"),
                pem_base64: lookup("TESLA_PUBLIC_KEY_BASE64"),
                pem_file: text("TESLA_PUBLIC_KEY_FILE").map(PathBuf::from),
            },
            metrics: MetricsConfig {
                enabled: parsed_var(&lookup, "METRICS_ENABLED").unwrap_or_else(default_true),
                ..Default::default()
            },
        }
    }
}

/// Non-blank variable value.
fn text_var<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).filter(|v| !v.trim().is_empty())
}

fn parsed_var<F, T>(lookup: &F, name: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    text_var(lookup, name).and_then(|v| v.trim().parse().ok())
}
