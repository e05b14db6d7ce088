// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Client for the partner fleet API.
//!
//! Covers the three calls the gateway proxies: the OAuth client-credentials
//! token exchange, and per-region partner domain registration and public key
//! verification. Region calls are fanned out concurrently and every region
//! settles independently, so one failing region never hides another's result.

use crate::config::FleetConfig;
use futures::future::join_all;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

const PARTNER_ACCOUNTS_PATH: &str = "/api/1/partner_accounts";
const PARTNER_PUBLIC_KEY_PATH: &str = "/api/1/partner_accounts/public_key";

/// Fleet API error types.
#[derive(Debug, Error)]
pub enum FleetError {
    #[error("Invalid region specified: {0}")]
    InvalidRegion(String),

    #[error("API error for region {region}: {message}")]
    RegionApi { region: String, message: String },

    #[error("Request to region {region} failed: {source}")]
    RegionTransport {
        region: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{0}")]
    TokenRejected(String),

    #[error("Token request failed: {0}")]
    TokenTransport(#[source] reqwest::Error),

    #[error("Invalid upstream URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("HTTP client error: {0}")]
    Client(#[source] reqwest::Error),
}

impl FleetError {
    /// Whether the upstream could not be reached or answered unreadably.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::RegionTransport { .. } | Self::TokenTransport(_) | Self::Client(_)
        )
    }
}

/// Partner API operation fanned out across regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionCall {
    /// Register the partner domain in the region.
    Register,
    /// Fetch the public key the region has on file for the domain.
    Verify,
}

/// Successful region response.
#[derive(Debug, Clone, Serialize)]
pub struct RegionSuccess {
    pub region: String,
    pub data: Value,
    pub url: String,
}

/// Why a region failed.
#[derive(Debug, Clone, Serialize)]
pub struct RejectionReason {
    pub message: String,
}

/// Region a rejection belongs to.
#[derive(Debug, Clone, Serialize)]
pub struct RegionRef {
    pub region: String,
}

/// Settled result of one region call.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RegionOutcome {
    Fulfilled {
        value: RegionSuccess,
    },
    Rejected {
        reason: RejectionReason,
        value: RegionRef,
    },
}

impl RegionOutcome {
    fn settle(region: &str, result: Result<RegionSuccess, FleetError>) -> Self {
        match result {
            Ok(value) => Self::Fulfilled { value },
            Err(e) => Self::Rejected {
                reason: RejectionReason {
                    message: e.to_string(),
                },
                value: RegionRef {
                    region: region.to_string(),
                },
            },
        }
    }

    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Self::Fulfilled { .. })
    }

    pub fn region(&self) -> &str {
        match self {
            Self::Fulfilled { value } => &value.region,
            Self::Rejected { value, .. } => &value.region,
        }
    }
}

/// Partner fleet API client.
#[derive(Debug, Clone)]
pub struct FleetClient {
    http: reqwest::Client,
    config: FleetConfig,
}

impl FleetClient {
    pub fn new(config: FleetConfig) -> Result<Self, FleetError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(FleetError::Client)?;
        Ok(Self { http, config })
    }

    /// Exchange partner client credentials for an access token.
    ///
    /// Returns the token endpoint's JSON response unchanged.
    pub async fn exchange_token(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<Value, FleetError> {
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("scope", self.config.scope.as_str()),
            ("audience", self.config.audience.as_str()),
        ];

        let response = self
            .http
            .post(&self.config.auth_url)
            .form(&form)
            .send()
            .await
            .map_err(FleetError::TokenTransport)?;

        let ok = response.status().is_success();
        let data: Value = response.json().await.map_err(FleetError::TokenTransport)?;

        if !ok {
            let message = upstream_message(&data, &["error_description", "error"])
                .unwrap_or("Failed to fetch token from Tesla API");
            warn!(error = %message, "Token exchange rejected");
            return Err(FleetError::TokenRejected(message.to_string()));
        }

        Ok(data)
    }

    /// Run `call` against every region concurrently, preserving request order.
    pub async fn settle_regions(
        &self,
        call: RegionCall,
        regions: &[String],
        domain: &str,
        token: &str,
    ) -> Vec<RegionOutcome> {
        let calls = regions.iter().map(|region| async move {
            let result = self.call_region(call, region, domain, token).await;
            RegionOutcome::settle(region, result)
        });
        join_all(calls).await
    }

    async fn call_region(
        &self,
        call: RegionCall,
        region: &str,
        domain: &str,
        token: &str,
    ) -> Result<RegionSuccess, FleetError> {
        let base = self
            .config
            .region_url(region)
            .ok_or_else(|| FleetError::InvalidRegion(region.to_string()))?;

        let request = match call {
            RegionCall::Verify => {
                let mut url = endpoint(base, PARTNER_PUBLIC_KEY_PATH)?;
                url.query_pairs_mut().append_pair("domain", domain);
                self.http.get(url)
            }
            RegionCall::Register => {
                let url = endpoint(base, PARTNER_ACCOUNTS_PATH)?;
                self.http.post(url).json(&json!({ "domain": domain }))
            }
        };

        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|source| FleetError::RegionTransport {
                region: region.to_string(),
                source,
            })?;

        let url = response.url().to_string();
        let ok = response.status().is_success();
        let data: Value = response
            .json()
            .await
            .map_err(|source| FleetError::RegionTransport {
                region: region.to_string(),
                source,
            })?;

        if !ok {
            let message = upstream_message(&data, &["error"]).unwrap_or("Unknown API error");
            debug!(region, ?call, error = %message, "Region call rejected");
            return Err(FleetError::RegionApi {
                region: region.to_string(),
                message: message.to_string(),
            });
        }

        Ok(RegionSuccess {
            region: region.to_string(),
            data,
            url,
        })
    }
}

/// Join an API path onto a configured base URL, keeping any base path prefix.
fn endpoint(base: &str, path: &str) -> Result<Url, FleetError> {
    Ok(Url::parse(&format!("{}{}", base.trim_end_matches('/'), path))?)
}

/// First non-empty string among `fields` of an upstream JSON body.
fn upstream_message<'a>(data: &'a Value, fields: &[&str]) -> Option<&'a str> {
    fields
        .iter()
        .filter_map(|field| data.get(*field).and_then(Value::as_str))
        .find(|message| !message.is_empty())
}
