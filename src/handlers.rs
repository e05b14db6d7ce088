// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! HTTP handlers for the fleet key gateway.
//!
//! Every proxy endpoint checks its own rate limiter before reading the body
//! or contacting the partner API, so a rejected request has no side effects.

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::fleet::{FleetClient, RegionCall, RegionOutcome};
use crate::limiter::{Decision, RateLimiter};
use crate::metrics::Metrics;
use crate::public_key;
use axum::{
    body::Bytes,
    extract::{ConnectInfo, State},
    http::{header, HeaderMap},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Path the partner platform fetches the public key from.
pub const PUBLIC_KEY_PATH: &str = "/.well-known/appspecific/com.tesla.3p.public-key.pem";

const PEM_CONTENT_TYPE: &str = "application/x-pem-file";
const PEM_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

/// Protected endpoints, each with its own limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    GetToken,
    Verify,
    Register,
}

impl Endpoint {
    pub const ALL: [Endpoint; 3] = [Endpoint::GetToken, Endpoint::Verify, Endpoint::Register];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GetToken => "get_token",
            Self::Verify => "verify",
            Self::Register => "register",
        }
    }
}

/// Rate limiters for the protected endpoints.
pub struct Limiters {
    pub get_token: RateLimiter,
    pub verify: RateLimiter,
    pub register: RateLimiter,
}

impl Limiters {
    pub fn get(&self, endpoint: Endpoint) -> &RateLimiter {
        match endpoint {
            Endpoint::GetToken => &self.get_token,
            Endpoint::Verify => &self.verify,
            Endpoint::Register => &self.register,
        }
    }
}

/// Shared application state.
pub struct AppState {
    pub limiters: Limiters,
    pub fleet: FleetClient,
    pub metrics: Metrics,
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        let rate_limit = &config.rate_limit;
        let limiters = Limiters {
            get_token: RateLimiter::new(rate_limit.limiter_config(rate_limit.get_token)?),
            verify: RateLimiter::new(rate_limit.limiter_config(rate_limit.verify)?),
            register: RateLimiter::new(rate_limit.limiter_config(rate_limit.register)?),
        };

        Ok(Self {
            limiters,
            fleet: FleetClient::new(config.fleet.clone())?,
            metrics: Metrics::new()?,
            config,
        })
    }

    /// Drop idle clients from every limiter and refresh the tracked-client gauge.
    pub fn sweep_limiters(&self) -> usize {
        Endpoint::ALL
            .iter()
            .map(|&endpoint| {
                let limiter = self.limiters.get(endpoint);
                let removed = limiter.sweep();
                self.metrics
                    .tracked_clients
                    .with_label_values(&[endpoint.as_str()])
                    .set(limiter.len() as i64);
                removed
            })
            .sum()
    }

    /// Admit the request or fail with [`AppError::RateLimited`].
    fn admit(&self, endpoint: Endpoint, client_key: &str) -> Result<()> {
        let label = [endpoint.as_str()];
        self.metrics.requests.with_label_values(&label).inc();

        match self.limiters.get(endpoint).decide(client_key) {
            Decision::Admitted { remaining } => {
                debug!(endpoint = label[0], client = %client_key, remaining, "Request admitted");
                Ok(())
            }
            Decision::Rejected { retry_after } => {
                self.metrics.rate_limited.with_label_values(&label).inc();
                info!(
                    endpoint = label[0],
                    client = %client_key,
                    retry_after_ms = retry_after.as_millis() as u64,
                    "Request rate limited"
                );
                Err(AppError::RateLimited { retry_after })
            }
        }
    }

    fn client_key(&self, headers: &HeaderMap, peer: Option<ConnectInfo<SocketAddr>>) -> String {
        self.config
            .client_key_policy
            .client_key(headers, peer.map(|ConnectInfo(addr)| addr))
    }

    fn record_upstream_failures(&self, endpoint: Endpoint, count: usize) {
        self.metrics
            .upstream_failures
            .with_label_values(&[endpoint.as_str()])
            .inc_by(count as u64);
    }
}

/// Build the router with all routes.
pub fn router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route(PUBLIC_KEY_PATH, get(serve_public_key))
        .route("/api/get-token", post(get_token))
        .route("/api/verify", post(verify))
        .route("/api/register", post(register))
        .route("/api/readyz", get(readyz))
        .route("/health", get(health));

    if state.config.metrics.enabled {
        router = router.route(&state.config.metrics.path, get(serve_metrics));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Status response for readiness and health probes.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub timestamp: String,
}

/// Token exchange request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
}

/// Domain registration or verification request.
#[derive(Debug, Deserialize)]
pub struct DomainRequest {
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub regions: Option<Value>,
}

impl DomainRequest {
    /// Domain, token and region names, or `None` if any is missing.
    ///
    /// Non-string region entries are kept as their JSON text so they settle
    /// as invalid regions rather than failing the whole request.
    fn into_parts(self) -> Option<(String, String, Vec<String>)> {
        let domain = self.domain.filter(|d| !d.is_empty())?;
        let token = self.token.filter(|t| !t.is_empty())?;
        let regions: Vec<String> = match self.regions? {
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(region) => region,
                    other => other.to_string(),
                })
                .collect(),
            _ => return None,
        };
        (!regions.is_empty()).then_some((domain, token, regions))
    }
}

fn parse_body<T: for<'de> Deserialize<'de>>(body: &Bytes) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| AppError::BadRequest(format!("Invalid JSON body: {e}")))
}

/// Serve the partner public key.
pub async fn serve_public_key(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse> {
    let pem = public_key::resolve(&state.config.public_key).ok_or(AppError::PublicKeyNotFound)?;
    Ok((
        [
            (header::CONTENT_TYPE, PEM_CONTENT_TYPE),
            (header::CACHE_CONTROL, PEM_CACHE_CONTROL),
        ],
        pem,
    ))
}

/// Exchange partner client credentials for an access token.
pub async fn get_token(
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>> {
    let client_key = state.client_key(&headers, peer);
    state.admit(Endpoint::GetToken, &client_key)?;

    let request: TokenRequest = parse_body(&body)?;
    let (Some(client_id), Some(client_secret)) = (
        request.client_id.filter(|v| !v.is_empty()),
        request.client_secret.filter(|v| !v.is_empty()),
    ) else {
        return Err(AppError::BadRequest(
            "clientId and clientSecret are required".to_string(),
        ));
    };

    match state.fleet.exchange_token(&client_id, &client_secret).await {
        Ok(data) => Ok(Json(data)),
        Err(e) => {
            state.record_upstream_failures(Endpoint::GetToken, 1);
            warn!(client = %client_key, error = %e, "Token exchange failed");
            Err(e.into())
        }
    }
}

/// Check which public key each region has on file for a domain.
pub async fn verify(
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Vec<RegionOutcome>>> {
    domain_call(&state, Endpoint::Verify, RegionCall::Verify, peer, &headers, &body).await
}

/// Register a partner domain in each region.
pub async fn register(
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Vec<RegionOutcome>>> {
    domain_call(&state, Endpoint::Register, RegionCall::Register, peer, &headers, &body).await
}

async fn domain_call(
    state: &AppState,
    endpoint: Endpoint,
    call: RegionCall,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<Json<Vec<RegionOutcome>>> {
    let client_key = state.client_key(headers, peer);
    state.admit(endpoint, &client_key)?;

    let request: DomainRequest = parse_body(body)?;
    let (domain, token, regions) = request.into_parts().ok_or_else(|| {
        AppError::BadRequest("Domain, token, and at least one region are required".to_string())
    })?;

    let outcomes = state.fleet.settle_regions(call, &regions, &domain, &token).await;

    let failed = outcomes.iter().filter(|o| !o.is_fulfilled()).count();
    if failed > 0 {
        state.record_upstream_failures(endpoint, failed);
        warn!(
            endpoint = endpoint.as_str(),
            %domain,
            failed,
            total = outcomes.len(),
            "Some regions rejected the request"
        );
    }

    Ok(Json(outcomes))
}

/// Readiness probe.
pub async fn readyz() -> Json<StatusResponse> {
    Json(StatusResponse { status: "ok" })
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "fleet-key-gateway",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// Prometheus metrics endpoint.
pub async fn serve_metrics(State(state): State<Arc<AppState>>) -> Result<String> {
    for endpoint in Endpoint::ALL {
        state
            .metrics
            .tracked_clients
            .with_label_values(&[endpoint.as_str()])
            .set(state.limiters.get(endpoint).len() as i64);
    }
    Ok(state.metrics.render()?)
}
