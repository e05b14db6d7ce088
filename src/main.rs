// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Fleet Key Gateway Service
//!
//! ## Configuration
//!
//! Configuration is loaded from environment variables (a `.env` file is read
//! first when present):
//!
//! - `BIND_ADDR`: Server bind address (default: 0.0.0.0:8080)
//! - `CLIENT_KEY_POLICY`: `forwarded` or `peer` (default: forwarded)
//! - `GET_TOKEN_LIMIT` / `GET_TOKEN_WINDOW_MS`: token exchange limit (default: 5 / 60000)
//! - `VERIFY_LIMIT` / `VERIFY_WINDOW_MS`: verification limit (default: 20 / 60000)
//! - `REGISTER_LIMIT` / `REGISTER_WINDOW_MS`: registration limit (default: 5 / 60000)
//! - `RATE_LIMIT_MAX_KEYS`: clients tracked per endpoint, 0 for unbounded (default: 100000)
//! - `RATE_LIMIT_SWEEP_SECS`: idle-client sweep interval, 0 to disable (default: 60)
//! - `FLEET_API_NA_URL`, `FLEET_API_EU_URL`, `FLEET_AUTH_URL`: partner endpoints
//! - `TESLA_PUBLIC_KEY`, `TESLA_PUBLIC_KEY_BASE64`, `TESLA_PUBLIC_KEY_FILE`: key sources

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{debug, error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fleet_key_gateway::{router, AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let config = Config::from_env();
    let rate_limit = &config.rate_limit;
    info!(
        bind_addr = %config.bind_addr,
        client_key_policy = ?config.client_key_policy,
        get_token_limit = rate_limit.get_token.limit,
        verify_limit = rate_limit.verify.limit,
        register_limit = rate_limit.register.limit,
        max_tracked_keys = ?rate_limit.max_tracked_keys,
        "Starting fleet key gateway"
    );

    let sweep_interval = rate_limit.sweep_interval();
    let addr: SocketAddr = config.bind_addr.parse()?;
    let state = Arc::new(AppState::new(config)?);

    // Spawn sweep task
    if let Some(every) = sweep_interval {
        let sweep_state = state.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                let removed = sweep_state.sweep_limiters();
                debug!(removed, "Swept idle rate limit clients");
            }
        });
    }

    let app = router(state);

    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Fleet key gateway stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
