// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Client key derivation for rate limiting.
//!
//! `forwarded` trusts proxy headers and falls back to a shared `unknown`
//! bucket. Anyone can send those headers, so deployments not behind a
//! trusted proxy should use `peer`.

use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::str::FromStr;
use thiserror::Error;

/// Key shared by every client that cannot be identified.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Headers consulted by [`ClientKeyPolicy::Forwarded`], in order.
const FORWARDED_HEADERS: [&str; 2] = ["x-forwarded-for", "remote-addr"];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Unknown client key policy {0:?}: expected \"forwarded\" or \"peer\"")]
pub struct UnknownPolicy(pub String);

/// How a request is mapped to a rate limit bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientKeyPolicy {
    /// `X-Forwarded-For`, then `Remote-Addr`, then `unknown`. The first
    /// non-empty header value is used verbatim, whitespace included.
    #[default]
    Forwarded,
    /// IP of the TCP peer.
    Peer,
}

impl ClientKeyPolicy {
    /// Derive the client key for a request.
    pub fn client_key(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
        let key = match self {
            Self::Forwarded => forwarded_client(headers),
            Self::Peer => peer.map(|addr| addr.ip().to_string()),
        };
        key.unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
    }
}

fn forwarded_client(headers: &HeaderMap) -> Option<String> {
    FORWARDED_HEADERS.iter().find_map(|name| {
        headers
            .get(*name)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .map(str::to_owned)
    })
}

impl FromStr for ClientKeyPolicy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "forwarded" => Ok(Self::Forwarded),
            "peer" => Ok(Self::Peer),
            _ => Err(UnknownPolicy(s.to_string())),
        }
    }
}
