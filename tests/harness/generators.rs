// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: Apache-2.0

//! Client key generators for flood simulation.

use std::net::{IpAddr, Ipv4Addr};

/// Generate a pool of client keys as forwarded-for addresses.
pub fn generate_client_keys(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| {
            // Use 10.x.x.x private range
            let a = ((i >> 16) & 0xFF) as u8;
            let b = ((i >> 8) & 0xFF) as u8;
            let c = (i & 0xFF) as u8;
            IpAddr::V4(Ipv4Addr::new(10, a, b, c)).to_string()
        })
        .collect()
}

/// Generate spoofed forwarded-for chains that all start with `victim`.
pub fn generate_spoofed_chains(victim: &str, count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("{victim}, 172.16.0.{}", i % 256))
        .collect()
}
