// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: Apache-2.0

//! Test harness for flooding the rate limiter with simulated clients.

pub mod floods;
pub mod generators;
pub mod metrics;
