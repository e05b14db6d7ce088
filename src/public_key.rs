// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Resolution of the partner public key served at the well-known path.
//!
//! Sources are tried in order:
//! 1. Plain PEM text (escaped `\n` sequences become newlines)
//! 2. Base64-encoded PEM, accepted only if it decodes to a PEM block
//! 3. A PEM file, re-read on every request so rotation needs no restart

use crate::config::PublicKeyConfig;
use base64::{
    alphabet,
    engine::{general_purpose::GeneralPurpose, DecodePaddingMode, GeneralPurposeConfig},
    Engine as _,
};
use std::path::Path;
use tracing::debug;

/// Standard alphabet, padding optional.
const PEM_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Resolve the public key from the configured sources.
pub fn resolve(config: &PublicKeyConfig) -> Option<String> {
    config
        .pem
        .as_deref()
        .and_then(normalize_pem)
        .or_else(|| config.pem_base64.as_deref().and_then(decode_base64_pem))
        .or_else(|| config.pem_file.as_deref().and_then(read_pem_file))
}

/// Unescape `\n`, trim, and treat blank input as absent.
pub fn normalize_pem(input: &str) -> Option<String> {
    let unescaped = input.replace("\\n", "\n");
    let trimmed = unescaped.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn decode_base64_pem(input: &str) -> Option<String> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = match PEM_BASE64.decode(compact) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(error = %e, "Public key is not valid base64");
            return None;
        }
    };

    let decoded = String::from_utf8(bytes).ok()?;
    normalize_pem(&decoded).filter(|pem| has_pem_marker(pem))
}

fn read_pem_file(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(contents) => normalize_pem(&contents),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Public key file unreadable");
            None
        }
    }
}

/// Whether `text` contains a `-----BEGIN <LABEL>-----` line, where the label
/// is uppercase letters and spaces.
fn has_pem_marker(text: &str) -> bool {
    const BEGIN: &str = "-----BEGIN ";
    const DASHES: &str = "-----";

    text.match_indices(BEGIN).any(|(start, _)| {
        let rest = &text[start + BEGIN.len()..];
        match rest.find(DASHES) {
            Some(end) if end > 0 => rest[..end]
                .chars()
                .all(|c| c.is_ascii_uppercase() || c == ' '),
            _ => false,
        }
    })
}
