// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Digests used by record producers
//!
//! The metrics engine only compares `prompt_hash` and `rationale_hash` for
//! equality. These helpers exist for code that writes records.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of raw bytes
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Digest of a value rendered as key-sorted compact JSON
pub fn sha256_json<T: Serialize>(value: &T) -> serde_json::Result<String> {
    // Round-trip through Value so object keys come out in BTreeMap order.
    let canonical = serde_json::to_value(value)?;
    let text = serde_json::to_string(&canonical)?;
    Ok(sha256_hex(text.as_bytes()))
}

/// Fingerprint of the exact prompt text sent to a model
///
/// Line endings are normalised so the same prompt hashes identically on
/// every platform.
pub fn prompt_hash(prompt: &str) -> String {
    sha256_hex(prompt.replace("\r\n", "\n").as_bytes())
}
