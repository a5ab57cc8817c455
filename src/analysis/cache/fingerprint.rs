//! Deterministic cache fingerprints.
//!
//! A fingerprint binds {session, stage, catalog version, input content} into
//! one opaque key. Versions are part of the key rather than subject to
//! explicit invalidation sweeps: publishing a new catalog simply makes old
//! entries unreachable.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::analysis::types::CatalogVersion;

/// Key-space prefix; bump when the key layout itself changes.
const KEY_SCHEMA: &str = "va1";

/// Hex SHA-256 of a value's canonical JSON encoding.
///
/// All cached payloads serialize through ordered containers (vectors, typed
/// structs), so the encoding is deterministic for identical values.
pub fn content_hash<T: Serialize>(value: &T) -> String {
    let encoded = serde_json::to_vec(value).unwrap_or_default();
    let digest = Sha256::digest(&encoded);
    hex_encode(&digest)
}

/// Prefix under which all of one session's keys live.
pub fn session_prefix(session_id: &str) -> String {
    format!("{KEY_SCHEMA}:{session_id}:")
}

/// Full stage fingerprint.
pub fn stage_key(
    session_id: &str,
    stage: &str,
    version: CatalogVersion,
    input_hash: &str,
) -> String {
    format!("{KEY_SCHEMA}:{session_id}:{stage}:{version}:{input_hash}")
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}
