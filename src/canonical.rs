//! Canonical serialization for deterministic fingerprints.
//!
//! Registry fingerprints and batch identifiers are xxh64 hashes over
//! canonical JSON bytes.
//!
//! ## Determinism Guarantees
//!
//! - Stable field order: struct fields serialize in declaration order
//! - Stable Vec order: vectors serialize in index order
//! - No HashMap allowed: use BTreeMap for maps in hashed data
//! - Selectors and addresses serialize as lowercase hex strings

use serde::Serialize;
use xxhash_rust::xxh64::xxh64;

/// Serialize a value to canonical JSON bytes for hashing.
///
/// Kernel types always serialize (every map key is a string), so a failure
/// here yields empty bytes rather than a panic.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Vec<u8> {
    serde_json::to_vec(value).unwrap_or_default()
}

/// Compute canonical hash of a serializable value.
pub fn canonical_hash<T: Serialize>(value: &T) -> u64 {
    let bytes = to_canonical_bytes(value);
    xxh64(&bytes, 0)
}

/// Compute canonical hash and return as hex string.
pub fn canonical_hash_hex<T: Serialize>(value: &T) -> String {
    format!("{:016x}", canonical_hash(value))
}
