//! Hashing System - SHA-256 for Manifests
//!
//! Provides deterministic hashes so an edition can be audited and its
//! configuration recognised later.

use serde::Serialize;
use serde_json::{to_string, Value};
use sha2::{Digest, Sha256};

/// Compute SHA-256 hash of bytes, return hex string
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Convert to canonical JSON (sorted keys, no whitespace)
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let v: Value = serde_json::to_value(value)?;
    to_string(&sort_value(&v))
}

fn sort_value(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut sorted: Vec<_> = map.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                sorted
                    .into_iter()
                    .map(|(k, v)| (k.clone(), sort_value(v)))
                    .collect(),
            )
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_value).collect()),
        _ => v.clone(),
    }
}

/// Hash of any serializable document in canonical form
pub fn compute_manifest_hash<T: Serialize>(manifest: &T) -> Result<String, serde_json::Error> {
    Ok(sha256_hex(canonical_json(manifest)?.as_bytes()))
}

/// Item hash = sha256(canonical metadata + ":" + image content hash)
pub fn compute_item_hash(
    metadata: &impl Serialize,
    image_hash: &str,
) -> Result<String, serde_json::Error> {
    let combined = format!("{}:{}", canonical_json(metadata)?, image_hash);
    Ok(sha256_hex(combined.as_bytes()))
}
