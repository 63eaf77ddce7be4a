//! Version tokens for cached narratives.
//!
//! Tokens are compared for equality only. They carry no ordering and are not
//! meant to be decoded.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::{IndicatorFeature, InsightResult};

/// Bytes of the digest kept for per-indicator tokens
const INDICATOR_TOKEN_BYTES: usize = 16;

/// Serialize `value` with object keys sorted at every depth, no whitespace.
pub fn canonical_json(value: &Value) -> String {
    sorted(value).to_string()
}

/// Rebuild objects with keys inserted in sorted order. The result serializes
/// sorted whether or not `serde_json/preserve_order` is enabled in the build.
fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, item)| (key.clone(), sorted(item)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        scalar => scalar.clone(),
    }
}

fn sha256(bytes: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().to_vec()
}

/// Token over the fields an indicator narrative talks about: latest value,
/// 1-month delta and 3-year z-score.
pub fn indicator_fingerprint(feature: &IndicatorFeature) -> String {
    let watched = serde_json::json!({
        "val": feature.latest_value,
        "d1m": feature.delta_1m,
        "z3y": feature.zscore_3y,
    });
    let digest = sha256(canonical_json(&watched).as_bytes());
    hex::encode(&digest[..INDICATOR_TOKEN_BYTES])
}

/// Full SHA-256 over the canonical form of an arbitrary payload
pub fn payload_hash<T: Serialize>(payload: &T) -> InsightResult<String> {
    let value = serde_json::to_value(payload)?;
    Ok(hex::encode(sha256(canonical_json(&value).as_bytes())))
}
