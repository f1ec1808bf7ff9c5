//! # Canonical JSON Hashing
//!
//! Produces a stable SHA-256 hex digest over a JSON value, used both for
//! idempotency request hashes and approval fingerprints. Object keys are
//! sorted recursively before serialization so the same logical payload
//! always hashes the same way regardless of field order, matching
//! `json.dumps(..., sort_keys=True, separators=(",", ":"))` in the original
//! implementation.

use serde_json::Value;
use sha2::{Digest, Sha256};

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted: Vec<_> = map.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(b.0));
            let mut out = serde_json::Map::new();
            for (k, v) in sorted {
                out.insert(k.clone(), canonicalize(v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

pub fn canonical_json(value: &Value) -> String {
    serde_json::to_string(&canonicalize(value)).expect("canonicalized value is always serializable")
}

pub fn hash_json(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(value).as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_does_not_affect_hash() {
        let a = json!({"b": 1, "a": 2});
        let b = json!({"a": 2, "b": 1});
        assert_eq!(hash_json(&a), hash_json(&b));
    }

    #[test]
    fn different_values_hash_differently() {
        let a = json!({"a": 1});
        let b = json!({"a": 2});
        assert_ne!(hash_json(&a), hash_json(&b));
    }

    #[test]
    fn canonical_json_has_no_whitespace() {
        let value = json!({"a": [1, 2, 3]});
        assert_eq!(canonical_json(&value), "{\"a\":[1,2,3]}");
    }
}
