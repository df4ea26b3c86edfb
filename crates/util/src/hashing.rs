//! Stable hashing of JSON values for execution traces.

use serde_json::Value;

/// Computes a deterministic hex digest of a JSON value.
///
/// Object keys are sorted before hashing so two stores with the same
/// contents hash identically regardless of insertion order. The digest is
/// FNV-1a over the canonical rendering; it identifies states within and
/// across runs, it is not a cryptographic commitment.
pub fn stable_value_hash(value: &Value) -> String {
    let mut hash: u64 = 0xcbf29ce484222325;
    hash_value(value, &mut hash);
    format!("{hash:016x}")
}

fn hash_value(value: &Value, hash: &mut u64) {
    match value {
        Value::Null => hash_bytes(b"null", hash),
        Value::Bool(flag) => hash_bytes(if *flag { b"#t" } else { b"#f" }, hash),
        Value::Number(number) => hash_bytes(number.to_string().as_bytes(), hash),
        Value::String(text) => {
            hash_bytes(b"\"", hash);
            hash_bytes(text.as_bytes(), hash);
        }
        Value::Array(items) => {
            hash_bytes(b"[", hash);
            for item in items {
                hash_value(item, hash);
                hash_bytes(b",", hash);
            }
            hash_bytes(b"]", hash);
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            hash_bytes(b"{", hash);
            for key in keys {
                hash_bytes(key.as_bytes(), hash);
                hash_bytes(b":", hash);
                hash_value(&map[key], hash);
                hash_bytes(b",", hash);
            }
            hash_bytes(b"}", hash);
        }
    }
}

fn hash_bytes(bytes: &[u8], hash: &mut u64) {
    for &byte in bytes {
        *hash ^= u64::from(byte);
        *hash = hash.wrapping_mul(0x100000001b3);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_does_not_matter() {
        let left: Value = serde_json::from_str(r#"{"a": 1, "b": 2}"#).unwrap();
        let right: Value = serde_json::from_str(r#"{"b": 2, "a": 1}"#).unwrap();
        assert_eq!(stable_value_hash(&left), stable_value_hash(&right));
    }

    #[test]
    fn different_values_differ() {
        assert_ne!(
            stable_value_hash(&json!({"a": 1})),
            stable_value_hash(&json!({"a": 2}))
        );
        assert_ne!(stable_value_hash(&json!("1")), stable_value_hash(&json!(1)));
        assert_ne!(stable_value_hash(&json!([])), stable_value_hash(&json!({})));
    }

    #[test]
    fn hash_is_stable_across_calls() {
        let value = json!({"nodes": ["a", "b"], "count": 2});
        assert_eq!(stable_value_hash(&value), stable_value_hash(&value));
    }
}
