//! Content fingerprints over structured account state.
//!
//! The input is first converted to a `serde_json::Value`, then written in a
//! canonical form (object keys sorted, no whitespace) and hashed with
//! SHA-256. Two inputs that are structurally equal produce the same
//! fingerprint no matter how their maps were built.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Fingerprint an arbitrary serializable snapshot.
pub fn compute<T: Serialize + ?Sized>(snapshot: &T) -> Result<String, serde_json::Error> {
    let value = serde_json::to_value(snapshot)?;
    Ok(compute_value(&value))
}

/// Fingerprint an already-built JSON value.
pub fn compute_value(value: &Value) -> String {
    let mut canonical = String::new();
    write_canonical(value, &mut canonical);
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();

            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // String serialization cannot fail
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    #[test]
    fn test_deterministic() {
        let snapshot = json!({"account": {"id": 1}, "managers": {"5": {"active": true}}});
        assert_eq!(compute_value(&snapshot), compute_value(&snapshot));
        assert_eq!(compute_value(&snapshot).len(), 64);
    }

    #[test]
    fn test_independent_of_insertion_order() {
        let mut first = Map::new();
        first.insert("zeta".into(), json!(1));
        first.insert("alpha".into(), json!({"b": 2, "a": 1}));

        let mut second = Map::new();
        second.insert("alpha".into(), json!({"a": 1, "b": 2}));
        second.insert("zeta".into(), json!(1));

        assert_eq!(
            compute_value(&Value::Object(first)),
            compute_value(&Value::Object(second))
        );
    }

    #[test]
    fn test_semantic_change_changes_fingerprint() {
        let before = json!({"managers": {"1": {"active": true}}});
        let added = json!({"managers": {"1": {"active": true}, "2": {"active": true}}});
        let changed = json!({"managers": {"1": {"active": false}}});

        assert_ne!(compute_value(&before), compute_value(&added));
        assert_ne!(compute_value(&before), compute_value(&changed));
    }

    #[test]
    fn test_array_order_matters() {
        assert_ne!(compute_value(&json!([1, 2])), compute_value(&json!([2, 1])));
    }

    #[test]
    fn test_type_distinctions() {
        assert_ne!(compute_value(&json!({"id": 1})), compute_value(&json!({"id": "1"})));
        assert_ne!(compute_value(&json!(null)), compute_value(&json!("null")));
    }

    #[test]
    fn test_compute_from_struct() {
        #[derive(Serialize)]
        struct Snapshot {
            id: u32,
            name: &'static str,
        }
        let from_struct = compute(&Snapshot { id: 7, name: "acme" }).unwrap();
        let from_value = compute_value(&json!({"name": "acme", "id": 7}));
        assert_eq!(from_struct, from_value);
    }
}
