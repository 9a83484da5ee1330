//! Canonical JSON encoding and stable hashing, shared by the approval
//! classifier's rule keys (C5) and the retry/stability signatures (C10).
//!
//! No language-specific stringification: keys are sorted, `null`/absent
//! values are omitted from objects, and the encoder recurses into arrays
//! and nested objects so the same logical value always produces the same
//! bytes regardless of insertion order.

use sha2::{Digest, Sha256};
use std::fmt::Write as _;

/// Render `value` as canonical JSON: object keys sorted, no whitespace.
pub fn canonical_json(value: &serde_json::Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::Null => out.push_str("null"),
        serde_json::Value::Bool(b) => {
            out.push_str(if *b { "true" } else { "false" });
        }
        serde_json::Value::Number(n) => {
            let _ = write!(out, "{n}");
        }
        serde_json::Value::String(s) => {
            out.push_str(&serde_json::to_string(s).expect("string always serializes"));
        }
        serde_json::Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            let mut first = true;
            for key in keys {
                let v = &map[key];
                if v.is_null() {
                    continue;
                }
                if !first {
                    out.push(',');
                }
                first = false;
                out.push_str(&serde_json::to_string(key).expect("key always serializes"));
                out.push(':');
                write_canonical(v, out);
            }
            out.push('}');
        }
    }
}

/// SHA-256 hex digest of a string, used as the stable signature value.
pub fn stable_hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

/// Stable hash of a canonical-JSON value, optionally namespaced by a prefix
/// (e.g. tool name, or "cwd-resolved" command text) so callers don't need to
/// build a wrapper object just to add a discriminant.
pub fn stable_hash_of(prefix: &str, value: &serde_json::Value) -> String {
    stable_hash(&format!("{prefix}\u{0}{}", canonical_json(value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_json_sorts_keys() {
        let a = canonical_json(&json!({"b": 1, "a": 2}));
        let b = canonical_json(&json!({"a": 2, "b": 1}));
        assert_eq!(a, b);
        assert_eq!(a, r#"{"a":2,"b":1}"#);
    }

    #[test]
    fn canonical_json_omits_null_values() {
        let s = canonical_json(&json!({"a": 1, "b": null}));
        assert_eq!(s, r#"{"a":1}"#);
    }

    #[test]
    fn canonical_json_recurses_into_arrays() {
        let s = canonical_json(&json!({"list": [{"z": 1, "a": 2}]}));
        assert_eq!(s, r#"{"list":[{"a":2,"z":1}]}"#);
    }

    #[test]
    fn stable_hash_is_deterministic() {
        assert_eq!(stable_hash("same input"), stable_hash("same input"));
        assert_ne!(stable_hash("a"), stable_hash("b"));
    }

    #[test]
    fn stable_hash_of_is_order_independent() {
        let a = stable_hash_of("execute_command", &json!({"command": "ls", "cwd": "/tmp"}));
        let b = stable_hash_of("execute_command", &json!({"cwd": "/tmp", "command": "ls"}));
        assert_eq!(a, b);
    }
}
