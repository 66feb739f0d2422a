//! Content fingerprints for inbound events.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Deterministic identifier of an inbound event: `"{source}_{sha256}"`.
///
/// The hash covers the source tag and a canonical rendering of the payload,
/// so key order and `1` versus `1.0` never change the result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventFingerprint(String);

impl EventFingerprint {
    pub fn compute(source: &str, payload: &Value) -> Self {
        let mut canonical = String::with_capacity(256);
        canonical.push_str("{\"payload\":");
        write_canonical(payload, &mut canonical);
        canonical.push_str(",\"source\":");
        push_json_string(source, &mut canonical);
        canonical.push('}');

        let digest = Sha256::digest(canonical.as_bytes());
        Self(format!("{}_{}", source, hex::encode(digest)))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for EventFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EventFingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => {
            // Integral floats render as integers.
            match (n.as_i64(), n.as_u64(), n.as_f64()) {
                (Some(i), _, _) => out.push_str(&i.to_string()),
                (None, Some(u), _) => out.push_str(&u.to_string()),
                (None, None, Some(f))
                    if f.fract() == 0.0 && f.is_finite() && f.abs() < i64::MAX as f64 =>
                {
                    out.push_str(&(f as i64).to_string())
                }
                _ => out.push_str(&n.to_string()),
            }
        }
        Value::String(s) => push_json_string(s, out),
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
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                push_json_string(key, out);
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
    }
}

fn push_json_string(s: &str, out: &mut String) {
    // Serializing a &str cannot fail.
    match serde_json::to_string(s) {
        Ok(escaped) => out.push_str(&escaped),
        Err(_) => out.push_str(s),
    }
}
