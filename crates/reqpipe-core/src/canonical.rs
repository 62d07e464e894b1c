//! Stable serialisation and non-cryptographic digests.
//!
//! Cache and idempotency keys must be identical for semantically identical
//! requests, so mapping keys are emitted in sorted order and recursion depth
//! is bounded (over-depth values collapse into an `"[Object]"` sentinel).

use serde_json::Value;

use crate::config::Body;

/// Maximum nesting depth before a value collapses into the sentinel.
pub const SERIALIZE_DEPTH_LIMIT: usize = 10;

const OVER_DEPTH_SENTINEL: &str = "\"[Object]\"";

/// Serialises a JSON value into a canonical string: object keys sorted,
/// depth-bounded, no insignificant whitespace.
pub fn stable_stringify(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value, 0);
    out
}

fn write_value(out: &mut String, value: &Value, depth: usize) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(_) => match serde_json::to_string(value) {
            Ok(s) => out.push_str(&s),
            Err(_) => out.push_str("null"),
        },
        Value::Array(items) => {
            if depth >= SERIALIZE_DEPTH_LIMIT {
                out.push_str(OVER_DEPTH_SENTINEL);
                return;
            }
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item, depth + 1);
            }
            out.push(']');
        }
        Value::Object(map) => {
            if depth >= SERIALIZE_DEPTH_LIMIT {
                out.push_str(OVER_DEPTH_SENTINEL);
                return;
            }
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                match serde_json::to_string(key) {
                    Ok(k) => out.push_str(&k),
                    Err(_) => out.push_str("\"\""),
                }
                out.push(':');
                if let Some(v) = map.get(key) {
                    write_value(out, v, depth + 1);
                }
            }
            out.push('}');
        }
    }
}

/// 64-bit FNV-1a digest, hex-encoded.
pub fn fnv1a_hex(input: &[u8]) -> String {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = OFFSET_BASIS;
    for byte in input {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(PRIME);
    }
    format!("{hash:016x}")
}

/// Lexicographic fallback digest (djb2 over the input plus its length).
pub fn simple_digest(input: &str) -> String {
    let mut hash: u32 = 5381;
    for byte in input.bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(u32::from(byte));
    }
    format!("{:08x}-{}", hash, input.len())
}

/// Canonical JSON rendition of a request body, suitable for key derivation.
/// Binary payloads are represented by their length and digest rather than
/// their content.
pub fn body_canonical(body: &Body) -> Value {
    match body {
        Body::Json(v) => v.clone(),
        Body::Text(t) => Value::String(t.clone()),
        Body::Bytes(b) => Value::String(format!("bytes:{}:{}", b.len(), fnv1a_hex(b))),
        Body::Form(pairs) => {
            let mut map = serde_json::Map::new();
            for (k, v) in pairs {
                map.insert(k.clone(), Value::String(v.clone()));
            }
            Value::Object(map)
        }
        Body::Multipart(parts) => Value::Array(
            parts
                .iter()
                .map(|p| {
                    serde_json::json!({
                        "name": p.name,
                        "filename": p.filename,
                        "size": p.data.len(),
                    })
                })
                .collect(),
        ),
    }
}
