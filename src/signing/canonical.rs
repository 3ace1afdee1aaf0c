//! Canonical JSON encoding for signatures
//!
//! Object keys sorted by byte order, no insignificant whitespace, strings
//! and numbers as serde_json prints them. Two semantically equal documents
//! always produce identical bytes regardless of field order.

use serde_json::Value;

/// Field holding an object's certificate; never part of the signed bytes
pub const CERT_FIELD: &str = "cert";

/// Canonical bytes of `value` with any top-level `cert` field removed
pub fn canonical_bytes(value: &Value) -> Vec<u8> {
    let mut out = String::new();
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().filter(|k| k.as_str() != CERT_FIELD).collect();
            keys.sort();
            write_object(&mut out, keys.into_iter().map(|k| (k, &map[k])));
        }
        other => write_value(&mut out, other),
    }
    out.into_bytes()
}

fn write_object<'a>(out: &mut String, entries: impl Iterator<Item = (&'a String, &'a Value)>) {
    out.push('{');
    for (i, (key, value)) in entries.enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_string(out, key);
        out.push(':');
        write_value(out, value);
    }
    out.push('}');
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_string(out, s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            write_object(out, keys.into_iter().map(|k| (k, &map[k])));
        }
    }
}

fn write_string(out: &mut String, s: &str) {
    // serde_json string escaping cannot fail
    out.push_str(&serde_json::to_string(s).unwrap_or_default());
}
