//! Canonical rendering of free-form metadata maps.
//!
//! Account and currency identifiers may carry arbitrary JSON metadata. Two
//! identifiers are equal iff their canonical string forms are byte-identical,
//! so the rendering must be deterministic: map keys are emitted in byte order
//! and every value kind has exactly one representation.

use std::collections::BTreeMap;
use std::fmt::Write;

use serde_json::Value;

/// A metadata map attached to an identifier. `BTreeMap` keeps keys sorted,
/// which makes serialization and iteration order deterministic for free.
pub type Metadata = BTreeMap<String, Value>;

/// Render a metadata map as `map[k1:v1 k2:v2]` with keys in byte order.
pub fn render_metadata(metadata: &Metadata) -> String {
    let mut out = String::from("map[");
    for (i, (key, value)) in metadata.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{key}:");
        render_value(&mut out, value);
    }
    out.push(']');
    out
}

/// Render a single JSON value. Strings and numbers are emitted bare (no
/// quoting), so `"1"` and `1` collide intentionally: identifiers that differ
/// only in metadata value *type* are treated as the same identifier.
fn render_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("<nil>"),
        Value::Bool(b) => {
            let _ = write!(out, "{b}");
        }
        Value::Number(n) => {
            let _ = write!(out, "{n}");
        }
        Value::String(s) => out.push_str(s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                render_value(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            // serde_json's default map is ordered by key, matching the
            // top-level sorting rule for nested objects.
            out.push_str("map[");
            for (i, (key, item)) in map.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                let _ = write!(out, "{key}:");
                render_value(out, item);
            }
            out.push(']');
        }
    }
}
