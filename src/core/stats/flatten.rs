//! Nested JSON to flat CSV columns.
//!
//! Objects nest as `parent_child`. Arrays whose elements are all objects are
//! expanded by index (`parent_0_child`); any other array is kept as JSON text.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};

const SEP: &str = "_";

/// Flattened `column -> cell` map for one object. A non-object value becomes
/// a single `value` column.
pub fn flatten_object(value: &Value) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    match value {
        Value::Object(map) => flatten_into("", map, &mut out),
        other => {
            out.insert("value".to_string(), cell_text(other));
        }
    }
    out
}

fn flatten_into(prefix: &str, map: &Map<String, Value>, out: &mut BTreeMap<String, String>) {
    for (key, value) in map {
        let column = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}{}{}", prefix, SEP, key)
        };

        match value {
            Value::Object(inner) => flatten_into(&column, inner, out),
            Value::Array(items) if items.iter().all(Value::is_object) => {
                for (i, item) in items.iter().enumerate() {
                    if let Value::Object(inner) = item {
                        flatten_into(&format!("{}{}{}", column, SEP, i), inner, out);
                    }
                }
            }
            other => {
                out.insert(column, cell_text(other));
            }
        }
    }
}

/// CSV cell for a JSON value: strings raw, null empty, containers as JSON.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Rows flattened with [`flatten_object`] plus the sorted union of their columns.
pub fn flatten_rows(items: &[Value]) -> (Vec<String>, Vec<Vec<String>>) {
    let flat: Vec<BTreeMap<String, String>> = items.iter().map(flatten_object).collect();
    let header: BTreeSet<&String> = flat.iter().flat_map(|row| row.keys()).collect();
    let header: Vec<String> = header.into_iter().cloned().collect();

    let rows = flat
        .iter()
        .map(|row| {
            header
                .iter()
                .map(|col| row.get(col).cloned().unwrap_or_default())
                .collect()
        })
        .collect();

    (header, rows)
}
