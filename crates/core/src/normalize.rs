//! Canonical form of a configuration.
//!
//! Two configurations that differ only in key order, surrounding whitespace of
//! textual fields, number spelling or attribute column order normalize to the
//! same bytes and therefore the same fingerprint. Numeric strings are not
//! turned into numbers: the aggregation fields reject them during validation
//! and every other option is stored and served exactly as given.

use crate::hash::Fingerprint;
use crate::mapconfig::{LayerOption, MapConfig};
use serde_json::{Map, Number, Value};

/// Largest integer an `f64` represents exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Normalize a configuration into its canonical JSON value.
pub fn normalize(config: &MapConfig) -> crate::Result<Value> {
    let mut config = config.clone();

    config.version = config.version.trim().to_string();
    for layer in &mut config.layers {
        layer.layer_type = layer.layer_type.trim().to_string();
        if layer.layer_type.is_empty() {
            layer.layer_type = crate::mapconfig::DEFAULT_LAYER_TYPE.to_string();
        }
        layer.id = layer.id.take().map(|id| id.trim().to_string());

        let options = &mut layer.options;
        trim_opt(&mut options.sql);
        trim_opt(&mut options.style);
        trim_opt(&mut options.style_version);

        for category in &mut options.categories {
            if let LayerOption::Attributes(spec) = category {
                spec.id_column = spec.id_column.trim().to_string();
                let mut columns: Vec<String> =
                    spec.columns.iter().map(|c| c.trim().to_string()).collect();
                columns.sort();
                columns.dedup();
                spec.columns = columns;
            }
        }
    }

    let value =
        serde_json::to_value(&config).map_err(|e| crate::Error::Serialization(e.to_string()))?;
    Ok(canonicalize(value))
}

/// Canonical serialized bytes of a configuration.
pub fn canonical_bytes(config: &MapConfig) -> crate::Result<Vec<u8>> {
    let value = normalize(config)?;
    serde_json::to_vec(&value).map_err(|e| crate::Error::Serialization(e.to_string()))
}

/// Fingerprint of a configuration's canonical bytes.
pub fn fingerprint(config: &MapConfig) -> crate::Result<Fingerprint> {
    Ok(Fingerprint::compute(&canonical_bytes(config)?))
}

fn trim_opt(field: &mut Option<String>) {
    if let Some(s) = field {
        *s = s.trim().to_string();
    }
}

/// Recursively sort object keys and canonicalize numbers.
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (key, value) in entries {
                sorted.insert(key, canonicalize(value));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        Value::Number(n) => Value::Number(canonical_number(n)),
        other => other,
    }
}

fn canonical_number(n: Number) -> Number {
    if n.is_i64() || n.is_u64() {
        return n;
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() <= MAX_SAFE_INTEGER => Number::from(f as i64),
        _ => n,
    }
}
