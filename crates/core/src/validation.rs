//! Layer option validation.
//!
//! Layers are checked in index order. Within a layer, each declared option
//! category runs its property rules; the first violation aborts with an error
//! naming the offending layer.

use crate::mapconfig::{AttributeSpec, Layer, LayerOption, MapConfig};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Valid aggregation placements.
pub const VALID_PLACEMENTS: &[&str] = &["point-sample", "point-grid", "centroid"];

/// Identifies the layer a validation error belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LayerRef {
    pub id: String,
    pub index: usize,
    #[serde(rename = "type")]
    pub layer_type: String,
}

/// A layer-scoped validation failure.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    pub layer: LayerRef,
    pub message: String,
}

/// A property check.
#[derive(Clone, Copy, Debug)]
pub enum Rule {
    /// Value must be one of the listed strings.
    OneOf(&'static [&'static str]),
    /// Value must be a finite number greater than zero.
    PositiveNumber,
}

impl Rule {
    /// Check `value` for `property`, returning the failure message.
    pub fn check(&self, value: &Value, property: &str) -> Result<(), String> {
        match self {
            Self::OneOf(valid) => {
                let ok = value.as_str().is_some_and(|s| valid.contains(&s));
                if ok {
                    Ok(())
                } else {
                    Err(format!(
                        "Invalid {property}. Valid values: {}",
                        valid.join(", ")
                    ))
                }
            }
            Self::PositiveNumber => {
                let ok = value
                    .as_f64()
                    .is_some_and(|n| n.is_finite() && n > 0.0);
                if ok {
                    Ok(())
                } else {
                    Err(format!(
                        "Invalid {property}, should be a number greater than 0"
                    ))
                }
            }
        }
    }
}

/// Rules applied to aggregation options, in check order.
pub const AGGREGATION_RULES: &[(&str, Rule)] = &[
    ("placement", Rule::OneOf(VALID_PLACEMENTS)),
    ("resolution", Rule::PositiveNumber),
    ("threshold", Rule::PositiveNumber),
];

/// Validate every layer of a configuration.
pub fn validate(config: &MapConfig) -> Result<(), ValidationError> {
    for (index, layer) in config.layers.iter().enumerate() {
        validate_layer(config, index, layer)?;
    }
    Ok(())
}

fn validate_layer(config: &MapConfig, index: usize, layer: &Layer) -> Result<(), ValidationError> {
    let fail = |message: String| ValidationError {
        layer: LayerRef {
            id: config.layer_id(index),
            index,
            layer_type: layer.layer_type.clone(),
        },
        message,
    };

    if layer.requires_sql()
        && layer
            .options
            .sql
            .as_deref()
            .is_none_or(|sql| sql.trim().is_empty())
    {
        return Err(fail(format!("Missing sql for layer {index} options")));
    }

    for category in &layer.options.categories {
        match category {
            LayerOption::Aggregation(aggregation) => {
                for (property, rule) in AGGREGATION_RULES {
                    if let Some(value) = aggregation.property(property) {
                        rule.check(value, property).map_err(fail)?;
                    }
                }
            }
            LayerOption::Attributes(spec) => check_attributes(spec).map_err(fail)?,
            LayerOption::Passthrough { .. } => {}
        }
    }

    Ok(())
}

fn check_attributes(spec: &AttributeSpec) -> Result<(), String> {
    if spec.id_column.trim().is_empty() {
        return Err("Invalid attributes.id, should be a non-empty column name".to_string());
    }
    if spec.columns.iter().any(|column| column.trim().is_empty()) {
        return Err("Invalid attributes.columns, should be non-empty column names".to_string());
    }
    Ok(())
}
