//! Map configuration (layergroup) model.
//!
//! A configuration is an ordered list of layers. Each layer carries a data
//! query, a style and a set of option categories. Known categories
//! (aggregation, attributes) are parsed into typed variants; anything else is
//! kept verbatim as a passthrough option so it still takes part in the
//! fingerprint.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Layer type assumed when a layer omits `type`.
pub const DEFAULT_LAYER_TYPE: &str = "mapnik";

/// Configuration version assumed when `version` is omitted.
pub const DEFAULT_MAPCONFIG_VERSION: &str = "1.0.0";

/// Option key for the aggregation category.
pub const AGGREGATION_KEY: &str = "aggregation";

/// Option key for the attribute exposure category.
pub const ATTRIBUTES_KEY: &str = "attributes";

fn default_version() -> String {
    DEFAULT_MAPCONFIG_VERSION.to_string()
}

fn default_layer_type() -> String {
    DEFAULT_LAYER_TYPE.to_string()
}

/// A declarative map configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MapConfig {
    /// Configuration format version.
    #[serde(default = "default_version")]
    pub version: String,
    /// Layers, addressed by position.
    pub layers: Vec<Layer>,
    /// Top-level keys this service does not interpret (e.g. `extent`, `buffersize`).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MapConfig {
    /// Parse a configuration from JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> crate::Result<Self> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| crate::Error::InvalidMapConfig(format!("invalid JSON: {e}")))?;
        Self::from_value(value)
    }

    /// Parse a configuration from an already decoded JSON value.
    pub fn from_value(value: Value) -> crate::Result<Self> {
        let has_layers = value
            .get("layers")
            .and_then(Value::as_array)
            .is_some_and(|layers| !layers.is_empty());
        if !has_layers {
            return Err(crate::Error::InvalidMapConfig(
                "Missing layers array from layergroup config".to_string(),
            ));
        }

        serde_json::from_value(value).map_err(|e| crate::Error::InvalidMapConfig(e.to_string()))
    }

    /// Number of layers.
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Get a layer by position.
    pub fn layer(&self, index: usize) -> Option<&Layer> {
        self.layers.get(index)
    }

    /// Identifier reported for a layer: its explicit `id`, or `layer<index>`.
    pub fn layer_id(&self, index: usize) -> String {
        self.layers
            .get(index)
            .and_then(|layer| layer.id.clone())
            .unwrap_or_else(|| format!("layer{index}"))
    }

    /// Type reported for a layer.
    pub fn layer_type(&self, index: usize) -> &str {
        self.layers
            .get(index)
            .map(|layer| layer.layer_type.as_str())
            .unwrap_or(DEFAULT_LAYER_TYPE)
    }
}

/// One data + style unit of a configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    /// Layer type (`mapnik`, `cartodb`, `http`, ...).
    #[serde(rename = "type", default = "default_layer_type")]
    pub layer_type: String,
    /// Optional explicit identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Layer options.
    pub options: LayerOptions,
}

impl Layer {
    /// Whether this layer type is backed by a SQL query.
    pub fn requires_sql(&self) -> bool {
        matches!(self.layer_type.as_str(), "mapnik" | "cartodb" | "torque")
    }
}

/// Per-layer options.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawLayerOptions", into = "RawLayerOptions")]
pub struct LayerOptions {
    /// Data query producing the layer's row set.
    pub sql: Option<String>,
    /// Styling source (opaque to this service).
    pub style: Option<String>,
    /// Styling language version.
    pub style_version: Option<String>,
    /// Option categories, in key order.
    pub categories: Vec<LayerOption>,
}

impl LayerOptions {
    /// Aggregation options, if declared.
    pub fn aggregation(&self) -> Option<&AggregationOptions> {
        self.categories.iter().find_map(|category| match category {
            LayerOption::Aggregation(aggregation) => Some(aggregation),
            _ => None,
        })
    }

    /// Attribute exposure spec, if declared.
    pub fn attributes(&self) -> Option<&AttributeSpec> {
        self.categories.iter().find_map(|category| match category {
            LayerOption::Attributes(spec) => Some(spec),
            _ => None,
        })
    }
}

/// A known option category, or an unrecognized key kept verbatim.
#[derive(Clone, Debug, PartialEq)]
pub enum LayerOption {
    Aggregation(AggregationOptions),
    Attributes(AttributeSpec),
    Passthrough { key: String, value: Value },
}

impl LayerOption {
    /// The option key this category was read from.
    pub fn key(&self) -> &str {
        match self {
            Self::Aggregation(_) => AGGREGATION_KEY,
            Self::Attributes(_) => ATTRIBUTES_KEY,
            Self::Passthrough { key, .. } => key,
        }
    }
}

/// Aggregation options.
///
/// Kept as the raw JSON object so wrong types, explicit `null` included,
/// surface as layer-scoped validation errors instead of parse failures.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregationOptions {
    properties: Map<String, Value>,
}

impl AggregationOptions {
    /// Look up a property by name. `None` means the key is absent.
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }
}

/// Declares which columns of a layer may be exposed through the attributes
/// sub-resource, and which column identifies a feature.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeSpec {
    /// Column identifying a feature.
    #[serde(rename = "id")]
    pub id_column: String,
    /// Columns returned for a feature.
    #[serde(default)]
    pub columns: Vec<String>,
}

/// Wire shape of [`LayerOptions`].
#[derive(Clone, Serialize, Deserialize)]
struct RawLayerOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sql: Option<String>,
    #[serde(
        rename = "cartocss",
        alias = "style",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    style: Option<String>,
    #[serde(
        rename = "cartocss_version",
        alias = "style_version",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    style_version: Option<String>,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

impl TryFrom<RawLayerOptions> for LayerOptions {
    type Error = String;

    fn try_from(raw: RawLayerOptions) -> Result<Self, Self::Error> {
        let mut categories = Vec::with_capacity(raw.rest.len());
        for (key, value) in raw.rest {
            let category = match key.as_str() {
                AGGREGATION_KEY => LayerOption::Aggregation(
                    serde_json::from_value(value)
                        .map_err(|e| format!("invalid aggregation options: {e}"))?,
                ),
                ATTRIBUTES_KEY => LayerOption::Attributes(
                    serde_json::from_value(value)
                        .map_err(|e| format!("invalid attributes options: {e}"))?,
                ),
                _ => LayerOption::Passthrough { key, value },
            };
            categories.push(category);
        }

        Ok(Self {
            sql: raw.sql,
            style: raw.style,
            style_version: raw.style_version,
            categories,
        })
    }
}

impl From<LayerOptions> for RawLayerOptions {
    fn from(options: LayerOptions) -> Self {
        let mut rest = Map::new();
        for category in options.categories {
            let (key, value) = match category {
                LayerOption::Aggregation(aggregation) => (
                    AGGREGATION_KEY.to_string(),
                    serde_json::to_value(aggregation).unwrap_or(Value::Null),
                ),
                LayerOption::Attributes(spec) => (
                    ATTRIBUTES_KEY.to_string(),
                    serde_json::to_value(spec).unwrap_or(Value::Null),
                ),
                LayerOption::Passthrough { key, value } => (key, value),
            };
            rest.insert(key, value);
        }

        Self {
            sql: options.sql,
            style: options.style,
            style_version: options.style_version,
            rest,
        }
    }
}
