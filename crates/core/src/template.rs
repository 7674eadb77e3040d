//! Named, parameterized map templates.
//!
//! A template wraps a layergroup document whose strings may reference
//! placeholders as `<%= name %>`. Instantiation substitutes typed, escaped
//! values into every string. Substitution is plain text replacement; nothing
//! in a template is ever evaluated.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// Supported template major version.
pub const TEMPLATE_MAJOR_VERSION: u64 = 0;

const OPEN_TAG: &str = "<%=";
const CLOSE_TAG: &str = "%>";

/// Template errors.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("{0}")]
    Invalid(String),

    #[error("Missing value for placeholder '{name}'")]
    MissingPlaceholder { name: String },

    #[error("Invalid value for placeholder '{name}': expected {expected}")]
    InvalidPlaceholderValue { name: String, expected: &'static str },

    #[error("Unknown placeholder '{name}' referenced in template")]
    UnknownPlaceholder { name: String },

    #[error("Unauthorized template instantiation")]
    Unauthorized,
}

/// A stored template definition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NamedTemplate {
    pub version: String,
    pub name: String,
    #[serde(default)]
    pub auth: TemplateAuth,
    #[serde(default)]
    pub placeholders: BTreeMap<String, Placeholder>,
    pub layergroup: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<Value>,
}

/// Who may instantiate a template.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum TemplateAuth {
    /// Anyone.
    #[default]
    Open,
    /// Only callers presenting one of `valid_tokens`.
    Token {
        #[serde(default)]
        valid_tokens: Vec<String>,
    },
}

impl TemplateAuth {
    /// Check a presented instantiation token.
    pub fn authorize(&self, presented: Option<&str>) -> Result<(), TemplateError> {
        match self {
            Self::Open => Ok(()),
            Self::Token { valid_tokens } => match presented {
                Some(token) if valid_tokens.iter().any(|t| t == token) => Ok(()),
                _ => Err(TemplateError::Unauthorized),
            },
        }
    }
}

/// A declared placeholder.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Placeholder {
    #[serde(rename = "type")]
    pub kind: PlaceholderType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// Placeholder value types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceholderType {
    SqlLiteral,
    SqlIdent,
    Number,
    CssColor,
}

/// A placeholder value after type checking and escaping.
#[derive(Clone, Debug, PartialEq)]
enum Rendered {
    Text(String),
    Number(Number),
}

impl Rendered {
    fn as_text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Number(n) => n.to_string(),
        }
    }
}

impl PlaceholderType {
    fn expected(self) -> &'static str {
        match self {
            Self::SqlLiteral => "a string or number",
            Self::SqlIdent => "a non-empty identifier",
            Self::Number => "a number",
            Self::CssColor => "a css color",
        }
    }

    fn render(self, name: &str, value: &Value) -> Result<Rendered, TemplateError> {
        let invalid = || TemplateError::InvalidPlaceholderValue {
            name: name.to_string(),
            expected: self.expected(),
        };

        match self {
            Self::SqlLiteral => match value {
                Value::String(s) => Ok(Rendered::Text(s.replace('\'', "''"))),
                Value::Number(n) => Ok(Rendered::Text(n.to_string())),
                Value::Bool(b) => Ok(Rendered::Text(b.to_string())),
                _ => Err(invalid()),
            },
            Self::SqlIdent => match value {
                Value::String(s) if !s.is_empty() => {
                    Ok(Rendered::Text(format!("\"{}\"", s.replace('"', "\"\""))))
                }
                _ => Err(invalid()),
            },
            Self::Number => {
                let parsed = match value {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => s.trim().parse::<f64>().ok(),
                    _ => None,
                };
                parsed
                    .filter(|f| f.is_finite())
                    .map(|f| Rendered::Number(canonical_number(f)))
                    .ok_or_else(invalid)
            }
            Self::CssColor => match value {
                Value::String(s)
                    if !s.is_empty() && s.chars().all(|c| c == '#' || c.is_ascii_alphanumeric()) =>
                {
                    Ok(Rendered::Text(s.clone()))
                }
                _ => Err(invalid()),
            },
        }
    }
}

fn canonical_number(f: f64) -> Number {
    if f.fract() == 0.0 && f.abs() < 9_007_199_254_740_992.0 {
        Number::from(f as i64)
    } else {
        Number::from_f64(f).unwrap_or_else(|| Number::from(0))
    }
}

impl NamedTemplate {
    /// Parse a template definition from JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TemplateError> {
        serde_json::from_slice(bytes)
            .map_err(|e| TemplateError::Invalid(format!("Invalid template: {e}")))
    }

    /// Parse a template definition from a JSON value.
    pub fn from_value(value: Value) -> Result<Self, TemplateError> {
        serde_json::from_value(value)
            .map_err(|e| TemplateError::Invalid(format!("Invalid template: {e}")))
    }

    /// Check the template's shape.
    pub fn validate(&self) -> Result<(), TemplateError> {
        if !is_template_name(&self.name) {
            return Err(TemplateError::Invalid(format!(
                "Invalid template name '{}', must contain only alphanumeric characters, '_' or '-'",
                self.name
            )));
        }

        let major = self
            .version
            .split('.')
            .next()
            .and_then(|m| m.parse::<u64>().ok());
        if major != Some(TEMPLATE_MAJOR_VERSION) {
            return Err(TemplateError::Invalid(format!(
                "Unsupported template version {}",
                self.version
            )));
        }

        if let TemplateAuth::Token { valid_tokens } = &self.auth
            && valid_tokens.is_empty()
        {
            return Err(TemplateError::Invalid(
                "Invalid auth: token method requires a non-empty valid_tokens list".to_string(),
            ));
        }

        for (name, placeholder) in &self.placeholders {
            if !is_placeholder_name(name) {
                return Err(TemplateError::Invalid(format!(
                    "Invalid placeholder name '{name}'"
                )));
            }
            if let Some(default) = &placeholder.default {
                placeholder.kind.render(name, default)?;
            }
        }

        let has_layers = self
            .layergroup
            .get("layers")
            .and_then(Value::as_array)
            .is_some_and(|layers| !layers.is_empty());
        if !has_layers {
            return Err(TemplateError::Invalid(
                "Missing or empty layers array in template layergroup".to_string(),
            ));
        }

        let mut referenced = Vec::new();
        collect_references(&self.layergroup, &mut referenced);
        if let Some(name) = referenced
            .into_iter()
            .find(|name| !self.placeholders.contains_key(name))
        {
            return Err(TemplateError::UnknownPlaceholder { name });
        }

        Ok(())
    }

    /// Instantiate the template's layergroup with `params`.
    ///
    /// Every declared placeholder resolves to the supplied value, else its
    /// default. Undeclared params are ignored.
    pub fn render(&self, params: &Map<String, Value>) -> Result<Value, TemplateError> {
        let mut values = BTreeMap::new();
        for (name, placeholder) in &self.placeholders {
            let value = params
                .get(name)
                .filter(|v| !v.is_null())
                .or(placeholder.default.as_ref())
                .ok_or_else(|| TemplateError::MissingPlaceholder { name: name.clone() })?;
            values.insert(name.as_str(), placeholder.kind.render(name, value)?);
        }

        let mut layergroup = self.layergroup.clone();
        substitute(&mut layergroup, &values)?;
        Ok(layergroup)
    }
}

fn is_template_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn is_placeholder_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A placeholder reference found in a string.
struct Reference<'a> {
    start: usize,
    end: usize,
    name: &'a str,
}

fn references(s: &str) -> Vec<Reference<'_>> {
    let mut found = Vec::new();
    let mut offset = 0;
    while let Some(open) = s[offset..].find(OPEN_TAG) {
        let start = offset + open;
        let inner_start = start + OPEN_TAG.len();
        let Some(close) = s[inner_start..].find(CLOSE_TAG) else {
            break;
        };
        let end = inner_start + close + CLOSE_TAG.len();
        found.push(Reference {
            start,
            end,
            name: s[inner_start..inner_start + close].trim(),
        });
        offset = end;
    }
    found
}

fn collect_references(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.extend(references(s).into_iter().map(|r| r.name.to_string())),
        Value::Array(items) => items.iter().for_each(|v| collect_references(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_references(v, out)),
        _ => {}
    }
}

fn substitute(value: &mut Value, values: &BTreeMap<&str, Rendered>) -> Result<(), TemplateError> {
    match value {
        Value::String(s) => {
            if let Some(rendered) = render_string(s, values)? {
                *value = rendered;
            }
        }
        Value::Array(items) => {
            for item in items {
                substitute(item, values)?;
            }
        }
        Value::Object(map) => {
            for item in map.values_mut() {
                substitute(item, values)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Render one string. `None` when it holds no references.
fn render_string(
    s: &str,
    values: &BTreeMap<&str, Rendered>,
) -> Result<Option<Value>, TemplateError> {
    let refs = references(s);
    if refs.is_empty() {
        return Ok(None);
    }

    let lookup = |name: &str| {
        values
            .get(name)
            .ok_or_else(|| TemplateError::UnknownPlaceholder {
                name: name.to_string(),
            })
    };

    // A string that is exactly one number placeholder becomes a JSON number.
    if let [only] = refs.as_slice()
        && only.start == 0
        && only.end == s.len()
        && let Rendered::Number(n) = lookup(only.name)?
    {
        return Ok(Some(Value::Number(n.clone())));
    }

    let mut out = String::with_capacity(s.len());
    let mut last = 0;
    for r in &refs {
        out.push_str(&s[last..r.start]);
        out.push_str(&lookup(r.name)?.as_text());
        last = r.end;
    }
    out.push_str(&s[last..]);
    Ok(Some(Value::String(out)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn template() -> NamedTemplate {
        NamedTemplate::from_value(json!({
            "version": "0.0.1",
            "name": "nm1",
            "auth": { "method": "open" },
            "placeholders": {
                "color": { "type": "css_color", "default": "Reds" },
                "table": { "type": "sql_ident", "default": "test_table" },
                "name": { "type": "sql_literal", "default": "x" },
                "zoom": { "type": "number", "default": 3 }
            },
            "layergroup": {
                "version": "1.0.1",
                "layers": [{
                    "type": "cartodb",
                    "options": {
                        "sql": "select * from <%= table %> where name = '<%= name %>'",
                        "cartocss": "#layer { polygon-fill: <%= color %>; }",
                        "cartocss_version": "2.0.1",
                        "aggregation": { "resolution": "<%= zoom %>" }
                    }
                }]
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_validate_accepts_well_formed() {
        assert!(template().validate().is_ok());
    }

    #[test]
    fn test_render_defaults() {
        let out = template().render(&Map::new()).unwrap();
        let options = &out["layers"][0]["options"];
        assert_eq!(
            options["sql"],
            json!("select * from \"test_table\" where name = 'x'")
        );
        assert_eq!(options["cartocss"], json!("#layer { polygon-fill: Reds; }"));
        assert_eq!(options["aggregation"]["resolution"], json!(3));
    }

    #[test]
    fn test_render_escapes_values() {
        let params = json!({
            "name": "O'Brien",
            "table": "we\"ird",
            "zoom": "4.5"
        });
        let out = template().render(params.as_object().unwrap()).unwrap();
        let options = &out["layers"][0]["options"];
        assert_eq!(
            options["sql"],
            json!("select * from \"we\"\"ird\" where name = 'O''Brien'")
        );
        assert_eq!(options["aggregation"]["resolution"], json!(4.5));
    }

    #[test]
    fn test_missing_placeholder() {
        let mut tpl = template();
        tpl.placeholders.get_mut("color").unwrap().default = None;
        let err = tpl.render(&Map::new()).unwrap_err();
        assert_eq!(err.to_string(), "Missing value for placeholder 'color'");
    }

    #[test]
    fn test_invalid_color_rejected() {
        let params = json!({ "color": "red; } #evil {" });
        let err = template().render(params.as_object().unwrap()).unwrap_err();
        assert!(matches!(
            err,
            TemplateError::InvalidPlaceholderValue { ref name, .. } if name == "color"
        ));
    }

    #[test]
    fn test_invalid_number_rejected() {
        let params = json!({ "zoom": "many" });
        assert!(template().render(params.as_object().unwrap()).is_err());
    }

    #[test]
    fn test_undeclared_reference_rejected() {
        let mut tpl = template();
        tpl.layergroup["layers"][0]["options"]["sql"] = json!("select <%= nope %>");
        assert_eq!(
            tpl.validate().unwrap_err(),
            TemplateError::UnknownPlaceholder {
                name: "nope".to_string()
            }
        );
    }

    #[test]
    fn test_bad_name_and_version() {
        let mut tpl = template();
        tpl.name = "bad name".to_string();
        assert!(tpl.validate().is_err());

        let mut tpl = template();
        tpl.version = "1.0.0".to_string();
        assert_eq!(
            tpl.validate().unwrap_err().to_string(),
            "Unsupported template version 1.0.0"
        );
    }

    #[test]
    fn test_unknown_placeholder_type() {
        let err = NamedTemplate::from_value(json!({
            "version": "0.0.1",
            "name": "t",
            "placeholders": { "x": { "type": "javascript" } },
            "layergroup": { "layers": [] }
        }))
        .unwrap_err();
        assert!(matches!(err, TemplateError::Invalid(_)));
    }

    #[test]
    fn test_token_auth() {
        let auth = TemplateAuth::Token {
            valid_tokens: vec!["secret".to_string()],
        };
        assert!(auth.authorize(Some("secret")).is_ok());
        assert_eq!(auth.authorize(Some("other")), Err(TemplateError::Unauthorized));
        assert_eq!(auth.authorize(None), Err(TemplateError::Unauthorized));
        assert!(TemplateAuth::Open.authorize(None).is_ok());
    }

    #[test]
    fn test_auth_wire_format() {
        let auth: TemplateAuth =
            serde_json::from_value(json!({ "method": "token", "valid_tokens": ["a"] })).unwrap();
        assert_eq!(
            auth,
            TemplateAuth::Token {
                valid_tokens: vec!["a".to_string()]
            }
        );
        assert_eq!(
            serde_json::to_value(TemplateAuth::Open).unwrap(),
            json!({ "method": "open" })
        );
    }

    #[test]
    fn test_substitution_is_not_evaluated() {
        let tpl = NamedTemplate::from_value(json!({
            "version": "0.0.1",
            "name": "t",
            "placeholders": { "v": { "type": "sql_literal" } },
            "layergroup": { "layers": [{ "options": { "sql": "select '<%= v %>'" } }] }
        }))
        .unwrap();
        let params = json!({ "v": "<%= v %>" });
        let out = tpl.render(params.as_object().unwrap()).unwrap();
        assert_eq!(out["layers"][0]["options"]["sql"], json!("select '<%= v %>'"));
    }
}
