//! Property schema: the allow-list of custom tag keys
//!
//! The schema is loaded once at startup from a JSON document of the form
//! `{"run_id": {"data_type": "text", "description": "..."}}` and is read-only
//! afterwards.

use crate::{ConfigError, ValidationError};
use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

// ============================================================================
// PROPERTY TYPES
// ============================================================================

/// Declared data type of a custom property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyType {
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "int")]
    Int,
    #[serde(rename = "number")]
    Number,
    #[serde(rename = "boolean")]
    Boolean,
    /// RFC 3339 timestamp or `YYYY-MM-DD` date, stored as text.
    #[serde(rename = "date")]
    Date,
    #[serde(rename = "text[]")]
    TextArray,
    #[serde(rename = "int[]")]
    IntArray,
}

impl PropertyType {
    /// Name used in schema files.
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyType::Text => "text",
            PropertyType::Int => "int",
            PropertyType::Number => "number",
            PropertyType::Boolean => "boolean",
            PropertyType::Date => "date",
            PropertyType::TextArray => "text[]",
            PropertyType::IntArray => "int[]",
        }
    }

    /// Coerce a raw tag value into this type.
    ///
    /// Text input is parsed for non-text types so that environment values
    /// (always strings) can populate typed properties.
    pub fn coerce(&self, key: &str, value: TagValue) -> Result<TagValue, ValidationError> {
        let mismatch = |reason: String| ValidationError::TagTypeMismatch {
            key: key.to_string(),
            expected: self.as_str().to_string(),
            reason,
        };

        match (self, value) {
            (PropertyType::Text, TagValue::Text(s)) => Ok(TagValue::Text(s)),
            (PropertyType::Text, TagValue::Int(i)) => Ok(TagValue::Text(i.to_string())),
            (PropertyType::Text, TagValue::Number(n)) => Ok(TagValue::Text(n.to_string())),
            (PropertyType::Text, TagValue::Bool(b)) => Ok(TagValue::Text(b.to_string())),

            (PropertyType::Int, TagValue::Int(i)) => Ok(TagValue::Int(i)),
            (PropertyType::Int, TagValue::Text(s)) => s
                .trim()
                .parse::<i64>()
                .map(TagValue::Int)
                .map_err(|e| mismatch(format!("'{}': {}", s, e))),

            (PropertyType::Number, TagValue::Number(n)) => Ok(TagValue::Number(n)),
            (PropertyType::Number, TagValue::Int(i)) => Ok(TagValue::Number(i as f64)),
            (PropertyType::Number, TagValue::Text(s)) => s
                .trim()
                .parse::<f64>()
                .map(TagValue::Number)
                .map_err(|e| mismatch(format!("'{}': {}", s, e))),

            (PropertyType::Boolean, TagValue::Bool(b)) => Ok(TagValue::Bool(b)),
            (PropertyType::Boolean, TagValue::Text(s)) => {
                match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "1" | "yes" => Ok(TagValue::Bool(true)),
                    "false" | "0" | "no" => Ok(TagValue::Bool(false)),
                    _ => Err(mismatch(format!("'{}' is not a boolean", s))),
                }
            }

            (PropertyType::Date, TagValue::Text(s)) => {
                let trimmed = s.trim();
                if DateTime::parse_from_rfc3339(trimmed).is_ok()
                    || NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").is_ok()
                {
                    Ok(TagValue::Text(trimmed.to_string()))
                } else {
                    Err(mismatch(format!("'{}' is not an RFC 3339 date", s)))
                }
            }

            (PropertyType::TextArray, TagValue::TextList(items)) => Ok(TagValue::TextList(items)),
            (PropertyType::TextArray, TagValue::Text(s)) => Ok(TagValue::TextList(
                split_list(&s).map(str::to_string).collect(),
            )),

            (PropertyType::IntArray, TagValue::IntList(items)) => Ok(TagValue::IntList(items)),
            (PropertyType::IntArray, TagValue::Text(s)) => split_list(&s)
                .map(|item| item.parse::<i64>())
                .collect::<Result<Vec<_>, _>>()
                .map(TagValue::IntList)
                .map_err(|e| mismatch(format!("'{}': {}", s, e))),

            (_, other) => Err(mismatch(format!("got {}", other.kind()))),
        }
    }

    /// Parse an environment-style string value into this type.
    pub fn parse_env(&self, key: &str, raw: &str) -> Result<TagValue, ValidationError> {
        self.coerce(key, TagValue::Text(raw.to_string()))
    }
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

// ============================================================================
// TAG VALUES
// ============================================================================

/// A typed tag value attached to an execution record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    Bool(bool),
    Int(i64),
    Number(f64),
    Text(String),
    TextList(Vec<String>),
    IntList(Vec<i64>),
}

impl TagValue {
    fn kind(&self) -> &'static str {
        match self {
            TagValue::Bool(_) => "boolean",
            TagValue::Int(_) => "int",
            TagValue::Number(_) => "number",
            TagValue::Text(_) => "text",
            TagValue::TextList(_) => "text[]",
            TagValue::IntList(_) => "int[]",
        }
    }

    /// Borrow the value as text, if it is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            TagValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Convert into a JSON value for filtering and export.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            TagValue::Bool(b) => serde_json::Value::Bool(*b),
            TagValue::Int(i) => serde_json::Value::from(*i),
            TagValue::Number(n) => serde_json::Value::from(*n),
            TagValue::Text(s) => serde_json::Value::String(s.clone()),
            TagValue::TextList(items) => serde_json::Value::from(items.clone()),
            TagValue::IntList(items) => serde_json::Value::from(items.clone()),
        }
    }
}

impl From<&str> for TagValue {
    fn from(value: &str) -> Self {
        TagValue::Text(value.to_string())
    }
}

impl From<String> for TagValue {
    fn from(value: String) -> Self {
        TagValue::Text(value)
    }
}

impl From<i64> for TagValue {
    fn from(value: i64) -> Self {
        TagValue::Int(value)
    }
}

impl From<i32> for TagValue {
    fn from(value: i32) -> Self {
        TagValue::Int(value as i64)
    }
}

impl From<f64> for TagValue {
    fn from(value: f64) -> Self {
        TagValue::Number(value)
    }
}

impl From<bool> for TagValue {
    fn from(value: bool) -> Self {
        TagValue::Bool(value)
    }
}

impl From<Vec<String>> for TagValue {
    fn from(value: Vec<String>) -> Self {
        TagValue::TextList(value)
    }
}

impl From<Vec<i64>> for TagValue {
    fn from(value: Vec<i64>) -> Self {
        TagValue::IntList(value)
    }
}

/// Tags after schema filtering and precedence resolution.
///
/// Every key in a `ResolvedTagSet` produced by the tag resolver is declared
/// in the active [`PropertySchema`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResolvedTagSet(BTreeMap<String, TagValue>);

impl ResolvedTagSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: TagValue) {
        self.0.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&TagValue> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TagValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

/// One declared custom property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDefinition {
    pub data_type: PropertyType,
    #[serde(default)]
    pub description: String,
}

impl PropertyDefinition {
    pub fn new(data_type: PropertyType) -> Self {
        Self {
            data_type,
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Allow-list of custom tag keys and their declared types.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertySchema {
    properties: BTreeMap<String, PropertyDefinition>,
}

impl PropertySchema {
    /// A schema with no declared keys. Every tag is dropped.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a schema from in-memory definitions.
    pub fn from_definitions<I, K>(definitions: I) -> Self
    where
        I: IntoIterator<Item = (K, PropertyDefinition)>,
        K: Into<String>,
    {
        Self {
            properties: definitions
                .into_iter()
                .map(|(k, v)| (k.into(), v))
                .collect(),
        }
    }

    /// Load the schema file.
    ///
    /// # Returns
    /// * `Err(ConfigError::FileNotFound)` - If the file does not exist
    /// * `Err(ConfigError::Malformed)` - If the file is not a valid schema document
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::FileNotFound {
                path: path.display().to_string(),
            },
            _ => ConfigError::Malformed {
                path: path.display().to_string(),
                reason: e.to_string(),
            },
        })?;
        Self::from_json_str(&path.display().to_string(), &raw)
    }

    /// Parse a schema document. `source` is only used in error messages.
    pub fn from_json_str(source: &str, raw: &str) -> Result<Self, ConfigError> {
        let schema: Self = serde_json::from_str(raw).map_err(|e| ConfigError::Malformed {
            path: source.to_string(),
            reason: e.to_string(),
        })?;

        if let Some(blank) = schema.properties.keys().find(|k| k.trim().is_empty()) {
            return Err(ConfigError::Malformed {
                path: source.to_string(),
                reason: format!("property key '{}' is blank", blank),
            });
        }

        Ok(schema)
    }

    pub fn get(&self, key: &str) -> Option<&PropertyDefinition> {
        self.properties.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyDefinition)> {
        self.properties.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

// =============================================================================
// TESTS
// =============================================================================
