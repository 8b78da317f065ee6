//! Sensitive value masking for captured arguments and return values

use serde_json::Value;
use std::collections::BTreeSet;

/// Replacement written in place of a sensitive value.
pub const MASK: &str = "[MASKED]";

/// Case-insensitive set of field names whose values must never be persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SensitiveFields {
    names: BTreeSet<String>,
}

impl SensitiveFields {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            names: names
                .into_iter()
                .map(|n| n.as_ref().trim().to_ascii_lowercase())
                .filter(|n| !n.is_empty())
                .collect(),
        }
    }

    pub fn is_sensitive(&self, key: &str) -> bool {
        self.names.contains(&key.to_ascii_lowercase())
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Return a copy of `value` with every sensitive object field masked,
    /// at any depth.
    pub fn mask(&self, value: &Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| {
                        if self.is_sensitive(k) {
                            (k.clone(), Value::String(MASK.to_string()))
                        } else {
                            (k.clone(), self.mask(v))
                        }
                    })
                    .collect(),
            ),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.mask(v)).collect()),
            other => other.clone(),
        }
    }
}
