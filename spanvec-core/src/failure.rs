//! Failure mapping: error type name to stable error code

use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Table mapping an error type name (e.g. `"ValueError"`) to an error code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FailureMapping {
    entries: BTreeMap<String, String>,
}

impl FailureMapping {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Load the mapping file.
    ///
    /// A missing file yields an empty mapping. A file that exists but cannot
    /// be parsed is a configuration error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(raw) => Self::from_json_str(&path.display().to_string(), &raw),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(
                    path = %path.display(),
                    "Failure mapping file not found, type-name lookup disabled"
                );
                Ok(Self::empty())
            }
            Err(e) => Err(ConfigError::Malformed {
                path: path.display().to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// Parse a mapping document. `source` is only used in error messages.
    pub fn from_json_str(source: &str, raw: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(raw).map_err(|e| ConfigError::Malformed {
            path: source.to_string(),
            reason: e.to_string(),
        })
    }

    /// Look up the code mapped to an error type name.
    pub fn lookup(&self, type_name: &str) -> Option<&str> {
        self.entries.get(type_name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
