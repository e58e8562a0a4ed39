//! Store configuration.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Knobs that apply to every node and subscription of one store.
///
/// Missing fields in a configuration document fall back to the defaults.
///
/// ```rust
/// use morphium_core::StoreConfig;
///
/// let config = StoreConfig::from_json(r#"{ "deep_wrap": false }"#).unwrap();
/// assert!(!config.deep_wrap);
/// assert!(config.batch_by_default);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Wrap every nested composite when a value is first tracked. When off,
    /// children are wrapped lazily the first time they are read.
    pub deep_wrap: bool,

    /// Whether subscriptions created with default options coalesce the paths
    /// of one tick into a single callback.
    pub batch_by_default: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            deep_wrap: true,
            batch_by_default: true,
        }
    }
}

impl StoreConfig {
    /// Parse a configuration from JSON.
    pub fn from_json(source: &str) -> Result<Self> {
        Ok(serde_json::from_str(source)?)
    }

    /// Set [`StoreConfig::deep_wrap`].
    pub fn deep_wrap(mut self, deep_wrap: bool) -> Self {
        self.deep_wrap = deep_wrap;
        self
    }

    /// Set [`StoreConfig::batch_by_default`].
    pub fn batch_by_default(mut self, batch: bool) -> Self {
        self.batch_by_default = batch;
        self
    }
}
