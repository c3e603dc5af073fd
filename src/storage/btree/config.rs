use serde::{Deserialize, Serialize};

use crate::core::errors::IndexError;

const DEFAULT_NODE_TARGET_SIZE: usize = 7 * 1024;
const DEFAULT_NODE_KEYS_MIN: usize = 6;
const DEFAULT_NODE_KEYS_MAX: usize = 1000;
const DEFAULT_SPLIT_FACTOR: usize = 2;

/// Page shape bounds for `IndexBuilder`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexBuilderConfig {
    /// Preferred serialized size of an index page in bytes.
    pub node_target_size: usize,
    /// Fewest keys a non-final page is cut with.
    pub node_keys_min: usize,
    /// Most keys a non-final page is cut with.
    pub node_keys_max: usize,
    /// A level is split once it holds more than this many times `node_keys_max` keys,
    /// or once it holds more than this many times `node_keys_min` keys and also passes
    /// the size gate.
    pub split_keys_factor: usize,
    /// Size gate: the level's estimated page size must exceed this many times
    /// `node_target_size`.
    pub split_size_factor: usize,
}

impl Default for IndexBuilderConfig {
    fn default() -> Self {
        Self {
            node_target_size: DEFAULT_NODE_TARGET_SIZE,
            node_keys_min: DEFAULT_NODE_KEYS_MIN,
            node_keys_max: DEFAULT_NODE_KEYS_MAX,
            split_keys_factor: DEFAULT_SPLIT_FACTOR,
            split_size_factor: DEFAULT_SPLIT_FACTOR,
        }
    }
}

impl IndexBuilderConfig {
    /// Create a new config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, IndexError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn node_target_size(mut self, bytes: usize) -> Self {
        self.node_target_size = bytes;
        self
    }

    pub fn node_keys_min(mut self, keys: usize) -> Self {
        self.node_keys_min = keys;
        self
    }

    pub fn node_keys_max(mut self, keys: usize) -> Self {
        self.node_keys_max = keys;
        self
    }

    pub fn split_keys_factor(mut self, factor: usize) -> Self {
        self.split_keys_factor = factor;
        self
    }

    pub fn split_size_factor(mut self, factor: usize) -> Self {
        self.split_size_factor = factor;
        self
    }

    pub fn validate(&self) -> Result<(), IndexError> {
        if self.node_keys_max == 0 {
            return Err(IndexError::InvalidConfig("node_keys_max must be at least 1".into()));
        }
        if self.node_keys_min > self.node_keys_max {
            return Err(IndexError::InvalidConfig(format!(
                "node_keys_min ({}) exceeds node_keys_max ({})",
                self.node_keys_min, self.node_keys_max
            )));
        }
        if self.node_target_size == 0 {
            return Err(IndexError::InvalidConfig("node_target_size must be positive".into()));
        }
        if self.split_keys_factor == 0 || self.split_size_factor == 0 {
            return Err(IndexError::InvalidConfig("split factors must be at least 1".into()));
        }
        if self.node_keys_min == 0 {
            return Err(IndexError::InvalidConfig("node_keys_min must be at least 1".into()));
        }
        // A split needs a key for the page, a separator and one key left behind.
        if self.split_keys_factor.saturating_mul(self.node_keys_min) < 2 {
            return Err(IndexError::InvalidConfig(format!(
                "split_keys_factor ({}) x node_keys_min ({}) must be at least 2",
                self.split_keys_factor, self.node_keys_min
            )));
        }
        Ok(())
    }
}
