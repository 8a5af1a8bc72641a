//! Client configuration: the ordered node list and the hash strategy name.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::address::NodeAddress;
use crate::error::ShardError;
use crate::hash::{HashMethod, STANDARD_HASH_METHOD};

fn default_hash_method() -> String {
    STANDARD_HASH_METHOD.to_string()
}

/// Configuration for a sharded client.
///
/// Node order is load-bearing: it decides which node owns which key, so
/// reordering the list redistributes every key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    pub nodes: Vec<NodeAddress>,
    /// Name of the hash strategy. Defaults to `"standard"`.
    #[serde(default = "default_hash_method", alias = "hash_method")]
    pub hash_method: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            hash_method: default_hash_method(),
        }
    }
}

impl ClientConfig {
    /// Creates a configuration using the standard hash strategy.
    #[must_use]
    pub fn new(nodes: Vec<NodeAddress>) -> Self {
        Self {
            nodes,
            hash_method: default_hash_method(),
        }
    }

    /// Overrides the hash strategy name.
    #[must_use]
    pub fn with_hash_method(mut self, name: impl Into<String>) -> Self {
        self.hash_method = name.into();
        self
    }

    /// Parses a configuration from JSON and validates it.
    ///
    /// # Errors
    ///
    /// Returns `ShardError::Configuration` when the document does not parse or
    /// the node list is invalid, and `ShardError::InvalidHashMethod` for an
    /// unknown strategy name.
    pub fn from_json(json: &str) -> Result<Self, ShardError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ShardError::Configuration(format!("malformed config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the node list and resolves the hash strategy name.
    ///
    /// # Errors
    ///
    /// - `ShardError::Configuration` for an empty list, an empty host, port 0,
    ///   or two entries with the same `host:port:db` identity
    /// - `ShardError::InvalidHashMethod` for an unknown strategy name
    pub fn validate(&self) -> Result<HashMethod, ShardError> {
        if self.nodes.is_empty() {
            return Err(ShardError::Configuration(
                "node list must contain at least one node".to_string(),
            ));
        }

        let mut seen = HashSet::with_capacity(self.nodes.len());
        for (index, node) in self.nodes.iter().enumerate() {
            if node.host.trim().is_empty() {
                return Err(ShardError::Configuration(format!(
                    "node {index} has an empty host"
                )));
            }
            if node.port == 0 {
                return Err(ShardError::Configuration(format!(
                    "node {index} ({}) has port 0",
                    node.host
                )));
            }
            if !seen.insert(node.identity()) {
                return Err(ShardError::Configuration(format!(
                    "node {node} is listed more than once"
                )));
            }
        }

        let method: HashMethod = self.hash_method.parse()?;
        debug!(nodes = self.nodes.len(), hash_method = %method, "configuration validated");
        Ok(method)
    }
}
