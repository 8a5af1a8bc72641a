//! Backend node addresses.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Location of one backend key-value store instance.
///
/// The rendered form `"host:port:db"` is the node identity used as the key of
/// every fan-out result map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeAddress {
    pub host: String,
    pub port: u16,
    /// Database index selected on the instance.
    #[serde(default, alias = "database")]
    pub db: u32,
}

impl NodeAddress {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, db: u32) -> Self {
        Self {
            host: host.into(),
            port,
            db,
        }
    }

    /// Renders the `"host:port:db"` identity string.
    #[must_use]
    pub fn identity(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.host, self.port, self.db)
    }
}
