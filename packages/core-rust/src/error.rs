//! Error types shared by the router, the fan-out executor and backends.

/// Failure reported by a single backend node.
///
/// The sharding layer never interprets or retries these. Single-key calls
/// hand them back unchanged inside [`ShardError::Backend`]; fan-out calls wrap
/// them in [`ShardError::NodeFailure`] together with the node identity.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("operation against a key holding the wrong kind of value")]
    WrongType,
    #[error("value is not an integer or out of range")]
    NotAnInteger,
    #[error("value is not a valid float")]
    NotAFloat,
    #[error("no such key")]
    NoSuchKey,
    #[error("index out of range")]
    IndexOutOfRange,
    #[error("invalid expire time")]
    InvalidExpireTime,
    #[error("invalid key pattern: {0}")]
    InvalidPattern(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors returned by the sharded client.
#[derive(Debug, thiserror::Error)]
pub enum ShardError {
    /// Empty or malformed node list, or unparseable configuration.
    #[error("invalid configuration: {0}")]
    Configuration(String),
    /// The configured hash strategy name is not known.
    #[error("invalid hash method: {name}")]
    InvalidHashMethod { name: String },
    /// The command needs atomicity or data movement across nodes.
    #[error("command {command} is not supported across shards")]
    UnsupportedOperation { command: &'static str },
    /// Verbatim error from the node a single-key command was routed to.
    #[error(transparent)]
    Backend(#[from] BackendError),
    /// A node failed during a fan-out command.
    #[error("node {node} failed: {source}")]
    NodeFailure {
        node: String,
        #[source]
        source: BackendError,
    },
    /// The connector could not produce a backend for a node.
    #[error("failed to connect to node {node}: {source}")]
    Connect {
        node: String,
        #[source]
        source: BackendError,
    },
}

impl ShardError {
    /// Returns the identity of the node that produced this error, when known.
    #[must_use]
    pub fn node(&self) -> Option<&str> {
        match self {
            Self::NodeFailure { node, .. } | Self::Connect { node, .. } => Some(node),
            _ => None,
        }
    }

    /// Returns `true` for [`ShardError::UnsupportedOperation`].
    #[must_use]
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::UnsupportedOperation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_failure_display_names_node() {
        let err = ShardError::NodeFailure {
            node: "localhost:6380:0".to_string(),
            source: BackendError::Connection("refused".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "node localhost:6380:0 failed: connection error: refused"
        );
        assert_eq!(err.node(), Some("localhost:6380:0"));
    }

    #[test]
    fn backend_error_converts_verbatim() {
        let err: ShardError = BackendError::WrongType.into();
        assert!(matches!(err, ShardError::Backend(BackendError::WrongType)));
        assert!(err.node().is_none());
        assert_eq!(
            err.to_string(),
            "operation against a key holding the wrong kind of value"
        );
    }

    #[test]
    fn unsupported_is_tagged() {
        let err = ShardError::UnsupportedOperation { command: "mget" };
        assert!(err.is_unsupported());
        assert_eq!(err.to_string(), "command mget is not supported across shards");
        assert!(!ShardError::Configuration("x".into()).is_unsupported());
    }

    #[test]
    fn invalid_expire_time_message() {
        assert_eq!(BackendError::InvalidExpireTime.to_string(), "invalid expire time");
    }

    #[test]
    fn other_wraps_anyhow() {
        let err = BackendError::from(anyhow::anyhow!("protocol desync"));
        assert_eq!(err.to_string(), "protocol desync");
    }
}
