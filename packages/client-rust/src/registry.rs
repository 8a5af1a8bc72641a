//! Ordered, immutable registry of backend nodes.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use keyshard_core::{NodeAddress, ShardError};

use crate::backend::{Backend, Connector};

/// One backend instance: its identity plus a shared handle.
#[derive(Clone)]
pub struct Node {
    id: String,
    backend: Arc<dyn Backend>,
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node").field("id", &self.id).finish_non_exhaustive()
    }
}

impl Node {
    /// Wraps a backend handle. The identity is taken from the backend's address.
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            id: backend.address().identity(),
            backend,
        }
    }

    /// The `"host:port:db"` identity string.
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn address(&self) -> &NodeAddress {
        self.backend.address()
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }
}

/// The nodes of a sharded client, in configuration order.
///
/// Position in the registry is what the router's index refers to, so the
/// order is fixed at construction and never changes.
#[derive(Debug, Clone)]
pub struct NodeRegistry {
    nodes: Vec<Node>,
    by_identity: HashMap<String, usize>,
}

impl NodeRegistry {
    /// Builds a registry from nodes in routing order.
    ///
    /// # Errors
    ///
    /// Returns `ShardError::Configuration` if `nodes` is empty, if an address
    /// has an empty host or port 0, or if two nodes share an identity.
    pub fn new(nodes: Vec<Node>) -> Result<Self, ShardError> {
        if nodes.is_empty() {
            return Err(ShardError::Configuration(
                "node list must contain at least one node".to_string(),
            ));
        }

        let mut by_identity = HashMap::with_capacity(nodes.len());
        for (index, node) in nodes.iter().enumerate() {
            let address = node.address();
            if address.host.trim().is_empty() || address.port == 0 {
                return Err(ShardError::Configuration(format!(
                    "node {index} has a malformed address: {address}"
                )));
            }
            if by_identity.insert(node.id.clone(), index).is_some() {
                return Err(ShardError::Configuration(format!(
                    "node {} is listed more than once",
                    node.id
                )));
            }
        }

        Ok(Self { nodes, by_identity })
    }

    /// Asks `connector` for one backend per address, in order.
    ///
    /// Configuration-level checks such as the hash method belong to
    /// [`keyshard_core::ClientConfig::validate`]; this only checks the node
    /// list itself, as [`NodeRegistry::new`] does.
    ///
    /// # Errors
    ///
    /// Returns `ShardError::Connect` naming the first node the connector failed
    /// on, or `ShardError::Configuration` for an empty, malformed or duplicated
    /// node list.
    pub fn connect(
        addresses: &[NodeAddress],
        connector: &dyn Connector,
    ) -> Result<Self, ShardError> {
        let nodes = addresses
            .iter()
            .map(|address| {
                connector
                    .connect(address)
                    .map(Node::new)
                    .map_err(|source| ShardError::Connect {
                        node: address.identity(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(nodes)
    }

    /// The node at routing index `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Node> {
        self.nodes.get(index)
    }

    /// The node at `index`, which must come from a router sized to this
    /// registry.
    pub(crate) fn at(&self, index: usize) -> &Node {
        &self.nodes[index]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always `false`: a registry holds at least one node.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in routing order.
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    #[must_use]
    pub fn by_identity(&self, identity: &str) -> Option<&Node> {
        self.by_identity.get(identity).map(|&i| &self.nodes[i])
    }

    /// Identities in routing order.
    #[must_use]
    pub fn identities(&self) -> Vec<&str> {
        self.nodes.iter().map(Node::identity).collect()
    }
}
