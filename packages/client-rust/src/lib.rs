//! `keyshard` client: spreads keys over a fixed set of key-value store nodes.
//!
//! [`ShardedClient`] is the entry point. Single-key commands are routed to one
//! node by a deterministic hash of the key; whole-instance commands are fanned
//! out to every node; commands whose keys may span nodes are refused.
//!
//! Nodes are reached through the [`backend::Backend`] capability traits.
//! [`backend::MemoryBackend`] implements them in memory.

pub mod backend;
pub mod classify;
pub mod client;
pub mod fanout;
pub mod registry;
pub mod telemetry;

pub use backend::{Backend, Connector, MemoryBackend, MemoryConnector};
pub use classify::{classify, CommandPolicy};
pub use client::ShardedClient;
pub use fanout::{FanOutExecutor, ResultMap};
pub use keyshard_core::{
    BackendError, ClientConfig, HashMethod, HashStrategy, NodeAddress, Router, ShardError,
};
pub use registry::{Node, NodeRegistry};
