//! Fan-out of one command to every node in the registry.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::join_all;
use keyshard_core::{BackendError, ShardError};
use tracing::{debug, warn};

use crate::backend::Backend;
use crate::registry::NodeRegistry;

/// Per-node results keyed by node identity (`"host:port:db"`).
pub type ResultMap<T> = BTreeMap<String, T>;

/// Runs an operation against every registered node.
#[derive(Debug, Clone)]
pub struct FanOutExecutor {
    registry: Arc<NodeRegistry>,
}

impl FanOutExecutor {
    #[must_use]
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self { registry }
    }

    #[must_use]
    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    /// Runs `op` on each node in registry order and collects the results.
    ///
    /// Nodes are visited one at a time. The first failure stops the fan-out:
    /// nodes after it are never invoked, and commands already applied on
    /// earlier nodes stay applied.
    ///
    /// # Errors
    ///
    /// Returns `ShardError::NodeFailure` carrying the failing node's identity
    /// and its error.
    pub async fn broadcast<T, F, Fut>(
        &self,
        command: &'static str,
        op: F,
    ) -> Result<ResultMap<T>, ShardError>
    where
        F: Fn(Arc<dyn Backend>) -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        let mut results = ResultMap::new();
        for node in self.registry.iter() {
            match op(Arc::clone(node.backend())).await {
                Ok(value) => {
                    results.insert(node.identity().to_string(), value);
                }
                Err(source) => {
                    warn!(
                        command,
                        node = node.identity(),
                        completed = results.len(),
                        error = %source,
                        "broadcast aborted"
                    );
                    metrics::counter!(
                        "keyshard_broadcast_total",
                        "command" => command,
                        "outcome" => "error"
                    )
                    .increment(1);
                    return Err(ShardError::NodeFailure {
                        node: node.identity().to_string(),
                        source,
                    });
                }
            }
        }

        debug!(command, nodes = results.len(), "broadcast complete");
        metrics::counter!(
            "keyshard_broadcast_total",
            "command" => command,
            "outcome" => "ok"
        )
        .increment(1);
        Ok(results)
    }

    /// Runs `op` on all nodes concurrently and records each node's outcome.
    ///
    /// Unlike [`broadcast`](Self::broadcast), a failing node does not stop the
    /// others; every node gets an entry.
    pub async fn broadcast_collect<T, F, Fut>(
        &self,
        command: &'static str,
        op: F,
    ) -> ResultMap<Result<T, BackendError>>
    where
        F: Fn(Arc<dyn Backend>) -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        let calls = self.registry.iter().map(|node| {
            let call = op(Arc::clone(node.backend()));
            async move { (node.identity().to_string(), call.await) }
        });
        let results: ResultMap<_> = join_all(calls).await.into_iter().collect();

        let failed = results.values().filter(|r| r.is_err()).count();
        if failed > 0 {
            warn!(command, failed, nodes = results.len(), "broadcast completed with failures");
        }
        metrics::counter!(
            "keyshard_broadcast_total",
            "command" => command,
            "outcome" => if failed == 0 { "ok" } else { "partial" }
        )
        .increment(1);
        results
    }
}
