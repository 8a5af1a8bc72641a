//! Key routing: maps a key to the index of the node that owns it.
//!
//! Routing is a static modulo hash (`bucket(key) % node_count`), not
//! consistent hashing. Changing the node count remaps nearly every key, and
//! reordering the node list changes which node sits behind each index.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

use crate::error::ShardError;
use crate::hash::{HashMethod, HashStrategy};

/// Pure key-to-index router over a fixed node count.
///
/// Holds no mutable state, so it is safe to share across threads and call
/// concurrently without locking.
#[derive(Clone)]
pub struct Router {
    strategy: Arc<dyn HashStrategy>,
    node_count: NonZeroUsize,
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("strategy", &self.strategy.name())
            .field("node_count", &self.node_count)
            .finish()
    }
}

impl Router {
    /// Creates a router for one of the built-in hash methods.
    #[must_use]
    pub fn new(method: HashMethod, node_count: NonZeroUsize) -> Self {
        Self::with_strategy(method.strategy(), node_count)
    }

    /// Creates a router from a strategy name, as found in configuration.
    ///
    /// # Errors
    ///
    /// Returns `ShardError::InvalidHashMethod` for an unknown name and
    /// `ShardError::Configuration` when `node_count` is zero.
    pub fn from_name(name: &str, node_count: usize) -> Result<Self, ShardError> {
        let method: HashMethod = name.parse()?;
        let node_count = NonZeroUsize::new(node_count).ok_or_else(|| {
            ShardError::Configuration("router needs at least one node".to_string())
        })?;
        Ok(Self::new(method, node_count))
    }

    /// Creates a router around a caller-supplied strategy.
    #[must_use]
    pub fn with_strategy(strategy: Arc<dyn HashStrategy>, node_count: NonZeroUsize) -> Self {
        Self {
            strategy,
            node_count,
        }
    }

    /// Returns the index in `[0, node_count)` of the node that owns `key`.
    #[must_use]
    pub fn select(&self, key: &[u8]) -> usize {
        self.bucket(key) as usize % self.node_count.get()
    }

    /// Returns the pre-modulo bucket value for `key`.
    #[must_use]
    pub fn bucket(&self, key: &[u8]) -> u32 {
        self.strategy.bucket(key)
    }

    /// Number of nodes this router distributes over.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.node_count.get()
    }

    /// Name of the configured hash strategy.
    #[must_use]
    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::address::NodeAddress;

    fn router(n: usize) -> Router {
        Router::new(HashMethod::Standard, NonZeroUsize::new(n).unwrap())
    }

    #[test]
    fn key_1_routes_to_index_2_of_3() {
        // crc32("key:1") = 0x0b6f3bec, bucket 2927, 2927 % 3 = 2.
        let r = router(3);
        assert_eq!(r.bucket(b"key:1"), 2927);
        for _ in 0..10 {
            assert_eq!(r.select(b"key:1"), 2);
        }
    }

    #[test]
    fn key_1_lands_on_port_6381() {
        let nodes = [
            NodeAddress::new("localhost", 6379, 0),
            NodeAddress::new("localhost", 6380, 0),
            NodeAddress::new("localhost", 6381, 0),
        ];
        let r = router(nodes.len());
        assert_eq!(nodes[r.select(b"key:1")].identity(), "localhost:6381:0");
    }

    #[test]
    fn single_node_always_selects_zero() {
        let r = router(1);
        for key in [&b""[..], b"a", b"key:1", b"\xff\xfe", b"user:1000"] {
            assert_eq!(r.select(key), 0);
        }
    }

    #[test]
    fn reordering_nodes_moves_keys() {
        let forward = [
            NodeAddress::new("localhost", 6379, 0),
            NodeAddress::new("localhost", 6380, 0),
            NodeAddress::new("localhost", 6381, 0),
        ];
        let reversed = [forward[2].clone(), forward[1].clone(), forward[0].clone()];
        let r = router(3);

        let keys: Vec<String> = (0..32).map(|i| format!("key:{i}")).collect();
        let moved = keys
            .iter()
            .filter(|k| {
                let idx = r.select(k.as_bytes());
                forward[idx] != reversed[idx]
            })
            .count();
        assert!(moved > 0, "expected reordering to move at least one key");
    }

    #[test]
    fn growing_the_cluster_remaps_keys() {
        let three = router(3);
        let four = router(4);
        let remapped = (0..100)
            .map(|i| format!("key:{i}"))
            .filter(|k| three.select(k.as_bytes()) != four.select(k.as_bytes()))
            .count();
        assert!(remapped > 50, "modulo routing should remap most keys, got {remapped}");
    }

    #[test]
    fn from_name_validates_inputs() {
        let r = Router::from_name("standard", 2).unwrap();
        assert_eq!(r.node_count(), 2);
        assert_eq!(r.strategy_name(), "standard");

        assert!(matches!(
            Router::from_name("random", 2).unwrap_err(),
            ShardError::InvalidHashMethod { .. }
        ));
        assert!(matches!(
            Router::from_name("standard", 0).unwrap_err(),
            ShardError::Configuration(_)
        ));
    }

    #[test]
    fn custom_strategy_is_pluggable() {
        #[derive(Debug)]
        struct FirstByte;

        impl HashStrategy for FirstByte {
            fn name(&self) -> &'static str {
                "first-byte"
            }

            fn bucket(&self, key: &[u8]) -> u32 {
                key.first().copied().map_or(0, u32::from)
            }
        }

        let r = Router::with_strategy(Arc::new(FirstByte), NonZeroUsize::new(4).unwrap());
        assert_eq!(r.select(b"a"), 97 % 4);
        assert_eq!(r.strategy_name(), "first-byte");
    }

    proptest! {
        #[test]
        fn select_is_in_range(
            key in proptest::collection::vec(any::<u8>(), 0..64),
            n in 1usize..64,
        ) {
            let r = router(n);
            prop_assert!(r.select(&key) < n);
        }

        #[test]
        fn select_is_deterministic(
            key in proptest::collection::vec(any::<u8>(), 0..64),
            n in 1usize..64,
        ) {
            let a = router(n);
            let b = router(n);
            prop_assert_eq!(a.select(&key), a.select(&key));
            prop_assert_eq!(a.select(&key), b.select(&key));
        }

        #[test]
        fn single_node_is_always_zero(key in proptest::collection::vec(any::<u8>(), 0..64)) {
            prop_assert_eq!(router(1).select(&key), 0);
        }
    }
}
