//! The sharded client: the public command surface.
//!
//! Every command is handled one of three ways (see [`crate::classify`]):
//!
//! - single-key commands go to the node chosen by the [`Router`] and return
//!   that node's result or error unchanged;
//! - whole-instance commands run on every node through the
//!   [`FanOutExecutor`] and return a [`ResultMap`] keyed by node identity;
//! - commands whose keys could live on different nodes are refused with
//!   [`ShardError::UnsupportedOperation`].

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;

use bytes::Bytes;
use keyshard_core::{BackendError, ClientConfig, HashMethod, HashStrategy, Router, ShardError};
use tracing::{debug, info, warn};

use crate::backend::{
    AdminCommands, Backend, Connector, InsertPosition, KeyCommands, KeyType, ListCommands,
    ScoredMember, SetCommands, SortOptions, SortedSetCommands, StringCommands, Ttl,
};
use crate::fanout::{FanOutExecutor, ResultMap};
use crate::registry::{Node, NodeRegistry};

/// Client that spreads keys over a fixed set of backend nodes.
///
/// Cheap to share behind an `Arc`; all commands take `&self`.
#[derive(Clone)]
pub struct ShardedClient {
    registry: Arc<NodeRegistry>,
    router: Router,
    fanout: FanOutExecutor,
}

impl fmt::Debug for ShardedClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardedClient")
            .field("nodes", &self.registry.identities())
            .field("hash_method", &self.router.strategy_name())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

impl ShardedClient {
    /// Validates `config` and connects one backend per configured node.
    ///
    /// # Errors
    ///
    /// - `ShardError::Configuration` for an empty or malformed node list
    /// - `ShardError::InvalidHashMethod` for an unknown strategy name
    /// - `ShardError::Connect` if the connector fails for a node
    pub fn connect(config: &ClientConfig, connector: &dyn Connector) -> Result<Self, ShardError> {
        let method = config.validate()?;
        let registry = NodeRegistry::connect(&config.nodes, connector)?;
        Ok(Self::with_strategy(registry, method.strategy()))
    }

    /// Builds a client over already-connected nodes, in routing order.
    ///
    /// # Errors
    ///
    /// Returns `ShardError::Configuration` for an empty or malformed node list
    /// and `ShardError::InvalidHashMethod` for an unknown strategy name.
    pub fn from_nodes(nodes: Vec<Node>, hash_method: &str) -> Result<Self, ShardError> {
        let method: HashMethod = hash_method.parse()?;
        let registry = NodeRegistry::new(nodes)?;
        Ok(Self::with_strategy(registry, method.strategy()))
    }

    /// Builds a client with a caller-supplied hash strategy.
    #[must_use]
    pub fn with_strategy(registry: NodeRegistry, strategy: Arc<dyn HashStrategy>) -> Self {
        let registry = Arc::new(registry);
        // A registry is never empty, so the fallback is unreachable.
        let node_count = NonZeroUsize::new(registry.len()).unwrap_or(NonZeroUsize::MIN);
        let router = Router::with_strategy(strategy, node_count);

        info!(
            nodes = registry.len(),
            hash_method = router.strategy_name(),
            "sharded client ready"
        );

        Self {
            fanout: FanOutExecutor::new(Arc::clone(&registry)),
            registry,
            router,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    #[must_use]
    pub fn router(&self) -> &Router {
        &self.router
    }

    #[must_use]
    pub fn fanout(&self) -> &FanOutExecutor {
        &self.fanout
    }

    /// The node that owns `key`.
    #[must_use]
    pub fn node_for(&self, key: &[u8]) -> &Node {
        self.registry.at(self.router.select(key))
    }

    /// Returns the backend handle owning `key`, for batching commands on that
    /// node directly. Commands sent through it bypass routing, so only keys
    /// owned by the same node should go through one handle.
    #[must_use]
    pub fn pipeline(&self, key: &[u8]) -> Arc<dyn Backend> {
        Arc::clone(self.route("pipeline", key))
    }

    fn route(&self, command: &'static str, key: &[u8]) -> &Arc<dyn Backend> {
        let node = self.node_for(key);
        debug!(command, node = node.identity(), "routed");
        metrics::counter!(
            "keyshard_routed_total",
            "node" => node.identity().to_string(),
            "command" => command
        )
        .increment(1);
        node.backend()
    }

    fn unsupported<T>(command: &'static str) -> Result<T, ShardError> {
        warn!(command, "refused command that may span shards");
        metrics::counter!("keyshard_unsupported_total", "command" => command).increment(1);
        Err(ShardError::UnsupportedOperation { command })
    }
}

// ---------------------------------------------------------------------------
// Routed: keys
// ---------------------------------------------------------------------------

impl ShardedClient {
    pub async fn exists(&self, key: &[u8]) -> Result<bool, ShardError> {
        Ok(self.route("exists", key).exists(key).await?)
    }

    /// Deletes one key. Returns `true` if it existed.
    pub async fn delete(&self, key: &[u8]) -> Result<bool, ShardError> {
        Ok(self.route("delete", key).delete(key).await?)
    }

    /// Deletes keys one at a time, each on its own node.
    ///
    /// Returns `Ok(false)` at the first key that did not exist; later keys are
    /// left alone. Keys deleted before a failure stay deleted.
    ///
    /// # Errors
    ///
    /// Returns the first backend error encountered.
    pub async fn delete_many<I, K>(&self, keys: I) -> Result<bool, ShardError>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<[u8]>,
    {
        for key in keys {
            let key = key.as_ref();
            if !self.route("delete", key).delete(key).await? {
                debug!("delete_many stopped at a missing key");
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Sets a relative expiry. Returns `false` if the key does not exist.
    pub async fn expire(&self, key: &[u8], seconds: u64) -> Result<bool, ShardError> {
        Ok(self.route("expire", key).expire(key, seconds).await?)
    }

    /// Sets an absolute expiry in Unix seconds.
    pub async fn expireat(&self, key: &[u8], unix_seconds: u64) -> Result<bool, ShardError> {
        Ok(self.route("expireat", key).expire_at(key, unix_seconds).await?)
    }

    pub async fn ttl(&self, key: &[u8]) -> Result<Ttl, ShardError> {
        Ok(self.route("ttl", key).ttl(key).await?)
    }

    pub async fn key_type(&self, key: &[u8]) -> Result<KeyType, ShardError> {
        Ok(self.route("type", key).key_type(key).await?)
    }

    pub async fn watch(&self, key: &[u8]) -> Result<(), ShardError> {
        Ok(self.route("watch", key).watch(key).await?)
    }

    /// Clears the watch list on the node that owns `key`.
    pub async fn unwatch(&self, key: &[u8]) -> Result<(), ShardError> {
        Ok(self.route("unwatch", key).unwatch().await?)
    }

    pub async fn sort(&self, key: &[u8], options: SortOptions) -> Result<Vec<Bytes>, ShardError> {
        Ok(self.route("sort", key).sort(key, options).await?)
    }
}

// ---------------------------------------------------------------------------
// Routed: strings
// ---------------------------------------------------------------------------

impl ShardedClient {
    pub async fn get(&self, key: &[u8]) -> Result<Option<Bytes>, ShardError> {
        Ok(self.route("get", key).get(key).await?)
    }

    pub async fn set(&self, key: &[u8], value: &[u8]) -> Result<(), ShardError> {
        Ok(self.route("set", key).set(key, value).await?)
    }

    pub async fn setex(&self, key: &[u8], value: &[u8], seconds: u64) -> Result<(), ShardError> {
        Ok(self.route("setex", key).setex(key, value, seconds).await?)
    }

    pub async fn getset(&self, key: &[u8], value: &[u8]) -> Result<Option<Bytes>, ShardError> {
        Ok(self.route("getset", key).getset(key, value).await?)
    }

    pub async fn append(&self, key: &[u8], value: &[u8]) -> Result<usize, ShardError> {
        Ok(self.route("append", key).append(key, value).await?)
    }

    /// Increments the integer at `key` by `amount`.
    pub async fn incr(&self, key: &[u8], amount: i64) -> Result<i64, ShardError> {
        Ok(self.route("incr", key).incr_by(key, amount).await?)
    }

    /// Decrements the integer at `key` by `amount`.
    pub async fn decr(&self, key: &[u8], amount: i64) -> Result<i64, ShardError> {
        Ok(self.route("decr", key).decr_by(key, amount).await?)
    }

    pub async fn substr(&self, key: &[u8], start: i64, end: i64) -> Result<Bytes, ShardError> {
        Ok(self.route("substr", key).substr(key, start, end).await?)
    }
}

// ---------------------------------------------------------------------------
// Routed: lists
// ---------------------------------------------------------------------------

impl ShardedClient {
    pub async fn lindex(&self, key: &[u8], index: i64) -> Result<Option<Bytes>, ShardError> {
        Ok(self.route("lindex", key).lindex(key, index).await?)
    }

    pub async fn linsert(
        &self,
        key: &[u8],
        position: InsertPosition,
        pivot: &[u8],
        value: &[u8],
    ) -> Result<i64, ShardError> {
        Ok(self
            .route("linsert", key)
            .linsert(key, position, pivot, value)
            .await?)
    }

    pub async fn llen(&self, key: &[u8]) -> Result<usize, ShardError> {
        Ok(self.route("llen", key).llen(key).await?)
    }

    pub async fn lpop(&self, key: &[u8]) -> Result<Option<Bytes>, ShardError> {
        Ok(self.route("lpop", key).lpop(key).await?)
    }

    pub async fn lpush(&self, key: &[u8], value: &[u8]) -> Result<usize, ShardError> {
        Ok(self.route("lpush", key).lpush(key, value).await?)
    }

    pub async fn lpushx(&self, key: &[u8], value: &[u8]) -> Result<usize, ShardError> {
        Ok(self.route("lpushx", key).lpushx(key, value).await?)
    }

    pub async fn lrange(
        &self,
        key: &[u8],
        start: i64,
        stop: i64,
    ) -> Result<Vec<Bytes>, ShardError> {
        Ok(self.route("lrange", key).lrange(key, start, stop).await?)
    }

    pub async fn lrem(&self, key: &[u8], count: i64, value: &[u8]) -> Result<usize, ShardError> {
        Ok(self.route("lrem", key).lrem(key, count, value).await?)
    }

    /// Replaces the element at `index`.
    pub async fn lset(&self, key: &[u8], index: i64, value: &[u8]) -> Result<(), ShardError> {
        Ok(self.route("lset", key).lset(key, index, value).await?)
    }

    pub async fn ltrim(&self, key: &[u8], start: i64, stop: i64) -> Result<(), ShardError> {
        Ok(self.route("ltrim", key).ltrim(key, start, stop).await?)
    }

    pub async fn rpop(&self, key: &[u8]) -> Result<Option<Bytes>, ShardError> {
        Ok(self.route("rpop", key).rpop(key).await?)
    }

    pub async fn rpush(&self, key: &[u8], value: &[u8]) -> Result<usize, ShardError> {
        Ok(self.route("rpush", key).rpush(key, value).await?)
    }

    pub async fn rpushx(&self, key: &[u8], value: &[u8]) -> Result<usize, ShardError> {
        Ok(self.route("rpushx", key).rpushx(key, value).await?)
    }
}

// ---------------------------------------------------------------------------
// Routed: sets
// ---------------------------------------------------------------------------

impl ShardedClient {
    pub async fn sadd(&self, key: &[u8], member: &[u8]) -> Result<bool, ShardError> {
        Ok(self.route("sadd", key).sadd(key, member).await?)
    }

    pub async fn scard(&self, key: &[u8]) -> Result<usize, ShardError> {
        Ok(self.route("scard", key).scard(key).await?)
    }

    pub async fn sismember(&self, key: &[u8], member: &[u8]) -> Result<bool, ShardError> {
        Ok(self.route("sismember", key).sismember(key, member).await?)
    }

    pub async fn smembers(&self, key: &[u8]) -> Result<Vec<Bytes>, ShardError> {
        Ok(self.route("smembers", key).smembers(key).await?)
    }

    pub async fn spop(&self, key: &[u8]) -> Result<Option<Bytes>, ShardError> {
        Ok(self.route("spop", key).spop(key).await?)
    }

    pub async fn srandmember(&self, key: &[u8]) -> Result<Option<Bytes>, ShardError> {
        Ok(self.route("srandmember", key).srandmember(key).await?)
    }

    pub async fn srem(&self, key: &[u8], member: &[u8]) -> Result<bool, ShardError> {
        Ok(self.route("srem", key).srem(key, member).await?)
    }
}

// ---------------------------------------------------------------------------
// Routed: sorted sets
// ---------------------------------------------------------------------------

impl ShardedClient {
    pub async fn zadd(&self, key: &[u8], member: &[u8], score: f64) -> Result<bool, ShardError> {
        Ok(self.route("zadd", key).zadd(key, member, score).await?)
    }

    pub async fn zcard(&self, key: &[u8]) -> Result<usize, ShardError> {
        Ok(self.route("zcard", key).zcard(key).await?)
    }

    pub async fn zcount(&self, key: &[u8], min: f64, max: f64) -> Result<usize, ShardError> {
        Ok(self.route("zcount", key).zcount(key, min, max).await?)
    }

    /// Adds `amount` to the score of `member` and returns the new score.
    pub async fn zincrby(&self, key: &[u8], member: &[u8], amount: f64) -> Result<f64, ShardError> {
        Ok(self.route("zincrby", key).zincrby(key, member, amount).await?)
    }

    pub async fn zrange(
        &self,
        key: &[u8],
        start: i64,
        stop: i64,
    ) -> Result<Vec<ScoredMember>, ShardError> {
        Ok(self.route("zrange", key).zrange(key, start, stop).await?)
    }

    pub async fn zrangebyscore(
        &self,
        key: &[u8],
        min: f64,
        max: f64,
        limit: Option<(usize, usize)>,
    ) -> Result<Vec<ScoredMember>, ShardError> {
        Ok(self
            .route("zrangebyscore", key)
            .zrangebyscore(key, min, max, limit)
            .await?)
    }

    pub async fn zrank(&self, key: &[u8], member: &[u8]) -> Result<Option<usize>, ShardError> {
        Ok(self.route("zrank", key).zrank(key, member).await?)
    }

    pub async fn zrem(&self, key: &[u8], member: &[u8]) -> Result<bool, ShardError> {
        Ok(self.route("zrem", key).zrem(key, member).await?)
    }

    pub async fn zremrangebyrank(
        &self,
        key: &[u8],
        start: i64,
        stop: i64,
    ) -> Result<usize, ShardError> {
        Ok(self
            .route("zremrangebyrank", key)
            .zremrangebyrank(key, start, stop)
            .await?)
    }

    pub async fn zremrangebyscore(
        &self,
        key: &[u8],
        min: f64,
        max: f64,
    ) -> Result<usize, ShardError> {
        Ok(self
            .route("zremrangebyscore", key)
            .zremrangebyscore(key, min, max)
            .await?)
    }

    pub async fn zrevrange(
        &self,
        key: &[u8],
        start: i64,
        stop: i64,
    ) -> Result<Vec<ScoredMember>, ShardError> {
        Ok(self.route("zrevrange", key).zrevrange(key, start, stop).await?)
    }

    pub async fn zrevrank(&self, key: &[u8], member: &[u8]) -> Result<Option<usize>, ShardError> {
        Ok(self.route("zrevrank", key).zrevrank(key, member).await?)
    }

    pub async fn zscore(&self, key: &[u8], member: &[u8]) -> Result<Option<f64>, ShardError> {
        Ok(self.route("zscore", key).zscore(key, member).await?)
    }
}

// ---------------------------------------------------------------------------
// Broadcast
// ---------------------------------------------------------------------------

/// Whole-instance commands. Each returns one entry per node, keyed by
/// `"host:port:db"`, and fails with `ShardError::NodeFailure` at the first
/// node that errors; nodes after it are not contacted.
impl ShardedClient {
    /// Pings every node.
    pub async fn ping(&self) -> Result<ResultMap<String>, ShardError> {
        self.fanout
            .broadcast("ping", |b| async move { b.ping().await })
            .await
    }

    pub async fn save(&self) -> Result<ResultMap<()>, ShardError> {
        self.fanout
            .broadcast("save", |b| async move { b.save().await })
            .await
    }

    pub async fn bgsave(&self) -> Result<ResultMap<()>, ShardError> {
        self.fanout
            .broadcast("bgsave", |b| async move { b.bgsave().await })
            .await
    }

    pub async fn bgrewriteaof(&self) -> Result<ResultMap<()>, ShardError> {
        self.fanout
            .broadcast("bgrewriteaof", |b| async move { b.bgrewriteaof().await })
            .await
    }

    pub async fn dbsize(&self) -> Result<ResultMap<usize>, ShardError> {
        self.fanout
            .broadcast("dbsize", |b| async move { b.dbsize().await })
            .await
    }

    pub async fn flushall(&self) -> Result<ResultMap<()>, ShardError> {
        self.fanout
            .broadcast("flushall", |b| async move { b.flushall().await })
            .await
    }

    pub async fn flushdb(&self) -> Result<ResultMap<()>, ShardError> {
        self.fanout
            .broadcast("flushdb", |b| async move { b.flushdb().await })
            .await
    }

    /// Unix time of each node's last save.
    pub async fn lastsave(&self) -> Result<ResultMap<u64>, ShardError> {
        self.fanout
            .broadcast("lastsave", |b| async move { b.lastsave().await })
            .await
    }

    pub async fn info(&self) -> Result<ResultMap<BTreeMap<String, String>>, ShardError> {
        self.fanout
            .broadcast("info", |b| async move { b.info().await })
            .await
    }

    /// Keys matching `pattern`, per node.
    pub async fn keys(&self, pattern: &str) -> Result<ResultMap<Vec<Bytes>>, ShardError> {
        self.fanout
            .broadcast("keys", |b| async move { b.keys(pattern).await })
            .await
    }

    pub async fn randomkey(&self) -> Result<ResultMap<Option<Bytes>>, ShardError> {
        self.fanout
            .broadcast("randomkey", |b| async move { b.randomkey().await })
            .await
    }

    /// Runs `op` on every node concurrently, keeping each node's outcome
    /// instead of stopping at the first failure.
    pub async fn broadcast_collect<T, F, Fut>(
        &self,
        command: &'static str,
        op: F,
    ) -> ResultMap<Result<T, BackendError>>
    where
        F: Fn(Arc<dyn Backend>) -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        self.fanout.broadcast_collect(command, op).await
    }
}

// ---------------------------------------------------------------------------
// Unsupported
// ---------------------------------------------------------------------------

/// Commands whose keys may live on different nodes. Each one fails with
/// `ShardError::UnsupportedOperation` whatever its arguments, without
/// contacting any node.
#[allow(clippy::unused_async)]
impl ShardedClient {
    pub async fn mget(&self, _keys: &[&[u8]]) -> Result<Vec<Option<Bytes>>, ShardError> {
        Self::unsupported("mget")
    }

    pub async fn mset(&self, _pairs: &[(&[u8], &[u8])]) -> Result<(), ShardError> {
        Self::unsupported("mset")
    }

    pub async fn msetnx(&self, _pairs: &[(&[u8], &[u8])]) -> Result<bool, ShardError> {
        Self::unsupported("msetnx")
    }

    pub async fn move_key(&self, _key: &[u8], _db: u32) -> Result<bool, ShardError> {
        Self::unsupported("move")
    }

    pub async fn rename(&self, _src: &[u8], _dst: &[u8]) -> Result<(), ShardError> {
        Self::unsupported("rename")
    }

    pub async fn renamenx(&self, _src: &[u8], _dst: &[u8]) -> Result<bool, ShardError> {
        Self::unsupported("renamenx")
    }

    pub async fn sdiff(&self, _keys: &[&[u8]]) -> Result<Vec<Bytes>, ShardError> {
        Self::unsupported("sdiff")
    }

    pub async fn sdiffstore(&self, _dst: &[u8], _keys: &[&[u8]]) -> Result<usize, ShardError> {
        Self::unsupported("sdiffstore")
    }

    pub async fn sinter(&self, _keys: &[&[u8]]) -> Result<Vec<Bytes>, ShardError> {
        Self::unsupported("sinter")
    }

    pub async fn sinterstore(&self, _dst: &[u8], _keys: &[&[u8]]) -> Result<usize, ShardError> {
        Self::unsupported("sinterstore")
    }

    pub async fn sunion(&self, _keys: &[&[u8]]) -> Result<Vec<Bytes>, ShardError> {
        Self::unsupported("sunion")
    }

    pub async fn sunionstore(&self, _dst: &[u8], _keys: &[&[u8]]) -> Result<usize, ShardError> {
        Self::unsupported("sunionstore")
    }

    pub async fn zunionstore(&self, _dst: &[u8], _keys: &[&[u8]]) -> Result<usize, ShardError> {
        Self::unsupported("zunionstore")
    }

    pub async fn zinterstore(&self, _dst: &[u8], _keys: &[&[u8]]) -> Result<usize, ShardError> {
        Self::unsupported("zinterstore")
    }

    pub async fn blpop(
        &self,
        _keys: &[&[u8]],
        _timeout_secs: u64,
    ) -> Result<Option<(Bytes, Bytes)>, ShardError> {
        Self::unsupported("blpop")
    }

    pub async fn brpop(
        &self,
        _keys: &[&[u8]],
        _timeout_secs: u64,
    ) -> Result<Option<(Bytes, Bytes)>, ShardError> {
        Self::unsupported("brpop")
    }

    pub async fn smove(
        &self,
        _src: &[u8],
        _dst: &[u8],
        _member: &[u8],
    ) -> Result<bool, ShardError> {
        Self::unsupported("smove")
    }
}
