//! Backend capability interface.
//!
//! The sharding layer talks to each node only through these traits. They are
//! split by command family; [`Backend`] ties them together with the node's
//! address. Every method returns a [`BackendError`] on failure, which the
//! client passes through without interpretation.
//!
//! Used as `Arc<dyn Backend>`.

pub mod memory;
pub mod pattern;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use keyshard_core::{BackendError, NodeAddress};

pub use memory::{MemoryBackend, MemoryConnector};

// ---------------------------------------------------------------------------
// Shared value types
// ---------------------------------------------------------------------------

/// Remaining lifetime of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// The key does not exist.
    Missing,
    /// The key exists and has no expiry.
    Persistent,
    /// The key expires in this many seconds (rounded up).
    Seconds(u64),
}

/// Kind of value stored at a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    None,
    String,
    List,
    Set,
    SortedSet,
}

impl KeyType {
    /// Name as reported by the store's `TYPE` command.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::String => "string",
            Self::List => "list",
            Self::Set => "set",
            Self::SortedSet => "zset",
        }
    }
}

/// Where `linsert` places the new element relative to the pivot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPosition {
    Before,
    After,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Order {
    #[default]
    Asc,
    Desc,
}

/// Options for the `sort` command.
///
/// There is no `store` destination: writing the result to another key could
/// target a different node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SortOptions {
    /// `(offset, count)` window applied after sorting.
    pub limit: Option<(usize, usize)>,
    pub order: Order,
    /// Compare elements as byte strings instead of numbers.
    pub alpha: bool,
}

/// A sorted-set member with its score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMember {
    pub member: Bytes,
    pub score: f64,
}

impl ScoredMember {
    #[must_use]
    pub fn new(member: impl Into<Bytes>, score: f64) -> Self {
        Self {
            member: member.into(),
            score,
        }
    }
}

// ---------------------------------------------------------------------------
// Command families
// ---------------------------------------------------------------------------

/// Generic key commands.
#[async_trait]
pub trait KeyCommands: Send + Sync {
    async fn exists(&self, key: &[u8]) -> Result<bool, BackendError>;

    /// Deletes `key`. Returns `true` if something was removed.
    async fn delete(&self, key: &[u8]) -> Result<bool, BackendError>;

    /// Sets a relative expiry. Returns `false` if the key does not exist.
    async fn expire(&self, key: &[u8], seconds: u64) -> Result<bool, BackendError>;

    /// Sets an absolute expiry in Unix seconds. Returns `false` if the key does not exist.
    async fn expire_at(&self, key: &[u8], unix_seconds: u64) -> Result<bool, BackendError>;

    async fn ttl(&self, key: &[u8]) -> Result<Ttl, BackendError>;

    async fn key_type(&self, key: &[u8]) -> Result<KeyType, BackendError>;

    async fn watch(&self, key: &[u8]) -> Result<(), BackendError>;

    /// Forgets every watched key on this connection.
    async fn unwatch(&self) -> Result<(), BackendError>;

    /// Sorts the elements of a list, set or sorted set.
    async fn sort(&self, key: &[u8], options: SortOptions) -> Result<Vec<Bytes>, BackendError>;
}

/// String value commands.
#[async_trait]
pub trait StringCommands: Send + Sync {
    async fn get(&self, key: &[u8]) -> Result<Option<Bytes>, BackendError>;

    async fn set(&self, key: &[u8], value: &[u8]) -> Result<(), BackendError>;

    /// Sets `key` with an expiry of `seconds`.
    async fn setex(&self, key: &[u8], value: &[u8], seconds: u64) -> Result<(), BackendError>;

    /// Sets `key` and returns the previous value.
    async fn getset(&self, key: &[u8], value: &[u8]) -> Result<Option<Bytes>, BackendError>;

    /// Appends to the value at `key`, creating it if needed. Returns the new length.
    async fn append(&self, key: &[u8], value: &[u8]) -> Result<usize, BackendError>;

    async fn incr_by(&self, key: &[u8], amount: i64) -> Result<i64, BackendError>;

    async fn decr_by(&self, key: &[u8], amount: i64) -> Result<i64, BackendError>;

    /// Returns the inclusive byte range `[start, end]`; negative offsets count from the end.
    async fn substr(&self, key: &[u8], start: i64, end: i64) -> Result<Bytes, BackendError>;
}

/// List commands.
#[async_trait]
pub trait ListCommands: Send + Sync {
    async fn lpush(&self, key: &[u8], value: &[u8]) -> Result<usize, BackendError>;

    async fn rpush(&self, key: &[u8], value: &[u8]) -> Result<usize, BackendError>;

    /// Pushes only if the list exists. Returns the new length, 0 when missing.
    async fn lpushx(&self, key: &[u8], value: &[u8]) -> Result<usize, BackendError>;

    async fn rpushx(&self, key: &[u8], value: &[u8]) -> Result<usize, BackendError>;

    async fn lpop(&self, key: &[u8]) -> Result<Option<Bytes>, BackendError>;

    async fn rpop(&self, key: &[u8]) -> Result<Option<Bytes>, BackendError>;

    async fn llen(&self, key: &[u8]) -> Result<usize, BackendError>;

    async fn lindex(&self, key: &[u8], index: i64) -> Result<Option<Bytes>, BackendError>;

    /// Inserts next to `pivot`. Returns the new length, -1 if the pivot is
    /// absent, 0 if the list is absent.
    async fn linsert(
        &self,
        key: &[u8],
        position: InsertPosition,
        pivot: &[u8],
        value: &[u8],
    ) -> Result<i64, BackendError>;

    async fn lrange(&self, key: &[u8], start: i64, stop: i64) -> Result<Vec<Bytes>, BackendError>;

    /// Removes occurrences of `value`: from the head when `count > 0`, from the
    /// tail when `count < 0`, all of them when `count == 0`.
    async fn lrem(&self, key: &[u8], count: i64, value: &[u8]) -> Result<usize, BackendError>;

    async fn lset(&self, key: &[u8], index: i64, value: &[u8]) -> Result<(), BackendError>;

    async fn ltrim(&self, key: &[u8], start: i64, stop: i64) -> Result<(), BackendError>;
}

/// Set commands.
#[async_trait]
pub trait SetCommands: Send + Sync {
    async fn sadd(&self, key: &[u8], member: &[u8]) -> Result<bool, BackendError>;

    async fn srem(&self, key: &[u8], member: &[u8]) -> Result<bool, BackendError>;

    async fn scard(&self, key: &[u8]) -> Result<usize, BackendError>;

    async fn sismember(&self, key: &[u8], member: &[u8]) -> Result<bool, BackendError>;

    async fn smembers(&self, key: &[u8]) -> Result<Vec<Bytes>, BackendError>;

    async fn spop(&self, key: &[u8]) -> Result<Option<Bytes>, BackendError>;

    async fn srandmember(&self, key: &[u8]) -> Result<Option<Bytes>, BackendError>;
}

/// Sorted set commands. Score bounds are inclusive.
#[async_trait]
pub trait SortedSetCommands: Send + Sync {
    /// Adds or updates `member`. Returns `true` if the member is new.
    async fn zadd(&self, key: &[u8], member: &[u8], score: f64) -> Result<bool, BackendError>;

    async fn zrem(&self, key: &[u8], member: &[u8]) -> Result<bool, BackendError>;

    async fn zcard(&self, key: &[u8]) -> Result<usize, BackendError>;

    async fn zcount(&self, key: &[u8], min: f64, max: f64) -> Result<usize, BackendError>;

    /// Adds `amount` to the score of `member` and returns the new score.
    async fn zincrby(&self, key: &[u8], member: &[u8], amount: f64) -> Result<f64, BackendError>;

    async fn zscore(&self, key: &[u8], member: &[u8]) -> Result<Option<f64>, BackendError>;

    async fn zrank(&self, key: &[u8], member: &[u8]) -> Result<Option<usize>, BackendError>;

    async fn zrevrank(&self, key: &[u8], member: &[u8]) -> Result<Option<usize>, BackendError>;

    /// Members by rank, lowest score first.
    async fn zrange(
        &self,
        key: &[u8],
        start: i64,
        stop: i64,
    ) -> Result<Vec<ScoredMember>, BackendError>;

    /// Members by rank, highest score first.
    async fn zrevrange(
        &self,
        key: &[u8],
        start: i64,
        stop: i64,
    ) -> Result<Vec<ScoredMember>, BackendError>;

    async fn zrangebyscore(
        &self,
        key: &[u8],
        min: f64,
        max: f64,
        limit: Option<(usize, usize)>,
    ) -> Result<Vec<ScoredMember>, BackendError>;

    async fn zremrangebyrank(&self, key: &[u8], start: i64, stop: i64)
        -> Result<usize, BackendError>;

    async fn zremrangebyscore(&self, key: &[u8], min: f64, max: f64)
        -> Result<usize, BackendError>;
}

/// Whole-instance administrative commands.
#[async_trait]
pub trait AdminCommands: Send + Sync {
    /// Returns the instance's reply, `"PONG"` for a healthy node.
    async fn ping(&self) -> Result<String, BackendError>;

    async fn save(&self) -> Result<(), BackendError>;

    async fn bgsave(&self) -> Result<(), BackendError>;

    async fn bgrewriteaof(&self) -> Result<(), BackendError>;

    async fn dbsize(&self) -> Result<usize, BackendError>;

    async fn flushall(&self) -> Result<(), BackendError>;

    async fn flushdb(&self) -> Result<(), BackendError>;

    /// Unix time in seconds of the last successful save.
    async fn lastsave(&self) -> Result<u64, BackendError>;

    async fn info(&self) -> Result<BTreeMap<String, String>, BackendError>;

    /// Keys matching a glob-style pattern (`*`, `?`, `[...]`).
    async fn keys(&self, pattern: &str) -> Result<Vec<Bytes>, BackendError>;

    async fn randomkey(&self) -> Result<Option<Bytes>, BackendError>;
}

/// Everything the sharding layer needs from one node.
pub trait Backend:
    KeyCommands + StringCommands + ListCommands + SetCommands + SortedSetCommands + AdminCommands
{
    /// The `host:port:db` location this backend talks to.
    fn address(&self) -> &NodeAddress;
}

/// Produces a backend handle for a configured node.
///
/// Connection establishment and pooling live behind this trait.
pub trait Connector: Send + Sync {
    /// Returns a handle for `address`.
    ///
    /// # Errors
    ///
    /// Returns a `BackendError` if no handle can be produced for the node.
    fn connect(&self, address: &NodeAddress) -> Result<Arc<dyn Backend>, BackendError>;
}
