//! Command classification: how the sharded client handles each command name.
//!
//! Every command falls into exactly one policy. Single-key commands are
//! routed to the node owning the key; whole-instance commands are broadcast to
//! every node; commands that need atomicity or data movement across keys that
//! may live on different nodes are refused.

use std::fmt;

/// How the sharded client handles a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandPolicy {
    /// Forwarded unchanged to the single node that owns the key.
    Routed,
    /// Issued to every node; results keyed by node identity.
    Broadcast,
    /// Always refused with `ShardError::UnsupportedOperation`.
    Unsupported,
}

impl CommandPolicy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Routed => "routed",
            Self::Broadcast => "broadcast",
            Self::Unsupported => "unsupported",
        }
    }
}

impl fmt::Display for CommandPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Commands forwarded to the node owning their key.
pub const ROUTED_COMMANDS: &[&str] = &[
    // strings
    "get", "set", "setex", "getset", "append", "incr", "decr", "substr",
    // keys
    "exists", "delete", "expire", "expireat", "ttl", "type", "watch", "unwatch", "sort",
    // lists
    "lindex", "linsert", "llen", "lpop", "lpush", "lpushx", "lrange", "lrem", "lset", "ltrim",
    "rpop", "rpush", "rpushx",
    // sets
    "sadd", "scard", "sismember", "smembers", "spop", "srandmember", "srem",
    // sorted sets
    "zadd", "zcard", "zcount", "zincrby", "zrange", "zrangebyscore", "zrank", "zrem",
    "zremrangebyrank", "zremrangebyscore", "zrevrange", "zrevrank", "zscore",
];

/// Commands issued to every node.
pub const BROADCAST_COMMANDS: &[&str] = &[
    "ping",
    "save",
    "bgsave",
    "bgrewriteaof",
    "dbsize",
    "flushall",
    "flushdb",
    "lastsave",
    "info",
    "keys",
    "randomkey",
];

/// Commands refused because their keys may span nodes.
pub const UNSUPPORTED_COMMANDS: &[&str] = &[
    "mget",
    "mset",
    "msetnx",
    "move",
    "rename",
    "renamenx",
    "sdiff",
    "sdiffstore",
    "sinter",
    "sinterstore",
    "sunion",
    "sunionstore",
    "zunionstore",
    "zinterstore",
    "blpop",
    "brpop",
    "smove",
];

/// Returns the policy for `command`, matched case-insensitively.
///
/// A few client method names differ from the wire command they stand for;
/// both spellings are accepted (`key_type`/`type`, `expire_at`/`expireat`,
/// `move_key`/`move`, `del`/`delete`).
///
/// Returns `None` for a name the client does not expose at all.
#[must_use]
pub fn classify(command: &str) -> Option<CommandPolicy> {
    let lower = command.to_ascii_lowercase();
    let name = match lower.as_str() {
        "key_type" => "type",
        "expire_at" => "expireat",
        "move_key" => "move",
        "del" | "delete_many" => "delete",
        other => other,
    };

    if ROUTED_COMMANDS.contains(&name) {
        Some(CommandPolicy::Routed)
    } else if BROADCAST_COMMANDS.contains(&name) {
        Some(CommandPolicy::Broadcast)
    } else if UNSUPPORTED_COMMANDS.contains(&name) {
        Some(CommandPolicy::Unsupported)
    } else {
        None
    }
}
