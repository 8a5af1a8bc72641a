//! Hash strategies for key routing.
//!
//! A strategy maps a binary-safe key to a non-negative bucket value. The
//! router reduces that bucket modulo the node count, so every strategy must be
//! a pure function of the key bytes: no state, no randomness.
//!
//! Only the `"standard"` strategy exists today. Adding one means a new
//! [`HashStrategy`] implementation plus a [`HashMethod`] variant; nothing that
//! dispatches commands needs to change.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::ShardError;

/// Configuration name of the standard CRC-32 strategy.
pub const STANDARD_HASH_METHOD: &str = "standard";

/// Mask applied to the shifted checksum: keeps the lower 15 bits.
const STANDARD_BUCKET_MASK: u32 = 0x7fff;

/// Maps a key to a bucket value.
pub trait HashStrategy: Send + Sync + fmt::Debug {
    /// Name used in configuration and logs.
    fn name(&self) -> &'static str;

    /// Computes the bucket for `key`. Must be deterministic.
    fn bucket(&self, key: &[u8]) -> u32;
}

/// The `"standard"` strategy: `(crc32(key) >> 16) & 0x7fff`.
///
/// Uses the IEEE CRC-32 polynomial over the raw key bytes. Buckets fall in
/// `[0, 32768)`.
///
/// # Examples
///
/// ```
/// use keyshard_core::hash::{HashStrategy, StandardHash};
///
/// assert_eq!(StandardHash.bucket(b"key:1"), 2927);
/// assert_eq!(StandardHash.bucket(b""), 0);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StandardHash;

impl HashStrategy for StandardHash {
    fn name(&self) -> &'static str {
        STANDARD_HASH_METHOD
    }

    fn bucket(&self, key: &[u8]) -> u32 {
        (crc32fast::hash(key) >> 16) & STANDARD_BUCKET_MASK
    }
}

/// Known hash strategies, selectable by name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum HashMethod {
    #[default]
    Standard,
}

impl HashMethod {
    /// Returns the configuration name of this method.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Standard => STANDARD_HASH_METHOD,
        }
    }

    /// Builds the strategy implementing this method.
    #[must_use]
    pub fn strategy(self) -> Arc<dyn HashStrategy> {
        match self {
            Self::Standard => Arc::new(StandardHash),
        }
    }
}

impl FromStr for HashMethod {
    type Err = ShardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            STANDARD_HASH_METHOD => Ok(Self::Standard),
            other => Err(ShardError::InvalidHashMethod {
                name: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for HashMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
