//! In-memory [`Backend`] implementation backed by [`DashMap`].
//!
//! Implements the full capability interface over a concurrent map with lazy
//! key expiry. Used by tests and by embedders that want a local stand-in for
//! a real store. [`MemoryBackend::set_available`] simulates an outage: while
//! unavailable, every command fails with `BackendError::Connection`.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use keyshard_core::{BackendError, NodeAddress};
use ordered_float::OrderedFloat;
use parking_lot::Mutex;
use rand::Rng;

use super::pattern::KeyPattern;
use super::{
    AdminCommands, Backend, Connector, InsertPosition, KeyCommands, KeyType, ListCommands, Order,
    ScoredMember, SetCommands, SortOptions, SortedSetCommands, StringCommands, Ttl,
};

// ---------------------------------------------------------------------------
// Stored values
// ---------------------------------------------------------------------------

/// Sorted set with a score index and a `(score, member)` ordering.
#[derive(Debug, Clone, Default)]
struct SortedSet {
    scores: HashMap<Bytes, f64>,
    ordered: BTreeSet<(OrderedFloat<f64>, Bytes)>,
}

impl SortedSet {
    /// Inserts or rescores `member`. Returns `true` if it was not present.
    fn insert(&mut self, member: Bytes, score: f64) -> bool {
        let previous = self.scores.insert(member.clone(), score);
        if let Some(old) = previous {
            self.ordered.remove(&(OrderedFloat(old), member.clone()));
        }
        self.ordered.insert((OrderedFloat(score), member));
        previous.is_none()
    }

    fn remove(&mut self, member: &[u8]) -> bool {
        match self.scores.remove_entry(member) {
            Some((member, score)) => {
                self.ordered.remove(&(OrderedFloat(score), member));
                true
            }
            None => false,
        }
    }

    fn score(&self, member: &[u8]) -> Option<f64> {
        self.scores.get(member).copied()
    }

    fn rank(&self, member: &[u8]) -> Option<usize> {
        let (member, score) = self.scores.get_key_value(member)?;
        Some(
            self.ordered
                .range(..(OrderedFloat(*score), member.clone()))
                .count(),
        )
    }

    fn len(&self) -> usize {
        self.scores.len()
    }

    fn in_score_range(&self, min: f64, max: f64) -> impl Iterator<Item = ScoredMember> + '_ {
        self.ordered
            .iter()
            .filter(move |(s, _)| s.0 >= min && s.0 <= max)
            .map(|(s, m)| ScoredMember::new(m.clone(), s.0))
    }
}

#[derive(Debug, Clone)]
enum Stored {
    Str(Vec<u8>),
    List(VecDeque<Bytes>),
    Set(HashSet<Bytes>),
    SortedSet(SortedSet),
}

impl Stored {
    fn kind(&self) -> KeyType {
        match self {
            Self::Str(_) => KeyType::String,
            Self::List(_) => KeyType::List,
            Self::Set(_) => KeyType::Set,
            Self::SortedSet(_) => KeyType::SortedSet,
        }
    }

    /// Collections that become empty are removed from the keyspace.
    fn is_empty_collection(&self) -> bool {
        match self {
            Self::Str(_) => false,
            Self::List(l) => l.is_empty(),
            Self::Set(s) => s.is_empty(),
            Self::SortedSet(z) => z.len() == 0,
        }
    }

    fn as_str(&self) -> Result<&Vec<u8>, BackendError> {
        match self {
            Self::Str(s) => Ok(s),
            _ => Err(BackendError::WrongType),
        }
    }

    fn as_str_mut(&mut self) -> Result<&mut Vec<u8>, BackendError> {
        match self {
            Self::Str(s) => Ok(s),
            _ => Err(BackendError::WrongType),
        }
    }

    fn as_list(&self) -> Result<&VecDeque<Bytes>, BackendError> {
        match self {
            Self::List(l) => Ok(l),
            _ => Err(BackendError::WrongType),
        }
    }

    fn as_list_mut(&mut self) -> Result<&mut VecDeque<Bytes>, BackendError> {
        match self {
            Self::List(l) => Ok(l),
            _ => Err(BackendError::WrongType),
        }
    }

    fn as_set(&self) -> Result<&HashSet<Bytes>, BackendError> {
        match self {
            Self::Set(s) => Ok(s),
            _ => Err(BackendError::WrongType),
        }
    }

    fn as_set_mut(&mut self) -> Result<&mut HashSet<Bytes>, BackendError> {
        match self {
            Self::Set(s) => Ok(s),
            _ => Err(BackendError::WrongType),
        }
    }

    fn as_zset(&self) -> Result<&SortedSet, BackendError> {
        match self {
            Self::SortedSet(z) => Ok(z),
            _ => Err(BackendError::WrongType),
        }
    }

    fn as_zset_mut(&mut self) -> Result<&mut SortedSet, BackendError> {
        match self {
            Self::SortedSet(z) => Ok(z),
            _ => Err(BackendError::WrongType),
        }
    }
}

#[derive(Debug, Clone)]
struct Slot {
    value: Stored,
    expires_at: Option<SystemTime>,
}

impl Slot {
    fn new(value: Stored) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: SystemTime) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

fn new_list() -> Stored {
    Stored::List(VecDeque::new())
}

fn new_set() -> Stored {
    Stored::Set(HashSet::new())
}

fn new_zset() -> Stored {
    Stored::SortedSet(SortedSet::default())
}

// ---------------------------------------------------------------------------
// Index helpers
// ---------------------------------------------------------------------------

/// Resolves an inclusive `[start, stop]` range with negative offsets counted
/// from the end. Returns `None` for an empty range.
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss, clippy::cast_possible_truncation)]
fn resolve_range(start: i64, stop: i64, len: usize) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

/// Resolves a single possibly-negative index.
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss, clippy::cast_possible_truncation)]
fn resolve_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let index = if index < 0 { len + index } else { index };
    (0..len).contains(&index).then_some(index as usize)
}

fn parse_int(bytes: &[u8]) -> Result<i64, BackendError> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(BackendError::NotAnInteger)
}

fn parse_float(bytes: &[u8]) -> Result<f64, BackendError> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|f| !f.is_nan())
        .ok_or(BackendError::NotAFloat)
}

fn check_score(score: f64) -> Result<f64, BackendError> {
    if score.is_nan() {
        Err(BackendError::NotAFloat)
    } else {
        Ok(score)
    }
}

/// `base + seconds`, or `InvalidExpireTime` when the sum is not representable.
fn expiry_after(base: SystemTime, seconds: u64) -> Result<SystemTime, BackendError> {
    base.checked_add(Duration::from_secs(seconds))
        .ok_or(BackendError::InvalidExpireTime)
}

fn unix_seconds(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs())
}

// ---------------------------------------------------------------------------
// MemoryBackend
// ---------------------------------------------------------------------------

/// In-memory key-value store for one node.
///
/// All operations go through a [`DashMap`], so concurrent callers contend
/// only on the shard holding the key they touch.
pub struct MemoryBackend {
    address: NodeAddress,
    entries: DashMap<Bytes, Slot>,
    available: AtomicBool,
    commands: AtomicU64,
    last_save: Mutex<SystemTime>,
    watched: Mutex<HashSet<Bytes>>,
    started_at: SystemTime,
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("address", &self.address)
            .field("keys", &self.entries.len())
            .field("available", &self.available.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl MemoryBackend {
    /// Creates an empty, available backend for `address`.
    #[must_use]
    pub fn new(address: NodeAddress) -> Self {
        let now = SystemTime::now();
        Self {
            address,
            entries: DashMap::new(),
            available: AtomicBool::new(true),
            commands: AtomicU64::new(0),
            last_save: Mutex::new(now),
            watched: Mutex::new(HashSet::new()),
            started_at: now,
        }
    }

    /// Simulates an outage (`false`) or recovery (`true`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    /// Number of commands this backend has accepted, failed ones included.
    #[must_use]
    pub fn command_count(&self) -> u64 {
        self.commands.load(Ordering::Relaxed)
    }

    /// Keys currently registered through `watch`.
    #[must_use]
    pub fn watched_keys(&self) -> Vec<Bytes> {
        let mut keys: Vec<Bytes> = self.watched.lock().iter().cloned().collect();
        keys.sort();
        keys
    }

    fn check(&self) -> Result<(), BackendError> {
        self.commands.fetch_add(1, Ordering::Relaxed);
        if self.is_available() {
            Ok(())
        } else {
            Err(BackendError::Connection(format!(
                "{} is unavailable",
                self.address
            )))
        }
    }

    fn purge_if_expired(&self, key: &[u8]) {
        let now = SystemTime::now();
        self.entries.remove_if(key, |_, slot| slot.is_expired(now));
    }

    /// Runs `f` against the live value at `key`, if any.
    fn read<T>(
        &self,
        key: &[u8],
        f: impl FnOnce(&Stored) -> Result<T, BackendError>,
    ) -> Result<Option<T>, BackendError> {
        self.check()?;
        self.purge_if_expired(key);
        match self.entries.get(key) {
            Some(slot) => f(&slot.value).map(Some),
            None => Ok(None),
        }
    }

    /// Runs `f` against the value at `key`, creating it with `init` when given
    /// and missing. Collections left empty are removed afterwards.
    fn write<T>(
        &self,
        key: &[u8],
        init: Option<fn() -> Stored>,
        f: impl FnOnce(&mut Stored) -> Result<T, BackendError>,
    ) -> Result<Option<T>, BackendError> {
        self.check()?;
        self.purge_if_expired(key);
        let result = match init {
            Some(init) => {
                let mut slot = self
                    .entries
                    .entry(Bytes::copy_from_slice(key))
                    .or_insert_with(|| Slot::new(init()));
                f(&mut slot.value).map(Some)
            }
            None => match self.entries.get_mut(key) {
                Some(mut slot) => f(&mut slot.value).map(Some),
                None => Ok(None),
            },
        };
        self.entries
            .remove_if(key, |_, slot| slot.value.is_empty_collection());
        result
    }

    /// Replaces the value at `key`, clearing any expiry.
    fn put(&self, key: &[u8], value: Stored, expires_at: Option<SystemTime>) {
        self.entries.insert(
            Bytes::copy_from_slice(key),
            Slot { value, expires_at },
        );
    }

    fn set_expiry(&self, key: &[u8], at: SystemTime) -> Result<bool, BackendError> {
        self.check()?;
        self.purge_if_expired(key);
        let updated = match self.entries.get_mut(key) {
            Some(mut slot) => {
                slot.expires_at = Some(at);
                true
            }
            None => false,
        };
        self.purge_if_expired(key);
        Ok(updated)
    }

    fn live_keys(&self) -> Vec<Bytes> {
        let now = SystemTime::now();
        self.entries
            .iter()
            .filter(|e| !e.value().is_expired(now))
            .map(|e| e.key().clone())
            .collect()
    }

    fn push(
        &self,
        key: &[u8],
        value: &[u8],
        front: bool,
        create: bool,
    ) -> Result<usize, BackendError> {
        let init = if create { Some(new_list as fn() -> Stored) } else { None };
        let len = self.write(key, init, |v| {
            let list = v.as_list_mut()?;
            let value = Bytes::copy_from_slice(value);
            if front {
                list.push_front(value);
            } else {
                list.push_back(value);
            }
            Ok(list.len())
        })?;
        Ok(len.unwrap_or(0))
    }

    fn pop(&self, key: &[u8], front: bool) -> Result<Option<Bytes>, BackendError> {
        let popped = self.write(key, None, |v| {
            let list = v.as_list_mut()?;
            Ok(if front { list.pop_front() } else { list.pop_back() })
        })?;
        Ok(popped.flatten())
    }

    fn zrange_by_rank(
        &self,
        key: &[u8],
        start: i64,
        stop: i64,
        order: Order,
    ) -> Result<Vec<ScoredMember>, BackendError> {
        let members = self.read(key, |v| {
            let zset = v.as_zset()?;
            let Some((start, stop)) = resolve_range(start, stop, zset.len()) else {
                return Ok(Vec::new());
            };
            let take = stop - start + 1;
            let to_member = |(s, m): &(OrderedFloat<f64>, Bytes)| ScoredMember::new(m.clone(), s.0);
            Ok(match order {
                Order::Asc => zset.ordered.iter().skip(start).take(take).map(to_member).collect(),
                Order::Desc => zset
                    .ordered
                    .iter()
                    .rev()
                    .skip(start)
                    .take(take)
                    .map(to_member)
                    .collect(),
            })
        })?;
        Ok(members.unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Command families
// ---------------------------------------------------------------------------

#[async_trait]
impl KeyCommands for MemoryBackend {
    async fn exists(&self, key: &[u8]) -> Result<bool, BackendError> {
        Ok(self.read(key, |_| Ok(()))?.is_some())
    }

    async fn delete(&self, key: &[u8]) -> Result<bool, BackendError> {
        self.check()?;
        self.purge_if_expired(key);
        Ok(self.entries.remove(key).is_some())
    }

    async fn expire(&self, key: &[u8], seconds: u64) -> Result<bool, BackendError> {
        self.set_expiry(key, expiry_after(SystemTime::now(), seconds)?)
    }

    async fn expire_at(&self, key: &[u8], unix_seconds: u64) -> Result<bool, BackendError> {
        self.set_expiry(key, expiry_after(UNIX_EPOCH, unix_seconds)?)
    }

    async fn ttl(&self, key: &[u8]) -> Result<Ttl, BackendError> {
        self.check()?;
        self.purge_if_expired(key);
        let Some(slot) = self.entries.get(key) else {
            return Ok(Ttl::Missing);
        };
        Ok(match slot.expires_at {
            None => Ttl::Persistent,
            Some(at) => {
                let remaining = at
                    .duration_since(SystemTime::now())
                    .unwrap_or(Duration::ZERO);
                let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
                Ttl::Seconds(secs)
            }
        })
    }

    async fn key_type(&self, key: &[u8]) -> Result<KeyType, BackendError> {
        Ok(self.read(key, |v| Ok(v.kind()))?.unwrap_or(KeyType::None))
    }

    async fn watch(&self, key: &[u8]) -> Result<(), BackendError> {
        self.check()?;
        self.watched.lock().insert(Bytes::copy_from_slice(key));
        Ok(())
    }

    async fn unwatch(&self) -> Result<(), BackendError> {
        self.check()?;
        self.watched.lock().clear();
        Ok(())
    }

    async fn sort(&self, key: &[u8], options: SortOptions) -> Result<Vec<Bytes>, BackendError> {
        let elements = self.read(key, |v| {
            Ok(match v {
                Stored::List(l) => l.iter().cloned().collect::<Vec<_>>(),
                Stored::Set(s) => s.iter().cloned().collect(),
                Stored::SortedSet(z) => z.ordered.iter().map(|(_, m)| m.clone()).collect(),
                Stored::Str(_) => return Err(BackendError::WrongType),
            })
        })?;
        let mut elements = elements.unwrap_or_default();

        if options.alpha {
            elements.sort();
        } else {
            let mut keyed = elements
                .into_iter()
                .map(|e| parse_float(&e).map(|f| (OrderedFloat(f), e)))
                .collect::<Result<Vec<_>, _>>()?;
            keyed.sort();
            elements = keyed.into_iter().map(|(_, e)| e).collect();
        }
        if options.order == Order::Desc {
            elements.reverse();
        }
        if let Some((offset, count)) = options.limit {
            elements = elements.into_iter().skip(offset).take(count).collect();
        }
        Ok(elements)
    }
}

#[async_trait]
impl StringCommands for MemoryBackend {
    async fn get(&self, key: &[u8]) -> Result<Option<Bytes>, BackendError> {
        self.read(key, |v| Ok(Bytes::copy_from_slice(v.as_str()?)))
    }

    async fn set(&self, key: &[u8], value: &[u8]) -> Result<(), BackendError> {
        self.check()?;
        self.put(key, Stored::Str(value.to_vec()), None);
        Ok(())
    }

    async fn setex(&self, key: &[u8], value: &[u8], seconds: u64) -> Result<(), BackendError> {
        self.check()?;
        let at = expiry_after(SystemTime::now(), seconds)?;
        self.put(key, Stored::Str(value.to_vec()), Some(at));
        Ok(())
    }

    async fn getset(&self, key: &[u8], value: &[u8]) -> Result<Option<Bytes>, BackendError> {
        let previous = self.read(key, |v| Ok(Bytes::copy_from_slice(v.as_str()?)))?;
        self.put(key, Stored::Str(value.to_vec()), None);
        Ok(previous)
    }

    async fn append(&self, key: &[u8], value: &[u8]) -> Result<usize, BackendError> {
        let len = self.write(key, Some(|| Stored::Str(Vec::new())), |v| {
            let s = v.as_str_mut()?;
            s.extend_from_slice(value);
            Ok(s.len())
        })?;
        Ok(len.unwrap_or(0))
    }

    async fn incr_by(&self, key: &[u8], amount: i64) -> Result<i64, BackendError> {
        let value = self.write(key, Some(|| Stored::Str(b"0".to_vec())), |v| {
            let s = v.as_str_mut()?;
            let next = parse_int(s)?
                .checked_add(amount)
                .ok_or(BackendError::NotAnInteger)?;
            *s = next.to_string().into_bytes();
            Ok(next)
        })?;
        value.ok_or(BackendError::NoSuchKey)
    }

    async fn decr_by(&self, key: &[u8], amount: i64) -> Result<i64, BackendError> {
        let negated = amount.checked_neg().ok_or(BackendError::NotAnInteger)?;
        self.incr_by(key, negated).await
    }

    async fn substr(&self, key: &[u8], start: i64, end: i64) -> Result<Bytes, BackendError> {
        let slice = self.read(key, |v| {
            let s = v.as_str()?;
            Ok(resolve_range(start, end, s.len())
                .map(|(a, b)| Bytes::copy_from_slice(&s[a..=b]))
                .unwrap_or_default())
        })?;
        Ok(slice.unwrap_or_default())
    }
}

#[async_trait]
impl ListCommands for MemoryBackend {
    async fn lpush(&self, key: &[u8], value: &[u8]) -> Result<usize, BackendError> {
        self.push(key, value, true, true)
    }

    async fn rpush(&self, key: &[u8], value: &[u8]) -> Result<usize, BackendError> {
        self.push(key, value, false, true)
    }

    async fn lpushx(&self, key: &[u8], value: &[u8]) -> Result<usize, BackendError> {
        self.push(key, value, true, false)
    }

    async fn rpushx(&self, key: &[u8], value: &[u8]) -> Result<usize, BackendError> {
        self.push(key, value, false, false)
    }

    async fn lpop(&self, key: &[u8]) -> Result<Option<Bytes>, BackendError> {
        self.pop(key, true)
    }

    async fn rpop(&self, key: &[u8]) -> Result<Option<Bytes>, BackendError> {
        self.pop(key, false)
    }

    async fn llen(&self, key: &[u8]) -> Result<usize, BackendError> {
        Ok(self.read(key, |v| Ok(v.as_list()?.len()))?.unwrap_or(0))
    }

    async fn lindex(&self, key: &[u8], index: i64) -> Result<Option<Bytes>, BackendError> {
        let found = self.read(key, |v| {
            let list = v.as_list()?;
            Ok(resolve_index(index, list.len()).map(|i| list[i].clone()))
        })?;
        Ok(found.flatten())
    }

    #[allow(clippy::cast_possible_wrap)]
    async fn linsert(
        &self,
        key: &[u8],
        position: InsertPosition,
        pivot: &[u8],
        value: &[u8],
    ) -> Result<i64, BackendError> {
        let len = self.write(key, None, |v| {
            let list = v.as_list_mut()?;
            let Some(at) = list.iter().position(|e| e.as_ref() == pivot) else {
                return Ok(-1);
            };
            let at = match position {
                InsertPosition::Before => at,
                InsertPosition::After => at + 1,
            };
            list.insert(at, Bytes::copy_from_slice(value));
            Ok(list.len() as i64)
        })?;
        Ok(len.unwrap_or(0))
    }

    async fn lrange(&self, key: &[u8], start: i64, stop: i64) -> Result<Vec<Bytes>, BackendError> {
        let items = self.read(key, |v| {
            let list = v.as_list()?;
            Ok(resolve_range(start, stop, list.len())
                .map(|(a, b)| list.range(a..=b).cloned().collect())
                .unwrap_or_default())
        })?;
        Ok(items.unwrap_or_default())
    }

    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    async fn lrem(&self, key: &[u8], count: i64, value: &[u8]) -> Result<usize, BackendError> {
        let removed = self.write(key, None, |v| {
            let list = v.as_list_mut()?;
            let limit = if count == 0 { usize::MAX } else { count.unsigned_abs() as usize };
            let mut removed = 0;
            if count >= 0 {
                let mut i = 0;
                while i < list.len() && removed < limit {
                    if list[i].as_ref() == value {
                        list.remove(i);
                        removed += 1;
                    } else {
                        i += 1;
                    }
                }
            } else {
                let mut i = list.len();
                while i > 0 && removed < limit {
                    i -= 1;
                    if list[i].as_ref() == value {
                        list.remove(i);
                        removed += 1;
                    }
                }
            }
            Ok(removed)
        })?;
        Ok(removed.unwrap_or(0))
    }

    async fn lset(&self, key: &[u8], index: i64, value: &[u8]) -> Result<(), BackendError> {
        self.write(key, None, |v| {
            let list = v.as_list_mut()?;
            let i = resolve_index(index, list.len()).ok_or(BackendError::IndexOutOfRange)?;
            list[i] = Bytes::copy_from_slice(value);
            Ok(())
        })?
        .ok_or(BackendError::NoSuchKey)
    }

    async fn ltrim(&self, key: &[u8], start: i64, stop: i64) -> Result<(), BackendError> {
        self.write(key, None, |v| {
            let list = v.as_list_mut()?;
            match resolve_range(start, stop, list.len()) {
                Some((a, b)) => {
                    list.truncate(b + 1);
                    list.drain(..a);
                }
                None => list.clear(),
            }
            Ok(())
        })?;
        Ok(())
    }
}

#[async_trait]
impl SetCommands for MemoryBackend {
    async fn sadd(&self, key: &[u8], member: &[u8]) -> Result<bool, BackendError> {
        let added = self.write(key, Some(new_set), |v| {
            Ok(v.as_set_mut()?.insert(Bytes::copy_from_slice(member)))
        })?;
        Ok(added.unwrap_or(false))
    }

    async fn srem(&self, key: &[u8], member: &[u8]) -> Result<bool, BackendError> {
        let removed = self.write(key, None, |v| Ok(v.as_set_mut()?.remove(member)))?;
        Ok(removed.unwrap_or(false))
    }

    async fn scard(&self, key: &[u8]) -> Result<usize, BackendError> {
        Ok(self.read(key, |v| Ok(v.as_set()?.len()))?.unwrap_or(0))
    }

    async fn sismember(&self, key: &[u8], member: &[u8]) -> Result<bool, BackendError> {
        Ok(self
            .read(key, |v| Ok(v.as_set()?.contains(member)))?
            .unwrap_or(false))
    }

    async fn smembers(&self, key: &[u8]) -> Result<Vec<Bytes>, BackendError> {
        let members = self.read(key, |v| {
            let mut members: Vec<Bytes> = v.as_set()?.iter().cloned().collect();
            members.sort();
            Ok(members)
        })?;
        Ok(members.unwrap_or_default())
    }

    async fn spop(&self, key: &[u8]) -> Result<Option<Bytes>, BackendError> {
        let popped = self.write(key, None, |v| {
            let set = v.as_set_mut()?;
            if set.is_empty() {
                return Ok(None);
            }
            let nth = rand::rng().random_range(0..set.len());
            let member = set.iter().nth(nth).cloned();
            if let Some(m) = &member {
                set.remove(m);
            }
            Ok(member)
        })?;
        Ok(popped.flatten())
    }

    async fn srandmember(&self, key: &[u8]) -> Result<Option<Bytes>, BackendError> {
        let picked = self.read(key, |v| {
            let set = v.as_set()?;
            if set.is_empty() {
                return Ok(None);
            }
            let nth = rand::rng().random_range(0..set.len());
            Ok(set.iter().nth(nth).cloned())
        })?;
        Ok(picked.flatten())
    }
}

#[async_trait]
impl SortedSetCommands for MemoryBackend {
    async fn zadd(&self, key: &[u8], member: &[u8], score: f64) -> Result<bool, BackendError> {
        let score = check_score(score)?;
        let added = self.write(key, Some(new_zset), |v| {
            Ok(v.as_zset_mut()?.insert(Bytes::copy_from_slice(member), score))
        })?;
        Ok(added.unwrap_or(false))
    }

    async fn zrem(&self, key: &[u8], member: &[u8]) -> Result<bool, BackendError> {
        let removed = self.write(key, None, |v| Ok(v.as_zset_mut()?.remove(member)))?;
        Ok(removed.unwrap_or(false))
    }

    async fn zcard(&self, key: &[u8]) -> Result<usize, BackendError> {
        Ok(self.read(key, |v| Ok(v.as_zset()?.len()))?.unwrap_or(0))
    }

    async fn zcount(&self, key: &[u8], min: f64, max: f64) -> Result<usize, BackendError> {
        Ok(self
            .read(key, |v| Ok(v.as_zset()?.in_score_range(min, max).count()))?
            .unwrap_or(0))
    }

    async fn zincrby(&self, key: &[u8], member: &[u8], amount: f64) -> Result<f64, BackendError> {
        let amount = check_score(amount)?;
        let score = self.write(key, Some(new_zset), |v| {
            let zset = v.as_zset_mut()?;
            let next = check_score(zset.score(member).unwrap_or(0.0) + amount)?;
            zset.insert(Bytes::copy_from_slice(member), next);
            Ok(next)
        })?;
        score.ok_or(BackendError::NoSuchKey)
    }

    async fn zscore(&self, key: &[u8], member: &[u8]) -> Result<Option<f64>, BackendError> {
        Ok(self.read(key, |v| Ok(v.as_zset()?.score(member)))?.flatten())
    }

    async fn zrank(&self, key: &[u8], member: &[u8]) -> Result<Option<usize>, BackendError> {
        Ok(self.read(key, |v| Ok(v.as_zset()?.rank(member)))?.flatten())
    }

    async fn zrevrank(&self, key: &[u8], member: &[u8]) -> Result<Option<usize>, BackendError> {
        let rank = self.read(key, |v| {
            let zset = v.as_zset()?;
            Ok(zset.rank(member).map(|r| zset.len() - 1 - r))
        })?;
        Ok(rank.flatten())
    }

    async fn zrange(
        &self,
        key: &[u8],
        start: i64,
        stop: i64,
    ) -> Result<Vec<ScoredMember>, BackendError> {
        self.zrange_by_rank(key, start, stop, Order::Asc)
    }

    async fn zrevrange(
        &self,
        key: &[u8],
        start: i64,
        stop: i64,
    ) -> Result<Vec<ScoredMember>, BackendError> {
        self.zrange_by_rank(key, start, stop, Order::Desc)
    }

    async fn zrangebyscore(
        &self,
        key: &[u8],
        min: f64,
        max: f64,
        limit: Option<(usize, usize)>,
    ) -> Result<Vec<ScoredMember>, BackendError> {
        let members = self.read(key, |v| {
            let in_range = v.as_zset()?.in_score_range(min, max);
            Ok(match limit {
                Some((offset, count)) => in_range.skip(offset).take(count).collect(),
                None => in_range.collect(),
            })
        })?;
        Ok(members.unwrap_or_default())
    }

    async fn zremrangebyrank(
        &self,
        key: &[u8],
        start: i64,
        stop: i64,
    ) -> Result<usize, BackendError> {
        let removed = self.write(key, None, |v| {
            let zset = v.as_zset_mut()?;
            let Some((a, b)) = resolve_range(start, stop, zset.len()) else {
                return Ok(0);
            };
            let doomed: Vec<Bytes> = zset
                .ordered
                .iter()
                .skip(a)
                .take(b - a + 1)
                .map(|(_, m)| m.clone())
                .collect();
            for member in &doomed {
                zset.remove(member);
            }
            Ok(doomed.len())
        })?;
        Ok(removed.unwrap_or(0))
    }

    async fn zremrangebyscore(
        &self,
        key: &[u8],
        min: f64,
        max: f64,
    ) -> Result<usize, BackendError> {
        let removed = self.write(key, None, |v| {
            let zset = v.as_zset_mut()?;
            let doomed: Vec<Bytes> = zset.in_score_range(min, max).map(|m| m.member).collect();
            for member in &doomed {
                zset.remove(member);
            }
            Ok(doomed.len())
        })?;
        Ok(removed.unwrap_or(0))
    }
}

#[async_trait]
impl AdminCommands for MemoryBackend {
    async fn ping(&self) -> Result<String, BackendError> {
        self.check()?;
        Ok("PONG".to_string())
    }

    async fn save(&self) -> Result<(), BackendError> {
        self.check()?;
        *self.last_save.lock() = SystemTime::now();
        Ok(())
    }

    async fn bgsave(&self) -> Result<(), BackendError> {
        self.save().await
    }

    async fn bgrewriteaof(&self) -> Result<(), BackendError> {
        self.check()
    }

    async fn dbsize(&self) -> Result<usize, BackendError> {
        self.check()?;
        Ok(self.live_keys().len())
    }

    async fn flushall(&self) -> Result<(), BackendError> {
        self.flushdb().await
    }

    async fn flushdb(&self) -> Result<(), BackendError> {
        self.check()?;
        self.entries.clear();
        Ok(())
    }

    async fn lastsave(&self) -> Result<u64, BackendError> {
        self.check()?;
        Ok(unix_seconds(*self.last_save.lock()))
    }

    async fn info(&self) -> Result<BTreeMap<String, String>, BackendError> {
        self.check()?;
        let uptime = SystemTime::now()
            .duration_since(self.started_at)
            .unwrap_or(Duration::ZERO);
        let mut info = BTreeMap::new();
        info.insert("role".to_string(), "master".to_string());
        info.insert("tcp_port".to_string(), self.address.port.to_string());
        info.insert("db".to_string(), self.address.db.to_string());
        info.insert("keys".to_string(), self.live_keys().len().to_string());
        info.insert("uptime_in_seconds".to_string(), uptime.as_secs().to_string());
        info.insert(
            "total_commands_processed".to_string(),
            self.command_count().to_string(),
        );
        Ok(info)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<Bytes>, BackendError> {
        self.check()?;
        let pattern = KeyPattern::compile(pattern)?;
        let mut keys: Vec<Bytes> = self
            .live_keys()
            .into_iter()
            .filter(|k| pattern.matches(k))
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn randomkey(&self) -> Result<Option<Bytes>, BackendError> {
        self.check()?;
        let keys = self.live_keys();
        if keys.is_empty() {
            return Ok(None);
        }
        let nth = rand::rng().random_range(0..keys.len());
        Ok(keys.into_iter().nth(nth))
    }
}

impl Backend for MemoryBackend {
    fn address(&self) -> &NodeAddress {
        &self.address
    }
}

// ---------------------------------------------------------------------------
// MemoryConnector
// ---------------------------------------------------------------------------

/// [`Connector`] that creates one [`MemoryBackend`] per node address.
///
/// Keeps the created backends so tests can reach a node directly, e.g. to
/// simulate an outage on it.
#[derive(Default)]
pub struct MemoryConnector {
    created: DashMap<NodeAddress, Arc<MemoryBackend>>,
}

impl MemoryConnector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The backend created for `address`, if `connect` has been called for it.
    #[must_use]
    pub fn backend(&self, address: &NodeAddress) -> Option<Arc<MemoryBackend>> {
        self.created.get(address).map(|b| b.value().clone())
    }
}

impl Connector for MemoryConnector {
    fn connect(&self, address: &NodeAddress) -> Result<Arc<dyn Backend>, BackendError> {
        let backend = self
            .created
            .entry(address.clone())
            .or_insert_with(|| Arc::new(MemoryBackend::new(address.clone())))
            .value()
            .clone();
        Ok(backend)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> MemoryBackend {
        MemoryBackend::new(NodeAddress::new("localhost", 6379, 0))
    }

    fn members(items: &[&str]) -> Vec<Bytes> {
        items.iter().map(|s| Bytes::copy_from_slice(s.as_bytes())).collect()
    }

    // ---- Range helpers ----

    #[test]
    fn resolve_range_handles_negative_and_clamped_bounds() {
        assert_eq!(resolve_range(0, -1, 5), Some((0, 4)));
        assert_eq!(resolve_range(-2, -1, 5), Some((3, 4)));
        assert_eq!(resolve_range(1, 100, 5), Some((1, 4)));
        assert_eq!(resolve_range(-100, 1, 5), Some((0, 1)));
        assert_eq!(resolve_range(3, 1, 5), None);
        assert_eq!(resolve_range(5, 10, 5), None);
        assert_eq!(resolve_range(0, -1, 0), None);
    }

    #[test]
    fn resolve_index_handles_negative() {
        assert_eq!(resolve_index(0, 3), Some(0));
        assert_eq!(resolve_index(-1, 3), Some(2));
        assert_eq!(resolve_index(3, 3), None);
        assert_eq!(resolve_index(-4, 3), None);
    }

    // ---- Strings ----

    #[tokio::test]
    async fn set_get_delete() {
        let b = backend();
        assert_eq!(b.get(b"k").await.unwrap(), None);
        b.set(b"k", b"v").await.unwrap();
        assert_eq!(b.get(b"k").await.unwrap(), Some(Bytes::from_static(b"v")));
        assert!(b.exists(b"k").await.unwrap());
        assert!(b.delete(b"k").await.unwrap());
        assert!(!b.delete(b"k").await.unwrap());
        assert!(!b.exists(b"k").await.unwrap());
    }

    #[tokio::test]
    async fn binary_keys_and_values() {
        let b = backend();
        b.set(b"\x00\xff", b"\xfe\x00").await.unwrap();
        assert_eq!(
            b.get(b"\x00\xff").await.unwrap(),
            Some(Bytes::from_static(b"\xfe\x00"))
        );
    }

    #[tokio::test]
    async fn incr_and_decr() {
        let b = backend();
        assert_eq!(b.incr_by(b"n", 1).await.unwrap(), 1);
        assert_eq!(b.incr_by(b"n", 10).await.unwrap(), 11);
        assert_eq!(b.decr_by(b"n", 3).await.unwrap(), 8);
        assert_eq!(b.decr_by(b"fresh", 2).await.unwrap(), -2);

        b.set(b"s", b"abc").await.unwrap();
        assert!(matches!(
            b.incr_by(b"s", 1).await.unwrap_err(),
            BackendError::NotAnInteger
        ));

        b.set(b"max", i64::MAX.to_string().as_bytes()).await.unwrap();
        assert!(matches!(
            b.incr_by(b"max", 1).await.unwrap_err(),
            BackendError::NotAnInteger
        ));
    }

    #[tokio::test]
    async fn append_getset_substr() {
        let b = backend();
        assert_eq!(b.append(b"k", b"Hello").await.unwrap(), 5);
        assert_eq!(b.append(b"k", b" World").await.unwrap(), 11);
        assert_eq!(b.substr(b"k", 0, 4).await.unwrap(), Bytes::from_static(b"Hello"));
        assert_eq!(b.substr(b"k", -5, -1).await.unwrap(), Bytes::from_static(b"World"));
        assert_eq!(b.substr(b"k", 20, 30).await.unwrap(), Bytes::new());
        assert_eq!(b.substr(b"missing", 0, -1).await.unwrap(), Bytes::new());

        let old = b.getset(b"k", b"new").await.unwrap();
        assert_eq!(old, Some(Bytes::from_static(b"Hello World")));
        assert_eq!(b.getset(b"other", b"x").await.unwrap(), None);
        assert_eq!(b.get(b"other").await.unwrap(), Some(Bytes::from_static(b"x")));
    }

    #[tokio::test]
    async fn wrong_type_is_reported() {
        let b = backend();
        b.lpush(b"list", b"a").await.unwrap();
        assert!(matches!(b.get(b"list").await.unwrap_err(), BackendError::WrongType));
        assert!(matches!(
            b.sadd(b"list", b"a").await.unwrap_err(),
            BackendError::WrongType
        ));
        assert!(matches!(
            b.getset(b"list", b"x").await.unwrap_err(),
            BackendError::WrongType
        ));
        // A failed getset leaves the list untouched.
        assert_eq!(b.llen(b"list").await.unwrap(), 1);
    }

    // ---- Expiry ----

    #[tokio::test]
    async fn ttl_states() {
        let b = backend();
        assert_eq!(b.ttl(b"k").await.unwrap(), Ttl::Missing);
        b.set(b"k", b"v").await.unwrap();
        assert_eq!(b.ttl(b"k").await.unwrap(), Ttl::Persistent);
        assert!(b.expire(b"k", 100).await.unwrap());
        assert!(matches!(b.ttl(b"k").await.unwrap(), Ttl::Seconds(s) if (99..=100).contains(&s)));

        // set clears the expiry
        b.set(b"k", b"v2").await.unwrap();
        assert_eq!(b.ttl(b"k").await.unwrap(), Ttl::Persistent);

        b.setex(b"e", b"v", 50).await.unwrap();
        assert!(matches!(b.ttl(b"e").await.unwrap(), Ttl::Seconds(s) if (49..=50).contains(&s)));
    }

    #[tokio::test]
    async fn expired_keys_disappear() {
        let b = backend();
        b.set(b"k", b"v").await.unwrap();
        assert!(b.expire_at(b"k", 1).await.unwrap());
        assert!(!b.exists(b"k").await.unwrap());
        assert_eq!(b.get(b"k").await.unwrap(), None);
        assert_eq!(b.dbsize().await.unwrap(), 0);

        b.set(b"z", b"v").await.unwrap();
        assert!(b.expire(b"z", 0).await.unwrap());
        assert_eq!(b.ttl(b"z").await.unwrap(), Ttl::Missing);
    }

    #[tokio::test]
    async fn out_of_range_expiry_is_rejected() {
        let b = backend();
        b.set(b"k", b"v").await.unwrap();
        assert!(matches!(
            b.expire(b"k", u64::MAX).await.unwrap_err(),
            BackendError::InvalidExpireTime
        ));
        assert!(matches!(
            b.expire_at(b"k", u64::MAX).await.unwrap_err(),
            BackendError::InvalidExpireTime
        ));
        assert!(matches!(
            b.setex(b"k", b"other", u64::MAX).await.unwrap_err(),
            BackendError::InvalidExpireTime
        ));
        // Rejected calls leave the key and its lifetime alone.
        assert_eq!(b.get(b"k").await.unwrap(), Some(Bytes::from_static(b"v")));
        assert_eq!(b.ttl(b"k").await.unwrap(), Ttl::Persistent);
    }

    #[tokio::test]
    async fn expire_on_missing_key_returns_false() {
        let b = backend();
        assert!(!b.expire(b"nope", 10).await.unwrap());
        assert!(!b.expire_at(b"nope", 4_000_000_000).await.unwrap());
    }

    // ---- Key metadata ----

    #[tokio::test]
    async fn key_type_reports_kind() {
        let b = backend();
        b.set(b"s", b"v").await.unwrap();
        b.rpush(b"l", b"v").await.unwrap();
        b.sadd(b"set", b"v").await.unwrap();
        b.zadd(b"z", b"v", 1.0).await.unwrap();
        assert_eq!(b.key_type(b"s").await.unwrap(), KeyType::String);
        assert_eq!(b.key_type(b"l").await.unwrap(), KeyType::List);
        assert_eq!(b.key_type(b"set").await.unwrap(), KeyType::Set);
        assert_eq!(b.key_type(b"z").await.unwrap(), KeyType::SortedSet);
        assert_eq!(b.key_type(b"none").await.unwrap(), KeyType::None);
    }

    #[tokio::test]
    async fn watch_and_unwatch() {
        let b = backend();
        b.watch(b"a").await.unwrap();
        b.watch(b"b").await.unwrap();
        assert_eq!(b.watched_keys(), members(&["a", "b"]));
        b.unwatch().await.unwrap();
        assert!(b.watched_keys().is_empty());
    }

    #[tokio::test]
    async fn sort_numeric_alpha_desc_limit() {
        let b = backend();
        for v in ["10", "2", "33", "1"] {
            b.rpush(b"nums", v.as_bytes()).await.unwrap();
        }
        assert_eq!(
            b.sort(b"nums", SortOptions::default()).await.unwrap(),
            members(&["1", "2", "10", "33"])
        );
        assert_eq!(
            b.sort(
                b"nums",
                SortOptions {
                    alpha: true,
                    ..SortOptions::default()
                }
            )
            .await
            .unwrap(),
            members(&["1", "10", "2", "33"])
        );
        assert_eq!(
            b.sort(
                b"nums",
                SortOptions {
                    order: Order::Desc,
                    limit: Some((1, 2)),
                    alpha: false,
                }
            )
            .await
            .unwrap(),
            members(&["10", "2"])
        );

        b.rpush(b"words", b"pear").await.unwrap();
        assert!(matches!(
            b.sort(b"words", SortOptions::default()).await.unwrap_err(),
            BackendError::NotAFloat
        ));
        assert!(b.sort(b"missing", SortOptions::default()).await.unwrap().is_empty());
    }

    // ---- Lists ----

    #[tokio::test]
    async fn push_pop_and_len() {
        let b = backend();
        assert_eq!(b.lpushx(b"l", b"x").await.unwrap(), 0);
        assert!(!b.exists(b"l").await.unwrap());

        assert_eq!(b.rpush(b"l", b"b").await.unwrap(), 1);
        assert_eq!(b.lpush(b"l", b"a").await.unwrap(), 2);
        assert_eq!(b.rpushx(b"l", b"c").await.unwrap(), 3);
        assert_eq!(b.lrange(b"l", 0, -1).await.unwrap(), members(&["a", "b", "c"]));

        assert_eq!(b.lpop(b"l").await.unwrap(), Some(Bytes::from_static(b"a")));
        assert_eq!(b.rpop(b"l").await.unwrap(), Some(Bytes::from_static(b"c")));
        assert_eq!(b.llen(b"l").await.unwrap(), 1);
        assert_eq!(b.rpop(b"l").await.unwrap(), Some(Bytes::from_static(b"b")));
        // Empty lists vanish.
        assert!(!b.exists(b"l").await.unwrap());
        assert_eq!(b.lpop(b"l").await.unwrap(), None);
    }

    #[tokio::test]
    async fn lindex_lset_linsert() {
        let b = backend();
        for v in ["a", "b", "c"] {
            b.rpush(b"l", v.as_bytes()).await.unwrap();
        }
        assert_eq!(b.lindex(b"l", -1).await.unwrap(), Some(Bytes::from_static(b"c")));
        assert_eq!(b.lindex(b"l", 5).await.unwrap(), None);

        b.lset(b"l", 1, b"B").await.unwrap();
        assert_eq!(b.lindex(b"l", 1).await.unwrap(), Some(Bytes::from_static(b"B")));
        assert!(matches!(
            b.lset(b"l", 9, b"x").await.unwrap_err(),
            BackendError::IndexOutOfRange
        ));
        assert!(matches!(
            b.lset(b"missing", 0, b"x").await.unwrap_err(),
            BackendError::NoSuchKey
        ));

        assert_eq!(
            b.linsert(b"l", InsertPosition::Before, b"B", b"a2").await.unwrap(),
            4
        );
        assert_eq!(
            b.linsert(b"l", InsertPosition::After, b"c", b"d").await.unwrap(),
            5
        );
        assert_eq!(
            b.linsert(b"l", InsertPosition::After, b"zz", b"d").await.unwrap(),
            -1
        );
        assert_eq!(
            b.linsert(b"missing", InsertPosition::After, b"a", b"d").await.unwrap(),
            0
        );
        assert_eq!(
            b.lrange(b"l", 0, -1).await.unwrap(),
            members(&["a", "a2", "B", "c", "d"])
        );
    }

    #[tokio::test]
    async fn lrem_directions() {
        let b = backend();
        for v in ["x", "a", "x", "b", "x"] {
            b.rpush(b"l", v.as_bytes()).await.unwrap();
        }
        assert_eq!(b.lrem(b"l", 1, b"x").await.unwrap(), 1);
        assert_eq!(b.lrange(b"l", 0, -1).await.unwrap(), members(&["a", "x", "b", "x"]));
        assert_eq!(b.lrem(b"l", -1, b"x").await.unwrap(), 1);
        assert_eq!(b.lrange(b"l", 0, -1).await.unwrap(), members(&["a", "x", "b"]));
        assert_eq!(b.lrem(b"l", 0, b"x").await.unwrap(), 1);
        assert_eq!(b.lrange(b"l", 0, -1).await.unwrap(), members(&["a", "b"]));
    }

    #[tokio::test]
    async fn ltrim_keeps_window() {
        let b = backend();
        for v in ["a", "b", "c", "d", "e"] {
            b.rpush(b"l", v.as_bytes()).await.unwrap();
        }
        b.ltrim(b"l", 1, -2).await.unwrap();
        assert_eq!(b.lrange(b"l", 0, -1).await.unwrap(), members(&["b", "c", "d"]));
        b.ltrim(b"l", 5, 10).await.unwrap();
        assert!(!b.exists(b"l").await.unwrap());
    }

    // ---- Sets ----

    #[tokio::test]
    async fn set_membership() {
        let b = backend();
        assert!(b.sadd(b"s", b"a").await.unwrap());
        assert!(!b.sadd(b"s", b"a").await.unwrap());
        assert!(b.sadd(b"s", b"b").await.unwrap());
        assert_eq!(b.scard(b"s").await.unwrap(), 2);
        assert!(b.sismember(b"s", b"a").await.unwrap());
        assert!(!b.sismember(b"s", b"z").await.unwrap());
        assert_eq!(b.smembers(b"s").await.unwrap(), members(&["a", "b"]));

        let random = b.srandmember(b"s").await.unwrap().unwrap();
        assert!(random == "a" || random == "b");
        assert_eq!(b.scard(b"s").await.unwrap(), 2);

        let popped = b.spop(b"s").await.unwrap().unwrap();
        assert!(!b.sismember(b"s", &popped).await.unwrap());
        assert!(b.srem(b"s", if popped == "a" { b"b" } else { b"a" }).await.unwrap());
        assert!(!b.exists(b"s").await.unwrap());
        assert_eq!(b.spop(b"s").await.unwrap(), None);
        assert_eq!(b.srandmember(b"s").await.unwrap(), None);
    }

    // ---- Sorted sets ----

    #[tokio::test]
    async fn sorted_set_basics() {
        let b = backend();
        assert!(b.zadd(b"z", b"one", 1.0).await.unwrap());
        assert!(b.zadd(b"z", b"two", 2.0).await.unwrap());
        assert!(b.zadd(b"z", b"three", 3.0).await.unwrap());
        assert!(!b.zadd(b"z", b"one", 1.5).await.unwrap());

        assert_eq!(b.zcard(b"z").await.unwrap(), 3);
        assert_eq!(b.zscore(b"z", b"one").await.unwrap(), Some(1.5));
        assert_eq!(b.zrank(b"z", b"one").await.unwrap(), Some(0));
        assert_eq!(b.zrank(b"z", b"three").await.unwrap(), Some(2));
        assert_eq!(b.zrevrank(b"z", b"three").await.unwrap(), Some(0));
        assert_eq!(b.zrank(b"z", b"nope").await.unwrap(), None);
        assert_eq!(b.zcount(b"z", 1.5, 2.0).await.unwrap(), 2);
        assert_eq!(
            b.zcount(b"z", f64::NEG_INFINITY, f64::INFINITY).await.unwrap(),
            3
        );

        assert!(matches!(
            b.zadd(b"z", b"nan", f64::NAN).await.unwrap_err(),
            BackendError::NotAFloat
        ));
    }

    #[tokio::test]
    async fn zincrby_adds_to_member_score() {
        let b = backend();
        assert_eq!(b.zincrby(b"z", b"m", 2.5).await.unwrap(), 2.5);
        assert_eq!(b.zincrby(b"z", b"m", -1.0).await.unwrap(), 1.5);
        assert_eq!(b.zscore(b"z", b"m").await.unwrap(), Some(1.5));
        assert!(matches!(
            b.zincrby(b"z", b"m", f64::NAN).await.unwrap_err(),
            BackendError::NotAFloat
        ));
    }

    #[tokio::test]
    async fn sorted_set_ranges() {
        let b = backend();
        for (m, s) in [("a", 1.0), ("b", 2.0), ("c", 3.0), ("d", 4.0)] {
            b.zadd(b"z", m.as_bytes(), s).await.unwrap();
        }
        assert_eq!(
            b.zrange(b"z", 0, 1).await.unwrap(),
            vec![ScoredMember::new("a", 1.0), ScoredMember::new("b", 2.0)]
        );
        assert_eq!(
            b.zrevrange(b"z", 0, 0).await.unwrap(),
            vec![ScoredMember::new("d", 4.0)]
        );
        assert_eq!(
            b.zrangebyscore(b"z", 2.0, 4.0, Some((1, 1))).await.unwrap(),
            vec![ScoredMember::new("c", 3.0)]
        );
        assert_eq!(b.zrangebyscore(b"z", 2.0, 3.0, None).await.unwrap().len(), 2);

        assert_eq!(b.zremrangebyrank(b"z", 0, 0).await.unwrap(), 1);
        assert_eq!(b.zremrangebyscore(b"z", 3.0, 10.0).await.unwrap(), 2);
        assert_eq!(b.zrange(b"z", 0, -1).await.unwrap(), vec![ScoredMember::new("b", 2.0)]);
        assert!(b.zrem(b"z", b"b").await.unwrap());
        assert!(!b.exists(b"z").await.unwrap());
    }

    #[tokio::test]
    async fn equal_scores_order_by_member() {
        let b = backend();
        b.zadd(b"z", b"b", 1.0).await.unwrap();
        b.zadd(b"z", b"a", 1.0).await.unwrap();
        assert_eq!(b.zrank(b"z", b"a").await.unwrap(), Some(0));
        assert_eq!(b.zrank(b"z", b"b").await.unwrap(), Some(1));
    }

    // ---- Admin ----

    #[tokio::test]
    async fn admin_commands() {
        let b = backend();
        assert_eq!(b.ping().await.unwrap(), "PONG");
        b.set(b"key:1", b"v").await.unwrap();
        b.set(b"key:2", b"v").await.unwrap();
        b.set(b"user:1", b"v").await.unwrap();
        assert_eq!(b.dbsize().await.unwrap(), 3);
        assert_eq!(b.keys("key:*").await.unwrap(), members(&["key:1", "key:2"]));
        assert!(b.randomkey().await.unwrap().is_some());

        let before = b.lastsave().await.unwrap();
        b.save().await.unwrap();
        b.bgsave().await.unwrap();
        b.bgrewriteaof().await.unwrap();
        assert!(b.lastsave().await.unwrap() >= before);

        let info = b.info().await.unwrap();
        assert_eq!(info["tcp_port"], "6379");
        assert_eq!(info["keys"], "3");

        b.flushdb().await.unwrap();
        assert_eq!(b.dbsize().await.unwrap(), 0);
        assert_eq!(b.randomkey().await.unwrap(), None);
        b.set(b"x", b"v").await.unwrap();
        b.flushall().await.unwrap();
        assert_eq!(b.dbsize().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn keys_rejects_bad_pattern() {
        let b = backend();
        assert!(matches!(
            b.keys("[abc").await.unwrap_err(),
            BackendError::InvalidPattern(_)
        ));
    }

    // ---- Outage simulation ----

    #[tokio::test]
    async fn unavailable_backend_fails_every_command() {
        let b = backend();
        b.set(b"k", b"v").await.unwrap();
        b.set_available(false);
        assert!(matches!(b.get(b"k").await.unwrap_err(), BackendError::Connection(_)));
        assert!(matches!(b.ping().await.unwrap_err(), BackendError::Connection(_)));
        assert!(matches!(b.delete(b"k").await.unwrap_err(), BackendError::Connection(_)));
        b.set_available(true);
        assert_eq!(b.get(b"k").await.unwrap(), Some(Bytes::from_static(b"v")));
    }

    #[tokio::test]
    async fn command_count_tracks_calls() {
        let b = backend();
        assert_eq!(b.command_count(), 0);
        b.ping().await.unwrap();
        b.set(b"k", b"v").await.unwrap();
        b.set_available(false);
        let _ = b.get(b"k").await;
        assert_eq!(b.command_count(), 3);
    }

    // ---- Connector ----

    #[test]
    fn connector_reuses_backend_per_address() {
        let connector = MemoryConnector::new();
        let addr = NodeAddress::new("localhost", 6379, 0);
        let first = connector.connect(&addr).unwrap();
        let second = connector.connect(&addr).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.address(), &addr);
        assert!(connector.backend(&addr).is_some());
        assert!(connector
            .backend(&NodeAddress::new("localhost", 6380, 0))
            .is_none());
    }
}
