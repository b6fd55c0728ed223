//! On-disk cache entry format and read outcomes

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Wrapper struct for cached data stored on disk
///
/// Serialized as `{"data": ..., "timestamp": <epoch millis>, "ttlMs": <millis>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<T> {
    /// The cached payload
    pub data: T,
    /// Wall-clock time of the store, in milliseconds since the Unix epoch
    pub timestamp: i64,
    /// How long the entry stays fresh, in milliseconds
    pub ttl_ms: u64,
}

impl<T> CacheEntry<T> {
    /// Creates an entry stamped with the current wall-clock time
    pub fn new(data: T, ttl_ms: u64) -> Self {
        Self {
            data,
            timestamp: now_millis(),
            ttl_ms,
        }
    }

    /// Age of the entry at `now_ms`. An entry stamped in the future has age 0.
    pub fn age_ms(&self, now_ms: i64) -> u64 {
        now_ms.saturating_sub(self.timestamp).max(0) as u64
    }

    /// Whether the entry's age exceeds its TTL at `now_ms`
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        self.age_ms(now_ms) > self.ttl_ms
    }

    /// Whether the entry has expired as of now
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_millis())
    }
}

/// Current wall-clock time in epoch milliseconds
pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Outcome of reading a key from the cache
///
/// Every variant except `Hit` is a miss for the caller. The reason is kept so
/// callers can log why data had to be refetched.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    /// A fresh entry was found
    Hit(T),
    /// No file exists for the key
    Missing,
    /// The entry outlived its TTL; its file is removed on a best-effort basis
    Expired,
    /// The file could not be parsed; it is removed on a best-effort basis
    Corrupt(String),
    /// The file exists but could not be read
    Unreadable(String),
}

impl<T> Lookup<T> {
    /// Collapses the outcome into hit-or-miss
    pub fn into_option(self) -> Option<T> {
        match self {
            Lookup::Hit(data) => Some(data),
            _ => None,
        }
    }

    pub fn is_hit(&self) -> bool {
        matches!(self, Lookup::Hit(_))
    }
}

/// Summary of the cache directory contents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Number of `*.json` files in the cache directory
    pub total_files: usize,
    /// Entries that parse and have not expired
    pub valid_entries: usize,
    /// Entries that have expired or fail to parse
    pub expired_entries: usize,
    /// Sum of the file sizes in bytes
    pub total_size_bytes: u64,
}
