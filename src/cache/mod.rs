//! Cache module for storing lesson data to disk
//!
//! This module provides a file-per-key JSON cache with explicit TTL values.
//! Expired or unparsable entries are removed when found and reported as misses,
//! so the cache never needs a dedicated repair path.

mod entry;
mod manager;

pub use entry::{CacheEntry, CacheStats, Lookup};
pub use manager::{CacheError, LocalStorageCache, DEFAULT_TTL_MS};
