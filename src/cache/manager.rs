//! File-per-key JSON cache with TTL expiry
//!
//! Provides `LocalStorageCache`, which stores each key as `<key>.json` inside a
//! cache directory. Expired and unparsable files are deleted when they are
//! found, so a damaged cache heals itself by turning into misses.

use std::io;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tokio::fs;

use super::entry::{now_millis, CacheEntry, CacheStats, Lookup};
use crate::config::CacheConfig;
use crate::data::CacheableData;

/// Default time-to-live for cache entries: 30 minutes
pub const DEFAULT_TTL_MS: u64 = 30 * 60 * 1000;

/// Extension of every cache file
const CACHE_EXTENSION: &str = "json";

/// Errors surfaced by cache writes, deletes and directory scans
#[derive(Debug, Error)]
pub enum CacheError {
    /// The key cannot be used as a file name inside the cache directory
    #[error("Invalid cache key: '{0}'")]
    InvalidKey(String),

    /// A filesystem operation failed
    #[error("Cache I/O failed for {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The payload could not be serialized
    #[error("Failed to serialize cache entry: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CacheError>;

/// Result of inspecting one cache file during a directory scan
struct Inspected {
    size: u64,
    stale: bool,
}

/// Durable cache of `T` values, one JSON file per key
///
/// Files live in `cache_dir` (`~/.cache/lingocache/` on Linux by default).
/// Operations are not coordinated with each other: two concurrent stores for
/// the same key race and the last write wins.
#[derive(Debug)]
pub struct LocalStorageCache<T = CacheableData> {
    /// Directory where cache files are stored
    cache_dir: PathBuf,
    /// TTL applied by `store_default`
    default_ttl_ms: u64,
    _payload: PhantomData<fn() -> T>,
}

impl<T> Clone for LocalStorageCache<T> {
    fn clone(&self) -> Self {
        Self {
            cache_dir: self.cache_dir.clone(),
            default_ttl_ms: self.default_ttl_ms,
            _payload: PhantomData,
        }
    }
}

impl<T> LocalStorageCache<T> {
    /// Creates a cache rooted at `cache_dir` with the 30 minute default TTL
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            default_ttl_ms: DEFAULT_TTL_MS,
            _payload: PhantomData,
        }
    }

    /// Creates a cache in the XDG-compliant cache directory
    ///
    /// Returns `None` if the directory cannot be determined (e.g., no home directory).
    pub fn default_location() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "lingocache")?;
        Some(Self::new(project_dirs.cache_dir()))
    }

    /// Creates a cache from configuration, falling back to the XDG location
    /// when no directory is configured
    pub fn from_config(config: &CacheConfig) -> Option<Self> {
        let cache = match &config.dir {
            Some(dir) => Self::new(dir.clone()),
            None => Self::default_location()?,
        };
        Some(cache.with_default_ttl(config.default_ttl_ms))
    }

    /// Overrides the TTL used by `store_default`
    pub fn with_default_ttl(mut self, ttl_ms: u64) -> Self {
        self.default_ttl_ms = ttl_ms;
        self
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn default_ttl_ms(&self) -> u64 {
        self.default_ttl_ms
    }

    /// Returns the path to the cache file for `key`
    ///
    /// Keys become file names, so anything that could escape the cache
    /// directory is rejected.
    pub fn cache_path(&self, key: &str) -> Result<PathBuf> {
        let invalid = key.is_empty()
            || key.contains(['/', '\\', '\0'])
            || key == "."
            || key == "..";
        if invalid {
            return Err(CacheError::InvalidKey(key.to_string()));
        }
        Ok(self.cache_dir.join(format!("{}.{}", key, CACHE_EXTENSION)))
    }

    async fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.cache_dir)
            .await
            .map_err(|source| CacheError::Io {
                path: self.cache_dir.clone(),
                source,
            })
    }

    /// Removes the file for `key`. Succeeds when there is nothing to remove.
    pub async fn delete(&self, key: &str) -> Result<()> {
        let path = self.cache_path(key)?;
        remove_if_present(&path).await
    }

    /// Removes every `*.json` file in the cache directory
    pub async fn clear(&self) -> Result<()> {
        for path in self.json_files().await? {
            remove_if_present(&path).await?;
        }
        Ok(())
    }

    /// Keys of all cache files, sorted
    pub async fn keys(&self) -> Result<Vec<String>> {
        let keys = self
            .json_files()
            .await?
            .iter()
            .filter_map(|path| path.file_stem())
            .map(|stem| stem.to_string_lossy().into_owned())
            .collect();
        Ok(keys)
    }

    /// Lists the `*.json` files in the cache directory. A missing directory
    /// is an empty cache.
    async fn json_files(&self) -> Result<Vec<PathBuf>> {
        let io_err = |source: io::Error| CacheError::Io {
            path: self.cache_dir.clone(),
            source,
        };

        let mut dir = match fs::read_dir(&self.cache_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(e)),
        };

        let mut files = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(io_err)? {
            let path = entry.path();
            let is_json = path
                .extension()
                .map(|ext| ext == CACHE_EXTENSION)
                .unwrap_or(false);
            if !is_json {
                continue;
            }
            match entry.file_type().await {
                Ok(file_type) if file_type.is_file() => files.push(path),
                _ => {}
            }
        }
        files.sort();
        Ok(files)
    }
}

impl<T: Serialize + DeserializeOwned> LocalStorageCache<T> {
    /// Writes `data` under `key` with the given TTL, replacing any existing entry
    ///
    /// # Returns
    /// * `Ok(())` on success
    /// * `Err` if the key is invalid, serialization fails, or the write fails
    pub async fn store(&self, key: &str, data: &T, ttl_ms: u64) -> Result<()> {
        let path = self.cache_path(key)?;
        let entry = CacheEntry::new(data, ttl_ms);
        let json = serde_json::to_string_pretty(&entry)?;

        self.ensure_dir().await?;
        if let Err(source) = fs::write(&path, json).await {
            return Err(CacheError::Io { path, source });
        }
        Ok(())
    }

    /// Writes `data` under `key` with the cache's default TTL
    pub async fn store_default(&self, key: &str, data: &T) -> Result<()> {
        self.store(key, data, self.default_ttl_ms).await
    }

    /// Reads the payload for `key`
    ///
    /// Returns `None` when the file is missing, unreadable, corrupt or expired.
    /// Corrupt and expired files are deleted. This never reports an error.
    pub async fn retrieve(&self, key: &str) -> Option<T> {
        self.lookup(key).await.into_option()
    }

    /// Reads the payload for `key`, reporting why a miss happened
    pub async fn lookup(&self, key: &str) -> Lookup<T> {
        let Ok(path) = self.cache_path(key) else {
            return Lookup::Missing;
        };

        let content = match fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Lookup::Missing,
            Err(e) => return Lookup::Unreadable(e.to_string()),
        };

        match serde_json::from_slice::<CacheEntry<T>>(&content) {
            Err(e) => {
                let _ = remove_if_present(&path).await;
                Lookup::Corrupt(e.to_string())
            }
            Ok(entry) if entry.is_expired() => {
                let _ = remove_if_present(&path).await;
                Lookup::Expired
            }
            Ok(entry) => Lookup::Hit(entry.data),
        }
    }

    /// Deletes every expired or unparsable entry
    ///
    /// # Returns
    /// The number of files deleted
    pub async fn clear_expired(&self) -> Result<usize> {
        let now = now_millis();
        let mut removed = 0;
        for path in self.json_files().await? {
            if let Some(inspected) = self.inspect(&path, now).await? {
                if inspected.stale {
                    remove_if_present(&path).await?;
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    /// Scans the cache directory and summarizes its contents
    pub async fn stats(&self) -> Result<CacheStats> {
        let now = now_millis();
        let mut stats = CacheStats::default();
        for path in self.json_files().await? {
            let Some(inspected) = self.inspect(&path, now).await? else {
                continue;
            };
            stats.total_files += 1;
            stats.total_size_bytes += inspected.size;
            if inspected.stale {
                stats.expired_entries += 1;
            } else {
                stats.valid_entries += 1;
            }
        }
        Ok(stats)
    }

    /// Reads one cache file. `None` means it disappeared since the scan.
    async fn inspect(&self, path: &Path, now_ms: i64) -> Result<Option<Inspected>> {
        let content = match fs::read(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CacheError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let stale = match serde_json::from_slice::<CacheEntry<T>>(&content) {
            Ok(entry) => entry.is_expired_at(now_ms),
            Err(_) => true,
        };
        Ok(Some(Inspected {
            size: content.len() as u64,
            stale,
        }))
    }
}

/// Removes a file, treating "not found" as success
async fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(CacheError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}
