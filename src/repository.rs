//! Cache-through access to lesson data
//!
//! `LessonRepository` answers from the local cache when it can and falls back
//! to the remote backend otherwise, retrying transient failures. Cache misses
//! and failures are logged here rather than inside the cache.

use std::time::Duration;

use futures::future::BoxFuture;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::{CacheError, LocalStorageCache, Lookup};
use crate::config::Config;
use crate::data::{CacheableData, DataError, LessonSummary, LessonTopic};
use crate::debounce::Debouncer;
use crate::retry::{retry_with_backoff, RetryError, RetryPolicy};

/// Errors reported by a remote lesson backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The backend could not be reached
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// The backend answered with an error status
    #[error("Backend error (HTTP {status}): {message}")]
    Status { status: u16, message: String },
}

/// Source of truth for lesson data
pub trait LessonBackend: Send + Sync {
    /// Fetches all topics for a language
    fn fetch_topics<'a>(
        &'a self,
        language_code: &'a str,
    ) -> BoxFuture<'a, Result<Vec<LessonTopic>, BackendError>>;

    /// Fetches the lessons of one topic
    fn fetch_lessons<'a>(
        &'a self,
        topic_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<LessonSummary>, BackendError>>;
}

/// Errors returned by `LessonRepository`
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Every backend attempt failed
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The retry policy allowed no backend attempts
    #[error("Backend was not queried: retry policy allows no attempts")]
    NotAttempted,

    /// Invalidating a cache entry failed
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl From<RetryError<BackendError>> for RepositoryError {
    fn from(err: RetryError<BackendError>) -> Self {
        match err {
            RetryError::Exhausted => RepositoryError::NotAttempted,
            RetryError::Failed(err) => RepositoryError::Backend(err),
        }
    }
}

/// Lesson data with a local cache in front of the backend
pub struct LessonRepository<B> {
    backend: B,
    cache: LocalStorageCache,
    retry: RetryPolicy,
    refresh_gate: Debouncer,
    topics_ttl_ms: u64,
    lessons_ttl_ms: u64,
}

impl<B: LessonBackend> LessonRepository<B> {
    pub fn new(backend: B, cache: LocalStorageCache, config: &Config) -> Self {
        Self {
            backend,
            cache,
            retry: RetryPolicy::from(&config.retry),
            refresh_gate: Debouncer::new(Duration::from_millis(
                config.debounce.refresh_interval_ms,
            )),
            topics_ttl_ms: config.cache.topics_ttl_ms,
            lessons_ttl_ms: config.cache.lessons_ttl_ms,
        }
    }

    pub fn cache(&self) -> &LocalStorageCache {
        &self.cache
    }

    /// Topics for a language, from cache when fresh
    ///
    /// # Behavior
    /// - Returns cached topics if a fresh entry exists
    /// - Otherwise fetches from the backend with retry and caches the result
    /// - A failed cache write is logged and does not fail the call
    pub async fn topics(&self, language_code: &str) -> Result<Vec<LessonTopic>, RepositoryError> {
        let key = topics_key(language_code);
        if let Some(topics) = self.cached(&key, CacheableData::into_topics).await {
            return Ok(topics);
        }

        let topics = retry_with_backoff(&self.retry, || self.backend.fetch_topics(language_code))
            .await
            .map_err(|e| {
                warn!(language_code, error = %e, "Fetching topics failed");
                e
            })?;
        info!(language_code, count = topics.len(), "Fetched topics from backend");

        self.remember(&key, &CacheableData::from_topics(&topics), self.topics_ttl_ms)
            .await;
        Ok(topics)
    }

    /// Lessons of a topic, from cache when fresh
    pub async fn lessons(&self, topic_id: &str) -> Result<Vec<LessonSummary>, RepositoryError> {
        let key = lessons_key(topic_id);
        if let Some(lessons) = self.cached(&key, CacheableData::into_lessons).await {
            return Ok(lessons);
        }

        let lessons = retry_with_backoff(&self.retry, || self.backend.fetch_lessons(topic_id))
            .await
            .map_err(|e| {
                warn!(topic_id, error = %e, "Fetching lessons failed");
                e
            })?;
        info!(topic_id, count = lessons.len(), "Fetched lessons from backend");

        self.remember(&key, &CacheableData::from_lessons(&lessons), self.lessons_ttl_ms)
            .await;
        Ok(lessons)
    }

    /// Drops cached topics and refetches them
    ///
    /// Returns `Ok(None)` without touching the cache or backend when the
    /// previous refresh was too recent.
    pub async fn refresh_topics(
        &mut self,
        language_code: &str,
    ) -> Result<Option<Vec<LessonTopic>>, RepositoryError> {
        if !self.refresh_gate.should_proceed() {
            debug!(language_code, "Refresh debounced");
            return Ok(None);
        }

        self.invalidate_topics(language_code).await?;
        self.topics(language_code).await.map(Some)
    }

    pub async fn invalidate_topics(&self, language_code: &str) -> Result<(), RepositoryError> {
        self.cache.delete(&topics_key(language_code)).await?;
        Ok(())
    }

    pub async fn invalidate_lessons(&self, topic_id: &str) -> Result<(), RepositoryError> {
        self.cache.delete(&lessons_key(topic_id)).await?;
        Ok(())
    }

    /// Reads and converts a cached payload, logging why a miss happened
    async fn cached<T>(
        &self,
        key: &str,
        convert: impl FnOnce(CacheableData) -> Result<T, DataError>,
    ) -> Option<T> {
        match self.cache.lookup(key).await {
            Lookup::Hit(payload) => match convert(payload) {
                Ok(value) => {
                    debug!(key, "Cache hit");
                    Some(value)
                }
                Err(e) => {
                    warn!(key, error = %e, "Cached payload unusable, refetching");
                    if let Err(e) = self.cache.delete(key).await {
                        warn!(key, error = %e, "Failed to drop unusable cache entry");
                    }
                    None
                }
            },
            Lookup::Missing => {
                debug!(key, "Cache miss");
                None
            }
            Lookup::Expired => {
                debug!(key, "Cache entry expired");
                None
            }
            Lookup::Corrupt(reason) => {
                warn!(key, %reason, "Discarded corrupt cache entry");
                None
            }
            Lookup::Unreadable(reason) => {
                warn!(key, %reason, "Cache entry unreadable");
                None
            }
        }
    }

    async fn remember(&self, key: &str, payload: &CacheableData, ttl_ms: u64) {
        if let Err(e) = self.cache.store(key, payload, ttl_ms).await {
            warn!(key, error = %e, "Failed to cache backend response");
        }
    }
}

/// Cache key for a language's topic list
pub fn topics_key(language_code: &str) -> String {
    format!("lesson_topics_{}", encode_key_part(language_code))
}

/// Cache key for a topic's lesson list
pub fn lessons_key(topic_id: &str) -> String {
    format!("lessons_{}", encode_key_part(topic_id))
}

/// Percent-encodes every byte outside `[a-z0-9-]`
///
/// The mapping is injective, so distinct IDs never share a cache file, even
/// on case-insensitive filesystems.
fn encode_key_part(part: &str) -> String {
    let mut encoded = String::with_capacity(part.len());
    for byte in part.bytes() {
        match byte {
            b'a'..=b'z' | b'0'..=b'9' | b'-' => encoded.push(byte as char),
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use futures::FutureExt;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    /// Backend that fails a set number of times before answering
    struct FakeBackend {
        topics: Vec<LessonTopic>,
        lessons: Vec<LessonSummary>,
        failures_left: AtomicU32,
        calls: AtomicU32,
    }

    impl FakeBackend {
        fn new(failures: u32) -> Self {
            Self {
                topics: vec![topic("greetings", 0), topic("travel", 1)],
                lessons: vec![lesson("greetings-1")],
                failures_left: AtomicU32::new(failures),
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }

        fn answer<T: Clone + Send + 'static>(
            &self,
            value: &[T],
        ) -> BoxFuture<'static, Result<Vec<T>, BackendError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let fail = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            let value = value.to_vec();
            async move {
                if fail {
                    Err(BackendError::Unavailable("connection reset".to_string()))
                } else {
                    Ok(value)
                }
            }
            .boxed()
        }
    }

    impl LessonBackend for FakeBackend {
        fn fetch_topics<'a>(
            &'a self,
            _language_code: &'a str,
        ) -> BoxFuture<'a, Result<Vec<LessonTopic>, BackendError>> {
            self.answer(&self.topics)
        }

        fn fetch_lessons<'a>(
            &'a self,
            _topic_id: &'a str,
        ) -> BoxFuture<'a, Result<Vec<LessonSummary>, BackendError>> {
            self.answer(&self.lessons)
        }
    }

    fn topic(id: &str, order_index: u32) -> LessonTopic {
        LessonTopic {
            id: id.to_string(),
            title: id.to_uppercase(),
            description: format!("About {}", id),
            order_index,
            is_completed: false,
            is_locked: order_index > 0,
            estimated_duration: Duration::from_secs(10 * 60),
            language_code: "fr".to_string(),
            completed_lessons: BTreeMap::new(),
        }
    }

    fn lesson(id: &str) -> LessonSummary {
        LessonSummary {
            id: id.to_string(),
            title: "Bonjour".to_string(),
            description: Some("First words".to_string()),
            topic_id: "greetings".to_string(),
            order_index: 0,
            is_published: true,
            question_count: 8,
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2024, 5, 2, 12, 0, 0).unwrap(),
        }
    }

    fn test_config() -> Config {
        let mut config = Config::default();
        config.retry.initial_delay_ms = 0;
        config.retry.max_delay_ms = 0;
        config.debounce.refresh_interval_ms = 60_000;
        config
    }

    fn create_repository(failures: u32) -> (LessonRepository<FakeBackend>, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let cache = LocalStorageCache::new(temp_dir.path());
        let repository = LessonRepository::new(FakeBackend::new(failures), cache, &test_config());
        (repository, temp_dir)
    }

    #[tokio::test]
    async fn test_topics_are_fetched_once_then_served_from_cache() {
        let (repository, temp_dir) = create_repository(0);

        let first = repository.topics("fr").await.unwrap();
        let second = repository.topics("fr").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert_eq!(repository.backend.calls(), 1);
        assert!(temp_dir.path().join("lesson_topics_fr.json").exists());
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let (repository, _temp_dir) = create_repository(2);

        let topics = repository.topics("fr").await.unwrap();

        assert_eq!(topics.len(), 2);
        assert_eq!(repository.backend.calls(), 3);
    }

    #[tokio::test]
    async fn test_persistent_failure_is_reported_and_not_cached() {
        let (repository, temp_dir) = create_repository(10);

        let err = repository.topics("fr").await.unwrap_err();

        assert!(matches!(
            err,
            RepositoryError::Backend(BackendError::Unavailable(_))
        ));
        assert_eq!(repository.backend.calls(), 3);
        assert!(!temp_dir.path().join("lesson_topics_fr.json").exists());
    }

    #[tokio::test]
    async fn test_corrupt_cache_entry_triggers_refetch() {
        let (repository, temp_dir) = create_repository(0);
        std::fs::write(temp_dir.path().join("lesson_topics_fr.json"), "{oops").unwrap();

        let topics = repository.topics("fr").await.unwrap();

        assert_eq!(topics.len(), 2);
        assert_eq!(repository.backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_wrong_payload_shape_triggers_refetch() {
        let (repository, _temp_dir) = create_repository(0);
        let wrong = CacheableData::from_lessons(&[lesson("x")]);
        repository
            .cache()
            .store(&topics_key("fr"), &wrong, 60_000)
            .await
            .unwrap();

        let topics = repository.topics("fr").await.unwrap();

        assert_eq!(topics[0].id, "greetings");
        assert_eq!(repository.backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_lessons_round_trip_through_cache() {
        let (repository, _temp_dir) = create_repository(0);

        let fetched = repository.lessons("greetings").await.unwrap();
        let cached = repository.lessons("greetings").await.unwrap();

        assert_eq!(fetched, vec![lesson("greetings-1")]);
        assert_eq!(cached, fetched);
        assert_eq!(repository.backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_refresh_refetches_then_is_debounced() {
        let (mut repository, _temp_dir) = create_repository(0);
        repository.topics("fr").await.unwrap();

        let refreshed = repository.refresh_topics("fr").await.unwrap();
        let debounced = repository.refresh_topics("fr").await.unwrap();

        assert!(refreshed.is_some());
        assert!(debounced.is_none());
        assert_eq!(repository.backend.calls(), 2);
    }

    #[tokio::test]
    async fn test_invalidate_lessons_forces_refetch() {
        let (repository, _temp_dir) = create_repository(0);
        repository.lessons("greetings").await.unwrap();

        repository.invalidate_lessons("greetings").await.unwrap();
        repository.lessons("greetings").await.unwrap();

        assert_eq!(repository.backend.calls(), 2);
    }

    #[test]
    fn test_keys_are_encoded() {
        assert_eq!(topics_key("fr"), "lesson_topics_fr");
        assert_eq!(topics_key("FR"), "lesson_topics_%46%52");
        assert_eq!(lessons_key("basic phrases/1"), "lessons_basic%20phrases%2F1");
        assert_eq!(lessons_key("../etc"), "lessons_%2E%2E%2Fetc");
    }

    #[test]
    fn test_distinct_ids_get_distinct_keys() {
        let ids = ["a.b", "a_b", "Basics", "basics", "a%2Eb", ""];
        let keys: std::collections::HashSet<String> =
            ids.iter().map(|id| lessons_key(id)).collect();

        assert_eq!(keys.len(), ids.len());
    }

    #[test]
    fn test_encoded_keys_are_valid_cache_keys() {
        let cache: LocalStorageCache = LocalStorageCache::new("/tmp/lingocache");

        for id in ["../etc", "a\\b", "..", "nul\0byte", "ümlaut"] {
            assert!(cache.cache_path(&lessons_key(id)).is_ok(), "{:?}", id);
            assert!(cache.cache_path(&topics_key(id)).is_ok(), "{:?}", id);
        }
    }

    #[tokio::test]
    async fn test_ids_differing_only_in_case_are_cached_separately() {
        let (repository, _temp_dir) = create_repository(0);

        repository.lessons("Basics").await.unwrap();
        repository.lessons("basics").await.unwrap();
        repository.lessons("Basics").await.unwrap();

        assert_eq!(repository.backend.calls(), 2);
    }
}
