//! Lesson data models for the tutor
//!
//! This module contains the in-memory domain types fetched from the backend
//! and the flat shapes they take inside the cache.

pub mod cacheable;

pub use cacheable::{CacheableData, CachedLessonSummary, CachedLessonTopic, DataError};

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// A group of lessons shown as one card on the learning path
#[derive(Debug, Clone, PartialEq)]
pub struct LessonTopic {
    /// Unique identifier for the topic
    pub id: String,
    pub title: String,
    pub description: String,
    /// Position of the topic on the learning path
    pub order_index: u32,
    pub is_completed: bool,
    /// Locked topics cannot be started until earlier ones are completed
    pub is_locked: bool,
    /// Expected time to finish all lessons in the topic
    pub estimated_duration: Duration,
    /// Language being taught (e.g., "fr")
    pub language_code: String,
    /// Completed lesson count per language code
    pub completed_lessons: BTreeMap<String, u32>,
}

/// A single lesson within a topic, without its questions
#[derive(Debug, Clone, PartialEq)]
pub struct LessonSummary {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    /// Topic this lesson belongs to
    pub topic_id: String,
    /// Position of the lesson within its topic
    pub order_index: u32,
    pub is_published: bool,
    pub question_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LessonTopic {
    /// Completed lessons for `language_code`, zero if none were recorded
    pub fn completed_for(&self, language_code: &str) -> u32 {
        self.completed_lessons
            .get(language_code)
            .copied()
            .unwrap_or(0)
    }
}
