//! Cache shapes for lesson data
//!
//! The cache never holds domain objects directly. Each domain type has a flat,
//! self-contained counterpart, and `CacheableData` tags those counterparts with
//! a `"type"` discriminator so one cache file can hold any of them.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{LessonSummary, LessonTopic};

/// Errors converting cached data back into domain types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataError {
    /// A timestamp field is not valid ISO-8601
    #[error("Invalid timestamp in field '{field}': '{value}'")]
    InvalidTimestamp { field: &'static str, value: String },

    /// The payload holds a different variant than the caller asked for
    #[error("Expected {expected} in cached data, found {found}")]
    UnexpectedShape {
        expected: &'static str,
        found: &'static str,
    },
}

/// Cached form of a `LessonTopic`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedLessonTopic {
    pub id: String,
    pub title: String,
    pub description: String,
    pub order_index: u32,
    pub is_completed: bool,
    pub is_locked: bool,
    /// Whole minutes; seconds are truncated
    pub duration_minutes: u64,
    pub language_code: String,
    #[serde(default)]
    pub completed_lessons: BTreeMap<String, u32>,
}

/// Cached form of a `LessonSummary`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedLessonSummary {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub topic_id: String,
    pub order_index: u32,
    pub is_published: bool,
    pub question_count: u32,
    /// ISO-8601 timestamp
    pub created_at: String,
    /// ISO-8601 timestamp
    pub updated_at: String,
}

/// Every payload shape the lesson cache can hold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CacheableData {
    LessonTopicList { topics: Vec<CachedLessonTopic> },
    LessonTopic(CachedLessonTopic),
    LessonSummaryList { lessons: Vec<CachedLessonSummary> },
    LessonSummary(CachedLessonSummary),
}

impl From<&LessonTopic> for CachedLessonTopic {
    fn from(topic: &LessonTopic) -> Self {
        Self {
            id: topic.id.clone(),
            title: topic.title.clone(),
            description: topic.description.clone(),
            order_index: topic.order_index,
            is_completed: topic.is_completed,
            is_locked: topic.is_locked,
            duration_minutes: topic.estimated_duration.as_secs() / 60,
            language_code: topic.language_code.clone(),
            completed_lessons: topic.completed_lessons.clone(),
        }
    }
}

impl From<CachedLessonTopic> for LessonTopic {
    fn from(cached: CachedLessonTopic) -> Self {
        Self {
            id: cached.id,
            title: cached.title,
            description: cached.description,
            order_index: cached.order_index,
            is_completed: cached.is_completed,
            is_locked: cached.is_locked,
            estimated_duration: Duration::from_secs(cached.duration_minutes.saturating_mul(60)),
            language_code: cached.language_code,
            completed_lessons: cached.completed_lessons,
        }
    }
}

impl From<&LessonSummary> for CachedLessonSummary {
    fn from(lesson: &LessonSummary) -> Self {
        Self {
            id: lesson.id.clone(),
            title: lesson.title.clone(),
            description: lesson.description.clone(),
            topic_id: lesson.topic_id.clone(),
            order_index: lesson.order_index,
            is_published: lesson.is_published,
            question_count: lesson.question_count,
            created_at: format_timestamp(&lesson.created_at),
            updated_at: format_timestamp(&lesson.updated_at),
        }
    }
}

impl TryFrom<CachedLessonSummary> for LessonSummary {
    type Error = DataError;

    fn try_from(cached: CachedLessonSummary) -> Result<Self, Self::Error> {
        Ok(Self {
            created_at: parse_timestamp("createdAt", &cached.created_at)?,
            updated_at: parse_timestamp("updatedAt", &cached.updated_at)?,
            id: cached.id,
            title: cached.title,
            description: cached.description,
            topic_id: cached.topic_id,
            order_index: cached.order_index,
            is_published: cached.is_published,
            question_count: cached.question_count,
        })
    }
}

fn format_timestamp(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn parse_timestamp(field: &'static str, value: &str) -> Result<DateTime<Utc>, DataError> {
    DateTime::parse_from_rfc3339(value)
        .map(|time| time.with_timezone(&Utc))
        .map_err(|_| DataError::InvalidTimestamp {
            field,
            value: value.to_string(),
        })
}

impl CacheableData {
    /// Builds a topic list payload from domain topics
    pub fn from_topics(topics: &[LessonTopic]) -> Self {
        CacheableData::LessonTopicList {
            topics: topics.iter().map(CachedLessonTopic::from).collect(),
        }
    }

    /// Builds a lesson list payload from domain lessons
    pub fn from_lessons(lessons: &[LessonSummary]) -> Self {
        CacheableData::LessonSummaryList {
            lessons: lessons.iter().map(CachedLessonSummary::from).collect(),
        }
    }

    /// The discriminator written to disk for this variant
    pub fn kind(&self) -> &'static str {
        match self {
            CacheableData::LessonTopicList { .. } => "lesson_topic_list",
            CacheableData::LessonTopic(_) => "lesson_topic",
            CacheableData::LessonSummaryList { .. } => "lesson_summary_list",
            CacheableData::LessonSummary(_) => "lesson_summary",
        }
    }

    /// Converts a topic list payload back into domain topics
    pub fn into_topics(self) -> Result<Vec<LessonTopic>, DataError> {
        match self {
            CacheableData::LessonTopicList { topics } => {
                Ok(topics.into_iter().map(LessonTopic::from).collect())
            }
            other => Err(DataError::UnexpectedShape {
                expected: "lesson_topic_list",
                found: other.kind(),
            }),
        }
    }

    /// Converts a lesson list payload back into domain lessons
    pub fn into_lessons(self) -> Result<Vec<LessonSummary>, DataError> {
        match self {
            CacheableData::LessonSummaryList { lessons } => lessons
                .into_iter()
                .map(LessonSummary::try_from)
                .collect(),
            other => Err(DataError::UnexpectedShape {
                expected: "lesson_summary_list",
                found: other.kind(),
            }),
        }
    }
}
