use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use story_markdown::Content;

/// Storage key for a (story, language) pair, e.g. `en_05`.
pub fn draft_key(story_num: &str, language: &str) -> String {
    format!("{language}_{story_num}")
}

/// A persisted draft. Field names match the on-disk JSON layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub key: String,
    pub story_num: String,
    pub language: String,
    pub last_edited: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub content: Content,
}

impl HistoryRecord {
    pub fn new(story_num: &str, language: &str, content: Content, now: DateTime<Utc>) -> Self {
        Self {
            key: draft_key(story_num, language),
            story_num: story_num.to_string(),
            language: language.to_string(),
            last_edited: now,
            created_at: now,
            content,
        }
    }

    /// Replace the content; `created_at` is left alone.
    pub fn revise(&mut self, content: Content, now: DateTime<Utc>) {
        self.content = content;
        self.last_edited = now;
    }
}
