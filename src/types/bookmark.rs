use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A saved bookmark row as returned by the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Bookmark {
    pub id: String,
    pub title: String,
    pub url: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a new bookmark. The backend assigns `id` and `created_at`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewBookmark {
    pub title: String,
    pub url: String,
    pub user_id: String,
}

/// Input fields of the add-bookmark form.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BookmarkDraft {
    pub title: String,
    pub url: String,
}

impl BookmarkDraft {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
        }
    }

    pub fn clear(&mut self) {
        self.title.clear();
        self.url.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_empty() && self.url.is_empty()
    }
}
