use serde::{Deserialize, Serialize};

use super::bookmark::Bookmark;

/// Row-level change type delivered by the push channel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Previous row image. With the default replica identity only the key is sent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OldRecord {
    pub id: String,
}

/// A single change pushed for the bookmark table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub new: Option<Bookmark>,
    pub old: Option<OldRecord>,
}

impl ChangeEvent {
    pub fn insert(record: Bookmark) -> Self {
        Self {
            kind: ChangeKind::Insert,
            new: Some(record),
            old: None,
        }
    }

    pub fn update(record: Bookmark) -> Self {
        let old = Some(OldRecord {
            id: record.id.clone(),
        });
        Self {
            kind: ChangeKind::Update,
            new: Some(record),
            old,
        }
    }

    pub fn delete(id: impl Into<String>) -> Self {
        Self {
            kind: ChangeKind::Delete,
            new: None,
            old: Some(OldRecord { id: id.into() }),
        }
    }

    /// Identifier the event targets, preferring the new row image.
    pub fn target_id(&self) -> Option<&str> {
        self.new
            .as_ref()
            .map(|b| b.id.as_str())
            .or_else(|| self.old.as_ref().map(|o| o.id.as_str()))
    }
}

/// Which change kinds a channel subscribes to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum EventMask {
    #[default]
    All,
    Insert,
    Update,
    Delete,
}

impl EventMask {
    /// Event name used in the realtime subscription config.
    pub fn as_wire(&self) -> &'static str {
        match self {
            EventMask::All => "*",
            EventMask::Insert => "INSERT",
            EventMask::Update => "UPDATE",
            EventMask::Delete => "DELETE",
        }
    }

    pub fn matches(&self, kind: ChangeKind) -> bool {
        match self {
            EventMask::All => true,
            EventMask::Insert => kind == ChangeKind::Insert,
            EventMask::Update => kind == ChangeKind::Update,
            EventMask::Delete => kind == ChangeKind::Delete,
        }
    }
}

/// Table-scoped filter for a change channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeFilter {
    pub schema: String,
    pub table: String,
    pub events: EventMask,
}

impl ChangeFilter {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            schema: "public".to_string(),
            table: table.into(),
            events: EventMask::All,
        }
    }
}

/// Lifecycle status of a change channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChannelStatus {
    Subscribed,
    Closed,
    TimedOut,
    Error(String),
}

impl ChannelStatus {
    /// Whether the channel can no longer deliver events.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ChannelStatus::Subscribed)
    }
}

/// Item delivered on a change channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelMessage {
    Change(ChangeEvent),
    Status(ChannelStatus),
}

/// Sort order for a full fetch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FetchOrder {
    pub column: String,
    pub ascending: bool,
}

impl FetchOrder {
    pub fn newest_first() -> Self {
        Self {
            column: "created_at".to_string(),
            ascending: false,
        }
    }
}
