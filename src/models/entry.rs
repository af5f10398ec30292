use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::mood::Mood;

/// A diary entry as stored locally.
///
/// `id` is generated on this device and stays the primary key of the local
/// store for the record's whole lifetime. `remote_id` is stamped once the
/// backend accepts the entry and is never reassigned to a different logical
/// entry. Whether an entry has ever been confirmed remote is decoded from
/// `remote_id`, not from any naming convention on `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiaryEntry {
    pub id: Uuid,
    pub remote_id: Option<Uuid>,
    pub title: String,
    /// Rich text content (HTML).
    pub content: String,
    pub mood: Option<Mood>,
    /// User-defined tags; order is display-only.
    pub tags: Vec<String>,
    /// Calendar date of the entry, user-editable.
    pub date: NaiveDate,
    /// Either a data URI pending upload, or a remote object-storage URL.
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Last-known-modification time, used for conflict resolution.
    pub updated_at: DateTime<Utc>,
    /// True from the moment of any local mutation until the matching
    /// remote operation is confirmed to have succeeded.
    pub needs_sync: bool,
}

/// Sync state of an entry, decoded from `remote_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Never confirmed by the backend.
    Pending,
    /// Accepted by the backend under this identifier.
    Synced { remote_id: Uuid },
}

impl DiaryEntry {
    /// Creates a new local entry from a draft, flagged for sync.
    pub fn from_draft(draft: EntryDraft) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            remote_id: None,
            title: draft.title,
            content: draft.content,
            mood: draft.mood,
            tags: draft.tags,
            date: draft.date.unwrap_or_else(|| Local::now().date_naive()),
            image: draft.image,
            created_at: now,
            updated_at: now,
            needs_sync: true,
        }
    }

    pub fn sync_state(&self) -> SyncState {
        match self.remote_id {
            Some(remote_id) => SyncState::Synced { remote_id },
            None => SyncState::Pending,
        }
    }

    /// True when the image points at uploaded object storage rather than
    /// an inline data URI.
    pub fn has_remote_image(&self) -> bool {
        self.image
            .as_deref()
            .is_some_and(|url| url.starts_with("http"))
    }
}

/// Caller-supplied fields for creating an entry.
#[derive(Debug, Clone, Default)]
pub struct EntryDraft {
    pub title: String,
    pub content: String,
    pub mood: Option<Mood>,
    pub tags: Vec<String>,
    /// Defaults to today when unset.
    pub date: Option<NaiveDate>,
    pub image: Option<String>,
}

impl EntryDraft {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_mood(mut self, mood: Mood) -> Self {
        self.mood = Some(mood);
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }
}

/// Partial update for an entry. Unset fields keep their stored value;
/// the local store merges a patch into the existing record, it never
/// replaces the whole row.
#[derive(Debug, Clone, Default)]
pub struct EntryPatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub mood: Option<Option<Mood>>,
    pub tags: Option<Vec<String>>,
    pub date: Option<NaiveDate>,
    pub image: Option<Option<String>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub needs_sync: Option<bool>,
    pub remote_id: Option<Option<Uuid>>,
}

impl EntryPatch {
    /// Applies the patch to an entry in place.
    pub fn apply(&self, entry: &mut DiaryEntry) {
        if let Some(title) = &self.title {
            entry.title = title.clone();
        }
        if let Some(content) = &self.content {
            entry.content = content.clone();
        }
        if let Some(mood) = &self.mood {
            entry.mood = *mood;
        }
        if let Some(tags) = &self.tags {
            entry.tags = tags.clone();
        }
        if let Some(date) = self.date {
            entry.date = date;
        }
        if let Some(image) = &self.image {
            entry.image = image.clone();
        }
        if let Some(updated_at) = self.updated_at {
            entry.updated_at = updated_at;
        }
        if let Some(needs_sync) = self.needs_sync {
            entry.needs_sync = needs_sync;
        }
        if let Some(remote_id) = self.remote_id {
            entry.remote_id = remote_id;
        }
    }
}
