//! Novel records as seen by the reconciliation pass.
//!
//! Backends only need to list every record across users, list users with
//! their pause flag, and apply partial updates to one record.

pub mod firestore;
pub mod local;

use async_trait::async_trait;

pub use firestore::FirestoreNovelStore;
pub use local::LocalFsNovelStore;

/// Title a record carries until a real one has been resolved.
pub const TITLE_PLACEHOLDER: &str = "Pending Sync...";

pub const DEFAULT_MILESTONE: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub user_id: String,
    pub novel_id: String,
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.user_id, self.novel_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NovelRecord {
    pub key: RecordKey,
    pub url: String,
    pub title: String,
    pub total_chapters: u32,
    pub read_chapters: u32,
    pub milestone_threshold: u32,
    pub notify_email: Option<String>,
    pub notifications_paused: bool,
    /// Count at which the last notification went out.
    pub last_notified_count: Option<u32>,
}

impl NovelRecord {
    pub fn has_placeholder_title(&self) -> bool {
        let title = self.title.trim();
        title.is_empty() || title == TITLE_PLACEHOLDER
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: String,
    pub notifications_paused: bool,
}

/// Partial merge-update; `None` fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordPatch {
    pub url: Option<String>,
    pub title: Option<String>,
    pub total_chapters: Option<u32>,
    pub last_notified_count: Option<u32>,
}

impl RecordPatch {
    pub fn is_empty(&self) -> bool {
        self.url.is_none()
            && self.title.is_none()
            && self.total_chapters.is_none()
            && self.last_notified_count.is_none()
    }

    /// Stored field names touched by this patch.
    pub fn field_paths(&self) -> Vec<&'static str> {
        let mut paths = Vec::new();
        if self.url.is_some() {
            paths.push("url");
        }
        if self.title.is_some() {
            paths.push("title");
        }
        if self.total_chapters.is_some() {
            paths.push("totalChapters");
        }
        if self.last_notified_count.is_some() {
            paths.push("lastNotifiedCount");
        }
        paths
    }
}

#[async_trait]
pub trait NovelStore: Send + Sync {
    /// Every record across all users, flattened.
    async fn list_all_novel_records(&self) -> anyhow::Result<Vec<NovelRecord>>;
    async fn list_users(&self) -> anyhow::Result<Vec<UserRecord>>;
    async fn update_record(&self, key: &RecordKey, patch: &RecordPatch) -> anyhow::Result<()>;
}
