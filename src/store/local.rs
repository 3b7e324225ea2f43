use std::path::{Path, PathBuf};

use anyhow::Context as _;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;

use super::{
    DEFAULT_MILESTONE, NovelRecord, NovelStore, RecordKey, RecordPatch, TITLE_PLACEHOLDER,
    UserRecord,
};

/// Single JSON document holding every user and their tracked novels.
///
/// ```json
/// {"users": [{"id": "u1", "notificationsPaused": false,
///             "novels": [{"id": "n1", "url": "...", "readChapters": 8, "milestone": 5}]}]}
/// ```
///
/// Unknown fields are carried through updates unchanged, and fields a document
/// never had stay absent; defaults exist only on the record side.
#[derive(Debug)]
pub struct LocalFsNovelStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    users: Vec<UserDocument>,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserDocument {
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    notifications_paused: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    novels: Option<Vec<NovelDocument>>,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NovelDocument {
    id: String,
    url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    total_chapters: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    read_chapters: Option<u32>,
    #[serde(default, rename = "milestone", skip_serializing_if = "Option::is_none")]
    milestone_threshold: Option<u32>,
    #[serde(default, rename = "email", skip_serializing_if = "Option::is_none")]
    notify_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    notifications_paused: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_notified_count: Option<u32>,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

impl NovelDocument {
    fn to_record(&self, user_id: &str) -> NovelRecord {
        NovelRecord {
            key: RecordKey {
                user_id: user_id.to_owned(),
                novel_id: self.id.clone(),
            },
            url: self.url.clone(),
            title: self
                .title
                .clone()
                .unwrap_or_else(|| TITLE_PLACEHOLDER.to_owned()),
            total_chapters: self.total_chapters.unwrap_or(0),
            read_chapters: self.read_chapters.unwrap_or(0),
            milestone_threshold: self.milestone_threshold.unwrap_or(DEFAULT_MILESTONE),
            notify_email: self.notify_email.clone().filter(|e| !e.trim().is_empty()),
            notifications_paused: self.notifications_paused.unwrap_or(false),
            last_notified_count: self.last_notified_count,
        }
    }

    fn apply(&mut self, patch: &RecordPatch) {
        if let Some(url) = &patch.url {
            self.url = url.clone();
        }
        if let Some(title) = &patch.title {
            self.title = Some(title.clone());
        }
        if let Some(total) = patch.total_chapters {
            self.total_chapters = Some(total);
        }
        if let Some(count) = patch.last_notified_count {
            self.last_notified_count = Some(count);
        }
    }
}

impl LocalFsNovelStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> anyhow::Result<StoreFile> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(StoreFile::default());
            }
            Err(err) => {
                return Err(err).with_context(|| format!("read: {}", self.path.display()));
            }
        };
        serde_json::from_slice(&bytes)
            .with_context(|| format!("parse store json: {}", self.path.display()))
    }
}

#[async_trait]
impl NovelStore for LocalFsNovelStore {
    async fn list_all_novel_records(&self) -> anyhow::Result<Vec<NovelRecord>> {
        let file = self.load().await?;
        Ok(file
            .users
            .iter()
            .flat_map(|user| {
                user.novels
                    .iter()
                    .flatten()
                    .map(|novel| novel.to_record(&user.id))
            })
            .collect())
    }

    async fn list_users(&self) -> anyhow::Result<Vec<UserRecord>> {
        let file = self.load().await?;
        Ok(file
            .users
            .iter()
            .map(|user| UserRecord {
                id: user.id.clone(),
                notifications_paused: user.notifications_paused.unwrap_or(false),
            })
            .collect())
    }

    async fn update_record(&self, key: &RecordKey, patch: &RecordPatch) -> anyhow::Result<()> {
        if patch.is_empty() {
            return Ok(());
        }

        let _guard = self.write_lock.lock().await;
        let mut file = self.load().await?;
        let novel = file
            .users
            .iter_mut()
            .filter(|user| user.id == key.user_id)
            .flat_map(|user| user.novels.iter_mut().flatten())
            .find(|novel| novel.id == key.novel_id)
            .ok_or_else(|| anyhow::anyhow!("record not found: {key}"))?;
        novel.apply(patch);

        write_json_atomic(&self.path, &file)
            .await
            .with_context(|| format!("write store: {}", self.path.display()))
    }
}

async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let tmp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
    let data = serde_json::to_vec_pretty(value).context("serialize json")?;
    fs::write(&tmp_path, &data)
        .await
        .with_context(|| format!("write tmp: {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("rename tmp to final: {}", path.display()))?;
    Ok(())
}
