//! Firestore REST backend: `users/{uid}` documents with a `novels`
//! subcollection per user.

use anyhow::Context as _;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::{
    DEFAULT_MILESTONE, NovelRecord, NovelStore, RecordKey, RecordPatch, TITLE_PLACEHOLDER,
    UserRecord,
};

pub const DEFAULT_FIRESTORE_BASE_URL: &str = "https://firestore.googleapis.com/v1";

const PAGE_SIZE: &str = "300";

#[derive(Debug, Clone)]
pub struct FirestoreNovelStore {
    client: reqwest::Client,
    base_url: String,
    project_id: String,
    access_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListDocumentsResponse {
    #[serde(default)]
    documents: Vec<Document>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Document {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

impl Document {
    fn id(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or_default()
    }
}

impl FirestoreNovelStore {
    pub fn new(base_url: &str, project_id: &str, access_token: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("build firestore http client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            project_id: project_id.to_owned(),
            access_token: access_token.to_owned(),
        })
    }

    fn documents_root(&self) -> String {
        format!(
            "{}/projects/{}/databases/(default)/documents",
            self.base_url, self.project_id
        )
    }

    async fn list_documents(&self, collection: &str, show_missing: bool) -> anyhow::Result<Vec<Document>> {
        let endpoint = format!("{}/{collection}", self.documents_root());
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![("pageSize", PAGE_SIZE.to_owned())];
            if show_missing {
                query.push(("showMissing", "true".to_owned()));
            }
            if let Some(token) = &page_token {
                query.push(("pageToken", token.clone()));
            }

            let response = self
                .client
                .get(&endpoint)
                .bearer_auth(&self.access_token)
                .query(&query)
                .send()
                .await
                .with_context(|| format!("GET {endpoint}"))?;
            let status = response.status();
            let raw = response.text().await.context("read firestore response body")?;
            if !status.is_success() {
                anyhow::bail!("firestore list {collection} failed ({status}): {}", error_message(&raw));
            }

            let page: ListDocumentsResponse =
                serde_json::from_str(&raw).context("parse firestore list response")?;
            documents.extend(page.documents);
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(documents)
    }
}

#[async_trait]
impl NovelStore for FirestoreNovelStore {
    async fn list_all_novel_records(&self) -> anyhow::Result<Vec<NovelRecord>> {
        let users = self.list_documents("users", true).await.context("list users")?;
        let mut records = Vec::new();
        for user in &users {
            let user_id = user.id();
            let novels = self
                .list_documents(&format!("users/{user_id}/novels"), false)
                .await
                .with_context(|| format!("list novels of user {user_id}"))?;
            records.extend(novels.iter().map(|doc| novel_from_fields(user_id, doc.id(), &doc.fields)));
        }
        Ok(records)
    }

    async fn list_users(&self) -> anyhow::Result<Vec<UserRecord>> {
        let users = self.list_documents("users", true).await.context("list users")?;
        Ok(users
            .iter()
            .map(|doc| UserRecord {
                id: doc.id().to_owned(),
                notifications_paused: bool_field(&doc.fields, "notificationsPaused").unwrap_or(false),
            })
            .collect())
    }

    async fn update_record(&self, key: &RecordKey, patch: &RecordPatch) -> anyhow::Result<()> {
        if patch.is_empty() {
            return Ok(());
        }

        let endpoint = format!(
            "{}/users/{}/novels/{}",
            self.documents_root(),
            key.user_id,
            key.novel_id
        );
        let mut query = patch
            .field_paths()
            .into_iter()
            .map(|path| ("updateMask.fieldPaths", path.to_owned()))
            .collect::<Vec<_>>();
        query.push(("currentDocument.exists", "true".to_owned()));

        let response = self
            .client
            .patch(&endpoint)
            .bearer_auth(&self.access_token)
            .query(&query)
            .json(&json!({ "fields": patch_fields(patch) }))
            .send()
            .await
            .with_context(|| format!("PATCH {endpoint}"))?;
        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            anyhow::bail!("firestore update {key} failed ({status}): {}", error_message(&raw));
        }
        Ok(())
    }
}

fn error_message(raw: &str) -> String {
    serde_json::from_str::<Value>(raw)
        .ok()
        .and_then(|v| v.pointer("/error/message")?.as_str().map(str::to_owned))
        .unwrap_or_else(|| raw.to_owned())
}

fn novel_from_fields(user_id: &str, novel_id: &str, fields: &Map<String, Value>) -> NovelRecord {
    NovelRecord {
        key: RecordKey {
            user_id: user_id.to_owned(),
            novel_id: novel_id.to_owned(),
        },
        url: string_field(fields, "url").unwrap_or_default(),
        title: string_field(fields, "title").unwrap_or_else(|| TITLE_PLACEHOLDER.to_owned()),
        total_chapters: count_field(fields, "totalChapters").unwrap_or(0),
        read_chapters: count_field(fields, "readChapters").unwrap_or(0),
        milestone_threshold: count_field(fields, "milestone").unwrap_or(DEFAULT_MILESTONE),
        notify_email: string_field(fields, "email").filter(|e| !e.trim().is_empty()),
        notifications_paused: bool_field(fields, "notificationsPaused").unwrap_or(false),
        last_notified_count: count_field(fields, "lastNotifiedCount"),
    }
}

fn string_field(fields: &Map<String, Value>, name: &str) -> Option<String> {
    fields
        .get(name)?
        .get("stringValue")?
        .as_str()
        .map(str::to_owned)
}

fn bool_field(fields: &Map<String, Value>, name: &str) -> Option<bool> {
    fields.get(name)?.get("booleanValue")?.as_bool()
}

/// Integer counts arrive as `integerValue` strings, occasionally as
/// `doubleValue` when written from JavaScript clients.
fn count_field(fields: &Map<String, Value>, name: &str) -> Option<u32> {
    let value = fields.get(name)?;
    if let Some(raw) = value.get("integerValue") {
        let parsed = match raw {
            Value::String(s) => s.parse::<i64>().ok(),
            Value::Number(n) => n.as_i64(),
            _ => None,
        }?;
        return u32::try_from(parsed.max(0)).ok();
    }
    let double = value.get("doubleValue")?.as_f64()?;
    (double.is_finite() && double >= 0.0).then(|| double.min(f64::from(u32::MAX)) as u32)
}

fn patch_fields(patch: &RecordPatch) -> Map<String, Value> {
    let mut fields = Map::new();
    if let Some(url) = &patch.url {
        fields.insert("url".to_owned(), json!({ "stringValue": url }));
    }
    if let Some(title) = &patch.title {
        fields.insert("title".to_owned(), json!({ "stringValue": title }));
    }
    if let Some(total) = patch.total_chapters {
        fields.insert("totalChapters".to_owned(), json!({ "integerValue": total.to_string() }));
    }
    if let Some(count) = patch.last_notified_count {
        fields.insert(
            "lastNotifiedCount".to_owned(),
            json!({ "integerValue": count.to_string() }),
        );
    }
    fields
}
