mod support;

use novelwatch::notify::{EmailJsConfig, EmailJsNotifier, Notifier};
use novelwatch::store::{FirestoreNovelStore, NovelStore, RecordKey, RecordPatch, UserRecord};
use serde_json::{Value, json};

use support::{StubSite, route};

const ROOT: &str = "/v1/projects/p/databases/(default)/documents";

fn emailjs(site: &StubSite) -> EmailJsNotifier {
    EmailJsNotifier::new(EmailJsConfig {
        service_id: "svc".to_owned(),
        template_id: "tpl".to_owned(),
        public_key: "pub".to_owned(),
        private_key: "priv".to_owned(),
        api_url: site.url("/api/v1.0/email/send"),
    })
    .unwrap()
}

#[tokio::test]
async fn emailjs_posts_template_params() -> anyhow::Result<()> {
    let site = StubSite::spawn(vec![route("/api/v1.0/email/send", 200, "OK")]);
    emailjs(&site)
        .send_notification("a@b.com", "The Book", 12)
        .await?;

    let hits = site.hits();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].method, "POST");
    let body: Value = serde_json::from_str(&hits[0].body)?;
    assert_eq!(
        body,
        json!({
            "service_id": "svc",
            "template_id": "tpl",
            "user_id": "pub",
            "accessToken": "priv",
            "template_params": {
                "to_email": "a@b.com",
                "novel_name": "The Book",
                "chapter_count": 12,
            },
        })
    );
    Ok(())
}

#[tokio::test]
async fn emailjs_rejection_is_an_error() {
    let site = StubSite::spawn(vec![route(
        "/api/v1.0/email/send",
        400,
        "The Public Key is invalid",
    )]);
    let err = emailjs(&site)
        .send_notification("a@b.com", "The Book", 12)
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("The Public Key is invalid"));
}

fn firestore_site() -> StubSite {
    let users_page_1 = json!({
        "documents": [{
            "name": "projects/p/databases/(default)/documents/users/u1",
            "fields": { "notificationsPaused": { "booleanValue": true } }
        }],
        "nextPageToken": "t2"
    });
    let users_page_2 = json!({
        "documents": [{ "name": "projects/p/databases/(default)/documents/users/u2" }]
    });
    let novels = json!({
        "documents": [{
            "name": "projects/p/databases/(default)/documents/users/u1/novels/n1",
            "fields": {
                "url": { "stringValue": "https://novelbin.me/b/book" },
                "title": { "stringValue": "Book" },
                "totalChapters": { "integerValue": "10" },
                "readChapters": { "integerValue": "8" },
                "milestone": { "integerValue": "5" },
                "email": { "stringValue": "a@b.com" }
            }
        }]
    });

    StubSite::spawn(vec![
        route(
            &format!("{ROOT}/users?pageSize=300&showMissing=true"),
            200,
            &users_page_1.to_string(),
        ),
        route(
            &format!("{ROOT}/users?pageSize=300&showMissing=true&pageToken=t2"),
            200,
            &users_page_2.to_string(),
        ),
        route(&format!("{ROOT}/users/u1/novels"), 200, &novels.to_string()),
        route(&format!("{ROOT}/users/u2/novels"), 200, "{}"),
        route(&format!("{ROOT}/users/u1/novels/n1"), 200, "{}"),
    ])
}

#[tokio::test]
async fn firestore_lists_users_across_pages() -> anyhow::Result<()> {
    let site = firestore_site();
    let store = FirestoreNovelStore::new(&site.url("/v1"), "p", "token")?;

    let users = store.list_users().await?;
    assert_eq!(
        users,
        vec![
            UserRecord {
                id: "u1".to_owned(),
                notifications_paused: true
            },
            UserRecord {
                id: "u2".to_owned(),
                notifications_paused: false
            },
        ]
    );

    let records = store.list_all_novel_records().await?;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].key.to_string(), "u1/n1");
    assert_eq!(records[0].total_chapters, 10);
    assert_eq!(records[0].notify_email.as_deref(), Some("a@b.com"));
    Ok(())
}

#[tokio::test]
async fn firestore_update_sends_field_mask() -> anyhow::Result<()> {
    let site = firestore_site();
    let store = FirestoreNovelStore::new(&site.url("/v1"), "p", "token")?;
    let key = RecordKey {
        user_id: "u1".to_owned(),
        novel_id: "n1".to_owned(),
    };

    store
        .update_record(
            &key,
            &RecordPatch {
                total_chapters: Some(20),
                last_notified_count: Some(20),
                ..RecordPatch::default()
            },
        )
        .await?;

    let hits = site.hits();
    let patch = hits.last().unwrap();
    assert_eq!(patch.method, "PATCH");
    assert_eq!(
        patch.target,
        format!(
            "{ROOT}/users/u1/novels/n1?updateMask.fieldPaths=totalChapters&updateMask.fieldPaths=lastNotifiedCount&currentDocument.exists=true"
        )
    );
    let body: Value = serde_json::from_str(&patch.body)?;
    assert_eq!(
        body,
        json!({
            "fields": {
                "totalChapters": { "integerValue": "20" },
                "lastNotifiedCount": { "integerValue": "20" },
            }
        })
    );
    Ok(())
}

#[tokio::test]
async fn firestore_error_message_is_surfaced() {
    let site = StubSite::spawn(vec![route(
        &format!("{ROOT}/users"),
        403,
        r#"{"error":{"code":403,"message":"Missing or insufficient permissions."}}"#,
    )]);
    let store = FirestoreNovelStore::new(&site.url("/v1"), "p", "token").unwrap();
    let err = store.list_users().await.unwrap_err();
    assert!(format!("{err:#}").contains("Missing or insufficient permissions."));
}
