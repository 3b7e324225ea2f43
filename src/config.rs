//! Environment configuration.
//!
//! Storage settings are mandatory and checked before any record is touched.
//! Notification settings are optional as a group: with any of the four
//! EmailJS values missing, notifications are skipped.

use std::sync::Arc;

use anyhow::Context as _;

use crate::notify::{DEFAULT_EMAILJS_API_URL, EmailJsConfig};
use crate::relay::DEFAULT_RELAY_TEMPLATES;
use crate::store::firestore::DEFAULT_FIRESTORE_BASE_URL;
use crate::store::{FirestoreNovelStore, LocalFsNovelStore, NovelStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    Firestore {
        base_url: String,
        project_id: String,
        access_token: String,
    },
    Local {
        path: String,
    },
}

impl StoreConfig {
    pub fn build(&self) -> anyhow::Result<Arc<dyn NovelStore>> {
        Ok(match self {
            Self::Firestore {
                base_url,
                project_id,
                access_token,
            } => Arc::new(
                FirestoreNovelStore::new(base_url, project_id, access_token)
                    .context("build firestore store")?,
            ),
            Self::Local { path } => Arc::new(LocalFsNovelStore::new(path)),
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Firestore { .. } => "firestore",
            Self::Local { .. } => "local",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub store: StoreConfig,
    pub email: Option<EmailJsConfig>,
    pub relay_templates: Vec<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };

        let store_kind = get("NOVELWATCH_STORE").unwrap_or_else(|| "firestore".to_owned());
        let store = match store_kind.to_ascii_lowercase().as_str() {
            "firestore" => StoreConfig::Firestore {
                base_url: get("FIRESTORE_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_FIRESTORE_BASE_URL.to_owned()),
                project_id: get("FIREBASE_PROJECT_ID")
                    .context("FIREBASE_PROJECT_ID is required for the firestore store")?,
                access_token: get("FIREBASE_ACCESS_TOKEN")
                    .context("FIREBASE_ACCESS_TOKEN is required for the firestore store")?,
            },
            "local" => StoreConfig::Local {
                path: get("NOVELWATCH_STORE_PATH")
                    .context("NOVELWATCH_STORE_PATH is required for the local store")?,
            },
            other => anyhow::bail!(
                "invalid NOVELWATCH_STORE={other:?}. expected one of: firestore, local"
            ),
        };

        let email = match (
            get("EMAILJS_SERVICE_ID"),
            get("EMAILJS_TEMPLATE_ID"),
            get("EMAILJS_PUBLIC_KEY"),
            get("EMAILJS_PRIVATE_KEY"),
        ) {
            (Some(service_id), Some(template_id), Some(public_key), Some(private_key)) => {
                Some(EmailJsConfig {
                    service_id,
                    template_id,
                    public_key,
                    private_key,
                    api_url: get("EMAILJS_API_URL")
                        .unwrap_or_else(|| DEFAULT_EMAILJS_API_URL.to_owned()),
                })
            }
            _ => None,
        };

        Ok(Self {
            store,
            email,
            relay_templates: relay_templates(get("NOVELWATCH_PROXIES")),
        })
    }
}

/// Relay templates from `NOVELWATCH_PROXIES` (comma separated), or the
/// built-in list. `NOVELWATCH_PROXIES=none` disables relaying.
pub fn relay_templates_from_env() -> Vec<String> {
    relay_templates(env_lookup("NOVELWATCH_PROXIES").filter(|v| !v.trim().is_empty()))
}

fn relay_templates(raw: Option<String>) -> Vec<String> {
    match raw {
        Some(raw) if raw.trim().eq_ignore_ascii_case("none") => Vec::new(),
        Some(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_owned)
            .collect(),
        None => DEFAULT_RELAY_TEMPLATES
            .iter()
            .map(|t| (*t).to_owned())
            .collect(),
    }
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}
