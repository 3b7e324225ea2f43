use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use url::Url;

use super::markup;
use super::static_list::{LatestChapterLabel, VisibleList, strings};
use super::{CountStrategy, StrategyChain};
use crate::fetch::RequestKind;
use crate::resolver::Session;

/// Sites that embed an internal series id in the page and serve the full
/// chapter list from a hidden AJAX endpoint keyed by it.
#[derive(Debug, Clone)]
pub struct ArchiveSite {
    /// Elements carrying the series id in `id_attr`.
    pub id_selectors: Vec<String>,
    pub id_attr: String,
    /// Absolute path (with query) of the archive endpoint; `{id}` is replaced.
    pub archive_path: String,
    pub archive_entry_selectors: Vec<String>,
    pub label_selectors: Vec<String>,
    pub list_selectors: Vec<String>,
}

impl ArchiveSite {
    pub fn novelbin() -> Self {
        Self {
            id_selectors: strings(&["#rating[data-novel-id]", "[data-novel-id]"]),
            id_attr: "data-novel-id".to_owned(),
            archive_path: "/ajax/chapter-archive?novelId={id}".to_owned(),
            archive_entry_selectors: strings(&["ul.list-chapter li", "select option"]),
            label_selectors: strings(&["div.l-chapter a.chapter-title", "a.chapter-title"]),
            list_selectors: strings(&["ul.list-chapter li"]),
        }
    }

    pub fn readnovelfull() -> Self {
        Self {
            label_selectors: strings(&["div.l-chapter a.chapter-title", "div.item-value a"]),
            ..Self::novelbin()
        }
    }

    pub fn chain(self) -> StrategyChain {
        vec![
            Arc::new(ArchiveProbe {
                id_selectors: self.id_selectors,
                id_attr: self.id_attr,
                archive_path: self.archive_path,
                entry_selectors: self.archive_entry_selectors,
            }),
            Arc::new(LatestChapterLabel {
                selectors: self.label_selectors,
            }),
            Arc::new(VisibleList {
                selectors: self.list_selectors,
            }),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct ArchiveProbe {
    pub id_selectors: Vec<String>,
    pub id_attr: String,
    pub archive_path: String,
    pub entry_selectors: Vec<String>,
}

impl ArchiveProbe {
    fn archive_url(&self, series_url: &str, series_id: &str) -> anyhow::Result<String> {
        let base = Url::parse(series_url).context("parse series url")?;
        let path = self.archive_path.replace("{id}", series_id);
        let joined = base
            .join(&path)
            .with_context(|| format!("join archive path {path:?}"))?;
        Ok(joined.to_string())
    }
}

#[async_trait]
impl CountStrategy for ArchiveProbe {
    fn name(&self) -> &'static str {
        "archive-probe"
    }

    async fn attempt(&self, session: &Session<'_>, url: &str) -> anyhow::Result<u32> {
        let page = session.page(url).await.context("load series page")?;
        let Some(series_id) = markup::first_attr(&page, &self.id_selectors, &self.id_attr)? else {
            tracing::debug!(url, "no series id on page");
            return Ok(0);
        };

        let archive_url = self.archive_url(url, &series_id)?;
        let archive = session
            .fetch(&archive_url, RequestKind::Ajax)
            .await
            .with_context(|| format!("fetch chapter archive {archive_url}"))?;
        markup::count_first_matching(&archive.body, &self.entry_selectors)
    }
}
