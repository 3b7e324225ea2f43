use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;

use super::markup;
use super::{CountStrategy, StrategyChain};
use crate::resolver::Session;

/// Sites whose series page shows a "latest chapter" label and a plain list.
#[derive(Debug, Clone)]
pub struct StaticListSite {
    pub label_selectors: Vec<String>,
    pub list_selectors: Vec<String>,
}

impl StaticListSite {
    pub fn freewebnovel() -> Self {
        Self {
            label_selectors: strings(&["div.m-newest1 a.con", "div.m-imgtxt a.chapter"]),
            list_selectors: strings(&["div.m-newest2 ul li", "ul#idData li"]),
        }
    }

    pub fn chain(self) -> StrategyChain {
        vec![
            Arc::new(LatestChapterLabel {
                selectors: self.label_selectors,
            }),
            Arc::new(VisibleList {
                selectors: self.list_selectors,
            }),
        ]
    }
}

/// Reads the number off a "latest chapter" label on the series page.
#[derive(Debug, Clone)]
pub struct LatestChapterLabel {
    pub selectors: Vec<String>,
}

#[async_trait]
impl CountStrategy for LatestChapterLabel {
    fn name(&self) -> &'static str {
        "latest-chapter-label"
    }

    async fn attempt(&self, session: &Session<'_>, url: &str) -> anyhow::Result<u32> {
        let page = session.page(url).await.context("load series page")?;
        let label = markup::first_text(&page, &self.selectors)?;
        Ok(label
            .as_deref()
            .and_then(markup::chapter_number_from_label)
            .unwrap_or(0))
    }
}

/// Counts visible list entries. One page of a paginated list at most, so a
/// lower bound; chains keep it last.
#[derive(Debug, Clone)]
pub struct VisibleList {
    pub selectors: Vec<String>,
}

#[async_trait]
impl CountStrategy for VisibleList {
    fn name(&self) -> &'static str {
        "visible-list"
    }

    async fn attempt(&self, session: &Session<'_>, url: &str) -> anyhow::Result<u32> {
        let page = session.page(url).await.context("load series page")?;
        markup::count_first_matching(&page, &self.selectors)
    }
}

pub(crate) fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| (*v).to_owned()).collect()
}
