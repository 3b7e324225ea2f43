//! Site strategy registry.
//!
//! A tracked URL is matched against a small table by substring on its
//! `host[:port]`. Each entry carries the ordered chain of strategies for its
//! site family plus the sub-path markers the URL normalizer truncates at.
//! Adding a site means adding one entry here; the resolver never changes.

pub mod archive;
pub mod markup;
pub mod rss;
pub mod static_list;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use url::Url;

use crate::fetch::host_key;
use crate::resolver::Session;

pub use archive::ArchiveSite;
pub use rss::{MirrorRule, RssSite};
pub use static_list::StaticListSite;

/// One way of determining a chapter count. `Ok(0)` and `Err` both mean
/// "this strategy could not tell"; the resolver moves on to the next one.
#[async_trait]
pub trait CountStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn attempt(&self, session: &Session<'_>, url: &str) -> anyhow::Result<u32>;
}

pub type StrategyChain = Vec<Arc<dyn CountStrategy>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SiteFamily {
    Archive,
    Rss,
    StaticList,
}

/// A path segment that marks a non-root page of a series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubpathMarker {
    /// Segment equals the marker (`glossary`, `stats`).
    Segment(String),
    /// Segment starts with the marker (`chapter-` matches `chapter-12`).
    Prefix(String),
}

impl SubpathMarker {
    pub fn segment(name: &str) -> Self {
        Self::Segment(name.to_owned())
    }

    pub fn prefix(prefix: &str) -> Self {
        Self::Prefix(prefix.to_owned())
    }

    pub fn matches(&self, segment: &str) -> bool {
        match self {
            Self::Segment(name) => segment.eq_ignore_ascii_case(name),
            Self::Prefix(prefix) => segment
                .get(..prefix.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(prefix)),
        }
    }
}

pub struct SiteEntry {
    pub pattern: String,
    pub family: SiteFamily,
    pub markers: Vec<SubpathMarker>,
    pub chain: StrategyChain,
}

impl SiteEntry {
    pub fn archive(pattern: &str, site: ArchiveSite) -> Self {
        Self {
            pattern: pattern.to_owned(),
            family: SiteFamily::Archive,
            markers: Vec::new(),
            chain: site.chain(),
        }
    }

    pub fn rss(pattern: &str, site: RssSite) -> anyhow::Result<Self> {
        Ok(Self {
            pattern: pattern.to_owned(),
            family: SiteFamily::Rss,
            markers: Vec::new(),
            chain: site.chain()?,
        })
    }

    pub fn static_list(pattern: &str, site: StaticListSite) -> Self {
        Self {
            pattern: pattern.to_owned(),
            family: SiteFamily::StaticList,
            markers: Vec::new(),
            chain: site.chain(),
        }
    }

    pub fn with_markers(mut self, markers: Vec<SubpathMarker>) -> Self {
        self.markers = markers;
        self
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.chain.iter().map(|s| s.name()).collect()
    }
}

impl std::fmt::Debug for SiteEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiteEntry")
            .field("pattern", &self.pattern)
            .field("family", &self.family)
            .field("markers", &self.markers)
            .field("chain", &self.strategy_names())
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct SiteRegistry {
    entries: Vec<SiteEntry>,
}

impl SiteRegistry {
    pub fn new(entries: Vec<SiteEntry>) -> Self {
        Self { entries }
    }

    pub fn with_defaults() -> anyhow::Result<Self> {
        Ok(Self::new(vec![
            SiteEntry::archive("novelbin", ArchiveSite::novelbin())
                .with_markers(vec![SubpathMarker::prefix("chapter-")]),
            SiteEntry::archive("readnovelfull", ArchiveSite::readnovelfull()),
            SiteEntry::rss("scribblehub", RssSite::scribblehub())?.with_markers(vec![
                SubpathMarker::segment("glossary"),
                SubpathMarker::segment("stats"),
                SubpathMarker::segment("discussion"),
                SubpathMarker::segment("reviews"),
                SubpathMarker::segment("chapter"),
            ]),
            SiteEntry::static_list("freewebnovel", StaticListSite::freewebnovel()),
        ]))
    }

    pub fn lookup(&self, url: &str) -> Option<&SiteEntry> {
        let parsed = Url::parse(url).ok()?;
        let host = host_key(&parsed)?.to_ascii_lowercase();
        self.entries
            .iter()
            .find(|entry| host.contains(&entry.pattern.to_ascii_lowercase()))
    }

    /// Empty for hosts the table does not know.
    pub fn chain_for(&self, url: &str) -> &[Arc<dyn CountStrategy>] {
        self.lookup(url)
            .map(|entry| entry.chain.as_slice())
            .unwrap_or(&[])
    }
}
