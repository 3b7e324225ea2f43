use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use quick_xml::Reader;
use quick_xml::events::Event;
use regex::Regex;
use url::Url;

use super::markup;
use super::static_list::strings;
use super::{CountStrategy, StrategyChain};
use crate::fetch::RequestKind;
use crate::resolver::{AttemptOutcome, Session};

/// Sites that publish a per-series RSS feed but sit behind aggressive
/// anti-bot protection.
#[derive(Debug, Clone)]
pub struct RssSite {
    /// Regex with one capture group: the numeric series id in the URL path.
    pub series_id_pattern: String,
    /// Absolute path (with query) of the feed; `{id}` is replaced.
    pub feed_path: String,
    /// Numbers at or above this are never chapter numbers (years, ids).
    pub ceiling: u32,
    pub mirror: Option<MirrorRule>,
    pub badge_selectors: Vec<String>,
}

/// Rebuilds an equivalent series URL on a sibling site.
#[derive(Debug, Clone)]
pub struct MirrorRule {
    /// Regex with one capture group: the series slug.
    pub slug_pattern: String,
    /// Target URL; `{slug}` is replaced.
    pub template: String,
}

impl RssSite {
    pub fn scribblehub() -> Self {
        Self {
            series_id_pattern: r"/series/(\d+)".to_owned(),
            feed_path: "/rssfeed.php?type=series&sid={id}".to_owned(),
            ceiling: 10_000,
            mirror: Some(MirrorRule {
                slug_pattern: r"/series/\d+/([^/?#]+)".to_owned(),
                template: "https://novelbin.com/b/{slug}".to_owned(),
            }),
            badge_selectors: strings(&["span.cnt_chapter", "div.cnt_toc"]),
        }
    }

    pub fn chain(self) -> anyhow::Result<StrategyChain> {
        let mut chain: StrategyChain = vec![Arc::new(RssFeed {
            series_id: Regex::new(&self.series_id_pattern).context("compile series id pattern")?,
            feed_path: self.feed_path,
            ceiling: self.ceiling,
        })];
        if let Some(mirror) = self.mirror {
            chain.push(Arc::new(MirrorLookup {
                slug: Regex::new(&mirror.slug_pattern).context("compile mirror slug pattern")?,
                template: mirror.template,
            }));
        }
        chain.push(Arc::new(CountBadge {
            selectors: self.badge_selectors,
        }));
        Ok(chain)
    }
}

fn first_capture(pattern: &Regex, text: &str) -> Option<String> {
    pattern
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_owned())
        .filter(|value| !value.is_empty())
}

/// Direct feed fetch, escalating through the relay list when blocked.
#[derive(Debug, Clone)]
pub struct RssFeed {
    series_id: Regex,
    feed_path: String,
    ceiling: u32,
}

impl RssFeed {
    fn feed_url(&self, series_url: &str) -> anyhow::Result<Option<String>> {
        let base = Url::parse(series_url).context("parse series url")?;
        let Some(id) = first_capture(&self.series_id, base.path()) else {
            return Ok(None);
        };
        let path = self.feed_path.replace("{id}", &id);
        let joined = base
            .join(&path)
            .with_context(|| format!("join feed path {path:?}"))?;
        Ok(Some(joined.to_string()))
    }
}

#[async_trait]
impl CountStrategy for RssFeed {
    fn name(&self) -> &'static str {
        "rss-feed"
    }

    async fn attempt(&self, session: &Session<'_>, url: &str) -> anyhow::Result<u32> {
        let Some(feed_url) = self.feed_url(url)? else {
            tracing::debug!(url, "no series id in url");
            return Ok(0);
        };

        let body = match session.fetch(&feed_url, RequestKind::Ajax).await {
            Ok(fetched) => {
                session.record_step("rss-feed/direct", &feed_url, AttemptOutcome::Succeeded);
                fetched.body
            }
            Err(failure) => {
                tracing::debug!(feed_url, %failure, "direct feed fetch failed; trying relays");
                session.record_step(
                    "rss-feed/direct",
                    &feed_url,
                    AttemptOutcome::Failed {
                        reason: failure.to_string(),
                    },
                );

                let outcome = session
                    .relay()
                    .relay(session.fetcher(), &feed_url, RequestKind::Ajax)
                    .await;
                for (index, step) in outcome.steps.iter().enumerate() {
                    let result = match &step.outcome {
                        Ok(()) => AttemptOutcome::Succeeded,
                        Err(failure) => AttemptOutcome::Failed {
                            reason: failure.to_string(),
                        },
                    };
                    session.record_step(&format!("rss-feed/relay#{}", index + 1), &step.endpoint, result);
                }
                outcome
                    .response
                    .with_context(|| format!("feed unavailable directly and via relays: {feed_url}"))?
                    .body
            }
        };

        let titles = item_titles(&body).context("parse feed")?;
        Ok(markup::max_below_ceiling(&titles, self.ceiling))
    }
}

/// Titles of every `<item>` in an RSS 2.0 document (plain text or CDATA).
pub fn item_titles(xml: &str) -> anyhow::Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut titles = Vec::new();

    let mut in_item = false;
    let mut in_title = false;
    let mut current = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"item" | b"entry" => in_item = true,
                b"title" if in_item => {
                    in_title = true;
                    current.clear();
                }
                _ => {}
            },
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"item" | b"entry" => in_item = false,
                b"title" if in_title => {
                    in_title = false;
                    let title = markup::collapse_whitespace(&current);
                    if !title.is_empty() {
                        titles.push(title);
                    }
                }
                _ => {}
            },
            Ok(Event::Text(t)) if in_title => {
                let text = t.unescape().context("unescape title text")?;
                current.push_str(&text);
            }
            Ok(Event::CData(t)) if in_title => {
                current.push_str(&String::from_utf8_lossy(&t));
            }
            Ok(Event::Eof) => break,
            Err(err) => {
                return Err(anyhow::anyhow!(
                    "xml error at byte {}: {err}",
                    reader.buffer_position()
                ));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(titles)
}

/// Resolves the same series on a sibling site through that site's chain.
#[derive(Debug, Clone)]
pub struct MirrorLookup {
    slug: Regex,
    template: String,
}

impl MirrorLookup {
    fn mirror_url(&self, url: &str) -> Option<String> {
        let path = Url::parse(url).ok()?.path().to_owned();
        let slug = first_capture(&self.slug, &path)?;
        Some(self.template.replace("{slug}", &slug))
    }
}

#[async_trait]
impl CountStrategy for MirrorLookup {
    fn name(&self) -> &'static str {
        "mirror-lookup"
    }

    async fn attempt(&self, session: &Session<'_>, url: &str) -> anyhow::Result<u32> {
        let Some(mirror_url) = self.mirror_url(url) else {
            return Ok(0);
        };
        if mirror_url == url {
            anyhow::bail!("mirror url is the source url: {mirror_url}");
        }
        let result = session.resolve_mirror(&mirror_url).await;
        Ok(result.count)
    }
}

/// Visible chapter-count badge on the series page.
#[derive(Debug, Clone)]
pub struct CountBadge {
    pub selectors: Vec<String>,
}

#[async_trait]
impl CountStrategy for CountBadge {
    fn name(&self) -> &'static str {
        "count-badge"
    }

    async fn attempt(&self, session: &Session<'_>, url: &str) -> anyhow::Result<u32> {
        let page = session.page(url).await.context("load series page")?;
        let badge = markup::first_text(&page, &self.selectors)?;
        Ok(badge.as_deref().and_then(markup::parse_count_badge).unwrap_or(0))
    }
}
