//! Chapter-count resolution: walk the strategy chain for a URL and return
//! the first confident non-zero count.
//!
//! Per call the resolver moves through `Unresolved -> Trying(i) ->
//! {Resolved | Trying(i + 1) | Exhausted}`. A strategy error counts as a zero
//! from that strategy; nothing a strategy does can abort the call. Exhausted
//! resolves to `0`, which callers treat as "no update, no error".

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use anyhow::Context as _;
use serde::Serialize;

use crate::cli::ResolveArgs;
use crate::fetch::{FetchFailure, Fetched, Fetcher, RequestKind};
use crate::relay::ProxyRelay;
use crate::sites::{SiteFamily, SiteRegistry};

/// Mirror lookups may recurse into a sibling site's chain this many levels.
pub const MAX_MIRROR_DEPTH: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Resolved { count: u32 },
    Empty,
    Succeeded,
    Failed { reason: String },
}

/// One strategy run, or one fetch step inside a strategy. Kept for
/// escalation logging only.
#[derive(Debug, Clone, Serialize)]
pub struct StrategyAttempt {
    pub family: Option<SiteFamily>,
    pub strategy: String,
    pub target: String,
    pub depth: u8,
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChapterCountResult {
    /// `0` means unresolved, never "zero chapters".
    pub count: u32,
    pub method: Option<String>,
    pub attempts: Vec<StrategyAttempt>,
}

impl ChapterCountResult {
    pub fn is_resolved(&self) -> bool {
        self.count > 0
    }
}

pub struct Resolver {
    fetcher: Arc<Fetcher>,
    relay: ProxyRelay,
    registry: Arc<SiteRegistry>,
}

impl Resolver {
    pub fn new(fetcher: Arc<Fetcher>, relay: ProxyRelay, registry: Arc<SiteRegistry>) -> Self {
        Self {
            fetcher,
            relay,
            registry,
        }
    }

    pub fn fetcher(&self) -> &Arc<Fetcher> {
        &self.fetcher
    }

    pub fn registry(&self) -> &SiteRegistry {
        &self.registry
    }

    pub async fn resolve(&self, url: &str) -> ChapterCountResult {
        self.resolve_at_depth(url, 0).await
    }

    fn resolve_at_depth<'a>(
        &'a self,
        url: &'a str,
        depth: u8,
    ) -> Pin<Box<dyn Future<Output = ChapterCountResult> + Send + 'a>> {
        Box::pin(async move {
            let entry = self.registry.lookup(url);
            let family = entry.map(|e| e.family);
            let chain = entry.map(|e| e.chain.as_slice()).unwrap_or(&[]);
            let session = Session::new(self, depth, family);

            if chain.is_empty() {
                tracing::debug!(url, "no strategy chain for host");
            }

            for strategy in chain {
                let name = strategy.name();
                let outcome = match strategy.attempt(&session, url).await {
                    Ok(count) if count > 0 => {
                        tracing::debug!(url, strategy = name, count, depth, "strategy resolved");
                        session.record_step(name, url, AttemptOutcome::Resolved { count });
                        return ChapterCountResult {
                            count,
                            method: Some(name.to_owned()),
                            attempts: session.into_attempts(),
                        };
                    }
                    Ok(_) => AttemptOutcome::Empty,
                    Err(err) => AttemptOutcome::Failed {
                        reason: format!("{err:#}"),
                    },
                };
                tracing::debug!(url, strategy = name, depth, ?outcome, "strategy yielded nothing");
                session.record_step(name, url, outcome);
            }

            ChapterCountResult {
                count: 0,
                method: None,
                attempts: session.into_attempts(),
            }
        })
    }
}

/// Per-call state handed to strategies: the shared fetch session, a page
/// cache so sibling strategies do not refetch the series page, and the
/// attempt ledger.
pub struct Session<'a> {
    resolver: &'a Resolver,
    depth: u8,
    family: Option<SiteFamily>,
    pages: Mutex<HashMap<String, Result<Arc<str>, FetchFailure>>>,
    attempts: Mutex<Vec<StrategyAttempt>>,
}

impl<'a> Session<'a> {
    fn new(resolver: &'a Resolver, depth: u8, family: Option<SiteFamily>) -> Self {
        Self {
            resolver,
            depth,
            family,
            pages: Mutex::new(HashMap::new()),
            attempts: Mutex::new(Vec::new()),
        }
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.resolver.fetcher
    }

    pub fn relay(&self) -> &ProxyRelay {
        &self.resolver.relay
    }

    /// Uncached fetch (archive endpoints, feeds).
    pub async fn fetch(&self, url: &str, kind: RequestKind) -> Result<Fetched, FetchFailure> {
        self.fetcher().fetch(url, kind).await
    }

    /// Cached page body; failures are cached too so a blocked page is hit once.
    pub async fn page(&self, url: &str) -> Result<Arc<str>, FetchFailure> {
        let cached = lock(&self.pages).get(url).cloned();
        if let Some(cached) = cached {
            return cached;
        }
        let result = self
            .fetcher()
            .fetch(url, RequestKind::Page)
            .await
            .map(|fetched| Arc::<str>::from(fetched.body));
        lock(&self.pages).insert(url.to_owned(), result.clone());
        result
    }

    pub fn record_step(&self, strategy: &str, target: &str, outcome: AttemptOutcome) {
        lock(&self.attempts).push(StrategyAttempt {
            family: self.family,
            strategy: strategy.to_owned(),
            target: target.to_owned(),
            depth: self.depth,
            outcome,
        });
    }

    /// Resolves `url` with its own site's chain, one level deeper. Past
    /// [`MAX_MIRROR_DEPTH`] this yields an unresolved result without fetching.
    pub async fn resolve_mirror(&self, url: &str) -> ChapterCountResult {
        if self.depth >= MAX_MIRROR_DEPTH {
            tracing::debug!(url, depth = self.depth, "mirror depth exhausted");
            return ChapterCountResult {
                count: 0,
                method: None,
                attempts: Vec::new(),
            };
        }
        let result = self.resolver.resolve_at_depth(url, self.depth + 1).await;
        lock(&self.attempts).extend(result.attempts.iter().cloned());
        result
    }

    fn into_attempts(self) -> Vec<StrategyAttempt> {
        self.attempts
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Serialize)]
struct ResolveReport<'a> {
    url: &'a str,
    normalized_url: &'a str,
    #[serde(flatten)]
    result: &'a ChapterCountResult,
}

/// `novelwatch resolve`: normalize, resolve and print the result as JSON.
pub async fn run(args: ResolveArgs) -> anyhow::Result<()> {
    let registry = Arc::new(SiteRegistry::with_defaults().context("build site registry")?);
    let fetcher = Arc::new(Fetcher::new(args.fetch.to_config()).context("build fetcher")?);
    let relay = ProxyRelay::new(crate::config::relay_templates_from_env());
    let resolver = Resolver::new(fetcher, relay, Arc::clone(&registry));

    let normalized = crate::normalize::normalize(&args.url, &registry);
    let result = resolver.resolve(&normalized).await;
    if !result.is_resolved() {
        tracing::warn!(url = %normalized, "chapter count unresolved");
    }

    let report = ResolveReport {
        url: &args.url,
        normalized_url: &normalized,
        result: &result,
    };
    println!("{}", serde_json::to_string(&report).context("serialize resolve report")?);
    Ok(())
}
