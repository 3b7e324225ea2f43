//! Outbound HTTP with a browser-like profile.
//!
//! This is the only place that knows about anti-bot defenses. Failures come
//! back as [`FetchFailure`] values; callers decide whether to escalate.

use std::time::Duration;

use anyhow::Context as _;
use reqwest::header::{
    ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, HeaderMap, HeaderName, HeaderValue, USER_AGENT,
};
use url::Url;

use crate::politeness::{HostPacer, PolitenessConfig};

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Challenge-script identifiers. Never part of real chapter content, so they
/// mark a block at any status.
const CHALLENGE_SCRIPT_MARKERS: &[&str] = &["cf-browser-verification", "cf_chl_opt"];

/// Interstitial wording. Chapter titles can quote these, so they only count
/// on a denial status.
const CHALLENGE_PHRASES: &[&str] = &[
    "Just a moment...",
    "Attention Required! | Cloudflare",
    "Enable JavaScript and cookies to continue",
];

/// Statuses challenge interstitials are served with.
const CHALLENGE_STATUSES: &[u16] = &[403, 429, 503];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// A normal series/chapter page load.
    Page,
    /// Hidden archive endpoints and feeds; slower, so they get a longer timeout.
    Ajax,
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub page_timeout: Duration,
    pub ajax_timeout: Duration,
    pub politeness: PolitenessConfig,
}

impl FetchConfig {
    pub fn timeout_for(&self, kind: RequestKind) -> Duration {
        match kind {
            RequestKind::Page => self.page_timeout,
            RequestKind::Ajax => self.ajax_timeout,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            page_timeout: Duration::from_secs(20),
            ajax_timeout: Duration::from_secs(40),
            politeness: PolitenessConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Fetched {
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchFailure {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("http status {0}")]
    Status(u16),
    #[error("blocked by anti-bot challenge (http {0})")]
    Blocked(u16),
    #[error("no relay endpoint succeeded")]
    RelayExhausted,
}

/// Long-lived session: one connection pool and cookie jar for a whole pass.
#[derive(Debug)]
pub struct Fetcher {
    client: reqwest::Client,
    config: FetchConfig,
    pacer: HostPacer,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .default_headers(browser_headers())
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::limited(10))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("build scrape http client")?;

        Ok(Self {
            client,
            pacer: HostPacer::new(config.politeness),
            config,
        })
    }

    pub async fn fetch(&self, url: &str, kind: RequestKind) -> Result<Fetched, FetchFailure> {
        let parsed = Url::parse(url).map_err(|err| FetchFailure::InvalidUrl(format!("{url}: {err}")))?;
        let host = host_key(&parsed).ok_or_else(|| FetchFailure::InvalidUrl(url.to_owned()))?;
        let timeout = self.config.timeout_for(kind);

        let _turn = self.pacer.turn(&host).await;

        let mut request = self.client.get(parsed).timeout(timeout);
        if kind == RequestKind::Ajax {
            request = request
                .header("X-Requested-With", "XMLHttpRequest")
                .header(ACCEPT, "*/*");
        }

        let response = request.send().await.map_err(|err| classify(err, timeout))?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|err| classify(err, timeout))?;

        if is_blocked(status, &body) {
            tracing::debug!(url, status, "anti-bot challenge detected");
            return Err(FetchFailure::Blocked(status));
        }
        if !(200..300).contains(&status) {
            return Err(FetchFailure::Status(status));
        }

        Ok(Fetched { body })
    }
}

/// `host[:port]`; the unit of pacing and of site matching.
pub fn host_key(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_owned(),
    })
}

/// Whether a response is an anti-bot interstitial instead of the page asked for.
pub fn is_blocked(status: u16, body: &str) -> bool {
    if CHALLENGE_SCRIPT_MARKERS.iter().any(|marker| body.contains(marker)) {
        return true;
    }
    CHALLENGE_STATUSES.contains(&status) && CHALLENGE_PHRASES.iter().any(|p| body.contains(p))
}

fn classify(err: reqwest::Error, timeout: Duration) -> FetchFailure {
    if err.is_timeout() {
        FetchFailure::Timeout(timeout)
    } else {
        FetchFailure::Transport(err.to_string())
    }
}

fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(
        HeaderName::from_static("upgrade-insecure-requests"),
        HeaderValue::from_static("1"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-mode"),
        HeaderValue::from_static("navigate"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-site"),
        HeaderValue::from_static("none"),
    );
    headers
}
