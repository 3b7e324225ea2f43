#![allow(dead_code)]

use std::io::Read as _;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use novelwatch::fetch::{FetchConfig, Fetcher};
use novelwatch::politeness::PolitenessConfig;
use novelwatch::relay::ProxyRelay;
use novelwatch::resolver::Resolver;
use novelwatch::sites::SiteRegistry;

#[derive(Debug, Clone)]
pub struct Route {
    /// Matched against the full request target first, then against its path.
    pub target: String,
    pub status: u16,
    pub body: String,
    /// Held before responding. The stub answers one request at a time, so a
    /// slow route stalls the whole site.
    pub delay: Duration,
}

pub fn route(target: &str, status: u16, body: &str) -> Route {
    Route {
        target: target.to_owned(),
        status,
        body: body.to_owned(),
        delay: Duration::ZERO,
    }
}

pub fn slow_route(target: &str, delay: Duration, status: u16, body: &str) -> Route {
    Route {
        delay,
        ..route(target, status, body)
    }
}

#[derive(Debug, Clone)]
pub struct Hit {
    pub method: String,
    pub target: String,
    pub body: String,
}

/// Canned HTTP site on `127.0.0.1:0` that records every request it sees.
pub struct StubSite {
    pub base_url: String,
    pub host: String,
    hits: Arc<Mutex<Vec<Hit>>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl StubSite {
    pub fn spawn(routes: Vec<Route>) -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start stub site");
        let addr = server.server_addr();
        let host = addr.to_string();
        let base_url = format!("http://{host}");
        let hits = Arc::new(Mutex::new(Vec::new()));
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let recorded = Arc::clone(&hits);
        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let mut request = match server.recv_timeout(Duration::from_millis(20)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let target = request.url().to_string();
                let mut body = String::new();
                let _ = request.as_reader().read_to_string(&mut body);
                recorded.lock().unwrap().push(Hit {
                    method: request.method().to_string(),
                    target: target.clone(),
                    body,
                });

                let path = target.split('?').next().unwrap_or(&target);
                let found = routes
                    .iter()
                    .find(|r| r.target == target)
                    .or_else(|| routes.iter().find(|r| r.target == path));
                let response = match found {
                    Some(r) => {
                        if !r.delay.is_zero() {
                            thread::sleep(r.delay);
                        }
                        tiny_http::Response::from_string(r.body.clone()).with_status_code(r.status)
                    }
                    None => tiny_http::Response::from_string("not found").with_status_code(404),
                };
                let _ = request.respond(response);
            }
        });

        Self {
            base_url,
            host,
            hits,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub fn hits(&self) -> Vec<Hit> {
        self.hits.lock().unwrap().clone()
    }

    pub fn hit_count(&self) -> usize {
        self.hits.lock().unwrap().len()
    }
}

impl Drop for StubSite {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

pub fn fast_fetcher() -> Fetcher {
    fetcher_with_timeouts(Duration::from_secs(5), Duration::from_secs(5))
}

pub fn fetcher_with_timeouts(page_timeout: Duration, ajax_timeout: Duration) -> Fetcher {
    Fetcher::new(FetchConfig {
        page_timeout,
        ajax_timeout,
        politeness: PolitenessConfig::none(),
    })
    .expect("build fetcher")
}

pub fn resolver(registry: SiteRegistry, relays: Vec<String>) -> Resolver {
    resolver_with_fetcher(fast_fetcher(), registry, relays)
}

pub fn resolver_with_fetcher(
    fetcher: Fetcher,
    registry: SiteRegistry,
    relays: Vec<String>,
) -> Resolver {
    Resolver::new(Arc::new(fetcher), ProxyRelay::new(relays), Arc::new(registry))
}

pub fn rss(items: &[&str]) -> String {
    let items = items
        .iter()
        .map(|title| format!("<item><title>{title}</title><link>http://x/</link></item>"))
        .collect::<String>();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><rss version="2.0"><channel><title>Feed</title>{items}</channel></rss>"#
    )
}

pub const CHALLENGE_PAGE: &str =
    "<html><head><title>Just a moment...</title></head><body>checking</body></html>";
