//! Third-party relay endpoints used when a direct fetch is blocked.
//!
//! A relay template contains `{url}`, which is replaced by the target URL
//! verbatim. Endpoints are tried strictly in order; every try is reported
//! back as a [`RelayStep`] so the caller can record the escalation path.

use crate::fetch::{FetchFailure, Fetched, Fetcher, RequestKind};

pub const DEFAULT_RELAY_TEMPLATES: &[&str] = &[
    "https://api.allorigins.win/raw?url={url}",
    "https://corsproxy.io/?url={url}",
    "https://api.codetabs.com/v1/proxy?quest={url}",
];

#[derive(Debug, Clone)]
pub struct RelayStep {
    pub endpoint: String,
    pub outcome: Result<(), FetchFailure>,
}

#[derive(Debug)]
pub struct RelayOutcome {
    pub response: Result<Fetched, FetchFailure>,
    pub steps: Vec<RelayStep>,
}

#[derive(Debug, Clone, Default)]
pub struct ProxyRelay {
    templates: Vec<String>,
}

impl ProxyRelay {
    pub fn new(templates: Vec<String>) -> Self {
        let templates = templates
            .into_iter()
            .map(|t| t.trim().to_owned())
            .filter(|t| !t.is_empty())
            .collect();
        Self { templates }
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn endpoints(&self, target: &str) -> Vec<String> {
        self.templates
            .iter()
            .map(|template| wrap(template, target))
            .collect()
    }

    pub async fn relay(&self, fetcher: &Fetcher, target: &str, kind: RequestKind) -> RelayOutcome {
        let mut steps = Vec::with_capacity(self.templates.len());
        for endpoint in self.endpoints(target) {
            match fetcher.fetch(&endpoint, kind).await {
                Ok(fetched) => {
                    steps.push(RelayStep {
                        endpoint,
                        outcome: Ok(()),
                    });
                    return RelayOutcome {
                        response: Ok(fetched),
                        steps,
                    };
                }
                Err(failure) => {
                    tracing::debug!(endpoint, target, %failure, "relay attempt failed");
                    steps.push(RelayStep {
                        endpoint,
                        outcome: Err(failure),
                    });
                }
            }
        }

        RelayOutcome {
            response: Err(FetchFailure::RelayExhausted),
            steps,
        }
    }
}

fn wrap(template: &str, target: &str) -> String {
    if template.contains("{url}") {
        template.replace("{url}", target)
    } else {
        format!("{template}{target}")
    }
}
