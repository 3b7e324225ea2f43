//! Per-host request pacing.
//!
//! Every scrape target host gets its own lane: requests to one host are
//! serialized and each one waits a randomized politeness delay first.
//! Requests to different hosts never wait on each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::Rng as _;
use tokio::sync::OwnedMutexGuard;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolitenessConfig {
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl PolitenessConfig {
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            min_delay,
            max_delay: max_delay.max(min_delay),
        }
    }

    /// No delay at all; used by tests and one-off lookups against local stubs.
    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    pub fn sample(&self) -> Duration {
        let min_ms = self.min_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;
        if max_ms <= min_ms {
            return self.min_delay;
        }
        Duration::from_millis(rand::thread_rng().gen_range(min_ms..=max_ms))
    }
}

impl Default for PolitenessConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(2), Duration::from_secs(4))
    }
}

/// Holding the returned guard keeps the host lane busy.
pub type HostTurn = OwnedMutexGuard<()>;

#[derive(Debug)]
pub struct HostPacer {
    config: PolitenessConfig,
    lanes: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl HostPacer {
    pub fn new(config: PolitenessConfig) -> Self {
        Self {
            config,
            lanes: Mutex::new(HashMap::new()),
        }
    }

    /// Waits for the host lane, then sleeps the politeness delay.
    pub async fn turn(&self, host: &str) -> HostTurn {
        let lane = {
            let mut lanes = self
                .lanes
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            Arc::clone(lanes.entry(host.to_owned()).or_default())
        };

        let turn = lane.lock_owned().await;
        let delay = self.config.sample();
        if !delay.is_zero() {
            tracing::trace!(host, delay_ms = delay.as_millis() as u64, "politeness delay");
            tokio::time::sleep(delay).await;
        }
        turn
    }
}
