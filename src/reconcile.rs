//! One reconciliation pass over every stored novel record.
//!
//! Per record: normalize the URL, resolve the chapter count, fill in a
//! placeholder title, store the count and decide whether the reader gets a
//! notification. Everything a record needs written goes out as a single
//! partial update. A failing record never aborts the pass.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::Context as _;
use serde::Serialize;
use url::Url;

use crate::cli::{CountPolicy, ReconcileArgs};
use crate::config::Config;
use crate::fetch::{Fetcher, host_key};
use crate::normalize::normalize;
use crate::notify::{EmailJsNotifier, Notifier};
use crate::relay::ProxyRelay;
use crate::resolver::Resolver;
use crate::sites::SiteRegistry;
use crate::store::{NovelRecord, NovelStore, RecordPatch};
use crate::title::resolve_title;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOptions {
    pub count_policy: CountPolicy,
    /// Host groups processed at once; `1` keeps the pass fully sequential.
    pub concurrency: usize,
    pub dry_run: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            count_policy: CountPolicy::Monotonic,
            concurrency: 1,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    pub records: usize,
    pub updated: usize,
    pub unresolved: usize,
    pub url_corrected: usize,
    pub notified: usize,
    pub notification_failures: usize,
    pub storage_failures: usize,
    /// Host groups whose task died; their records are missing from the counts.
    pub failed_groups: usize,
    pub dry_run: bool,
}

impl PassSummary {
    fn absorb(&mut self, outcome: &RecordOutcome) {
        self.records += 1;
        self.updated += usize::from(outcome.updated);
        self.unresolved += usize::from(outcome.unresolved);
        self.url_corrected += usize::from(outcome.url_corrected);
        self.notified += usize::from(outcome.notified);
        self.notification_failures += usize::from(outcome.notification_failed);
        self.storage_failures += usize::from(outcome.storage_failed);
    }

    fn merge(&mut self, other: PassSummary) {
        self.records += other.records;
        self.updated += other.updated;
        self.unresolved += other.unresolved;
        self.url_corrected += other.url_corrected;
        self.notified += other.notified;
        self.notification_failures += other.notification_failures;
        self.storage_failures += other.storage_failures;
        self.failed_groups += other.failed_groups;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct RecordOutcome {
    updated: bool,
    unresolved: bool,
    url_corrected: bool,
    notified: bool,
    notification_failed: bool,
    storage_failed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationDecision {
    Due { unread: u32 },
    BelowThreshold { unread: i64 },
    NoEmail,
    Paused,
    /// A notification already went out at this count or a higher one.
    AlreadyNotified { last: u32 },
}

/// Threshold rule: `count - read >= milestone` (inclusive), an email is set,
/// nobody paused it, and the count moved past the last notified one.
pub fn decide_notification(count: u32, record: &NovelRecord, paused: bool) -> NotificationDecision {
    let unread = i64::from(count) - i64::from(record.read_chapters);
    if unread < i64::from(record.milestone_threshold) {
        return NotificationDecision::BelowThreshold { unread };
    }
    if record.notify_email.is_none() {
        return NotificationDecision::NoEmail;
    }
    if paused {
        return NotificationDecision::Paused;
    }
    if let Some(last) = record.last_notified_count.filter(|last| count <= *last) {
        return NotificationDecision::AlreadyNotified { last };
    }
    NotificationDecision::Due {
        unread: u32::try_from(unread).unwrap_or(u32::MAX),
    }
}

/// Count to store given the policy.
pub fn effective_count(policy: CountPolicy, stored: u32, resolved: u32) -> u32 {
    match policy {
        CountPolicy::Monotonic => stored.max(resolved),
        CountPolicy::Overwrite => resolved,
    }
}

#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn NovelStore>,
    notifier: Option<Arc<dyn Notifier>>,
    resolver: Arc<Resolver>,
    options: ReconcileOptions,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn NovelStore>,
        notifier: Option<Arc<dyn Notifier>>,
        resolver: Arc<Resolver>,
        options: ReconcileOptions,
    ) -> Self {
        Self {
            store,
            notifier,
            resolver,
            options,
        }
    }

    pub async fn run_pass(&self) -> anyhow::Result<PassSummary> {
        let records = self
            .store
            .list_all_novel_records()
            .await
            .context("list novel records")?;
        let paused_users = Arc::new(self.paused_users().await);
        tracing::info!(
            records = records.len(),
            paused_users = paused_users.len(),
            concurrency = self.options.concurrency,
            dry_run = self.options.dry_run,
            "reconcile pass: start"
        );

        let mut summary = PassSummary {
            dry_run: self.options.dry_run,
            ..PassSummary::default()
        };

        if self.options.concurrency <= 1 {
            for record in &records {
                let outcome = self.reconcile_record(record, &paused_users).await;
                summary.absorb(&outcome);
            }
        } else {
            let mut groups = group_by_host(records).into_iter();
            let mut join_set = tokio::task::JoinSet::new();
            let mut running = HashMap::new();
            loop {
                while join_set.len() < self.options.concurrency {
                    let Some((host, group)) = groups.next() else {
                        break;
                    };
                    let reconciler = self.clone();
                    let paused_users = Arc::clone(&paused_users);
                    let task_host = host.clone();
                    let handle = join_set.spawn(async move {
                        tracing::debug!(host = %host, records = group.len(), "host group: start");
                        let mut partial = PassSummary::default();
                        for record in &group {
                            let outcome = reconciler.reconcile_record(record, &paused_users).await;
                            partial.absorb(&outcome);
                        }
                        partial
                    });
                    running.insert(handle.id(), task_host);
                }

                let Some(joined) = join_set.join_next_with_id().await else {
                    break;
                };
                match joined {
                    Ok((id, partial)) => {
                        running.remove(&id);
                        summary.merge(partial);
                    }
                    Err(err) => {
                        let host = running.remove(&err.id()).unwrap_or_default();
                        tracing::warn!(host = %host, err = %err, "host group task failed");
                        summary.failed_groups += 1;
                    }
                }
            }
        }

        tracing::info!(
            records = summary.records,
            updated = summary.updated,
            unresolved = summary.unresolved,
            notified = summary.notified,
            failed_groups = summary.failed_groups,
            "reconcile pass: done"
        );
        Ok(summary)
    }

    async fn paused_users(&self) -> HashSet<String> {
        match self.store.list_users().await {
            Ok(users) => users
                .into_iter()
                .filter(|user| user.notifications_paused)
                .map(|user| user.id)
                .collect(),
            Err(err) => {
                tracing::warn!(err = ?err, "failed to read users; assuming nobody is paused");
                HashSet::new()
            }
        }
    }

    async fn reconcile_record(
        &self,
        record: &NovelRecord,
        paused_users: &HashSet<String>,
    ) -> RecordOutcome {
        let mut outcome = RecordOutcome::default();
        let mut patch = RecordPatch::default();

        let url = normalize(&record.url, self.resolver.registry());
        if url != record.url {
            tracing::info!(record = %record.key, from = %record.url, to = %url, "url normalized");
            outcome.url_corrected = true;
            patch.url = Some(url.clone());
        }

        let resolution = self.resolver.resolve(&url).await;
        if !resolution.is_resolved() {
            tracing::info!(
                record = %record.key,
                url = %url,
                attempts = resolution.attempts.len(),
                "chapter count unresolved; skipping"
            );
            outcome.unresolved = true;
            self.write(record, &patch, &mut outcome).await;
            return outcome;
        }

        let mut title = record.title.clone();
        if record.has_placeholder_title() {
            title = resolve_title(self.resolver.fetcher(), &url).await;
            patch.title = Some(title.clone());
        }

        let count = effective_count(self.options.count_policy, record.total_chapters, resolution.count);
        if count != resolution.count {
            tracing::warn!(
                record = %record.key,
                stored = record.total_chapters,
                resolved = resolution.count,
                "resolved count is lower than stored; keeping stored count"
            );
        }
        patch.total_chapters = Some(count);
        tracing::info!(
            record = %record.key,
            count,
            method = resolution.method.as_deref().unwrap_or_default(),
            "chapter count resolved"
        );

        let paused = record.notifications_paused || paused_users.contains(&record.key.user_id);
        match (decide_notification(count, record, paused), record.notify_email.as_deref()) {
            (NotificationDecision::Due { unread }, Some(email)) => {
                if self.notify(record, email, &title, unread, &mut outcome).await {
                    patch.last_notified_count = Some(count);
                }
            }
            (decision, _) => {
                tracing::debug!(record = %record.key, ?decision, "no notification");
            }
        }

        self.write(record, &patch, &mut outcome).await;
        outcome
    }

    /// Returns whether the notification counts as sent.
    async fn notify(
        &self,
        record: &NovelRecord,
        email: &str,
        title: &str,
        unread: u32,
        outcome: &mut RecordOutcome,
    ) -> bool {
        if self.options.dry_run {
            tracing::info!(record = %record.key, unread, "dry run: notification skipped");
            outcome.notified = true;
            return false;
        }
        let Some(notifier) = &self.notifier else {
            tracing::debug!(record = %record.key, "notifications not configured");
            return false;
        };
        match notifier.send_notification(email, title, unread).await {
            Ok(()) => {
                tracing::info!(record = %record.key, unread, "notification sent");
                outcome.notified = true;
                true
            }
            Err(err) => {
                tracing::warn!(record = %record.key, err = ?err, "notification failed");
                outcome.notification_failed = true;
                false
            }
        }
    }

    async fn write(&self, record: &NovelRecord, patch: &RecordPatch, outcome: &mut RecordOutcome) {
        if patch.is_empty() {
            return;
        }
        let fields = patch.field_paths();
        if self.options.dry_run {
            tracing::info!(record = %record.key, ?fields, "dry run: update skipped");
            outcome.updated = true;
            return;
        }
        match self.store.update_record(&record.key, patch).await {
            Ok(()) => {
                tracing::info!(record = %record.key, ?fields, "record updated");
                outcome.updated = true;
            }
            Err(err) => {
                tracing::warn!(record = %record.key, err = ?err, "record update failed");
                outcome.storage_failed = true;
            }
        }
    }
}

/// Groups records by `host[:port]`, keeping first-seen order of hosts and the
/// stored order within a host.
fn group_by_host(records: Vec<NovelRecord>) -> Vec<(String, Vec<NovelRecord>)> {
    let mut groups: Vec<(String, Vec<NovelRecord>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for record in records {
        let host = Url::parse(&record.url)
            .ok()
            .and_then(|url| host_key(&url))
            .unwrap_or_default();
        match index.get(&host) {
            Some(&i) => groups[i].1.push(record),
            None => {
                index.insert(host.clone(), groups.len());
                groups.push((host, vec![record]));
            }
        }
    }
    groups
}

/// `novelwatch reconcile`: one full pass, summary JSON on stdout.
pub async fn run(args: ReconcileArgs) -> anyhow::Result<()> {
    let config = Config::from_env().context("load configuration")?;
    let store = config.store.build().context("open novel store")?;
    let notifier: Option<Arc<dyn Notifier>> = match &config.email {
        Some(email) => Some(Arc::new(
            EmailJsNotifier::new(email.clone()).context("build notifier")?,
        )),
        None => {
            tracing::info!("email settings incomplete; notifications disabled");
            None
        }
    };

    let registry = Arc::new(SiteRegistry::with_defaults().context("build site registry")?);
    let fetcher = Arc::new(Fetcher::new(args.fetch.to_config()).context("build fetcher")?);
    let relay = ProxyRelay::new(config.relay_templates.clone());
    let resolver = Arc::new(Resolver::new(fetcher, relay, registry));

    tracing::info!(store = config.store.kind(), policy = ?args.count_policy, "reconcile: configured");
    let reconciler = Reconciler::new(
        store,
        notifier,
        resolver,
        ReconcileOptions {
            count_policy: args.count_policy,
            concurrency: args.concurrency.max(1),
            dry_run: args.dry_run,
        },
    );
    let summary = reconciler.run_pass().await?;
    println!("{}", serde_json::to_string(&summary).context("serialize pass summary")?);
    Ok(())
}
