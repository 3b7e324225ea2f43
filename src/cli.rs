use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::fetch::FetchConfig;
use crate::politeness::PolitenessConfig;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run one reconciliation pass over every stored novel.
    Reconcile(ReconcileArgs),
    /// Resolve the chapter count of a single URL.
    Resolve(ResolveArgs),
    /// Print the canonical series URL.
    Normalize(NormalizeArgs),
    /// Print the display title of a series page.
    Title(TitleArgs),
}

#[derive(Debug, Clone, Args)]
pub struct FetchArgs {
    /// Lower bound of the per-host politeness delay.
    #[arg(long, default_value_t = 2000)]
    pub min_delay_ms: u64,

    /// Upper bound of the per-host politeness delay.
    #[arg(long, default_value_t = 4000)]
    pub max_delay_ms: u64,

    /// Timeout for series pages.
    #[arg(long, default_value_t = 20)]
    pub page_timeout_secs: u64,

    /// Timeout for AJAX archive endpoints and feeds.
    #[arg(long, default_value_t = 40)]
    pub ajax_timeout_secs: u64,
}

impl FetchArgs {
    pub fn to_config(&self) -> FetchConfig {
        FetchConfig {
            page_timeout: Duration::from_secs(self.page_timeout_secs),
            ajax_timeout: Duration::from_secs(self.ajax_timeout_secs),
            politeness: PolitenessConfig::new(
                Duration::from_millis(self.min_delay_ms),
                Duration::from_millis(self.max_delay_ms),
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum CountPolicy {
    /// Keep the stored count when a smaller one is resolved.
    #[default]
    Monotonic,
    /// Always store the latest resolved count.
    Overwrite,
}

#[derive(Debug, Args)]
pub struct ReconcileArgs {
    #[command(flatten)]
    pub fetch: FetchArgs,

    /// Host groups processed in parallel (1 = fully sequential).
    #[arg(long, default_value_t = 1)]
    pub concurrency: usize,

    #[arg(long, value_enum, default_value_t = CountPolicy::Monotonic)]
    pub count_policy: CountPolicy,

    /// Resolve and decide, but write nothing and send nothing.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

#[derive(Debug, Args)]
pub struct ResolveArgs {
    /// Series URL (normalized before resolution).
    #[arg(long)]
    pub url: String,

    #[command(flatten)]
    pub fetch: FetchArgs,
}

#[derive(Debug, Args)]
pub struct NormalizeArgs {
    #[arg(long)]
    pub url: String,
}

#[derive(Debug, Args)]
pub struct TitleArgs {
    #[arg(long)]
    pub url: String,

    #[command(flatten)]
    pub fetch: FetchArgs,
}
