use anyhow::Context as _;

/// Installs the stderr subscriber. `RUST_LOG` wins; otherwise `info`.
///
/// Stdout is reserved for command output (JSON summaries, resolved values),
/// so log lines never interleave with it.
pub fn init() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info"))
        .context("build log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("initialize tracing subscriber: {err}"))?;

    Ok(())
}
