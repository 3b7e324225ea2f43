use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    novelwatch::logging::init().context("init logging")?;

    let cli = novelwatch::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        novelwatch::cli::Command::Reconcile(args) => {
            novelwatch::reconcile::run(args).await.context("reconcile")?;
        }
        novelwatch::cli::Command::Resolve(args) => {
            novelwatch::resolver::run(args).await.context("resolve")?;
        }
        novelwatch::cli::Command::Normalize(args) => {
            novelwatch::normalize::run(args).context("normalize")?;
        }
        novelwatch::cli::Command::Title(args) => {
            novelwatch::title::run(args).await.context("title")?;
        }
    }

    Ok(())
}
