//! The `pilot run` daemon command.

use crate::api;
use crate::pilot::Pilot;
use crate::repo::Repo;
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Repo directory (config, scripts, state).
    #[arg(long, env = "PILOT_HOME")]
    pub repo: Option<PathBuf>,

    /// Override the configured listen address.
    #[arg(long)]
    pub listen: Option<String>,

    /// Verbose logging.
    #[arg(long)]
    pub debug: bool,
}

pub async fn run(args: RunArgs) -> Result<()> {
    let default_filter = if args.debug { "pilot=debug" } else { "pilot=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("starting pilot...");

    let repo = Repo::new(args.repo.unwrap_or_else(Repo::default_path));
    repo.init()?;
    let conf = repo.load_config()?;
    let listen = args.listen.unwrap_or_else(|| conf.listen.clone());

    let pilot = Pilot::open(repo, &conf).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reconciler = pilot.spawn_reconciler(shutdown_rx);

    let listener = tokio::net::TcpListener::bind(&listen)
        .await
        .with_context(|| format!("failed to bind {listen}"))?;
    info!(%listen, "pilot server listening");

    axum::serve(listener, api::router(pilot.clone()))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown pilot server");
        })
        .await?;

    let _ = shutdown_tx.send(true);
    let _ = reconciler.await;
    pilot.close().await;

    Ok(())
}
