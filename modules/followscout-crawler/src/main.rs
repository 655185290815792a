use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use followscout_common::{load_config, Secrets};
use followscout_crawler::{
    CrawlCache, CriteriaEngine, JsonlSink, LogSink, Pipeline, PipelineDeps, SinkFanout,
};
use twitter_client::TwitterClient;

/// Crawl the follow graph from a seed account and record matching profiles.
#[derive(Debug, Parser)]
#[command(name = "followscout", version)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, env = "FOLLOWSCOUT_CONFIG", default_value = "followscout.toml")]
    config: PathBuf,

    /// Override the config's storage directory.
    #[arg(long)]
    storage_dir: Option<PathBuf>,

    /// Emit logs as JSON.
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::from_default_env().add_directive("followscout=info".parse()?);
    if cli.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("Followscout starting...");

    let mut config = load_config(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;
    if let Some(dir) = cli.storage_dir {
        config.storage_dir = dir;
    }

    let secrets = Secrets::from_env()?;
    secrets.log_redacted();

    let client = match secrets.api_base {
        Some(base) => TwitterClient::with_base_url(secrets.bearer_token, base),
        None => TwitterClient::new(secrets.bearer_token),
    };

    let engine = CriteriaEngine::new(&config.criteria).context("invalid criteria")?;

    let sinks = SinkFanout::new()
        .with(Arc::new(LogSink))
        .with(Arc::new(JsonlSink::in_dir(&config.storage_dir)));

    let mut pipeline = Pipeline::new(
        config,
        PipelineDeps {
            source: Arc::new(client),
            cache: Arc::new(CrawlCache::new()),
            engine,
            sinks,
        },
    );
    pipeline.start()?;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    let stats = pipeline.close().await;
    info!("Followscout stopped. {stats}");
    Ok(())
}
