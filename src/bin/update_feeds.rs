use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use tw_airbot::config;
use tw_airbot::snapshot::SnapshotStore;
use tw_airbot::updater::{self, HttpFeeds};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Fetch the air-quality and weather feeds and overwrite the local snapshots"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Keep running and refresh every N seconds instead of exiting after one pass
    #[arg(long)]
    interval_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let feeds = HttpFeeds::from_config(&cfg.feeds)?;
    let store = SnapshotStore::new(cfg.app.data_path());
    let log_path = cfg.app.update_log_path();

    loop {
        let outcome = updater::run_update(&feeds, &store, &log_path).await;
        info!(
            air_rows = ?outcome.air_rows,
            weather_rows = ?outcome.weather_rows,
            "update pass finished"
        );
        if outcome.air_rows.is_none() || outcome.weather_rows.is_none() {
            warn!(log = %log_path.display(), "some snapshots were left stale");
        }

        match args.interval_secs {
            Some(secs) if secs > 0 => tokio::time::sleep(Duration::from_secs(secs)).await,
            _ => break,
        }
    }
    Ok(())
}
