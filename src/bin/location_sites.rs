use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use tw_airbot::config;
use tw_airbot::model::{StationRecord, TownRecord};
use tw_airbot::sites::annotate_towns;
use tw_airbot::snapshot::{SnapshotStore, AIR_FILE, TOWN_FILE, TOWN_SITE_FILE};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Mark which towns have an air-quality station and write pm-site.json"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
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
    let store = SnapshotStore::new(cfg.app.data_path());

    let (towns, stations) = tokio::try_join!(
        store.read_all::<TownRecord>(TOWN_FILE),
        store.read_all::<StationRecord>(AIR_FILE),
    )
    .context("failed to load towns and stations")?;

    let rows = annotate_towns(towns, &stations);
    let with_site = rows.iter().filter(|r| r.has_site).count();
    store
        .write_all(TOWN_SITE_FILE, &rows)
        .await
        .context("failed to write town/site table")?;
    info!(towns = rows.len(), with_site, "wrote {}", TOWN_SITE_FILE);
    Ok(())
}
