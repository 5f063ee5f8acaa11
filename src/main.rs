use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;

use tw_airbot::config;
use tw_airbot::db;
use tw_airbot::handlers::Dispatcher;
use tw_airbot::line::{LineApi, LineClient};
use tw_airbot::server::{self, AppState};
use tw_airbot::snapshot::SnapshotStore;
use tw_airbot::state::BotState;

#[derive(Debug, Parser)]
#[command(author, version, about = "Webhook server for the air-quality bot")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Print a reference config and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    if args.print_config {
        print!("{}", config::example());
        return Ok(());
    }
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;
    info!(channel_id = %cfg.channel.id, "starting webhook server");

    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;

    let line: Arc<dyn LineApi> = Arc::new(LineClient::new(
        cfg.channel.token.clone(),
        Duration::from_secs(cfg.feeds.timeout_secs),
    )?);
    let store = SnapshotStore::new(cfg.app.data_path());
    let dispatcher = Arc::new(Dispatcher::new(
        line.clone(),
        store.clone(),
        pool.clone(),
        Arc::new(BotState::new()),
    ));
    let state = AppState {
        dispatcher,
        line,
        store,
        pool,
        channel_secret: Arc::from(cfg.channel.secret.as_str()),
    };
    let app = server::router(state, cfg.app.enable_admin);
    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.listen_port()));

    tokio::select! {
        result = server::serve(addr, app, cfg.tls.as_ref()) => result?,
        _ = signal::ctrl_c() => info!("Received shutdown signal"),
    }
    Ok(())
}
