//! `eddo-scheduler` — the standalone email sync scheduler binary, §2
//! component K / §4.J. Shares `EddoConfig` loading and the tracing
//! bootstrap with `eddo-server`; the two binaries can also be run combined
//! via `eddo-server --combined` for small deployments.

use std::sync::Arc;

use clap::Parser;
use eddo_core::config::EddoConfig;
use eddo_scheduler::SyncScheduler;
use eddo_store::couch::CouchStore;
use eddo_store::DocumentStore;
use eddo_users::UserRegistry;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "eddo-scheduler")]
struct Cli {
    /// Path to an `eddo.toml` config file. Falls back to `./eddo.toml`.
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match EddoConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    let _telemetry_guard = eddo_core::telemetry::init(&config.tracing);

    let store: Arc<dyn DocumentStore> = match CouchStore::connect(&config.database.couch_url) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!(error = %e, "unable to reach the document store at startup");
            std::process::exit(1);
        }
    };

    let registry = Arc::new(UserRegistry::new(Arc::clone(&store), &config));
    if let Err(e) = registry.ensure_database().await {
        tracing::error!(error = %e, "failed to ensure the tenant registry database exists");
        std::process::exit(1);
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(eddo_server::shutdown::wait_for_signal(shutdown_tx));

    info!("email sync scheduler starting");
    let scheduler = SyncScheduler::new(store, config, registry);
    scheduler.run(shutdown_rx).await;
    info!("email sync scheduler exited cleanly");

    Ok(())
}
