//! `eddo-server` — the tool server binary, §2 component K / §4.H.
//!
//! Loads config, bootstraps tracing, ensures the tenant registry database
//! and its design documents exist, then serves `/mcp` and `/health` over
//! HTTP. With `--combined`, also runs the email sync scheduler (§4.J) in
//! the same process — a convenience for small deployments, since nothing
//! in the spec forbids it and the teacher's own gateway binary runs several
//! subsystems (chat, scheduler, terminal) in one process.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use eddo_core::config::EddoConfig;
use eddo_scheduler::SyncScheduler;
use eddo_server::{app, shutdown};
use eddo_store::couch::CouchStore;
use eddo_store::DocumentStore;
use eddo_users::UserRegistry;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "eddo-server")]
struct Cli {
    /// Path to an `eddo.toml` config file. Falls back to `./eddo.toml`.
    #[arg(long)]
    config: Option<String>,

    /// Also run the email sync scheduler (§4.J) in this process.
    #[arg(long)]
    combined: bool,
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
    if let Err(e) = registry.setup_design_documents().await {
        tracing::error!(error = %e, "failed to install tenant registry design documents");
        std::process::exit(1);
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    if cli.combined {
        let scheduler = SyncScheduler::new(Arc::clone(&store), config.clone(), Arc::clone(&registry));
        let scheduler_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            scheduler.run(scheduler_shutdown).await;
        });
        info!("email sync scheduler started in combined mode");
    }

    let port = config.server.port;
    let state = Arc::new(app::AppState::new(config, store, registry));
    let router = app::build_router(state);

    let addr: SocketAddr = format!("0.0.0.0:{port}").parse()?;
    info!(%addr, "eddo tool server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown::wait_for_signal(shutdown_tx))
        .await?;

    Ok(())
}
