//! Graceful shutdown signal handling, §5 / §6: a request-scoped
//! cancellation propagates from the transport down; here that propagation
//! starts with the process signal itself, broadcast via a `watch` channel
//! so the scheduler (when running combined) stops starting new per-user
//! syncs but lets in-flight ones finish.

use tokio::sync::watch;
use tracing::info;

pub async fn wait_for_signal(shutdown_tx: watch::Sender<bool>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down gracefully"),
        _ = terminate => info!("received SIGTERM, shutting down gracefully"),
    }

    let _ = shutdown_tx.send(true);
}
