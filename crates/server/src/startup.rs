//! Server startup: schema, crash recovery, dispatcher, listener.

use std::sync::Arc;

use offers_core::Config;
use offers_ingest::TaskLifecycle;
use tracing::info;

use crate::db;
use crate::pg_gateway::PgGateway;
use crate::router;
use crate::state::AppState;

async fn connect(config: &Config) -> anyhow::Result<Arc<PgGateway>> {
    let pool = db::init_pg_pool(&config.postgres).await?;
    Ok(Arc::new(PgGateway::new(pool)))
}

/// Recover abandoned tasks, start the ingestion dispatcher and serve HTTP
/// until Ctrl-C.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let gateway = connect(&config).await?;
    let (lifecycle, dispatcher) = TaskLifecycle::new(gateway);

    // Must finish before the listener accepts uploads.
    lifecycle.recover_abandoned().await?;
    tokio::spawn(dispatcher.run());

    let addr = config.server.bind_addr();
    let state = Arc::new(AppState { lifecycle, config });
    let app = router::build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Finalize tasks left `running` by a previous process, then exit.
pub async fn sweep(config: Config) -> anyhow::Result<()> {
    let gateway = connect(&config).await?;
    let (lifecycle, _dispatcher) = TaskLifecycle::new(gateway);
    let swept = lifecycle.recover_abandoned().await?;
    info!(count = swept.len(), "Sweep finished");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
