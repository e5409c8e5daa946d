use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use helix_search::http::{self, AppState};
use helix_search::{Config, Registry, SearchCoordinator};

pub async fn run(config: Config, bind: Option<SocketAddr>) -> Result<()> {
    let registry = Arc::new(
        Registry::open_dir(&config.data_dir, config.storage.writer_memory_bytes)
            .with_context(|| format!("failed to open indices in {}", config.data_dir.display()))?,
    );
    let coordinator = SearchCoordinator::new(Arc::clone(&registry), config.search.clone());
    let state = AppState::new(coordinator, config.storage.clone());

    let addr = bind.unwrap_or(config.server.bind);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(data_dir = %config.data_dir.display(), "starting helix-search");

    http::serve(listener, state, shutdown_signal()).await?;

    tracing::info!("shutting down");
    registry.close()?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
