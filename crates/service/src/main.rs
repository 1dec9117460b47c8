mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use decor_rag::{Assistant, AssistantConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::routes::{router, AppState};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = AssistantConfig::resolve(None)?;
    config.validate()?;
    if decor_llm::resolve_credentials().is_err() {
        warn!("no completion API key in the environment; requests will be rejected until one is set");
    }
    let assistant = Assistant::from_config(&config);
    let state = Arc::new(AppState { assistant });
    let app = router(state);

    let addr: SocketAddr = config
        .bind_addr
        .parse()
        .with_context(|| format!("invalid bind address {}", config.bind_addr))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening" = %addr, db = %config.rag_db.display());
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
