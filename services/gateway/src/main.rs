mod allocator;
mod auth;
mod config;
mod error;
mod handlers;
mod rate_limit;
mod router;
mod state;

use allocator::HttpSessionAllocator;
use config::Config;
use matchmaker::{Coordinator, LocalSessionAllocator, SessionAllocator};
use router::create_router;
use state::AppState;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    tracing::info!("Starting matchmaking gateway");

    let config = Config::from_env()?;

    let allocator: Arc<dyn SessionAllocator> = match &config.session_service_url {
        Some(url) => {
            tracing::info!(url = %url, "using collaboration service for sessions");
            Arc::new(HttpSessionAllocator::new(url, config.session_service_timeout)?)
        }
        None => {
            tracing::warn!("SESSION_SERVICE_URL not set, minting sessions locally");
            Arc::new(LocalSessionAllocator)
        }
    };

    tracing::info!(store = %config.store_url, "using in-memory matchmaking state");
    let coordinator = Coordinator::in_memory(config.matchmaker.clone(), allocator);
    let state = AppState::new(coordinator, &config.jwt_secret);

    // Idle rate-limit buckets
    let limiter = Arc::clone(&state.rate_limiter);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        loop {
            ticker.tick().await;
            limiter.prune();
        }
    });

    let app = create_router(state);

    let listener = TcpListener::bind(config.bind_addr).await?;
    tracing::info!("Listening on {}", config.bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
