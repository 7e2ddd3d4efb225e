mod config;
mod fetcher;
mod routes;
mod store;

use std::sync::Arc;

use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::fetcher::{start_background_refresh, Fetcher};
use crate::routes::AppState;
use crate::store::NewsStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "newsdesk=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load("feeds.toml")?;
    info!("Loaded {} feeds from configuration", config.feeds.len());

    // Create the shared in-memory store, seeded so the API has content
    // before the first fetch cycle completes
    let store = Arc::new(NewsStore::new());
    store.seed_samples().await;

    // Create fetcher
    let fetcher = Arc::new(Fetcher::new(
        store.clone(),
        config.feeds.clone(),
        config.max_entries_per_feed,
    ));

    // Start the background refresh loop with a shutdown channel so an
    // in-flight cycle can finish cleanly on exit
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let bg_fetcher = fetcher.clone();
    let refresh_interval = config.refresh_interval;
    tokio::spawn(async move {
        start_background_refresh(bg_fetcher, refresh_interval, shutdown_rx).await;
    });

    // Create app state
    let state = Arc::new(AppState {
        store: store.clone(),
        fetcher: fetcher.clone(),
    });

    let app = routes::app(state).layer(TraceLayer::new_for_http());

    // Start server
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(5000);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("Server starting on http://localhost:{}", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    Ok(())
}
