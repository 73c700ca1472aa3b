//! chatframe demo server
//!
//! Serves the demo application over the HTTP webhook adapter.

use chatframe::app;
use chatframe::webhook::{create_router, AppState, WebhookAdapter};
use chatframe::{Core, MemoryStorage, Router, ServerConfig, SqliteStorage, Storage, StorageBackend};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chatframe=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = ServerConfig::from_env()?;

    // Storage
    let storage: Arc<dyn Storage> = match config.storage {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; routes and state are lost on restart");
            Arc::new(MemoryStorage::new())
        }
        StorageBackend::Sqlite => {
            if let Some(parent) = config.db_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            tracing::info!(path = %config.db_path.display(), "Opening database");
            Arc::new(SqliteStorage::open(&config.db_path)?)
        }
    };

    // Routes
    let catalog = app::catalog();
    let router = match &config.routes_path {
        Some(path) => {
            tracing::info!(path = %path.display(), "Loading route metadata");
            Router::init(path, &catalog, storage)?
        }
        None => Router::init_from_routes(&app::route_file(), &catalog, storage)?,
    };

    let core = Core::new(
        Arc::new(WebhookAdapter::new()),
        Arc::new(router),
        config.core.clone(),
    );
    core.init().await?;

    let state = AppState::new(Arc::clone(&core), config.webhook_token.clone());

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new().gzip(true).br(true);

    let app = create_router(state).layer(cors).layer(compression);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("chatframe listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    core.on_destroy().await?;
    tracing::info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
