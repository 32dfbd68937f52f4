use axum::{
    routing::{get, post},
    Router,
};
use std::env;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

use crate::config::{load_config, Config};
use crate::registry::SessionRegistry;

// --- Modules ---
pub mod cleanup;
pub mod config;
pub mod downloader;
pub mod error;
pub mod handlers;
pub mod models;
pub mod progress;
pub mod registry;

pub type ConfigState = Arc<RwLock<Config>>;

#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionRegistry,
    pub config: ConfigState,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let mut config = load_config().await?;
    if let Ok(port) = env::var("PORT") {
        if let Ok(port) = port.parse() {
            config.port = port;
        }
    }
    tokio::fs::create_dir_all(&config.temp_directory).await?;

    let state = AppState {
        sessions: SessionRegistry::new(),
        config: Arc::new(RwLock::new(config.clone())),
    };

    tokio::spawn(cleanup::run_cleanup_loop(
        state.sessions.clone(),
        PathBuf::from(&config.temp_directory),
        Duration::from_secs(config.sweep_interval_secs),
        Duration::from_secs(config.retention_secs),
    ));

    let app = Router::new()
        .route("/start", post(handlers::start_download))
        .route("/progress/:id", get(handlers::get_progress))
        .route("/file/:id", get(handlers::get_file))
        .route("/health", get(handlers::health))
        .layer(CorsLayer::new().allow_origin(Any).allow_headers(Any).allow_methods(Any))
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server running on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
