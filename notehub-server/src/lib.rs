//! notehub-server library interface
//!
//! Exposes the router and application state for integration testing.

pub mod api;
pub mod auth;
pub mod db;
pub mod error;
pub mod export;
pub mod images;
pub mod pagination;
pub mod realtime;
pub mod render;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use notehub_common::config::ServerConfig;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::realtime::NotePool;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Resolved server configuration
    pub config: Arc<ServerConfig>,
    /// Live collaborative documents
    pub pool: NotePool,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool, config: ServerConfig) -> Self {
        let pool = NotePool::new(db.clone(), config.realtime.clone());
        Self {
            db,
            config: Arc::new(config),
            pool,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let uploads = ServeDir::new(&state.config.uploads_path);

    Router::new()
        .merge(api::health_routes())
        .merge(api::account_routes())
        .merge(api::tag_routes())
        .merge(api::note_api_routes())
        .merge(api::image_routes(state.config.max_upload_bytes))
        .merge(realtime::realtime_routes())
        // Catch-all note routes go last
        .merge(api::page_routes())
        .nest_service("/uploads", uploads)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
