//! Realtime collaborative editing

pub mod pool;
pub mod ws;

pub use pool::{
    ClientSession, DocSnapshot, HttpUpdateGuard, NewClient, NotePool, OnlineUser, PoolError,
    PoolEvent,
};

use axum::{routing::get, Router};

use crate::AppState;

/// Build realtime routes
pub fn realtime_routes() -> Router<AppState> {
    Router::new().route("/realtime/:note_id", get(ws::realtime_handler))
}
