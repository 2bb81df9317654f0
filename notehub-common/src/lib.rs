//! # notehub common library
//!
//! Shared code for the notehub server and its tests:
//! - Configuration loading and root folder resolution
//! - Database bootstrap and schema
//! - Domain models (notes, tags, users, revisions, permissions)
//! - Note id encoding, markdown helpers
//! - Operational-transform text operations and authorship tracking
//! - Editor text commands (wrap, link, header, line prefix)

pub mod auth;
pub mod authorship;
pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod editor;
pub mod error;
pub mod markdown;
pub mod models;
pub mod note_id;
pub mod ot;

pub use error::{Error, Result};
pub use models::Permission;
pub use ot::TextOperation;
