//! Database queries
//!
//! Schema creation lives in `notehub_common::db`; this module holds the
//! queries the HTTP handlers and the realtime pool run.

pub mod notes;
pub mod revisions;
pub mod tags;
pub mod users;

use notehub_common::{Error, Result};
use uuid::Uuid;

/// Parse a UUID stored as TEXT
pub(crate) fn parse_uuid(text: &str) -> Result<Uuid> {
    Uuid::parse_str(text).map_err(|e| Error::Internal(format!("Corrupt id '{}': {}", text, e)))
}

/// Parse an optional UUID column
pub(crate) fn parse_opt_uuid(text: Option<String>) -> Result<Option<Uuid>> {
    text.as_deref().map(parse_uuid).transpose()
}

/// Whether an insert or update hit a UNIQUE constraint
pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Escape `%`, `_` and `\` for a LIKE pattern using `ESCAPE '\'`
pub(crate) fn like_pattern(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}
