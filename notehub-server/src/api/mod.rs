//! HTTP routes
//!
//! JSON API handlers answer with `{status, ...}` bodies; page handlers
//! render HTML.

pub mod account;
pub mod health;
pub mod images;
pub mod notes;
pub mod pages;
pub mod tags;

pub use account::account_routes;
pub use health::health_routes;
pub use images::image_routes;
pub use notes::note_api_routes;
pub use pages::page_routes;
pub use tags::tag_routes;

use notehub_common::config::ServerConfig;
use notehub_common::models::{Note, Permission};
use uuid::Uuid;

/// Whether a visitor may read a note under the server's anonymous rules
pub(crate) fn can_view_note(config: &ServerConfig, note: &Note, user_id: Option<Uuid>) -> bool {
    if user_id.is_none() && !config.allow_anonymous_views {
        return false;
    }
    note.can_view(user_id)
}

/// Whether a visitor may change a note's content
pub(crate) fn can_edit_note(config: &ServerConfig, note: &Note, user_id: Option<Uuid>) -> bool {
    can_view_note(config, note, user_id) && note.can_edit(user_id, config.allow_anonymous_edits)
}

/// Permission given to newly created notes
pub(crate) fn new_note_permission(config: &ServerConfig, owner: Option<Uuid>) -> Permission {
    match owner {
        // Nobody could ever edit an ownerless note otherwise
        None => Permission::Freely,
        Some(_) => config.default_permission,
    }
}
