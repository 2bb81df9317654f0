//! Domain models shared between the database layer and the HTTP layer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::authorship::AuthorshipSpan;
use crate::Error;

/// Note visibility and edit permission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    /// Anyone can view and edit
    Freely,
    /// Anyone can view, signed-in users can edit
    Editable,
    /// Signed-in users can view and edit
    Limited,
    /// Anyone can view, only the owner can edit
    Locked,
    /// Signed-in users can view, only the owner can edit
    Protected,
    /// Only the owner can view or edit
    Private,
    /// Anyone can view, signed-in users can edit
    Public,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Freely => "freely",
            Permission::Editable => "editable",
            Permission::Limited => "limited",
            Permission::Locked => "locked",
            Permission::Protected => "protected",
            Permission::Private => "private",
            Permission::Public => "public",
        }
    }

    /// Whether a viewer may read a note with this permission
    pub fn can_view(&self, is_owner: bool, is_logged_in: bool) -> bool {
        match self {
            Permission::Private => is_owner,
            Permission::Limited | Permission::Protected => is_logged_in,
            Permission::Freely | Permission::Editable | Permission::Locked | Permission::Public => {
                true
            }
        }
    }

    /// Whether a viewer may change the content of a note with this permission
    ///
    /// `anonymous_edits` mirrors the `allow_anonymous_edits` switch and only
    /// matters for `freely` notes.
    pub fn can_edit(&self, is_owner: bool, is_logged_in: bool, anonymous_edits: bool) -> bool {
        if is_owner {
            return true;
        }
        match self {
            Permission::Freely => is_logged_in || anonymous_edits,
            Permission::Editable | Permission::Limited | Permission::Public => is_logged_in,
            Permission::Locked | Permission::Protected | Permission::Private => false,
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "freely" => Ok(Permission::Freely),
            "editable" => Ok(Permission::Editable),
            "limited" => Ok(Permission::Limited),
            "locked" => Ok(Permission::Locked),
            "protected" => Ok(Permission::Protected),
            "private" => Ok(Permission::Private),
            "public" => Ok(Permission::Public),
            other => Err(Error::InvalidInput(format!("Unknown permission: {}", other))),
        }
    }
}

/// Note record
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: Uuid,
    pub shortid: String,
    pub alias: Option<String>,
    pub title: String,
    pub content: String,
    pub permission: Permission,
    pub owner_id: Option<Uuid>,
    pub last_change_user_id: Option<Uuid>,
    pub viewcount: i64,
    /// Ordered, duplicate-free list of tag ids
    pub tag_id_list: Vec<i64>,
    pub authorship: Vec<AuthorshipSpan>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_change_at: Option<DateTime<Utc>>,
}

impl Note {
    pub fn is_owner(&self, user_id: Option<Uuid>) -> bool {
        matches!((self.owner_id, user_id), (Some(owner), Some(user)) if owner == user)
    }

    pub fn can_view(&self, user_id: Option<Uuid>) -> bool {
        self.permission.can_view(self.is_owner(user_id), user_id.is_some())
    }

    pub fn can_edit(&self, user_id: Option<Uuid>, anonymous_edits: bool) -> bool {
        self.permission
            .can_edit(self.is_owner(user_id), user_id.is_some(), anonymous_edits)
    }

    /// The id used in canonical publish URLs
    pub fn public_id(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.shortid)
    }
}

/// User-scoped label with a denormalized usage counter
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: i64,
    pub name: String,
    /// Number of notes whose tag list contains this tag
    pub count: i64,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Account record (password material never leaves the db layer)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.username)
    }
}

/// Append-only content snapshot
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Revision {
    pub id: i64,
    pub note_id: Uuid,
    pub content: String,
    pub length: i64,
    pub authorship: Vec<AuthorshipSpan>,
    pub created_at: DateTime<Utc>,
}
