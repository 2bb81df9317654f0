//! Note queries

use chrono::{DateTime, Utc};
use notehub_common::authorship::{Authorship, AuthorshipSpan};
use notehub_common::markdown::parse_note_title;
use notehub_common::models::{Note, Permission};
use notehub_common::note_id::{decode_note_id, generate_shortid};
use notehub_common::{Error, Result};
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use super::{is_unique_violation, like_pattern, parse_opt_uuid, parse_uuid, revisions};

fn note_from_row(row: &SqliteRow) -> Result<Note> {
    let tag_id_list: String = row.try_get("tag_id_list")?;
    let authorship: String = row.try_get("authorship")?;
    let permission: String = row.try_get("permission")?;

    Ok(Note {
        id: parse_uuid(row.try_get::<String, _>("id")?.as_str())?,
        shortid: row.try_get("shortid")?,
        alias: row.try_get("alias")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        permission: permission.parse()?,
        owner_id: parse_opt_uuid(row.try_get("owner_id")?)?,
        last_change_user_id: parse_opt_uuid(row.try_get("last_change_user_id")?)?,
        viewcount: row.try_get("viewcount")?,
        tag_id_list: serde_json::from_str(&tag_id_list)?,
        authorship: serde_json::from_str(&authorship)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        last_change_at: row.try_get("last_change_at")?,
    })
}

/// Fields for a new note
#[derive(Debug, Clone)]
pub struct NewNote {
    pub owner_id: Option<Uuid>,
    pub alias: Option<String>,
    pub content: String,
    pub permission: Permission,
}

pub async fn create_note(pool: &SqlitePool, new: NewNote) -> Result<Note> {
    let id = Uuid::new_v4();
    let shortid = generate_shortid();
    let now = Utc::now();
    let title = parse_note_title(&new.content);
    let authorship = match new.owner_id {
        Some(owner) if !new.content.is_empty() => {
            Authorship::whole(Some(owner), new.content.chars().count(), now.timestamp_millis())
                .spans()
        }
        _ => Vec::new(),
    };

    sqlx::query(
        r#"
        INSERT INTO notes (id, shortid, alias, title, content, permission, owner_id,
                           last_change_user_id, authorship, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(&shortid)
    .bind(&new.alias)
    .bind(&title)
    .bind(&new.content)
    .bind(new.permission.as_str())
    .bind(new.owner_id.map(|u| u.to_string()))
    .bind(new.owner_id.map(|u| u.to_string()))
    .bind(serde_json::to_string(&authorship)?)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    info!(note_id = %id, shortid = %shortid, "Created note");

    Ok(Note {
        id,
        shortid,
        alias: new.alias,
        title,
        content: new.content,
        permission: new.permission,
        owner_id: new.owner_id,
        last_change_user_id: new.owner_id,
        viewcount: 0,
        tag_id_list: Vec::new(),
        authorship,
        created_at: now,
        updated_at: now,
        last_change_at: None,
    })
}

/// Create a note under an alias, or return the note that claimed the alias
/// first when two requests race for it
pub async fn create_aliased_note(pool: &SqlitePool, new: NewNote) -> Result<Note> {
    let Some(alias) = new.alias.clone() else {
        return create_note(pool, new).await;
    };
    match create_note(pool, new).await {
        Err(Error::Database(e)) if is_unique_violation(&e) => {
            debug!(alias = %alias, "Alias claimed concurrently, reusing note");
            find_note(pool, &alias)
                .await?
                .ok_or_else(|| Error::Internal(format!("Note '{}' vanished after conflict", alias)))
        }
        other => other,
    }
}

pub async fn get_note(pool: &SqlitePool, id: Uuid) -> Result<Option<Note>> {
    let row = sqlx::query("SELECT * FROM notes WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(note_from_row).transpose()
}

/// Look a note up by a route segment: alias, then short id, then note id
pub async fn find_note(pool: &SqlitePool, route_id: &str) -> Result<Option<Note>> {
    let decoded = decode_note_id(route_id)
        .map(|id| id.to_string())
        .unwrap_or_default();

    let row = sqlx::query(
        r#"
        SELECT * FROM notes
        WHERE alias = ?1 OR shortid = ?1 OR id = ?2
        ORDER BY (alias = ?1) DESC, (shortid = ?1) DESC
        LIMIT 1
        "#,
    )
    .bind(route_id)
    .bind(decoded)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(note_from_row).transpose()
}

pub async fn increment_viewcount(pool: &SqlitePool, id: Uuid) -> Result<()> {
    sqlx::query("UPDATE notes SET viewcount = viewcount + 1 WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// New content for a note, written together with a revision snapshot
#[derive(Debug, Clone, Copy)]
pub struct SaveContent<'a> {
    pub content: &'a str,
    pub authorship: &'a [AuthorshipSpan],
    pub user_id: Option<Uuid>,
    pub at: DateTime<Utc>,
}

/// Write content, title and authorship, and append a revision
///
/// Returns `false` when the note no longer exists.
pub async fn save_content(pool: &SqlitePool, id: Uuid, save: SaveContent<'_>) -> Result<bool> {
    let authorship = serde_json::to_string(save.authorship)?;
    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        r#"
        UPDATE notes
        SET title = ?, content = ?, authorship = ?, last_change_user_id = ?,
            last_change_at = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(parse_note_title(save.content))
    .bind(save.content)
    .bind(&authorship)
    .bind(save.user_id.map(|u| u.to_string()))
    .bind(save.at)
    .bind(save.at)
    .bind(id.to_string())
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        tx.rollback().await?;
        return Ok(false);
    }

    revisions::insert_revision(&mut *tx, id, save.content, &authorship, save.at).await?;
    tx.commit().await?;
    Ok(true)
}

/// Delete a note owned by `owner`, releasing its tag references
///
/// Returns the deleted note, or `None` when no such note is owned by `owner`.
pub async fn delete_owned_note(pool: &SqlitePool, id: Uuid, owner: Uuid) -> Result<Option<Note>> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query("SELECT * FROM notes WHERE id = ? AND owner_id = ?")
        .bind(id.to_string())
        .bind(owner.to_string())
        .fetch_optional(&mut *tx)
        .await?;
    let Some(note) = row.as_ref().map(note_from_row).transpose()? else {
        return Ok(None);
    };

    for tag_id in &note.tag_id_list {
        sqlx::query("UPDATE tags SET count = MAX(count - 1, 0), updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(*tag_id)
            .execute(&mut *tx)
            .await?;
    }

    sqlx::query("DELETE FROM notes WHERE id = ?")
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    info!(note_id = %id, tags = note.tag_id_list.len(), "Deleted note");
    Ok(Some(note))
}

/// Sort column for note listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteOrder {
    LastChangeAt,
    CreatedAt,
    UpdatedAt,
    Title,
    Viewcount,
}

impl NoteOrder {
    /// Parse the `orderBy` query value
    pub fn from_query(name: &str) -> Option<Self> {
        match name {
            "lastchangeAt" => Some(NoteOrder::LastChangeAt),
            "createdAt" => Some(NoteOrder::CreatedAt),
            "updatedAt" => Some(NoteOrder::UpdatedAt),
            "title" => Some(NoteOrder::Title),
            "viewcount" => Some(NoteOrder::Viewcount),
            _ => None,
        }
    }

    fn column(&self) -> &'static str {
        match self {
            NoteOrder::LastChangeAt => "last_change_at",
            NoteOrder::CreatedAt => "created_at",
            NoteOrder::UpdatedAt => "updated_at",
            NoteOrder::Title => "title",
            NoteOrder::Viewcount => "viewcount",
        }
    }
}

/// Filters for listing a user's notes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteFilter {
    /// Substring of the content
    pub keyword: Option<String>,
    /// Substring of the title; OR-combined with `keyword`
    pub name: Option<String>,
    /// Every listed tag must be on the note
    pub tag_ids: Vec<i64>,
    pub order_by: Option<NoteOrder>,
    pub descending: bool,
}

fn push_filter(qb: &mut QueryBuilder<'_, Sqlite>, owner: Uuid, filter: &NoteFilter) {
    qb.push(" WHERE owner_id = ").push_bind(owner.to_string());

    let keyword = filter.keyword.as_deref().filter(|s| !s.is_empty());
    let name = filter.name.as_deref().filter(|s| !s.is_empty());
    match (keyword, name) {
        (Some(keyword), Some(name)) => {
            qb.push(" AND (content LIKE ")
                .push_bind(like_pattern(keyword))
                .push(" ESCAPE '\\' OR title LIKE ")
                .push_bind(like_pattern(name))
                .push(" ESCAPE '\\')");
        }
        (Some(keyword), None) => {
            qb.push(" AND content LIKE ")
                .push_bind(like_pattern(keyword))
                .push(" ESCAPE '\\'");
        }
        (None, Some(name)) => {
            qb.push(" AND title LIKE ")
                .push_bind(like_pattern(name))
                .push(" ESCAPE '\\'");
        }
        (None, None) => {}
    }

    for tag_id in &filter.tag_ids {
        qb.push(" AND EXISTS (SELECT 1 FROM json_each(notes.tag_id_list) WHERE json_each.value = ")
            .push_bind(*tag_id)
            .push(")");
    }
}

pub async fn count_owned_notes(pool: &SqlitePool, owner: Uuid, filter: &NoteFilter) -> Result<i64> {
    let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM notes");
    push_filter(&mut qb, owner, filter);
    Ok(qb.build_query_scalar::<i64>().fetch_one(pool).await?)
}

pub async fn list_owned_notes(
    pool: &SqlitePool,
    owner: Uuid,
    filter: &NoteFilter,
    limit: i64,
    offset: i64,
) -> Result<Vec<Note>> {
    let mut qb = QueryBuilder::new("SELECT * FROM notes");
    push_filter(&mut qb, owner, filter);

    let column = filter.order_by.map(|o| o.column()).unwrap_or("created_at");
    let direction = if filter.descending { "DESC" } else { "ASC" };
    qb.push(format!(" ORDER BY {} {}, rowid {}", column, direction, direction));
    qb.push(" LIMIT ").push_bind(limit);
    qb.push(" OFFSET ").push_bind(offset);

    let rows = qb.build().fetch_all(pool).await?;
    rows.iter().map(note_from_row).collect()
}

/// Every note owned by a user, oldest first
pub async fn notes_for_owner(pool: &SqlitePool, owner: Uuid) -> Result<Vec<Note>> {
    let rows = sqlx::query("SELECT * FROM notes WHERE owner_id = ? ORDER BY created_at ASC")
        .bind(owner.to_string())
        .fetch_all(pool)
        .await?;
    rows.iter().map(note_from_row).collect()
}
