//! Tag queries and the note/tag reference counter
//!
//! `tags.count` always equals the number of notes whose `tag_id_list`
//! contains the tag. Every change to a tag list updates the counter in the
//! same transaction.

use chrono::Utc;
use notehub_common::models::Tag;
use notehub_common::{Error, Result};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use super::{is_unique_violation, like_pattern, parse_uuid};

fn tag_from_row(row: &SqliteRow) -> Result<Tag> {
    Ok(Tag {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        count: row.try_get("count")?,
        owner_id: parse_uuid(row.try_get::<String, _>("owner_id")?.as_str())?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Live tags of an owner, optionally filtered by a name substring
pub async fn list_tags(pool: &SqlitePool, owner: Uuid, q: Option<&str>) -> Result<Vec<Tag>> {
    let rows = match q.filter(|q| !q.is_empty()) {
        Some(q) => {
            sqlx::query(
                r#"
                SELECT * FROM tags
                WHERE owner_id = ? AND deleted_at IS NULL AND name LIKE ? ESCAPE '\'
                ORDER BY name ASC
                "#,
            )
            .bind(owner.to_string())
            .bind(like_pattern(q))
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query("SELECT * FROM tags WHERE owner_id = ? AND deleted_at IS NULL ORDER BY name ASC")
                .bind(owner.to_string())
                .fetch_all(pool)
                .await?
        }
    };
    rows.iter().map(tag_from_row).collect()
}

/// A live tag owned by `owner`
pub async fn get_owned_tag(pool: &SqlitePool, owner: Uuid, id: i64) -> Result<Option<Tag>> {
    let row = sqlx::query("SELECT * FROM tags WHERE id = ? AND owner_id = ? AND deleted_at IS NULL")
        .bind(id)
        .bind(owner.to_string())
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(tag_from_row).transpose()
}

async fn find_tag_by_name(pool: &SqlitePool, owner: Uuid, name: &str) -> Result<Option<Tag>> {
    let row = sqlx::query("SELECT * FROM tags WHERE owner_id = ? AND name = ? AND deleted_at IS NULL")
        .bind(owner.to_string())
        .bind(name)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(tag_from_row).transpose()
}

/// Return the owner's tag with this name, creating it with a zero count
/// when it does not exist yet
///
/// A concurrent create of the same name loses on the unique index and
/// returns the winner's row.
pub async fn find_or_create_tag(pool: &SqlitePool, owner: Uuid, name: &str) -> Result<Tag> {
    if let Some(tag) = find_tag_by_name(pool, owner, name).await? {
        return Ok(tag);
    }

    let now = Utc::now();
    let inserted = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO tags (name, count, owner_id, created_at, updated_at)
        VALUES (?, 0, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(name)
    .bind(owner.to_string())
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await;

    let id = match inserted {
        Ok(id) => id,
        Err(e) if is_unique_violation(&e) => {
            debug!(owner = %owner, name, "Tag created concurrently, reusing it");
            return find_tag_by_name(pool, owner, name)
                .await?
                .ok_or_else(|| Error::Internal(format!("Tag '{}' vanished after conflict", name)));
        }
        Err(e) => return Err(e.into()),
    };

    info!(tag_id = id, owner = %owner, "Created tag");

    Ok(Tag {
        id,
        name: name.to_string(),
        count: 0,
        owner_id: owner,
        created_at: now,
        updated_at: now,
    })
}

/// Result of renaming a tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenameOutcome {
    Renamed(Tag),
    NotFound,
    /// Another live tag of the same owner already has the name
    NameTaken,
}

pub async fn rename_tag(pool: &SqlitePool, owner: Uuid, id: i64, name: &str) -> Result<RenameOutcome> {
    let Some(mut tag) = get_owned_tag(pool, owner, id).await? else {
        return Ok(RenameOutcome::NotFound);
    };
    if tag.name == name {
        return Ok(RenameOutcome::Renamed(tag));
    }
    if find_tag_by_name(pool, owner, name).await?.is_some() {
        return Ok(RenameOutcome::NameTaken);
    }

    let now = Utc::now();
    let renamed = sqlx::query("UPDATE tags SET name = ?, updated_at = ? WHERE id = ?")
        .bind(name)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await;
    match renamed {
        Ok(_) => {}
        Err(e) if is_unique_violation(&e) => return Ok(RenameOutcome::NameTaken),
        Err(e) => return Err(e.into()),
    }

    tag.name = name.to_string();
    tag.updated_at = now;
    Ok(RenameOutcome::Renamed(tag))
}

/// Result of deleting a tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
    /// At least one note still lists the tag
    Referenced,
}

/// Soft-delete a tag that no note references
///
/// The tag row is written first so the transaction holds the write lock
/// before the reference check; a concurrent tag-list change cannot slip in
/// between.
pub async fn delete_tag(pool: &SqlitePool, owner: Uuid, id: i64) -> Result<DeleteOutcome> {
    let mut tx = pool.begin().await?;
    let now = Utc::now();

    let claimed = sqlx::query(
        r#"
        UPDATE tags SET deleted_at = ?, updated_at = ?
        WHERE id = ? AND owner_id = ? AND deleted_at IS NULL
        "#,
    )
    .bind(now)
    .bind(now)
    .bind(id)
    .bind(owner.to_string())
    .execute(&mut *tx)
    .await?;
    if claimed.rows_affected() == 0 {
        return Ok(DeleteOutcome::NotFound);
    }

    let referenced: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM notes, json_each(notes.tag_id_list)
            WHERE json_each.value = ?
        )
        "#,
    )
    .bind(id)
    .fetch_one(&mut *tx)
    .await?;
    if referenced {
        tx.rollback().await?;
        return Ok(DeleteOutcome::Referenced);
    }

    tx.commit().await?;
    info!(tag_id = id, "Deleted tag");
    Ok(DeleteOutcome::Deleted)
}

/// Tags for a list of ids, in list order; unknown ids are skipped
pub async fn tags_by_ids(pool: &SqlitePool, ids: &[i64]) -> Result<Vec<Tag>> {
    let mut tags = Vec::with_capacity(ids.len());
    for id in ids {
        let row = sqlx::query("SELECT * FROM tags WHERE id = ?")
            .bind(*id)
            .fetch_optional(pool)
            .await?;
        if let Some(row) = row {
            tags.push(tag_from_row(&row)?);
        }
    }
    Ok(tags)
}

/// Direction of a note tag-list change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagChange {
    Add,
    Remove,
}

/// Result of changing a note's tag list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteTagOutcome {
    /// The new tag list of the note
    Updated(Vec<i64>),
    /// Tag already present on add, or absent on remove
    Unchanged,
    NoteNotFound,
    /// No live tag with this id belongs to the owner
    TagNotFound,
}

/// Add or remove a tag on a note and move the tag's counter with it
///
/// The counter update runs first and only matches a live tag of `owner`,
/// so a tag deleted concurrently is never attached or counted.
pub async fn update_note_tag(
    pool: &SqlitePool,
    owner: Uuid,
    note_id: Uuid,
    tag_id: i64,
    change: TagChange,
) -> Result<NoteTagOutcome> {
    let delta: i64 = match change {
        TagChange::Add => 1,
        TagChange::Remove => -1,
    };
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let counted = sqlx::query(
        r#"
        UPDATE tags SET count = count + ?, updated_at = ?
        WHERE id = ? AND owner_id = ? AND deleted_at IS NULL
        "#,
    )
    .bind(delta)
    .bind(now)
    .bind(tag_id)
    .bind(owner.to_string())
    .execute(&mut *tx)
    .await?;
    if counted.rows_affected() == 0 {
        tx.rollback().await?;
        return Ok(NoteTagOutcome::TagNotFound);
    }

    let list: Option<String> = sqlx::query_scalar("SELECT tag_id_list FROM notes WHERE id = ?")
        .bind(note_id.to_string())
        .fetch_optional(&mut *tx)
        .await?;
    let Some(list) = list else {
        tx.rollback().await?;
        return Ok(NoteTagOutcome::NoteNotFound);
    };
    let mut tag_ids: Vec<i64> = serde_json::from_str(&list)?;

    let position = tag_ids.iter().position(|id| *id == tag_id);
    match (change, position) {
        (TagChange::Add, None) => tag_ids.push(tag_id),
        (TagChange::Remove, Some(pos)) => {
            tag_ids.remove(pos);
        }
        _ => {
            tx.rollback().await?;
            return Ok(NoteTagOutcome::Unchanged);
        }
    }

    sqlx::query("UPDATE notes SET tag_id_list = ?, updated_at = ? WHERE id = ?")
        .bind(serde_json::to_string(&tag_ids)?)
        .bind(now)
        .bind(note_id.to_string())
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    debug!(note_id = %note_id, tag_id, ?change, "Updated note tags");
    Ok(NoteTagOutcome::Updated(tag_ids))
}
