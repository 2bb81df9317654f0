//! Revision snapshots (append-only)

use chrono::{DateTime, TimeZone, Utc};
use notehub_common::models::Revision;
use notehub_common::{Error, Result};
use serde::Serialize;
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::parse_uuid;

fn revision_from_row(row: &SqliteRow) -> Result<Revision> {
    let authorship: String = row.try_get("authorship")?;
    Ok(Revision {
        id: row.try_get("id")?,
        note_id: parse_uuid(row.try_get::<String, _>("note_id")?.as_str())?,
        content: row.try_get("content")?,
        length: row.try_get("length")?,
        authorship: serde_json::from_str(&authorship)?,
        created_at: row.try_get("created_at")?,
    })
}

/// Append a snapshot inside the caller's transaction
pub async fn insert_revision(
    conn: &mut SqliteConnection,
    note_id: Uuid,
    content: &str,
    authorship_json: &str,
    at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO revisions (note_id, content, length, authorship, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(note_id.to_string())
    .bind(content)
    .bind(content.chars().count() as i64)
    .bind(authorship_json)
    .bind(at)
    .execute(conn)
    .await?;
    Ok(())
}

/// Entry of a revision list
#[derive(Debug, Clone, Serialize)]
pub struct RevisionSummary {
    /// Creation time in milliseconds since the epoch
    pub time: i64,
    pub length: i64,
}

/// Revisions of a note, newest first
pub async fn list_revisions(pool: &SqlitePool, note_id: Uuid) -> Result<Vec<RevisionSummary>> {
    let rows = sqlx::query(
        "SELECT length, created_at FROM revisions WHERE note_id = ? ORDER BY id DESC",
    )
    .bind(note_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let created_at: DateTime<Utc> = row.try_get("created_at")?;
            Ok(RevisionSummary {
                time: created_at.timestamp_millis(),
                length: row.try_get("length")?,
            })
        })
        .collect()
}

/// The revision in effect at `time_ms`: the newest one created at or before it
pub async fn revision_at(pool: &SqlitePool, note_id: Uuid, time_ms: i64) -> Result<Option<Revision>> {
    let at = Utc
        .timestamp_millis_opt(time_ms)
        .single()
        .ok_or_else(|| Error::InvalidInput(format!("Invalid revision time: {}", time_ms)))?;

    let rows = sqlx::query("SELECT * FROM revisions WHERE note_id = ? ORDER BY id DESC")
        .bind(note_id.to_string())
        .fetch_all(pool)
        .await?;

    for row in &rows {
        let revision = revision_from_row(row)?;
        // Compare at millisecond precision, the precision the list hands out
        if revision.created_at.timestamp_millis() <= at.timestamp_millis() {
            return Ok(Some(revision));
        }
    }
    Ok(None)
}
