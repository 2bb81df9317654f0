//! Accounts and sessions

use chrono::{Duration, Utc};
use notehub_common::auth::{generate_salt, generate_session_token, hash_password, verify_password};
use notehub_common::models::User;
use notehub_common::{Error, Result};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use uuid::Uuid;

use super::parse_uuid;

fn user_from_row(row: &SqliteRow) -> Result<User> {
    Ok(User {
        id: parse_uuid(row.try_get::<String, _>("id")?.as_str())?,
        username: row.try_get("username")?,
        display_name: row.try_get("display_name")?,
        email: row.try_get("email")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Create an account; fails with `InvalidInput` when the name is taken
pub async fn create_user(
    pool: &SqlitePool,
    username: &str,
    password: &str,
    display_name: Option<&str>,
    email: Option<&str>,
) -> Result<User> {
    let taken: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE username = ?)")
        .bind(username)
        .fetch_one(pool)
        .await?;
    if taken {
        return Err(Error::InvalidInput("username already taken".to_string()));
    }

    let id = Uuid::new_v4();
    let salt = generate_salt();
    let hash = hash_password(password, &salt);
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO users (id, username, password_hash, password_salt, display_name, email, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(username)
    .bind(&hash)
    .bind(&salt)
    .bind(display_name)
    .bind(email)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(User {
        id,
        username: username.to_string(),
        display_name: display_name.map(str::to_string),
        email: email.map(str::to_string),
        created_at: now,
    })
}

pub async fn get_user(pool: &SqlitePool, id: Uuid) -> Result<Option<User>> {
    let row = sqlx::query("SELECT * FROM users WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(user_from_row).transpose()
}

/// Check credentials, returning the user on success
pub async fn authenticate(pool: &SqlitePool, username: &str, password: &str) -> Result<Option<User>> {
    let Some(row) = sqlx::query("SELECT * FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(pool)
        .await?
    else {
        return Ok(None);
    };

    let hash: String = row.try_get("password_hash")?;
    let salt: String = row.try_get("password_salt")?;
    if !verify_password(password, &salt, &hash) {
        return Ok(None);
    }
    user_from_row(&row).map(Some)
}

/// Open a session for a user and return its token
pub async fn create_session(pool: &SqlitePool, user_id: Uuid, lifetime_days: i64) -> Result<String> {
    let token = generate_session_token();
    let now = Utc::now();
    let expires_at = now + Duration::days(lifetime_days.max(1));

    sqlx::query("INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)")
        .bind(&token)
        .bind(user_id.to_string())
        .bind(now)
        .bind(expires_at)
        .execute(pool)
        .await?;

    Ok(token)
}

/// Resolve a session token to its (unexpired) user
pub async fn user_for_session(pool: &SqlitePool, token: &str) -> Result<Option<User>> {
    let row = sqlx::query(
        r#"
        SELECT u.* FROM sessions s
        JOIN users u ON u.id = s.user_id
        WHERE s.token = ? AND s.expires_at > ?
        "#,
    )
    .bind(token)
    .bind(Utc::now())
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(user_from_row).transpose()
}

pub async fn delete_session(pool: &SqlitePool, token: &str) -> Result<()> {
    sqlx::query("DELETE FROM sessions WHERE token = ?")
        .bind(token)
        .execute(pool)
        .await?;
    Ok(())
}

/// Remove expired sessions, returning how many were dropped
pub async fn purge_expired_sessions(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
        .bind(Utc::now())
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
