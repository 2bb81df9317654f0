//! Database bootstrap tests

use notehub_common::db::{get_setting, init_database, set_setting, SCHEMA_VERSION};
use tempfile::TempDir;

#[tokio::test]
async fn test_creates_database_file_and_parent() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("nested").join("notehub.db");

    let pool = init_database(&db_path).await.unwrap();
    assert!(db_path.exists());

    let version: i64 = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(version, SCHEMA_VERSION);
}

#[tokio::test]
async fn test_all_tables_created() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("notehub.db")).await.unwrap();

    for table in ["settings", "users", "sessions", "notes", "tags", "revisions"] {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?)",
        )
        .bind(table)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert!(exists, "missing table {}", table);
    }
}

#[tokio::test]
async fn test_init_is_idempotent_and_keeps_settings() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("notehub.db");

    let pool = init_database(&db_path).await.unwrap();
    let instance = get_setting(&pool, "instance_id").await.unwrap();
    assert!(instance.is_some());
    set_setting(&pool, "custom", "1").await.unwrap();
    pool.close().await;

    let pool = init_database(&db_path).await.unwrap();
    assert_eq!(get_setting(&pool, "instance_id").await.unwrap(), instance);
    assert_eq!(get_setting(&pool, "custom").await.unwrap().as_deref(), Some("1"));
}

#[tokio::test]
async fn test_tag_count_cannot_go_negative() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("notehub.db")).await.unwrap();

    sqlx::query(
        "INSERT INTO users (id, username, password_hash, password_salt, created_at, updated_at)
         VALUES ('u1', 'alice', '', '', CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)",
    )
    .execute(&pool)
    .await
    .unwrap();

    let result = sqlx::query(
        "INSERT INTO tags (name, count, owner_id, created_at, updated_at)
         VALUES ('t', -1, 'u1', CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)",
    )
    .execute(&pool)
    .await;
    assert!(result.is_err());
}
