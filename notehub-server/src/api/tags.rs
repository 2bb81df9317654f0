//! Tag API
//!
//! Tags belong to one user. The usage `count` is maintained by the note tag
//! endpoints; whatever count a client sends is ignored.

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::CurrentUser;
use crate::db::tags::{self, DeleteOutcome, RenameOutcome};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Longest accepted tag name, in characters
const MAX_TAG_NAME: usize = 64;

#[derive(Debug, Deserialize)]
pub struct TagListQuery {
    /// Name substring for autocomplete
    pub q: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TagBody {
    pub name: Option<String>,
}

fn tag_name(body: &TagBody) -> ApiResult<&str> {
    let name = body.name.as_deref().map(str::trim).unwrap_or_default();
    if name.is_empty() {
        return Err(ApiError::Failed("name is required".to_string()));
    }
    if name.chars().count() > MAX_TAG_NAME {
        return Err(ApiError::Failed("name is too long".to_string()));
    }
    Ok(name)
}

/// GET /api/tag
pub async fn list_tags(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<TagListQuery>,
) -> ApiResult<Json<Value>> {
    let tags = tags::list_tags(&state.db, user.id, query.q.as_deref().map(str::trim)).await?;
    Ok(Json(json!({ "status": "ok", "tags": tags })))
}

/// PUT /api/tag
pub async fn put_tag(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<TagBody>,
) -> ApiResult<Json<Value>> {
    let name = tag_name(&body)?;
    let tag = tags::find_or_create_tag(&state.db, user.id, name).await?;
    Ok(Json(json!({ "status": "ok", "tag": tag })))
}

/// POST /api/tag/:id
pub async fn rename_tag(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    Json(body): Json<TagBody>,
) -> ApiResult<Json<Value>> {
    let name = tag_name(&body)?;
    match tags::rename_tag(&state.db, user.id, id, name).await? {
        RenameOutcome::Renamed(tag) => Ok(Json(json!({ "status": "ok", "tag": tag }))),
        RenameOutcome::NotFound => Err(ApiError::NotFound("tag not found".to_string())),
        RenameOutcome::NameTaken => Err(ApiError::Failed("tag already exists".to_string())),
    }
}

/// DELETE /api/tag/:id
pub async fn delete_tag(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    match tags::delete_tag(&state.db, user.id, id).await? {
        DeleteOutcome::Deleted => Ok(Json(json!({ "status": "ok" }))),
        DeleteOutcome::NotFound => Err(ApiError::NotFound("tag not found".to_string())),
        DeleteOutcome::Referenced => Err(ApiError::Failed("tag has reference".to_string())),
    }
}

/// Build tag routes
pub fn tag_routes() -> Router<AppState> {
    Router::new()
        .route("/api/tag", get(list_tags).put(put_tag))
        .route("/api/tag/:id", post(rename_tag).delete(delete_tag))
}
