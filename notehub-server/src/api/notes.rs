//! Note API: listing, content update, deletion and note tags

use axum::{
    extract::{Path, Query, State},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use notehub_common::authorship::Authorship;
use notehub_common::models::{Note, Permission, Tag};
use notehub_common::note_id::encode_note_id;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use super::{can_edit_note, can_view_note};
use crate::auth::{CurrentUser, MaybeUser};
use crate::db::notes::{self, NoteFilter, NoteOrder, SaveContent};
use crate::db::tags::{self, NoteTagOutcome, TagChange};
use crate::error::{ApiError, ApiResult};
use crate::pagination::{calculate_pagination, sanitize_limit};
use crate::AppState;

/// Message for HTTP updates refused because of a live session
pub const BUSY_MESSAGE: &str = "Update API can only be used when no users is online";

/// Listing parameters, parsed from repeated query pairs so both `tagIds=1`
/// and `tagIds[]=1&tagIds[]=2` work
#[derive(Debug, Default, PartialEq)]
pub struct ListQuery {
    pub filter: NoteFilter,
    pub limit: Option<i64>,
    pub page: i64,
}

impl ListQuery {
    pub fn parse(pairs: &[(String, String)]) -> ApiResult<Self> {
        let mut query = ListQuery::default();

        for (key, value) in pairs {
            match key.as_str() {
                "keyword" => query.filter.keyword = Some(value.clone()),
                "name" => query.filter.name = Some(value.clone()),
                "tagIds" | "tagIds[]" => {
                    for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                        let id = part
                            .parse::<i64>()
                            .map_err(|_| ApiError::BadRequest(format!("invalid tag id: {}", part)))?;
                        if !query.filter.tag_ids.contains(&id) {
                            query.filter.tag_ids.push(id);
                        }
                    }
                }
                "limit" => {
                    query.limit = Some(
                        value
                            .parse()
                            .map_err(|_| ApiError::BadRequest("invalid limit".to_string()))?,
                    )
                }
                "page" => {
                    query.page = value
                        .parse()
                        .map_err(|_| ApiError::BadRequest("invalid page".to_string()))?
                }
                "orderBy" => {
                    query.filter.order_by = Some(
                        NoteOrder::from_query(value)
                            .ok_or_else(|| ApiError::BadRequest(format!("invalid orderBy: {}", value)))?,
                    )
                }
                "order" => {
                    query.filter.descending = match value.to_ascii_uppercase().as_str() {
                        "ASC" => false,
                        "DESC" => true,
                        _ => return Err(ApiError::BadRequest(format!("invalid order: {}", value))),
                    }
                }
                _ => {}
            }
        }

        Ok(query)
    }
}

/// One entry of the `myNotes` list
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteSummary {
    pub id: String,
    pub alias: Option<String>,
    pub short_id: String,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "lastchangeAt")]
    pub lastchange_at: Option<DateTime<Utc>>,
    pub viewcount: i64,
    pub permission: Permission,
    pub tags: Vec<Tag>,
}

impl NoteSummary {
    fn new(note: Note, tags: Vec<Tag>) -> Self {
        Self {
            id: encode_note_id(&note.id),
            alias: note.alias,
            short_id: note.shortid,
            title: note.title,
            content: note.content,
            created_at: note.created_at,
            lastchange_at: note.last_change_at,
            viewcount: note.viewcount,
            permission: note.permission,
            tags,
        }
    }
}

/// GET /api/notes/my_notes
pub async fn my_notes(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(pairs): Query<Vec<(String, String)>>,
) -> ApiResult<Json<Value>> {
    let query = ListQuery::parse(&pairs)?;
    let limit = sanitize_limit(query.limit);

    let total = notes::count_owned_notes(&state.db, user.id, &query.filter).await?;
    let page = calculate_pagination(total, query.page, limit);
    let rows = notes::list_owned_notes(&state.db, user.id, &query.filter, page.limit, page.offset).await?;

    let mut my_notes = Vec::with_capacity(rows.len());
    for note in rows {
        let tags = tags::tags_by_ids(&state.db, &note.tag_id_list).await?;
        my_notes.push(NoteSummary::new(note, tags));
    }

    Ok(Json(json!({
        "status": "ok",
        "total": total,
        "totalPages": page.total_pages,
        "page": page.page,
        "limit": page.limit,
        "myNotes": my_notes,
    })))
}

#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    pub content: String,
}

/// PUT /api/notes/:note_id
pub async fn update_note(
    State(state): State<AppState>,
    user: MaybeUser,
    Path(note_id): Path<String>,
    Json(req): Json<UpdateRequest>,
) -> ApiResult<Json<Value>> {
    let user_id = user.id();
    if user_id.is_none() && !state.config.allow_anonymous_edits {
        return Err(ApiError::forbidden());
    }

    let note = notes::find_note(&state.db, &note_id)
        .await?
        .ok_or_else(ApiError::not_found)?;
    if !can_edit_note(&state.config, &note, user_id) {
        return Err(ApiError::forbidden());
    }

    let _guard = state
        .pool
        .lock_for_http_update(note.id)
        .ok_or_else(|| ApiError::Busy(BUSY_MESSAGE.to_string()))?;

    let now = Utc::now();
    let authorship = Authorship::whole(user_id, req.content.chars().count(), now.timestamp_millis()).spans();
    let saved = notes::save_content(
        &state.db,
        note.id,
        SaveContent {
            content: &req.content,
            authorship: &authorship,
            user_id,
            at: now,
        },
    )
    .await?;
    if !saved {
        return Err(ApiError::not_found());
    }

    info!(note_id = %note.id, "Updated note over HTTP");
    Ok(Json(json!({ "status": "ok", "id": encode_note_id(&note.id) })))
}

/// DELETE /api/notes/:note_id
pub async fn delete_note(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(note_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let note = notes::find_note(&state.db, &note_id)
        .await?
        .ok_or_else(ApiError::not_found)?;

    if notes::delete_owned_note(&state.db, note.id, user.id).await?.is_none() {
        return Err(ApiError::forbidden());
    }
    state.pool.disconnect_note(note.id).await;

    Ok(Json(json!({ "status": "ok" })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteTagRequest {
    #[serde(alias = "tag_id")]
    pub tag_id: i64,
}

async fn change_note_tag(
    state: &AppState,
    user_id: Uuid,
    note_id: &str,
    tag_id: i64,
    change: TagChange,
) -> ApiResult<Json<Value>> {
    let note = notes::find_note(&state.db, note_id)
        .await?
        .ok_or_else(ApiError::not_found)?;
    if !can_edit_note(&state.config, &note, Some(user_id)) {
        return Err(ApiError::forbidden());
    }
    let tag_ids = match tags::update_note_tag(&state.db, user_id, note.id, tag_id, change).await? {
        NoteTagOutcome::Updated(tag_ids) => tag_ids,
        NoteTagOutcome::Unchanged => {
            let msg = match change {
                TagChange::Add => "tag already on note",
                TagChange::Remove => "tag not on note",
            };
            return Err(ApiError::Failed(msg.to_string()));
        }
        NoteTagOutcome::NoteNotFound => return Err(ApiError::not_found()),
        NoteTagOutcome::TagNotFound => return Err(ApiError::NotFound("tag not found".to_string())),
    };

    let tags = tags::tags_by_ids(&state.db, &tag_ids).await?;
    Ok(Json(json!({ "status": "ok", "tags": tags })))
}

/// POST /api/notes/:note_id/add_tag
pub async fn add_tag(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(note_id): Path<String>,
    Json(req): Json<NoteTagRequest>,
) -> ApiResult<Json<Value>> {
    change_note_tag(&state, user.id, &note_id, req.tag_id, TagChange::Add).await
}

/// POST /api/notes/:note_id/del_tag
pub async fn del_tag(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(note_id): Path<String>,
    Json(req): Json<NoteTagRequest>,
) -> ApiResult<Json<Value>> {
    change_note_tag(&state, user.id, &note_id, req.tag_id, TagChange::Remove).await
}

/// GET /api/notes/:note_id/get_tag
pub async fn get_tags(
    State(state): State<AppState>,
    user: MaybeUser,
    Path(note_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let note = notes::find_note(&state.db, &note_id)
        .await?
        .ok_or_else(ApiError::not_found)?;
    if !can_view_note(&state.config, &note, user.id()) {
        return Err(ApiError::forbidden());
    }

    let tags = tags::tags_by_ids(&state.db, &note.tag_id_list).await?;
    Ok(Json(json!({ "status": "ok", "tags": tags })))
}

/// Build note API routes
pub fn note_api_routes() -> Router<AppState> {
    Router::new()
        .route("/api/notes/my_notes", get(my_notes))
        .route("/api/notes/:note_id", put(update_note).delete(delete_note))
        .route("/api/notes/:note_id/add_tag", post(add_tag))
        .route("/api/notes/:note_id/del_tag", post(del_tag))
        .route("/api/notes/:note_id/get_tag", get(get_tags))
}
