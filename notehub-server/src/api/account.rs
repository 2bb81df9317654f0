//! Accounts, sessions and per-user data export

use axum::{
    extract::State,
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_TYPE, SET_COOKIE},
        HeaderMap,
    },
    response::{AppendHeaders, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use notehub_common::auth::{is_valid_username, MIN_PASSWORD_LEN};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::auth::{cookie_value, login_cookies, logout_cookies, CurrentUser, MaybeUser, SESSION_COOKIE};
use crate::db::{notes, users};
use crate::error::{ApiError, ApiResult};
use crate::export::{export_archive, EXPORT_FILE_NAME};
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

fn cookie_headers(cookies: [String; 3]) -> AppendHeaders<[(axum::http::HeaderName, String); 3]> {
    let [session, state, user] = cookies;
    AppendHeaders([(SET_COOKIE, session), (SET_COOKIE, state), (SET_COOKIE, user)])
}

/// POST /register
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    let username = req.username.trim();
    if !is_valid_username(username) {
        return Err(ApiError::BadRequest("invalid username".to_string()));
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::BadRequest(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    let user = users::create_user(
        &state.db,
        username,
        &req.password,
        req.display_name.as_deref().map(str::trim).filter(|s| !s.is_empty()),
        req.email.as_deref().map(str::trim).filter(|s| !s.is_empty()),
    )
    .await?;
    let token = users::create_session(&state.db, user.id, state.config.session_lifetime_days).await?;

    info!(user_id = %user.id, "Registered user");

    Ok((
        cookie_headers(login_cookies(&token, user.id, state.config.session_lifetime_days)),
        Json(json!({ "status": "ok", "id": user.id, "name": user.name() })),
    ))
}

/// POST /login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let user = users::authenticate(&state.db, req.username.trim(), &req.password)
        .await?
        .ok_or_else(|| ApiError::Forbidden("invalid username or password".to_string()))?;
    let token = users::create_session(&state.db, user.id, state.config.session_lifetime_days).await?;

    info!(user_id = %user.id, "User logged in");

    Ok((
        cookie_headers(login_cookies(&token, user.id, state.config.session_lifetime_days)),
        Json(json!({ "status": "ok", "id": user.id, "name": user.name() })),
    ))
}

/// POST /logout
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<impl IntoResponse> {
    if let Some(token) = cookie_value(&headers, SESSION_COOKIE).filter(|t| !t.is_empty()) {
        users::delete_session(&state.db, &token).await?;
    }

    Ok((cookie_headers(logout_cookies()), Json(json!({ "status": "ok" }))))
}

/// GET /me
pub async fn me(user: MaybeUser) -> Json<serde_json::Value> {
    match user.0 {
        Some(user) => Json(json!({
            "status": "ok",
            "id": user.id,
            "name": user.name(),
            "email": user.email,
        })),
        None => Json(json!({ "status": "forbidden" })),
    }
}

/// POST /me/export
pub async fn export(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<impl IntoResponse> {
    let notes = notes::notes_for_owner(&state.db, user.id).await?;
    let count = notes.len();

    let archive = tokio::task::spawn_blocking(move || export_archive(&notes))
        .await
        .map_err(|e| ApiError::Internal(format!("Export task failed: {}", e)))??;

    info!(user_id = %user.id, notes = count, bytes = archive.len(), "Exported notes");

    Ok((
        [
            (CONTENT_TYPE, "application/zip".to_string()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", EXPORT_FILE_NAME),
            ),
        ],
        archive,
    ))
}

/// Build account routes
pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/me", get(me))
        .route("/me/export", post(export))
}
