//! Image upload

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};

use crate::auth::MaybeUser;
use crate::error::{ApiError, ApiResult};
use crate::images::store_image;
use crate::AppState;

/// Multipart field carrying the image
const IMAGE_FIELD: &str = "image";

/// POST /uploadimage
pub async fn upload_image(
    State(state): State<AppState>,
    user: MaybeUser,
    mut multipart: Multipart,
) -> ApiResult<Json<Value>> {
    if user.0.is_none() && !state.config.allow_anonymous {
        return Err(ApiError::forbidden());
    }

    let mut bytes = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid upload: {}", e)))?
    {
        if field.name() == Some(IMAGE_FIELD) {
            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("invalid upload: {}", e)))?;
            bytes = Some(data);
            break;
        }
    }
    let bytes = bytes.ok_or_else(|| ApiError::BadRequest("missing image field".to_string()))?;

    let dir = state.config.uploads_path.clone();
    let stored = tokio::task::spawn_blocking(move || store_image(&dir, &bytes))
        .await
        .map_err(|e| ApiError::Internal(format!("Upload task failed: {}", e)))??;

    let link = format!(
        "{}/uploads/{}",
        state.config.server_url.trim_end_matches('/'),
        stored.file_name
    );
    Ok(Json(json!({ "link": link })))
}

/// Build image routes; uploads larger than `max_bytes` are rejected
pub fn image_routes(max_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/uploadimage", post(upload_image))
        .layer(DefaultBodyLimit::max(max_bytes))
}
