use crate::{
    auth::CurrentIdentity,
    models::{Photo, PhotoPatch},
    utils::{ApiError, ApiResult},
    AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use validator::Validate;

/// Create a photo
pub async fn create_photo(
    State(state): State<AppState>,
    Extension(CurrentIdentity(identity)): Extension<CurrentIdentity>,
    Json(mut patch): Json<PhotoPatch>,
) -> ApiResult<(StatusCode, Json<Photo>)> {
    patch
        .validate()
        .map_err(|e| ApiError::validation_error(format!("Invalid photo data: {}", e)))?;

    if patch.author.is_none() {
        patch.author = Some(identity.id);
    }

    state.lifecycle.before_create(&mut patch, Utc::now());
    let photo = state.photos.create_photo(&patch).await?;
    state.lifecycle.after_create(&photo);

    Ok((StatusCode::CREATED, Json(photo)))
}

/// Update a photo, keeping its moderation timestamps in step with its status
pub async fn update_photo(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(mut patch): Json<PhotoPatch>,
) -> ApiResult<Json<Photo>> {
    patch
        .validate()
        .map_err(|e| ApiError::validation_error(format!("Invalid photo data: {}", e)))?;

    state.lifecycle.before_update(id, &mut patch, Utc::now()).await?;

    let photo = state
        .photos
        .update_photo(id, &patch)
        .await?
        .ok_or_else(|| ApiError::not_found_error(format!("Photo {} not found", id)))?;
    state.lifecycle.after_update(&photo);

    Ok(Json(photo))
}
