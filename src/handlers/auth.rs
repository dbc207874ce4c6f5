use crate::{
    auth::{extract_bearer_token, CurrentIdentity, Resolution},
    models::Identity,
    utils::ApiResult,
    AppState,
};
use axum::{extract::State, http::HeaderMap, Extension, Json};

/// Get the identity attached to the current request
pub async fn me(Extension(CurrentIdentity(identity)): Extension<CurrentIdentity>) -> Json<Identity> {
    Json(identity)
}

/// Explain how the caller's bearer token resolves, strategy by strategy
pub async fn resolution(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Resolution>> {
    let token = extract_bearer_token(&headers);
    let resolution = state
        .resolver
        .resolve_with_diagnostics(token.as_deref())
        .await?;

    Ok(Json(resolution))
}
