use crate::{
    auth::require_auth,
    handlers::{auth as auth_handlers, photos},
    middleware::health_check,
    AppState,
};
use axum::{
    middleware::from_fn,
    routing::{get, post, put},
    Router,
};

/// Build the router with every configured middleware stage applied
pub fn create_app(state: AppState) -> anyhow::Result<Router> {
    // Public routes (identity optional)
    let public_routes = Router::new()
        .route("/health", get(health_check))
        .route("/api/auth/resolution", get(auth_handlers::resolution));

    // Protected routes (identity required)
    let protected_routes = Router::new()
        .route("/api/users/me", get(auth_handlers::me))
        .route("/api/photos", post(photos::create_photo))
        .route("/api/photos/:id", put(photos::update_photo))
        .layer(from_fn(require_auth));

    let pipeline = state.config.pipeline.clone();
    let resolver = state.resolver.clone();

    let router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state);

    pipeline.apply(router, resolver)
}
