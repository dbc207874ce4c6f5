//! Credential resolution.
//!
//! Every request carrying `Authorization: Bearer <token>` is run through an
//! ordered list of strategies:
//!
//! 1. **Session tokens**: HS256 tokens issued by this service, carrying the
//!    user id. The identity is loaded by id.
//! 2. **Provider tokens**: Firebase ID tokens verified against Google's
//!    published key set. The identity is loaded by its stored provider uid.
//!    Skipped when no provider project is configured.
//!
//! The first strategy that yields a non-blocked identity wins and the identity
//! is attached to the request as [`CurrentIdentity`]. Requests that resolve to
//! nothing continue unauthenticated; [`require_auth`] is what turns that into
//! a 401 on protected routes.

pub mod jwks;
pub mod provider;
pub mod resolver;
pub mod session;

pub use provider::{FirebaseVerifier, IdTokenVerifier, ProviderClaims, ProviderStrategy};
pub use resolver::{
    AttemptRecord, CredentialResolver, OutcomeKind, RejectReason, Resolution, Strategy,
    StrategyResult, VerificationOutcome,
};
pub use session::{SessionStrategy, SessionTokenVerifier};

use crate::{
    db::IdentityStore,
    models::Identity,
    utils::{ApiError, Config},
};
use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::{sync::Arc, time::Duration};
use tracing::info;

/// Identity resolved for the current request
#[derive(Debug, Clone)]
pub struct CurrentIdentity(pub Identity);

/// Build the session-then-provider resolver from configuration
pub fn build_resolver(
    config: &Config,
    store: Arc<dyn IdentityStore>,
) -> anyhow::Result<CredentialResolver> {
    let provider: Option<Arc<dyn IdTokenVerifier>> = match &config.provider.project_id {
        Some(project_id) => {
            info!(project_id = %project_id, "Identity provider verification enabled");
            Some(Arc::new(FirebaseVerifier::new(
                project_id,
                &config.provider.jwks_url,
                Duration::from_secs(config.provider.key_cache_ttl_secs),
            )?))
        }
        None => {
            info!("FIREBASE_PROJECT_ID not set, provider tokens will not be accepted");
            None
        }
    };

    let strategies: Vec<Box<dyn Strategy>> = vec![
        Box::new(SessionStrategy::new(
            SessionTokenVerifier::new(&config.session.jwt_secret),
            store.clone(),
        )),
        Box::new(ProviderStrategy::new(provider, store)),
    ];

    Ok(CredentialResolver::new(strategies, &config.auth))
}

/// Extract bearer token from request headers
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("Authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|auth_header| auth_header.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

/// Authentication middleware
pub async fn auth_middleware(
    State(resolver): State<Arc<CredentialResolver>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer_token(request.headers());

    if let Some(identity) = resolver.resolve(token.as_deref()).await? {
        request.extensions_mut().insert(CurrentIdentity(identity));
    }

    Ok(next.run(request).await)
}

/// Required authentication middleware (returns 401 if no identity was resolved)
pub async fn require_auth(request: Request, next: Next) -> Result<Response, ApiError> {
    if request.extensions().get::<CurrentIdentity>().is_some() {
        Ok(next.run(request).await)
    } else {
        Err(ApiError::authentication_error("Authentication required"))
    }
}
