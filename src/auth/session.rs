use super::resolver::{RejectReason, Strategy, StrategyResult, VerificationOutcome};
use crate::{db::IdentityStore, utils::AuthFault};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Claims carried by locally issued session tokens
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    pub id: i64,
    pub iat: usize,
    pub exp: usize,
}

/// HS256 verifier for session tokens signed with the service secret
pub struct SessionTokenVerifier {
    decoding_key: DecodingKey,
    encoding_key: EncodingKey,
    validation: Validation,
}

impl SessionTokenVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Returns the subject id, or a description of why the token is invalid.
    pub fn verify(&self, token: &str) -> Result<i64, String> {
        decode::<SessionClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims.id)
            .map_err(|e| e.to_string())
    }

    /// Issue a session token for `id` valid for `ttl`.
    pub fn issue(&self, id: i64, ttl: Duration) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let claims = SessionClaims {
            id,
            iat: now.timestamp() as usize,
            exp: (now + ttl).timestamp() as usize,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
    }
}

/// Strategy A: session token, identity looked up by id
pub struct SessionStrategy {
    verifier: SessionTokenVerifier,
    store: Arc<dyn IdentityStore>,
}

impl SessionStrategy {
    pub fn new(verifier: SessionTokenVerifier, store: Arc<dyn IdentityStore>) -> Self {
        Self { verifier, store }
    }
}

pub(crate) fn looks_like_jwt(token: &str) -> bool {
    let segments: Vec<&str> = token.split('.').collect();
    segments.len() == 3 && segments.iter().take(2).all(|s| !s.is_empty())
}

#[async_trait]
impl Strategy for SessionStrategy {
    fn name(&self) -> &'static str {
        "session"
    }

    async fn attempt(&self, token: &str) -> Result<StrategyResult, AuthFault> {
        if !looks_like_jwt(token) {
            return Ok(VerificationOutcome::Inapplicable.into());
        }

        let id = match self.verifier.verify(token) {
            Ok(id) => id,
            Err(reason) => {
                debug!(%reason, "Session token verification failed");
                return Ok(VerificationOutcome::Rejected(RejectReason::TokenInvalid(reason)).into());
            }
        };

        let outcome = match self.store.find_by_id(id).await? {
            Some(identity) if identity.blocked => {
                debug!(user_id = id, "Session token subject is blocked");
                VerificationOutcome::Rejected(RejectReason::IdentityBlocked)
            }
            Some(identity) => VerificationOutcome::Verified(identity),
            None => {
                debug!(user_id = id, "Session token subject not found");
                VerificationOutcome::Rejected(RejectReason::IdentityNotFound)
            }
        };

        Ok(StrategyResult {
            outcome,
            matches: None,
        })
    }
}
