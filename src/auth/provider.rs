use super::{
    jwks::KeySetCache,
    resolver::{RejectReason, Strategy, StrategyResult, VerificationOutcome},
    session::looks_like_jwt,
};
use crate::{db::IdentityStore, utils::AuthFault};
use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, warn};

/// Claims of a provider ID token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderClaims {
    pub sub: String,
    pub iss: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    #[serde(default)]
    pub auth_time: Option<i64>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: Option<bool>,
}

#[derive(Debug)]
pub enum ProviderError {
    /// The token failed verification
    Invalid(String),
    Fault(AuthFault),
}

/// Verifies ID tokens issued by the external identity provider
#[async_trait]
pub trait IdTokenVerifier: Send + Sync {
    async fn verify_id_token(&self, token: &str) -> Result<ProviderClaims, ProviderError>;
}

/// Firebase ID token verifier: RS256 against the published key set
pub struct FirebaseVerifier {
    project_id: String,
    keys: KeySetCache,
}

impl FirebaseVerifier {
    pub fn new(project_id: &str, jwks_url: &str, key_cache_ttl: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            project_id: project_id.to_string(),
            keys: KeySetCache::new(jwks_url, key_cache_ttl)?,
        })
    }

    pub fn issuer(&self) -> String {
        format!("https://securetoken.google.com/{}", self.project_id)
    }
}

#[async_trait]
impl IdTokenVerifier for FirebaseVerifier {
    async fn verify_id_token(&self, token: &str) -> Result<ProviderClaims, ProviderError> {
        let header = decode_header(token).map_err(|e| ProviderError::Invalid(e.to_string()))?;
        if header.alg != Algorithm::RS256 {
            return Err(ProviderError::Invalid(format!(
                "unexpected algorithm {:?}",
                header.alg
            )));
        }

        let kid = header
            .kid
            .ok_or_else(|| ProviderError::Invalid("token has no key id".to_string()))?;
        let jwk = self
            .keys
            .find(&kid)
            .await
            .map_err(ProviderError::Fault)?
            .ok_or_else(|| ProviderError::Invalid(format!("unknown key id {kid}")))?;
        let key = DecodingKey::from_jwk(&jwk).map_err(|e| ProviderError::Invalid(e.to_string()))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&self.project_id]);
        validation.set_issuer(&[self.issuer()]);

        let data = decode::<ProviderClaims>(token, &key, &validation)
            .map_err(|e| ProviderError::Invalid(e.to_string()))?;

        if data.claims.sub.is_empty() {
            return Err(ProviderError::Invalid("token has an empty subject".to_string()));
        }

        Ok(data.claims)
    }
}

/// Unverified view of a token, for diagnostics only
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenAnalysis {
    pub algorithm: String,
    pub token_type: Option<String>,
    pub has_kid: bool,
    pub issuer: Option<String>,
    pub subject: Option<String>,
    pub audience: Option<String>,
}

impl TokenAnalysis {
    /// Provider custom tokens carry no key id and cannot be verified here.
    pub fn is_custom_token(&self) -> bool {
        !self.has_kid
    }
}

/// Decode a token's header and payload without checking anything.
pub fn analyze_token(token: &str) -> Option<TokenAnalysis> {
    let header = decode_header(token).ok()?;

    let mut validation = Validation::new(header.alg);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let payload = decode::<serde_json::Value>(token, &DecodingKey::from_secret(&[]), &validation)
        .ok()?
        .claims;

    let text = |name: &str| match payload.get(name) {
        Some(serde_json::Value::String(s)) => Some(s.clone()),
        Some(serde_json::Value::Null) | None => None,
        Some(other) => Some(other.to_string()),
    };

    Some(TokenAnalysis {
        algorithm: format!("{:?}", header.alg),
        token_type: header.typ,
        has_kid: header.kid.is_some(),
        issuer: text("iss"),
        subject: text("sub"),
        audience: text("aud"),
    })
}

/// Strategy B: provider ID token, identity looked up by provider uid
pub struct ProviderStrategy {
    verifier: Option<Arc<dyn IdTokenVerifier>>,
    store: Arc<dyn IdentityStore>,
}

impl ProviderStrategy {
    /// `verifier` is `None` when the provider is not configured.
    pub fn new(verifier: Option<Arc<dyn IdTokenVerifier>>, store: Arc<dyn IdentityStore>) -> Self {
        Self { verifier, store }
    }
}

fn log_token_analysis(token: &str) {
    match analyze_token(token) {
        Some(analysis) => {
            debug!(
                algorithm = %analysis.algorithm,
                token_type = ?analysis.token_type,
                has_kid = analysis.has_kid,
                issuer = ?analysis.issuer,
                subject = ?analysis.subject,
                audience = ?analysis.audience,
                "Rejected provider token analysis"
            );
            if analysis.is_custom_token() {
                info!("Token has no key id; it looks like a provider custom token, which must be exchanged for an ID token client-side");
            }
        }
        None => debug!("Could not decode rejected token for analysis"),
    }
}

#[async_trait]
impl Strategy for ProviderStrategy {
    fn name(&self) -> &'static str {
        "provider"
    }

    async fn attempt(&self, token: &str) -> Result<StrategyResult, AuthFault> {
        let Some(verifier) = &self.verifier else {
            debug!("Identity provider not initialized, skipping provider token verification");
            return Ok(VerificationOutcome::Inapplicable.into());
        };

        if !looks_like_jwt(token) {
            return Ok(VerificationOutcome::Inapplicable.into());
        }

        let claims = match verifier.verify_id_token(token).await {
            Ok(claims) => claims,
            Err(ProviderError::Fault(fault)) => return Err(fault),
            Err(ProviderError::Invalid(reason)) => {
                debug!(%reason, "Provider token verification failed");
                log_token_analysis(token);
                return Ok(VerificationOutcome::Rejected(RejectReason::TokenInvalid(reason)).into());
            }
        };

        debug!(uid = %claims.sub, "Provider token verified");

        let matches = self.store.find_by_provider_uid(&claims.sub).await?;
        let count = matches.len();
        if count > 1 {
            warn!(
                uid = %claims.sub,
                count,
                "Multiple identities share a provider uid, using the first"
            );
        }

        let outcome = match matches.into_iter().next() {
            Some(identity) if identity.blocked => {
                debug!(user_id = identity.id, "Provider token subject is blocked");
                VerificationOutcome::Rejected(RejectReason::IdentityBlocked)
            }
            Some(identity) => VerificationOutcome::Verified(identity),
            None => {
                debug!(uid = %claims.sub, "No identity linked to provider uid");
                VerificationOutcome::Rejected(RejectReason::IdentityNotFound)
            }
        };

        Ok(StrategyResult {
            outcome,
            matches: Some(count),
        })
    }
}
