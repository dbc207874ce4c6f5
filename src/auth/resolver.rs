use crate::{
    models::Identity,
    utils::{config::AuthPolicyConfig, AuthFault},
};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Why a strategy refused a token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Malformed, expired, wrong signature, wrong audience...
    TokenInvalid(String),
    IdentityNotFound,
    IdentityBlocked,
}

/// Result of running one verification strategy against a token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    Verified(Identity),
    Rejected(RejectReason),
    /// The token is not of the scheme this strategy handles, or the strategy is unavailable
    Inapplicable,
}

impl VerificationOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            VerificationOutcome::Verified(_) => OutcomeKind::Verified,
            VerificationOutcome::Rejected(RejectReason::TokenInvalid(_)) => OutcomeKind::TokenInvalid,
            VerificationOutcome::Rejected(RejectReason::IdentityNotFound) => {
                OutcomeKind::IdentityNotFound
            }
            VerificationOutcome::Rejected(RejectReason::IdentityBlocked) => {
                OutcomeKind::IdentityBlocked
            }
            VerificationOutcome::Inapplicable => OutcomeKind::Inapplicable,
        }
    }
}

/// What a strategy hands back to the resolver
#[derive(Debug, Clone)]
pub struct StrategyResult {
    pub outcome: VerificationOutcome,
    /// Number of identity records the strategy's lookup matched, when it did one
    pub matches: Option<usize>,
}

impl From<VerificationOutcome> for StrategyResult {
    fn from(outcome: VerificationOutcome) -> Self {
        Self {
            outcome,
            matches: None,
        }
    }
}

/// One way of turning a bearer token into an identity.
#[async_trait]
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Only infrastructure faults are errors; every token problem is an outcome.
    async fn attempt(&self, token: &str) -> Result<StrategyResult, AuthFault>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Verified,
    TokenInvalid,
    IdentityNotFound,
    IdentityBlocked,
    Inapplicable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptRecord {
    pub strategy: &'static str,
    pub outcome: OutcomeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matches: Option<usize>,
}

/// Diagnostics of a single resolve call
#[derive(Debug, Clone, Default, Serialize)]
pub struct Resolution {
    pub identity: Option<Identity>,
    pub attempts: Vec<AttemptRecord>,
}

impl Resolution {
    /// Identity matches reported by the named strategy, if it ran a lookup
    pub fn matches_for(&self, strategy: &str) -> Option<usize> {
        self.attempts
            .iter()
            .find(|attempt| attempt.strategy == strategy)
            .and_then(|attempt| attempt.matches)
    }
}

/// Runs the configured strategies in order and stops at the first verified identity.
pub struct CredentialResolver {
    strategies: Vec<Box<dyn Strategy>>,
    blocked_falls_through: bool,
}

impl CredentialResolver {
    pub fn new(strategies: Vec<Box<dyn Strategy>>, policy: &AuthPolicyConfig) -> Self {
        Self {
            strategies,
            blocked_falls_through: policy.blocked_falls_through,
        }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub async fn resolve(&self, token: Option<&str>) -> Result<Option<Identity>, AuthFault> {
        Ok(self.resolve_with_diagnostics(token).await?.identity)
    }

    pub async fn resolve_with_diagnostics(
        &self,
        token: Option<&str>,
    ) -> Result<Resolution, AuthFault> {
        let mut resolution = Resolution::default();

        let Some(token) = token.filter(|t| !t.is_empty()) else {
            debug!("No bearer token, request proceeds unauthenticated");
            return Ok(resolution);
        };

        for strategy in &self.strategies {
            let result = strategy.attempt(token).await?;
            resolution.attempts.push(AttemptRecord {
                strategy: strategy.name(),
                outcome: result.outcome.kind(),
                matches: result.matches,
            });

            match result.outcome {
                VerificationOutcome::Verified(identity) => {
                    info!(
                        strategy = strategy.name(),
                        user_id = identity.id,
                        "Request authenticated"
                    );
                    resolution.identity = Some(identity);
                    return Ok(resolution);
                }
                VerificationOutcome::Rejected(RejectReason::IdentityBlocked)
                    if !self.blocked_falls_through =>
                {
                    warn!(
                        strategy = strategy.name(),
                        "Blocked identity, not trying remaining strategies"
                    );
                    return Ok(resolution);
                }
                VerificationOutcome::Rejected(reason) => {
                    debug!(strategy = strategy.name(), ?reason, "Strategy rejected token");
                }
                VerificationOutcome::Inapplicable => {
                    debug!(strategy = strategy.name(), "Strategy not applicable");
                }
            }
        }

        debug!("No strategy resolved an identity");
        Ok(resolution)
    }
}
