//! Cached provider key set.
//!
//! Keys are refetched once the TTL elapses, or early when a token names a
//! key id the cache has not seen (provider key rotation). Every fetch,
//! failed or not, starts a refresh interval during which no other fetch is
//! made, so neither bogus key ids nor a provider outage turn a flood of
//! tokens into a flood of requests to the provider.

use crate::utils::AuthFault;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use std::time::Duration;
use tokio::{sync::RwLock, time::Instant};
use tracing::{debug, info, warn};

const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(30);
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

struct CachedKeys {
    keys: JwkSet,
    fetched_at: Instant,
}

#[derive(Default)]
struct KeyState {
    keys: Option<CachedKeys>,
    /// Last fetch, successful or not
    last_attempt: Option<Instant>,
    last_error: Option<String>,
}

impl KeyState {
    /// Answer from what is already known, or `None` when a fetch is due.
    fn lookup(&self, kid: &str, ttl: Duration) -> Option<Result<Option<Jwk>, AuthFault>> {
        if let Some(cached) = &self.keys {
            if cached.fetched_at.elapsed() < ttl {
                if let Some(key) = cached.keys.find(kid) {
                    return Some(Ok(Some(key.clone())));
                }
            }
        }

        let recent = self
            .last_attempt
            .is_some_and(|at| at.elapsed() < MIN_REFRESH_INTERVAL);
        if !recent {
            return None;
        }

        Some(match &self.keys {
            Some(cached) => Ok(cached.keys.find(kid).cloned()),
            None => Err(AuthFault::KeySet(
                self.last_error
                    .clone()
                    .unwrap_or_else(|| "key set unavailable".to_string()),
            )),
        })
    }
}

pub struct KeySetCache {
    client: reqwest::Client,
    url: String,
    ttl: Duration,
    state: RwLock<KeyState>,
}

impl KeySetCache {
    pub fn new(url: impl Into<String>, ttl: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(FETCH_TIMEOUT).build()?;

        Ok(Self {
            client,
            url: url.into(),
            ttl,
            state: RwLock::new(KeyState::default()),
        })
    }

    /// Look up a key by id, fetching the key set when needed.
    ///
    /// While the endpoint is failing, stale keys keep being served and at
    /// most one fetch is made per refresh interval.
    pub async fn find(&self, kid: &str) -> Result<Option<Jwk>, AuthFault> {
        if let Some(answer) = self.state.read().await.lookup(kid, self.ttl) {
            return answer;
        }

        let mut state = self.state.write().await;

        // Another task may have fetched while we waited for the lock.
        if let Some(answer) = state.lookup(kid, self.ttl) {
            return answer;
        }

        state.last_attempt = Some(Instant::now());
        match self.fetch().await {
            Ok(keys) => {
                let found = keys.find(kid).cloned();
                state.keys = Some(CachedKeys {
                    keys,
                    fetched_at: Instant::now(),
                });
                state.last_error = None;
                Ok(found)
            }
            Err(fault) => {
                state.last_error = Some(match &fault {
                    AuthFault::KeySet(message) => message.clone(),
                    other => other.to_string(),
                });
                match &state.keys {
                    Some(cached) => {
                        warn!(error = %fault, "Key set refresh failed, serving stale keys");
                        Ok(cached.keys.find(kid).cloned())
                    }
                    None => Err(fault),
                }
            }
        }
    }

    async fn fetch(&self) -> Result<JwkSet, AuthFault> {
        debug!(url = %self.url, "Fetching provider key set");

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| AuthFault::KeySet(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthFault::KeySet(format!(
                "key set endpoint returned {}",
                response.status()
            )));
        }

        let keys: JwkSet = response
            .json()
            .await
            .map_err(|e| AuthFault::KeySet(e.to_string()))?;

        info!(count = keys.keys.len(), "Provider key set refreshed");
        Ok(keys)
    }
}
