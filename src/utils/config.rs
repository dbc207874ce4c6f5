use crate::middleware::pipeline::PipelineConfig;
use serde::{Deserialize, Serialize};
use std::env;

/// Default key set endpoint for Firebase ID tokens.
pub const DEFAULT_PROVIDER_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Session token configuration
    pub session: SessionConfig,
    /// Identity provider configuration
    pub provider: ProviderConfig,
    /// Credential resolution policy
    pub auth: AuthPolicyConfig,
    /// Photo lifecycle policy
    pub lifecycle: LifecycleConfig,
    /// Ordered middleware stages
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub supabase_url: String,
    #[serde(skip_serializing)]
    pub supabase_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(skip_serializing)]
    pub jwt_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Firebase project id; the provider strategy is unavailable without it.
    pub project_id: Option<String>,
    pub jwks_url: String,
    pub key_cache_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthPolicyConfig {
    /// Keep trying later strategies when an earlier one finds a blocked identity.
    pub blocked_falls_through: bool,
}

impl Default for AuthPolicyConfig {
    fn default() -> Self {
        Self {
            blocked_falls_through: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Log and continue when a lifecycle hook fails instead of aborting the write.
    pub swallow_trigger_errors: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            swallow_trigger_errors: true,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let pipeline = match env::var("MIDDLEWARES_CONFIG") {
            Ok(path) => PipelineConfig::from_file(&path)?,
            Err(_) => PipelineConfig::default(),
        };

        let config = Self {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "1337".to_string())
                    .parse()
                    .map_err(|_| anyhow::anyhow!("Invalid PORT value"))?,
            },
            database: DatabaseConfig {
                supabase_url: env::var("SUPABASE_URL")
                    .map_err(|_| anyhow::anyhow!("SUPABASE_URL is required"))?,
                supabase_key: env::var("SUPABASE_SERVICE_ROLE_KEY")
                    .map_err(|_| anyhow::anyhow!("SUPABASE_SERVICE_ROLE_KEY is required"))?,
            },
            session: SessionConfig {
                jwt_secret: env::var("JWT_SECRET")
                    .map_err(|_| anyhow::anyhow!("JWT_SECRET is required"))?,
            },
            provider: ProviderConfig {
                project_id: env::var("FIREBASE_PROJECT_ID")
                    .ok()
                    .filter(|id| !id.trim().is_empty()),
                jwks_url: env::var("FIREBASE_JWKS_URL")
                    .unwrap_or_else(|_| DEFAULT_PROVIDER_JWKS_URL.to_string()),
                key_cache_ttl_secs: env::var("JWKS_CACHE_TTL_SECS")
                    .unwrap_or_else(|_| "3600".to_string())
                    .parse()
                    .unwrap_or(3600),
            },
            auth: AuthPolicyConfig {
                blocked_falls_through: env_flag("AUTH_BLOCKED_FALLS_THROUGH", true)?,
            },
            lifecycle: LifecycleConfig {
                swallow_trigger_errors: env_flag("LIFECYCLE_SWALLOW_ERRORS", true)?,
            },
            pipeline,
        };

        Ok(config)
    }
}

fn env_flag(name: &str, default: bool) -> anyhow::Result<bool> {
    match env::var(name) {
        Ok(value) => parse_flag(&value)
            .ok_or_else(|| anyhow::anyhow!("Invalid {} value: {}", name, value)),
        Err(_) => Ok(default),
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
