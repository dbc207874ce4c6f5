//! Ordered middleware stages.
//!
//! The pipeline is read once at startup, either from a TOML file or from the
//! built-in default, and applied to the router in list order: the first stage
//! sees the request first.
//!
//! ```toml
//! [[stages]]
//! name = "logger"
//!
//! [[stages]]
//! name = "cors"
//! origins = ["http://localhost:3000"]
//! credentials = true
//! ```

use super::{
    cors_layer, handle_panic, powered_by_layer, propagate_request_id_layer, request_id_layer,
    security_header_layers, trace_layer, validate_request_size,
};
use crate::auth::{auth_middleware, CredentialResolver};
use axum::{extract::DefaultBodyLimit, middleware::from_fn_with_state, Router};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, collections::HashSet, path::Path, sync::Arc};
use tower_http::catch_panic::CatchPanicLayer;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DirectiveValue {
    Sources(Vec<String>),
    /// `false` drops the directive, `true` emits it without sources
    Enabled(bool),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CspOptions {
    #[serde(default = "default_true")]
    pub use_defaults: bool,
    #[serde(default)]
    pub directives: BTreeMap<String, DirectiveValue>,
}

impl Default for CspOptions {
    fn default() -> Self {
        Self {
            use_defaults: true,
            directives: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CorsOptions {
    #[serde(default)]
    pub origins: Vec<String>,
    #[serde(default)]
    pub credentials: bool,
    #[serde(default = "default_cors_methods")]
    pub methods: Vec<String>,
    #[serde(default = "default_cors_headers")]
    pub headers: Vec<String>,
}

impl Default for CorsOptions {
    fn default() -> Self {
        Self {
            origins: Vec::new(),
            credentials: false,
            methods: default_cors_methods(),
            headers: default_cors_headers(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case", deny_unknown_fields)]
pub enum StageConfig {
    Logger,
    Errors,
    Security {
        #[serde(default)]
        content_security_policy: CspOptions,
    },
    Cors(CorsOptions),
    PoweredBy {
        #[serde(default = "default_powered_by")]
        value: String,
    },
    Body {
        #[serde(default = "default_max_body_bytes")]
        max_bytes: usize,
    },
    RequestId,
    CredentialResolver,
}

impl StageConfig {
    pub fn name(&self) -> &'static str {
        match self {
            StageConfig::Logger => "logger",
            StageConfig::Errors => "errors",
            StageConfig::Security { .. } => "security",
            StageConfig::Cors(_) => "cors",
            StageConfig::PoweredBy { .. } => "powered_by",
            StageConfig::Body { .. } => "body",
            StageConfig::RequestId => "request_id",
            StageConfig::CredentialResolver => "credential_resolver",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub stages: Vec<StageConfig>,
}

fn default_true() -> bool {
    true
}

fn default_cors_methods() -> Vec<String> {
    ["GET", "POST", "PUT", "DELETE", "PATCH", "OPTIONS"]
        .iter()
        .map(|m| m.to_string())
        .collect()
}

fn default_cors_headers() -> Vec<String> {
    ["Content-Type", "Authorization", "Origin", "Accept"]
        .iter()
        .map(|h| h.to_string())
        .collect()
}

fn default_powered_by() -> String {
    "Pattaya API".to_string()
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let sources = |values: &[&str]| {
            DirectiveValue::Sources(values.iter().map(|v| v.to_string()).collect())
        };

        Self {
            stages: vec![
                StageConfig::Logger,
                StageConfig::Errors,
                StageConfig::Security {
                    content_security_policy: CspOptions {
                        use_defaults: true,
                        directives: BTreeMap::from([
                            ("connect-src".to_string(), sources(&["'self'", "https:"])),
                            (
                                "img-src".to_string(),
                                sources(&["'self'", "data:", "blob:", "https:"]),
                            ),
                            (
                                "media-src".to_string(),
                                sources(&["'self'", "data:", "blob:", "https:"]),
                            ),
                            (
                                "upgrade-insecure-requests".to_string(),
                                DirectiveValue::Enabled(false),
                            ),
                        ]),
                    },
                },
                StageConfig::Cors(CorsOptions {
                    origins: vec![
                        "http://localhost:3000".to_string(),
                        "http://localhost:5173".to_string(),
                        "https://pattaya1-ten.vercel.app".to_string(),
                    ],
                    credentials: true,
                    ..CorsOptions::default()
                }),
                StageConfig::PoweredBy {
                    value: default_powered_by(),
                },
                StageConfig::Body {
                    max_bytes: default_max_body_bytes(),
                },
                StageConfig::RequestId,
                StageConfig::CredentialResolver,
            ],
        }
    }
}

impl PipelineConfig {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| anyhow::anyhow!("Invalid middleware configuration: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Each stage at most once, and the credential resolver must be present.
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut seen = HashSet::new();
        for stage in &self.stages {
            if !seen.insert(stage.name()) {
                anyhow::bail!("Middleware stage '{}' is listed twice", stage.name());
            }
        }

        if !seen.contains("credential_resolver") {
            anyhow::bail!("Middleware stage 'credential_resolver' is required");
        }

        Ok(())
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(StageConfig::name).collect()
    }

    /// Wrap `router` with every stage. Layers added last run first, so
    /// stages are applied in reverse.
    pub fn apply(&self, router: Router, resolver: Arc<CredentialResolver>) -> anyhow::Result<Router> {
        self.validate()?;

        let mut router = router;
        for stage in self.stages.iter().rev() {
            router = match stage {
                StageConfig::Logger => router.layer(trace_layer()),
                StageConfig::Errors => router.layer(CatchPanicLayer::custom(handle_panic)),
                StageConfig::Security {
                    content_security_policy,
                } => security_header_layers(content_security_policy)?
                    .into_iter()
                    .fold(router, |router, layer| router.layer(layer)),
                StageConfig::Cors(options) => router.layer(cors_layer(options)?),
                StageConfig::PoweredBy { value } => router.layer(powered_by_layer(value)?),
                StageConfig::Body { max_bytes } => router
                    .layer(DefaultBodyLimit::max(*max_bytes))
                    .layer(from_fn_with_state(*max_bytes, validate_request_size)),
                StageConfig::RequestId => router
                    .layer(propagate_request_id_layer())
                    .layer(request_id_layer()),
                StageConfig::CredentialResolver => {
                    router.layer(from_fn_with_state(resolver.clone(), auth_middleware))
                }
            };
        }

        Ok(router)
    }
}
