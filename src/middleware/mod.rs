pub mod pipeline;

use crate::utils::ApiError;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderName, HeaderValue, Method},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use pipeline::{CorsOptions, CspOptions, DirectiveValue};
use std::{any::Any, collections::BTreeMap};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
};

/// Reject requests whose declared length exceeds the body limit
pub async fn validate_request_size(
    State(max_bytes): State<usize>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(content_length) = request.headers().get(header::CONTENT_LENGTH) {
        if let Ok(length_str) = content_length.to_str() {
            if let Ok(length) = length_str.parse::<usize>() {
                if length > max_bytes {
                    return Err(ApiError::payload_too_large());
                }
            }
        }
    }

    Ok(next.run(request).await)
}

/// CORS layer from the `cors` stage options.
///
/// An origin of `*` mirrors the request origin, which unlike a literal
/// wildcard stays valid when credentials are allowed.
pub fn cors_layer(options: &CorsOptions) -> anyhow::Result<CorsLayer> {
    let allow_origin = if options.origins.iter().any(|origin| origin == "*") {
        AllowOrigin::mirror_request()
    } else {
        let origins = options
            .origins
            .iter()
            .map(|origin| {
                origin
                    .parse::<HeaderValue>()
                    .map_err(|_| anyhow::anyhow!("Invalid CORS origin: {}", origin))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        AllowOrigin::list(origins)
    };

    let methods = options
        .methods
        .iter()
        .map(|method| {
            Method::from_bytes(method.as_bytes())
                .map_err(|_| anyhow::anyhow!("Invalid CORS method: {}", method))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let headers = options
        .headers
        .iter()
        .map(|name| {
            HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| anyhow::anyhow!("Invalid CORS header: {}", name))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(methods)
        .allow_headers(headers)
        .allow_credentials(options.credentials))
}

fn default_csp_directives() -> BTreeMap<String, DirectiveValue> {
    let sources = |values: &[&str]| {
        DirectiveValue::Sources(values.iter().map(|v| v.to_string()).collect())
    };

    BTreeMap::from([
        ("default-src".to_string(), sources(&["'self'"])),
        ("base-uri".to_string(), sources(&["'self'"])),
        ("font-src".to_string(), sources(&["'self'", "https:", "data:"])),
        ("form-action".to_string(), sources(&["'self'"])),
        ("frame-ancestors".to_string(), sources(&["'self'"])),
        ("img-src".to_string(), sources(&["'self'", "data:"])),
        ("object-src".to_string(), sources(&["'none'"])),
        ("script-src".to_string(), sources(&["'self'"])),
        ("script-src-attr".to_string(), sources(&["'none'"])),
        ("style-src".to_string(), sources(&["'self'", "https:", "'unsafe-inline'"])),
        ("upgrade-insecure-requests".to_string(), DirectiveValue::Enabled(true)),
    ])
}

/// Render the `Content-Security-Policy` header value
pub fn content_security_policy(options: &CspOptions) -> String {
    let mut directives = if options.use_defaults {
        default_csp_directives()
    } else {
        BTreeMap::new()
    };
    directives.extend(options.directives.clone());

    directives
        .iter()
        .filter_map(|(name, value)| match value {
            DirectiveValue::Enabled(false) => None,
            DirectiveValue::Enabled(true) => Some(name.clone()),
            DirectiveValue::Sources(sources) if sources.is_empty() => Some(name.clone()),
            DirectiveValue::Sources(sources) => Some(format!("{} {}", name, sources.join(" "))),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Headers set by the `security` stage
pub fn security_header_layers(
    options: &CspOptions,
) -> anyhow::Result<Vec<SetResponseHeaderLayer<HeaderValue>>> {
    let csp = HeaderValue::from_str(&content_security_policy(options))
        .map_err(|_| anyhow::anyhow!("Content security policy is not a valid header value"))?;

    Ok(vec![
        SetResponseHeaderLayer::if_not_present(header::CONTENT_SECURITY_POLICY, csp),
        SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ),
        SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("SAMEORIGIN"),
        ),
        SetResponseHeaderLayer::if_not_present(
            header::REFERRER_POLICY,
            HeaderValue::from_static("no-referrer"),
        ),
    ])
}

pub fn powered_by_layer(value: &str) -> anyhow::Result<SetResponseHeaderLayer<HeaderValue>> {
    let value = HeaderValue::from_str(value)
        .map_err(|_| anyhow::anyhow!("Invalid X-Powered-By value: {}", value))?;
    Ok(SetResponseHeaderLayer::overriding(
        HeaderName::from_static("x-powered-by"),
        value,
    ))
}

/// Request ID middleware
pub fn request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::x_request_id(MakeRequestUuid)
}

pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::x_request_id()
}

/// Tracing middleware
pub fn trace_layer() -> tower_http::trace::TraceLayer<
    tower_http::classify::SharedClassifier<tower_http::classify::ServerErrorsAsFailures>,
> {
    tower_http::trace::TraceLayer::new_for_http()
        .make_span_with(tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO))
        .on_response(tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO))
}

/// Turn a handler panic into a JSON 500
pub fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response<Body> {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!(%detail, "Handler panicked");

    ApiError::internal_error("Internal server error").into_response()
}

/// Health check handler
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}
