//! CORS layer built from bridge configuration.

use crate::domain::config::CorsConfig;
use axum::http::{header, HeaderValue, Method};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

/// Prompt callers only need POST, health checks GET.
const ALLOWED_METHODS: [Method; 3] = [Method::GET, Method::POST, Method::OPTIONS];

pub fn create_cors_layer(config: &CorsConfig) -> CorsLayer {
    if !config.enabled {
        return CorsLayer::very_permissive();
    }

    let cors = CorsLayer::new()
        .allow_methods(ALLOWED_METHODS.to_vec())
        .allow_headers([header::CONTENT_TYPE])
        .max_age(Duration::from_secs(config.max_age));

    if config.allowed_origins.iter().any(|o| o == "*") {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    cors.allow_origin(origins)
}
