pub mod auth_context;
pub mod extractors;

pub use auth_context::{AuthContext, Viewer};
pub use extractors::{ApiJson, ApiPath, ApiQuery};

use axum::{
    extract::Request,
    http::{header, HeaderValue, Method},
    middleware::Next,
    response::Response,
};
use std::time::{Duration, Instant};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::warn;

/// Request timing middleware
pub async fn request_timing_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();

    let response = next.run(request).await;

    tracing::info!(
        method = %method,
        uri = %uri,
        duration_ms = start.elapsed().as_millis(),
        status = response.status().as_u16(),
        "Request processed"
    );

    response
}

/// Log which caller attempted a state change. Reads pass silently.
pub async fn mutation_logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    if crate::auth::policy::is_read_only(&method) {
        return next.run(request).await;
    }

    let uri = request.uri().clone();
    let has_credentials = request.headers().contains_key(header::AUTHORIZATION);
    let response = next.run(request).await;

    tracing::info!(
        method = %method,
        uri = %uri,
        authenticated = has_credentials,
        status = response.status().as_u16(),
        "Mutation request"
    );

    response
}

/// CORS for the configured origins, or any origin when none are configured.
pub fn create_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match origin.parse::<HeaderValue>() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = %origin, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .max_age(Duration::from_secs(3600))
}
