//! Chelal HMS server
//!
//! REST/JSON backend for a hospital management system: patients,
//! appointments, encounters, pharmacy stock and dispensing, billing,
//! notifications, audit trail and reports.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod server;
pub mod services;
pub mod types;
pub mod utils;
pub mod validation;

pub use config::AppConfig;
pub use error::{ApiError, ApiResult};
pub use server::ChelalServer;

use axum::{middleware::from_fn, Router};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Build the application router with every route and middleware layer.
pub fn create_app(server: ChelalServer) -> Router {
    let timeout = Duration::from_secs(server.config.server.request_timeout_secs);
    let cors = middleware::create_cors_layer(&server.config.server.cors_origins);

    routes::create_routes()
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(TimeoutLayer::new(timeout))
                .layer(from_fn(middleware::request_timing_middleware))
                .layer(from_fn(middleware::mutation_logging_middleware)),
        )
        .with_state(server)
}
