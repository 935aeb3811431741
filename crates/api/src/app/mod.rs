//! Router assembly.

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

use std::sync::Arc;

use axum::error_handling::HandleErrorLayer;
use axum::extract::Extension;
use axum::http::StatusCode;
use axum::Router;
use tower::ServiceBuilder;

use crate::config::AppConfig;
use services::AppServices;

/// Build the application router with the shared service handles and the
/// off-the-shelf protection layers (load shedding, a concurrency cap, and
/// a whole-request deadline).
pub fn build_app(services: Arc<AppServices>, config: &AppConfig) -> Router {
    let protection = ServiceBuilder::new()
        .layer(HandleErrorLayer::new(handle_middleware_error))
        .load_shed()
        .concurrency_limit(config.max_in_flight)
        .timeout(config.request_timeout);

    Router::new()
        .nest(
            "/profiles",
            routes::profiles::router().merge(routes::referrals::router()),
        )
        .layer(protection)
        .layer(Extension(services))
}

async fn handle_middleware_error(err: tower::BoxError) -> axum::response::Response {
    if err.is::<tower::timeout::error::Elapsed>() {
        return errors::json_error(
            StatusCode::REQUEST_TIMEOUT,
            "request_timeout",
            "request exceeded the deadline",
        );
    }

    if err.is::<tower::load_shed::error::Overloaded>() {
        return errors::json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "overloaded",
            "service is at capacity, try again shortly",
        );
    }

    errors::json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error",
        err.to_string(),
    )
}
