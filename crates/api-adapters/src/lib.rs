//! # api-adapters
//!
//! The HTTP routing layer of the comment service.

pub mod metrics;

#[cfg(feature = "web-axum")]
pub mod error;
#[cfg(feature = "web-axum")]
pub mod handlers;
#[cfg(feature = "web-axum")]
pub mod middleware;

pub use metrics::ApiMetrics;

#[cfg(feature = "web-axum")]
pub use handlers::AppState;

/// Builds the full router: comment API, health and metrics, wrapped in
/// tracing and CORS layers.
#[cfg(feature = "web-axum")]
pub fn router(state: AppState) -> axum::Router {
    use axum::routing::{delete, get, post};

    axum::Router::new()
        .route(
            "/api/comments",
            post(handlers::create_comment).get(handlers::list_comments),
        )
        .route("/api/comments/{id}", delete(handlers::delete_comment))
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .layer(middleware::cors_policy())
        .layer(middleware::standard_middleware())
        .with_state(state)
}
