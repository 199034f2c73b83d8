//! HTTP transport: routes, CORS, body limit, request ids and response logging.

mod error;
mod handlers;
mod middleware;
mod state;

pub use error::{ApiError, ApiErrorBody, ApiErrorMessage, codes};
pub use middleware::REQUEST_ID_HEADER;
pub use state::AppState;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{Method, header},
    middleware as axum_middleware,
    routing::post,
};
use tower_http::cors::{Any, CorsLayer};

use middleware::{log_responses, set_request_context};

/// `OPTIONS` on any path is answered by the CORS layer before routing.
pub fn build_router(state: AppState, body_limit_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .expose_headers([header::CONTENT_DISPOSITION, REQUEST_ID_HEADER]);

    Router::new()
        .route("/", post(handlers::render_document))
        .route("/multiple", post(handlers::render_multiple))
        .layer(DefaultBodyLimit::max(body_limit_bytes))
        .with_state(state)
        .layer(cors)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}
