use std::time::Instant;

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::application::error::ErrorReport;

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
}

/// What a successful render produced, attached to the response for logging.
#[derive(Debug, Clone)]
pub struct RenderSummary {
    pub attachment: String,
    pub fragments: usize,
    pub bytes: usize,
}

/// Tags the request with a fresh id and echoes it as `x-request-id`.
pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    request.extensions_mut().insert(RequestContext {
        request_id: request_id.clone(),
    });

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();

    let mut response = next.run(request).await;
    let status = response.status();
    let elapsed_ms = start.elapsed().as_millis() as u64;

    if let Some(summary) = response.extensions_mut().remove::<RenderSummary>() {
        info!(
            target = "presswork::http::response",
            status = status.as_u16(),
            method = %method,
            path = %path,
            elapsed_ms,
            attachment = %summary.attachment,
            fragments = summary.fragments,
            bytes = summary.bytes,
            request_id = %request_id,
            "document rendered",
        );
        return response;
    }

    if !(status.is_client_error() || status.is_server_error()) {
        return response;
    }

    let (source, messages) = match response.extensions_mut().remove::<ErrorReport>() {
        Some(report) => (report.source, report.messages),
        None => ("axum", Vec::new()),
    };
    let detail = messages
        .last()
        .cloned()
        .unwrap_or_else(|| "rejected before reaching a handler".to_string());

    if status.is_server_error() {
        error!(
            target = "presswork::http::response",
            status = status.as_u16(),
            method = %method,
            path = %path,
            elapsed_ms,
            source,
            detail = %detail,
            chain = ?messages,
            request_id = %request_id,
            "render request failed",
        );
    } else {
        warn!(
            target = "presswork::http::response",
            status = status.as_u16(),
            method = %method,
            path = %path,
            elapsed_ms,
            source,
            detail = %detail,
            request_id = %request_id,
            "render request rejected",
        );
    }

    response
}
