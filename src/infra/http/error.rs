use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::error::ErrorReport;
use crate::application::render::{RenderError, RenderErrorKind};
use crate::domain::error::RequestError;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorMessage,
}

pub mod codes {
    pub const BAD_REQUEST: &str = "bad_request";
    pub const RENDER: &str = "render_error";
    pub const MERGE: &str = "merge_error";
    pub const RESOURCE: &str = "resource_error";
    pub const TIMEOUT: &str = "timeout";
    pub const INTERNAL: &str = "internal_error";
}

#[derive(Debug, Serialize)]
pub struct ApiErrorMessage {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: &'static str,
    hint: Option<String>,
    report: ErrorReport,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl From<RenderError> for ApiError {
    fn from(error: RenderError) -> Self {
        let (status, code, message) = match error.kind() {
            RenderErrorKind::MalformedRequest => (
                StatusCode::BAD_REQUEST,
                codes::BAD_REQUEST,
                "Request could not be processed",
            ),
            RenderErrorKind::RenderEngine => (
                StatusCode::BAD_GATEWAY,
                codes::RENDER,
                "Rendering engine failed",
            ),
            RenderErrorKind::Merge => (
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::MERGE,
                "Rendered documents could not be merged",
            ),
            RenderErrorKind::Resource => (
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::RESOURCE,
                "Transient render resources failed",
            ),
            RenderErrorKind::Timeout => (
                StatusCode::GATEWAY_TIMEOUT,
                codes::TIMEOUT,
                "Render request timed out",
            ),
            RenderErrorKind::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::INTERNAL,
                "Unexpected error occurred",
            ),
        };

        let report = ErrorReport::from_error("infra::http::render", &error);
        let hint = report.messages.join(": ");
        Self {
            status,
            code,
            message,
            hint: Some(hint),
            report,
        }
    }
}

impl From<RequestError> for ApiError {
    fn from(error: RequestError) -> Self {
        RenderError::from(error).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: ApiErrorMessage {
                code: self.code.to_string(),
                message: self.message.to_string(),
                hint: self.hint,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        self.report.attach(&mut response);
        response
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::application::render::MergeError;

    #[test]
    fn maps_error_kinds_to_status_codes() {
        let cases = [
            (
                RenderError::from(RequestError::body("bad json")),
                StatusCode::BAD_REQUEST,
                codes::BAD_REQUEST,
            ),
            (
                RenderError::Merge(MergeError::Empty { index: 2 }),
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::MERGE,
            ),
            (
                RenderError::resource("disk full"),
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::RESOURCE,
            ),
            (
                RenderError::Timeout(Duration::from_secs(1)),
                StatusCode::GATEWAY_TIMEOUT,
                codes::TIMEOUT,
            ),
            (
                RenderError::TaskAborted("panicked".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::INTERNAL,
            ),
        ];

        for (error, status, code) in cases {
            let api = ApiError::from(error);
            assert_eq!(api.status(), status);
            assert_eq!(api.code(), code);
        }
    }

    #[test]
    fn response_carries_json_body_and_report() {
        let response = ApiError::from(RequestError::body("`pages` missing")).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let report = response
            .extensions()
            .get::<ErrorReport>()
            .expect("report attached");
        assert!(report.messages[0].contains("`pages` missing"));
    }
}
