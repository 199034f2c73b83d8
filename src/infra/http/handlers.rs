use axum::{
    extract::{Query, State},
    http::{HeaderValue, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

use crate::domain::{
    error::RequestError,
    request::{self, Filename, PdfOptions, RawRenderQuery, RenderRequest},
};

use super::{error::ApiError, middleware::RenderSummary, state::AppState};

/// RFC 5987 attr-char: everything except unreserved characters is escaped.
const FILENAME_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// `POST /`: one HTML document in, one PDF out.
pub async fn render_document(
    State(state): State<AppState>,
    uri: Uri,
    body: Bytes,
) -> Result<Response, ApiError> {
    let (filename, options) = parse_query(&uri)?;
    let html = request::parse_html(&body)?;
    let request = RenderRequest::new(filename, options, vec![html])?;

    let document = state.coordinator.run_single(&request).await?;
    Ok(pdf_response(&request, document))
}

/// `POST /multiple`: `{ "pages": [...] }` in, one merged PDF out.
pub async fn render_multiple(
    State(state): State<AppState>,
    uri: Uri,
    body: Bytes,
) -> Result<Response, ApiError> {
    let (filename, options) = parse_query(&uri)?;
    let pages = request::parse_pages(&body, state.max_pages)?;
    let request = RenderRequest::new(filename, options, pages)?;

    let document = state.coordinator.run(&request).await?;
    Ok(pdf_response(&request, document))
}

fn parse_query(uri: &Uri) -> Result<(Filename, PdfOptions), RequestError> {
    let Query(raw) = Query::<RawRenderQuery>::try_from_uri(uri)
        .map_err(|err| RequestError::query(err.body_text()))?;
    request::parse(raw)
}

fn pdf_response(request: &RenderRequest, document: Vec<u8>) -> Response {
    let summary = RenderSummary {
        attachment: request.filename().attachment_name(),
        fragments: request.fragments().len(),
        bytes: document.len(),
    };

    let mut response = (StatusCode::OK, document).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/pdf"),
    );
    let disposition = HeaderValue::from_str(&content_disposition(request.filename()))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
    headers.insert(header::CONTENT_DISPOSITION, disposition);
    response.extensions_mut().insert(summary);
    response
}

pub(crate) fn content_disposition(filename: &Filename) -> String {
    let name = filename.attachment_name();
    let fallback: String = name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();

    if fallback == name {
        format!("attachment; filename=\"{name}\"")
    } else {
        let encoded = utf8_percent_encode(&name, FILENAME_ENCODE_SET);
        format!("attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
    }
}
