use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE, LAST_MODIFIED},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
};

use crate::application::article::{encode_title, ArticleError};
use crate::application::error::RenderFailure;
use crate::application::queue::task::RenderJob;
use crate::application::render::RenderRequest;
use crate::domain::types::{DeviceKind, PageFormat, PdfDocument};

use super::error::HttpError;
use super::HttpState;

const SOURCE: &str = "infra::http::pdf";

/// Request headers forwarded to the browser alongside the configured
/// overrides.
const FORWARDED_HEADERS: &[&str] = &["accept-language", "x-request-id"];

pub async fn render_pdf(
    State(state): State<HttpState>,
    Path((domain, title, format)): Path<(String, String, String)>,
    request_headers: HeaderMap,
) -> Result<Response, HttpError> {
    respond(state, domain, title, format, None, request_headers).await
}

pub async fn render_pdf_for_device(
    State(state): State<HttpState>,
    Path((domain, title, format, device)): Path<(String, String, String, String)>,
    request_headers: HeaderMap,
) -> Result<Response, HttpError> {
    respond(state, domain, title, format, Some(device), request_headers).await
}

async fn respond(
    state: HttpState,
    domain: String,
    title: String,
    format: String,
    device: Option<String>,
    request_headers: HeaderMap,
) -> Result<Response, HttpError> {
    let page_format = PageFormat::try_from(format.as_str()).map_err(|()| {
        HttpError::bad_request(SOURCE, format!("unknown page format `{format}`"))
    })?;
    let device = match device.as_deref() {
        None => DeviceKind::Desktop,
        Some(value) => DeviceKind::try_from(value).map_err(|()| {
            HttpError::bad_request(SOURCE, format!("unknown device type `{value}`"))
        })?,
    };

    match state.probe.ensure_exists(&domain, &title).await {
        Ok(()) => {}
        Err(ArticleError::NotFound) => {
            return Err(HttpError::article_not_found(SOURCE, &title));
        }
        Err(err) => return Err(HttpError::internal(SOURCE, err.to_string())),
    }

    let url = state
        .locator
        .article_url(&domain, &title)
        .map_err(|err| HttpError::internal(SOURCE, err.to_string()))?;

    let mut headers = state.forwarded_headers.clone();
    for name in FORWARDED_HEADERS {
        if let Some(value) = request_headers.get(*name).and_then(|value| value.to_str().ok()) {
            headers.insert((*name).to_string(), value.to_string());
        }
    }

    let renderer = state.renderers.create();
    let job = RenderJob::new(
        RenderRequest {
            url,
            format: page_format,
            device,
            headers,
        },
        renderer,
    );

    let ticket = state
        .queue
        .submit(Arc::new(job))
        .map_err(|failure| failure_to_http(&title, failure, state.retry_after_seconds))?;

    // A dropped wait (client disconnect) cancels the job through the ticket.
    let document = ticket
        .wait()
        .await
        .map_err(|failure| failure_to_http(&title, failure, state.retry_after_seconds))?;

    Ok(pdf_response(&title, document))
}

fn failure_to_http(title: &str, failure: RenderFailure, retry_after_seconds: u64) -> HttpError {
    match failure {
        RenderFailure::QueueFull => HttpError::unavailable(
            SOURCE,
            "queue_full",
            failure.to_string(),
            retry_after_seconds,
        ),
        RenderFailure::QueueTimeout => HttpError::unavailable(
            SOURCE,
            "queue_timeout",
            failure.to_string(),
            retry_after_seconds,
        ),
        RenderFailure::JobTimeout => HttpError::unavailable(
            SOURCE,
            "render_timeout",
            failure.to_string(),
            retry_after_seconds,
        ),
        RenderFailure::Navigation { status: 404, .. } => {
            HttpError::article_not_found(SOURCE, title)
        }
        other => HttpError::internal(SOURCE, other.to_string()),
    }
}

fn pdf_response(title: &str, document: PdfDocument) -> Response {
    let encoded = encode_title(title);
    let disposition = format!(
        "attachment; filename=\"{encoded}.pdf\"; filename*=UTF-8''{encoded}.pdf"
    );
    let length = document.bytes.len();
    let last_modified = document.last_modified.clone();

    let mut response = (StatusCode::OK, document.bytes).into_response();
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/pdf"));
    if let Ok(value) = HeaderValue::from_str(&length.to_string()) {
        headers.insert(CONTENT_LENGTH, value);
    }
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(CONTENT_DISPOSITION, value);
    }
    if let Ok(value) = HeaderValue::from_str(&last_modified) {
        headers.insert(LAST_MODIFIED, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn document() -> PdfDocument {
        PdfDocument {
            bytes: Bytes::from_static(b"%PDF-1.7 stub"),
            last_modified: "Wed, 01 Jan 2025 00:00:00 GMT".to_string(),
        }
    }

    #[test]
    fn capacity_failures_map_to_unavailable() {
        for failure in [
            RenderFailure::QueueFull,
            RenderFailure::QueueTimeout,
            RenderFailure::JobTimeout,
        ] {
            let error = failure_to_http("Rust", failure, 60);
            assert_eq!(error.status(), StatusCode::SERVICE_UNAVAILABLE);
        }
    }

    #[test]
    fn missing_article_navigation_maps_to_not_found() {
        let error = failure_to_http("Rust", RenderFailure::navigation(404, "Not Found"), 60);
        assert_eq!(error.status(), StatusCode::NOT_FOUND);

        let error = failure_to_http("Rust", RenderFailure::navigation(502, "Bad Gateway"), 60);
        assert_eq!(error.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn pdf_response_carries_content_headers() {
        let response = pdf_response("Alan Turing", document());
        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[CONTENT_TYPE.as_str()], "application/pdf");
        assert_eq!(headers[CONTENT_LENGTH.as_str()], "13");
        assert_eq!(
            headers[CONTENT_DISPOSITION.as_str()],
            "attachment; filename=\"Alan%20Turing.pdf\"; filename*=UTF-8''Alan%20Turing.pdf"
        );
        assert_eq!(
            headers[LAST_MODIFIED.as_str()],
            "Wed, 01 Jan 2025 00:00:00 GMT"
        );
    }
}
