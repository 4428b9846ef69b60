use std::error::Error as StdError;

use axum::{
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Diagnostic attached to error responses so the logging middleware can emit
/// rich records without the handler logging twice.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

#[derive(Debug, Serialize)]
struct HttpErrorBody {
    name: &'static str,
    status: u16,
    message: &'static str,
    details: String,
}

/// Error response in the service's JSON shape, with an optional
/// `Retry-After` hint for capacity-related rejections.
#[derive(Debug)]
pub struct HttpError {
    source: &'static str,
    status: StatusCode,
    name: &'static str,
    message: &'static str,
    details: String,
    retry_after_seconds: Option<u64>,
}

impl HttpError {
    pub fn new(
        source: &'static str,
        status: StatusCode,
        name: &'static str,
        message: &'static str,
        details: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            name,
            message,
            details: details.into(),
            retry_after_seconds: None,
        }
    }

    pub fn bad_request(source: &'static str, details: impl Into<String>) -> Self {
        Self::new(
            source,
            StatusCode::BAD_REQUEST,
            "bad_request",
            "Bad Request",
            details,
        )
    }

    pub fn article_not_found(source: &'static str, title: &str) -> Self {
        Self::new(
            source,
            StatusCode::NOT_FOUND,
            "HTTPError",
            "Not Found",
            format!("Article '{title}' not found"),
        )
    }

    pub fn unavailable(
        source: &'static str,
        name: &'static str,
        details: impl Into<String>,
        retry_after_seconds: u64,
    ) -> Self {
        let mut error = Self::new(
            source,
            StatusCode::SERVICE_UNAVAILABLE,
            name,
            "Service Unavailable",
            details,
        );
        error.retry_after_seconds = Some(retry_after_seconds);
        error
    }

    pub fn internal(source: &'static str, details: impl Into<String>) -> Self {
        Self::new(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "Internal Server Error",
            details,
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let body = HttpErrorBody {
            name: self.name,
            status: self.status.as_u16(),
            message: self.message,
            details: self.details.clone(),
        };
        let mut response = (self.status, Json(body)).into_response();
        if let Some(seconds) = self.retry_after_seconds {
            if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
                response.headers_mut().insert(RETRY_AFTER, value);
            }
        }
        ErrorReport::from_message(
            self.source,
            self.status,
            format!("{}: {}", self.name, self.details),
        )
        .attach(&mut response);
        response
    }
}
