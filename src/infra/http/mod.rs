//! HTTP surface: the PDF route plus service endpoints.

mod error;
mod middleware;
mod pdf;

pub use error::{ErrorReport, HttpError};

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{http::StatusCode, middleware as axum_middleware, routing::get, Json, Router};
use serde::Serialize;

use crate::application::article::{ArticleLocator, ArticleProbe};
use crate::application::queue::RenderQueue;
use crate::application::render::RendererFactory;

#[derive(Clone)]
pub struct HttpState {
    pub queue: Arc<RenderQueue>,
    pub probe: Arc<dyn ArticleProbe>,
    pub locator: ArticleLocator,
    pub renderers: Arc<dyn RendererFactory>,
    /// Whole seconds advertised in `Retry-After` on capacity rejections.
    pub retry_after_seconds: u64,
    /// Static header overrides applied to every render.
    pub forwarded_headers: BTreeMap<String, String>,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/_info", get(info))
        .route("/_health", get(health))
        .route("/{domain}/v1/pdf/{title}/{format}", get(pdf::render_pdf))
        .route(
            "/{domain}/v1/pdf/{title}/{format}/{device}",
            get(pdf::render_pdf_for_device),
        )
        .with_state(state)
        .layer(axum_middleware::from_fn(middleware::log_responses))
}

#[derive(Debug, Serialize)]
struct ServiceInfo {
    name: &'static str,
    version: &'static str,
}

async fn info() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}
