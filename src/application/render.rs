//! Renderer port: the queue treats the browser as an opaque capability.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::application::error::RenderFailure;
use crate::domain::types::{DeviceKind, PageFormat, PdfDocument};

/// Everything a renderer needs to produce one article PDF.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub url: Url,
    pub format: PageFormat,
    pub device: DeviceKind,
    /// Headers applied to the navigation and every sub-resource. A `host`
    /// entry is stripped before use.
    pub headers: BTreeMap<String, String>,
}

/// Per-job render capability.
///
/// A renderer drives at most one browser subprocess and is never reused
/// across jobs; two `article_to_pdf` calls on the same renderer are not
/// supported.
#[async_trait]
pub trait ArticleRenderer: Send + Sync {
    /// Navigate to the article and produce a PDF.
    async fn article_to_pdf(&self, request: &RenderRequest)
        -> Result<PdfDocument, RenderFailure>;

    /// Abort an in-flight render and tear down the subprocess. Idempotent;
    /// resolves once the process has exited or been killed.
    async fn abort_render(&self);
}

/// Creates one fresh renderer per admitted job.
pub trait RendererFactory: Send + Sync {
    fn create(&self) -> Arc<dyn ArticleRenderer>;
}
