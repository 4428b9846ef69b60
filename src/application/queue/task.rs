//! Units of work consumed by the render queue.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::application::error::RenderFailure;
use crate::application::render::{ArticleRenderer, RenderRequest};
use crate::domain::types::PdfDocument;

/// A single schedulable unit of work.
///
/// The queue calls `process` exactly once, after the task reaches the running
/// state. `cancel` may be called any number of times and in any state; it
/// must be idempotent and resolve once external resources held by the task
/// are released.
#[async_trait]
pub trait QueueTask: Send + Sync + 'static {
    /// Identity unique within a process run.
    fn job_id(&self) -> Uuid;

    async fn process(&self) -> Result<PdfDocument, RenderFailure>;

    async fn cancel(&self);
}

/// Production task: renders one article through an owned renderer handle.
pub struct RenderJob {
    job_id: Uuid,
    request: RenderRequest,
    renderer: Arc<dyn ArticleRenderer>,
}

impl RenderJob {
    pub fn new(request: RenderRequest, renderer: Arc<dyn ArticleRenderer>) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            request,
            renderer,
        }
    }
}

#[async_trait]
impl QueueTask for RenderJob {
    fn job_id(&self) -> Uuid {
        self.job_id
    }

    async fn process(&self) -> Result<PdfDocument, RenderFailure> {
        self.renderer.article_to_pdf(&self.request).await
    }

    async fn cancel(&self) {
        self.renderer.abort_render().await;
    }
}
