use thiserror::Error;

use crate::config::LoadError;
use crate::infra::error::InfraError;

/// Failure kinds reported by the queue and the renderer.
///
/// Every rejected job settles with exactly one of these. Kinds are matched by
/// variant, never compared as integers, and the HTTP layer is the only place
/// they are translated into statuses. Cancellation is normal control flow and
/// must not be logged as an error.
#[derive(Debug, Clone, Error)]
pub enum RenderFailure {
    #[error("render queue is at capacity")]
    QueueFull,
    #[error("job timed out waiting for a render slot")]
    QueueTimeout,
    #[error("render exceeded the execution budget")]
    JobTimeout,
    #[error("render cancelled by the client")]
    Cancelled,
    #[error("upstream navigation failed with status {status}: {message}")]
    Navigation { status: u16, message: String },
    #[error("navigation finished without a response")]
    MalformedResponse,
    #[error("target host `{host}` is not allowed")]
    ForbiddenHost { host: String },
    #[error("unexpected render failure: {0}")]
    Internal(String),
}

impl RenderFailure {
    pub fn navigation(status: u16, message: impl Into<String>) -> Self {
        Self::Navigation {
            status,
            message: message.into(),
        }
    }

    pub fn forbidden_host(host: impl Into<String>) -> Self {
        Self::ForbiddenHost { host: host.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Top-level error for service bootstrap.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}
