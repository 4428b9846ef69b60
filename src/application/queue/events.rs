//! Queue lifecycle events and the observer port.

use std::time::Duration;

use uuid::Uuid;

/// Waiting/running population at the moment an event was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueDepth {
    pub waiting: usize,
    pub running: usize,
}

/// One externally observable queue transition.
///
/// Per job the sequence is a prefix of: admitted, then either wait-expired or
/// wait-aborted, or started followed by exactly one of succeeded, failed,
/// run-aborted, or run-expired.
#[derive(Debug, Clone)]
pub enum QueueEvent {
    /// A job entered the waiting set.
    Admitted { job_id: Uuid, depth: QueueDepth },
    /// Admission was refused because the queue is at capacity.
    Rejected { job_id: Uuid, depth: QueueDepth },
    /// A waiting job aged out before a slot opened.
    WaitExpired {
        job_id: Uuid,
        waited: Duration,
        depth: QueueDepth,
    },
    /// A waiting job was cancelled by its client.
    WaitAborted {
        job_id: Uuid,
        waited: Duration,
        depth: QueueDepth,
    },
    /// A job was promoted to running.
    Started {
        job_id: Uuid,
        waited: Duration,
        depth: QueueDepth,
    },
    /// A running job produced a PDF.
    Succeeded {
        job_id: Uuid,
        ran: Duration,
        depth: QueueDepth,
    },
    /// A running job failed.
    Failed {
        job_id: Uuid,
        ran: Duration,
        error: String,
        depth: QueueDepth,
    },
    /// A running job was cancelled by its client.
    RunAborted {
        job_id: Uuid,
        ran: Duration,
        depth: QueueDepth,
    },
    /// A running job exceeded the execution budget.
    RunExpired {
        job_id: Uuid,
        ran: Duration,
        depth: QueueDepth,
    },
}

impl QueueEvent {
    /// Stable operator-facing event name.
    pub fn name(&self) -> &'static str {
        match self {
            QueueEvent::Admitted { .. } => "queue.new",
            QueueEvent::Rejected { .. } => "queue.full",
            QueueEvent::WaitExpired { .. } => "queue.timeout",
            QueueEvent::WaitAborted { .. } => "queue.abort",
            QueueEvent::Started { .. } => "process.started",
            QueueEvent::Succeeded { .. } => "process.success",
            QueueEvent::Failed { .. } => "process.failure",
            QueueEvent::RunAborted { .. } => "process.abort",
            QueueEvent::RunExpired { .. } => "process.timeout",
        }
    }

    pub fn job_id(&self) -> Uuid {
        match self {
            QueueEvent::Admitted { job_id, .. }
            | QueueEvent::Rejected { job_id, .. }
            | QueueEvent::WaitExpired { job_id, .. }
            | QueueEvent::WaitAborted { job_id, .. }
            | QueueEvent::Started { job_id, .. }
            | QueueEvent::Succeeded { job_id, .. }
            | QueueEvent::Failed { job_id, .. }
            | QueueEvent::RunAborted { job_id, .. }
            | QueueEvent::RunExpired { job_id, .. } => *job_id,
        }
    }

    pub fn depth(&self) -> QueueDepth {
        match self {
            QueueEvent::Admitted { depth, .. }
            | QueueEvent::Rejected { depth, .. }
            | QueueEvent::WaitExpired { depth, .. }
            | QueueEvent::WaitAborted { depth, .. }
            | QueueEvent::Started { depth, .. }
            | QueueEvent::Succeeded { depth, .. }
            | QueueEvent::Failed { depth, .. }
            | QueueEvent::RunAborted { depth, .. }
            | QueueEvent::RunExpired { depth, .. } => *depth,
        }
    }
}

/// Observer port for queue telemetry.
///
/// The queue is not coupled to any metrics library; adapters translate events
/// into whatever counters, histograms, and log records the deployment wants.
pub trait QueueObserver: Send + Sync {
    fn handle(&self, event: &QueueEvent);
}

/// Observer that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl QueueObserver for NullObserver {
    fn handle(&self, _event: &QueueEvent) {}
}
