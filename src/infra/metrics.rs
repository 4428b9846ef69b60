//! Queue telemetry adapter: lifecycle events become metrics and log records.

use metrics::{counter, gauge, histogram};
use tracing::{info, warn};

use crate::application::queue::events::{QueueEvent, QueueObserver};

const METRIC_QUEUE_EVENTS_TOTAL: &str = "stampa_queue_events_total";
const METRIC_QUEUE_WAIT_MS: &str = "stampa_queue_wait_ms";
const METRIC_RENDER_MS: &str = "stampa_render_ms";
const METRIC_QUEUE_WAITING: &str = "stampa_queue_waiting";
const METRIC_QUEUE_RUNNING: &str = "stampa_queue_running";

/// Translates queue events into counter/histogram/gauge operations and
/// structured log records. Cancellation is normal control flow and is never
/// logged above `info`.
pub struct QueueTelemetry;

impl QueueObserver for QueueTelemetry {
    fn handle(&self, event: &QueueEvent) {
        let depth = event.depth();
        gauge!(METRIC_QUEUE_WAITING).set(depth.waiting as f64);
        gauge!(METRIC_QUEUE_RUNNING).set(depth.running as f64);
        counter!(METRIC_QUEUE_EVENTS_TOTAL, "event" => event.name()).increment(1);

        let job_id = event.job_id();
        match event {
            QueueEvent::Admitted { .. } => info!(
                target: "stampa::queue",
                job_id = %job_id,
                event = event.name(),
                waiting = depth.waiting,
                running = depth.running,
                "job admitted"
            ),
            QueueEvent::Rejected { .. } => warn!(
                target: "stampa::queue",
                job_id = %job_id,
                event = event.name(),
                waiting = depth.waiting,
                running = depth.running,
                "queue at capacity; job rejected"
            ),
            QueueEvent::WaitExpired { waited, .. } => {
                histogram!(METRIC_QUEUE_WAIT_MS).record(waited.as_secs_f64() * 1000.0);
                warn!(
                    target: "stampa::queue",
                    job_id = %job_id,
                    event = event.name(),
                    waited_ms = waited.as_millis() as u64,
                    "job expired while waiting"
                );
            }
            QueueEvent::WaitAborted { waited, .. } => {
                histogram!(METRIC_QUEUE_WAIT_MS).record(waited.as_secs_f64() * 1000.0);
                info!(
                    target: "stampa::queue",
                    job_id = %job_id,
                    event = event.name(),
                    waited_ms = waited.as_millis() as u64,
                    "waiting job cancelled"
                );
            }
            QueueEvent::Started { waited, .. } => {
                histogram!(METRIC_QUEUE_WAIT_MS).record(waited.as_secs_f64() * 1000.0);
                info!(
                    target: "stampa::queue",
                    job_id = %job_id,
                    event = event.name(),
                    waited_ms = waited.as_millis() as u64,
                    "render started"
                );
            }
            QueueEvent::Succeeded { ran, .. } => {
                histogram!(METRIC_RENDER_MS).record(ran.as_secs_f64() * 1000.0);
                info!(
                    target: "stampa::queue",
                    job_id = %job_id,
                    event = event.name(),
                    ran_ms = ran.as_millis() as u64,
                    "render finished"
                );
            }
            QueueEvent::Failed { ran, error, .. } => {
                histogram!(METRIC_RENDER_MS).record(ran.as_secs_f64() * 1000.0);
                warn!(
                    target: "stampa::queue",
                    job_id = %job_id,
                    event = event.name(),
                    ran_ms = ran.as_millis() as u64,
                    error = %error,
                    "render failed"
                );
            }
            QueueEvent::RunAborted { ran, .. } => {
                histogram!(METRIC_RENDER_MS).record(ran.as_secs_f64() * 1000.0);
                info!(
                    target: "stampa::queue",
                    job_id = %job_id,
                    event = event.name(),
                    ran_ms = ran.as_millis() as u64,
                    "running job cancelled"
                );
            }
            QueueEvent::RunExpired { ran, .. } => {
                histogram!(METRIC_RENDER_MS).record(ran.as_secs_f64() * 1000.0);
                warn!(
                    target: "stampa::queue",
                    job_id = %job_id,
                    event = event.name(),
                    ran_ms = ran.as_millis() as u64,
                    "render exceeded the execution budget"
                );
            }
        }
    }
}
