//! Bounded render queue: FIFO admission control, a concurrency gate,
//! independent wait/run time budgets, and cancellation plumbing.
//!
//! Bookkeeping is serialized by a single state mutex that is never held
//! across an await point; render work itself runs off that serialization
//! point, up to `concurrency` jobs in parallel. Timer fires, settlements,
//! and cancellations re-enter through short locked sections, so no two
//! bookkeeping steps ever observe a partially updated queue.

pub mod events;
pub mod task;

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use uuid::Uuid;

use crate::application::error::RenderFailure;
use crate::domain::types::PdfDocument;

use self::events::{QueueDepth, QueueEvent, QueueObserver};
use self::task::QueueTask;

type Outcome = Result<PdfDocument, RenderFailure>;

/// Immutable queue configuration.
#[derive(Debug, Clone)]
pub struct QueueSettings {
    /// Maximum number of jobs rendering in parallel. Zero admits jobs but
    /// never starts them.
    pub concurrency: usize,
    /// Budget a job may spend waiting for a slot.
    pub queue_timeout: Duration,
    /// Budget a job may spend rendering once started.
    pub execution_timeout: Duration,
    /// Ceiling on waiting plus running jobs.
    pub max_task_count: usize,
}

enum Phase {
    Waiting,
    Running,
}

struct JobEntry {
    task: Arc<dyn QueueTask>,
    phase: Phase,
    added_at: Instant,
    started_at: Option<Instant>,
    /// Present until the job's outcome is claimed; taking it is the
    /// settlement claim, so a job can never settle twice.
    settle: Option<oneshot::Sender<Outcome>>,
    /// The job's single live timer: queue residency while waiting,
    /// execution budget while running.
    timer: Option<JoinHandle<()>>,
}

struct QueueState {
    waiting: VecDeque<Uuid>,
    running: usize,
    entries: HashMap<Uuid, JobEntry>,
    /// Guards the advance loop against re-entry from its own emitted
    /// events; late requests coalesce into `repull`.
    pulling: bool,
    repull: bool,
}

impl QueueState {
    fn depth(&self) -> QueueDepth {
        QueueDepth {
            waiting: self.waiting.len(),
            running: self.running,
        }
    }

    fn population(&self) -> usize {
        self.waiting.len() + self.running
    }
}

fn lock(state: &Mutex<QueueState>) -> MutexGuard<'_, QueueState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct Promotion {
    job_id: Uuid,
    task: Arc<dyn QueueTask>,
    event: QueueEvent,
}

struct QueueCore {
    settings: QueueSettings,
    observer: Arc<dyn QueueObserver>,
    state: Mutex<QueueState>,
}

impl QueueCore {
    fn emit(&self, event: &QueueEvent) {
        self.observer.handle(event);
    }

    fn spawn_wait_timer(core: &Arc<Self>, job_id: Uuid) -> JoinHandle<()> {
        let core = Arc::clone(core);
        let timeout = core.settings.queue_timeout;
        tokio::spawn(async move {
            sleep(timeout).await;
            QueueCore::expire_waiting(&core, job_id);
        })
    }

    fn spawn_run_timer(core: &Arc<Self>, job_id: Uuid) -> JoinHandle<()> {
        let core = Arc::clone(core);
        let timeout = core.settings.execution_timeout;
        tokio::spawn(async move {
            sleep(timeout).await;
            QueueCore::expire_running(core, job_id).await;
        })
    }

    /// Promote waiting jobs while slots are free. Only one advance pass runs
    /// at a time; requests arriving mid-pass (e.g. from an observer reacting
    /// to `process.started`) coalesce and are served before the pass ends.
    fn advance(core: &Arc<Self>) {
        {
            let mut state = lock(&core.state);
            if state.pulling {
                state.repull = true;
                return;
            }
            state.pulling = true;
        }

        loop {
            let promoted = {
                let mut state = lock(&core.state);
                QueueCore::promote_locked(core, &mut state)
            };

            if let Some(promotion) = promoted {
                core.emit(&promotion.event);
                let core = Arc::clone(core);
                let job_id = promotion.job_id;
                let task = promotion.task;
                tokio::spawn(async move {
                    let outcome = task.process().await;
                    QueueCore::settle(&core, job_id, outcome);
                });
                continue;
            }

            let mut state = lock(&core.state);
            if state.repull {
                state.repull = false;
                continue;
            }
            state.pulling = false;
            return;
        }
    }

    fn promote_locked(core: &Arc<Self>, state: &mut QueueState) -> Option<Promotion> {
        if state.running >= core.settings.concurrency {
            return None;
        }
        let job_id = state.waiting.pop_front()?;
        let entry = state.entries.get_mut(&job_id)?;
        if let Some(timer) = entry.timer.take() {
            timer.abort();
        }
        let now = Instant::now();
        entry.phase = Phase::Running;
        entry.started_at = Some(now);
        entry.timer = Some(QueueCore::spawn_run_timer(core, job_id));
        let waited = now.duration_since(entry.added_at);
        let task = Arc::clone(&entry.task);
        state.running += 1;
        let event = QueueEvent::Started {
            job_id,
            waited,
            depth: state.depth(),
        };
        Some(Promotion {
            job_id,
            task,
            event,
        })
    }

    /// Normal completion path; a no-op when a timeout or cancellation
    /// already claimed the job.
    fn settle(core: &Arc<Self>, job_id: Uuid, outcome: Outcome) {
        let (sender, event) = {
            let mut state = lock(&core.state);
            let Some(entry) = state.entries.get_mut(&job_id) else {
                return;
            };
            let Some(sender) = entry.settle.take() else {
                return;
            };
            if let Some(timer) = entry.timer.take() {
                timer.abort();
            }
            let ran = entry
                .started_at
                .map(|started| started.elapsed())
                .unwrap_or_default();
            state.entries.remove(&job_id);
            state.running = state.running.saturating_sub(1);
            let event = match &outcome {
                Ok(_) => Some(QueueEvent::Succeeded {
                    job_id,
                    ran,
                    depth: state.depth(),
                }),
                Err(err) if err.is_cancelled() => None,
                Err(err) => Some(QueueEvent::Failed {
                    job_id,
                    ran,
                    error: err.to_string(),
                    depth: state.depth(),
                }),
            };
            (sender, event)
        };
        if let Some(event) = &event {
            core.emit(event);
        }
        let _ = sender.send(outcome);
        QueueCore::advance(core);
    }

    /// Queue-residency timer fired while the job was still waiting. The job
    /// never started, so there is nothing to cancel.
    fn expire_waiting(core: &Arc<Self>, job_id: Uuid) {
        let (sender, event) = {
            let mut state = lock(&core.state);
            let Some(entry) = state.entries.get_mut(&job_id) else {
                return;
            };
            if !matches!(entry.phase, Phase::Waiting) {
                return;
            }
            let Some(sender) = entry.settle.take() else {
                return;
            };
            if let Some(timer) = entry.timer.take() {
                timer.abort();
            }
            let waited = entry.added_at.elapsed();
            state.entries.remove(&job_id);
            state.waiting.retain(|id| *id != job_id);
            let event = QueueEvent::WaitExpired {
                job_id,
                waited,
                depth: state.depth(),
            };
            (sender, event)
        };
        core.emit(&event);
        let _ = sender.send(Err(RenderFailure::QueueTimeout));
        QueueCore::advance(core);
    }

    /// Execution timer fired while the job was running. The job leaves the
    /// running set only once its `cancel` has released external resources;
    /// a concurrent settlement claims first and turns this into a no-op.
    async fn expire_running(core: Arc<Self>, job_id: Uuid) {
        let (sender, task, event) = {
            let mut state = lock(&core.state);
            let Some(entry) = state.entries.get_mut(&job_id) else {
                return;
            };
            if !matches!(entry.phase, Phase::Running) {
                return;
            }
            let Some(sender) = entry.settle.take() else {
                return;
            };
            entry.timer.take();
            let ran = entry
                .started_at
                .map(|started| started.elapsed())
                .unwrap_or_default();
            let task = Arc::clone(&entry.task);
            let event = QueueEvent::RunExpired {
                job_id,
                ran,
                depth: state.depth(),
            };
            (sender, task, event)
        };
        core.emit(&event);
        task.cancel().await;
        {
            let mut state = lock(&core.state);
            if state.entries.remove(&job_id).is_some() {
                state.running = state.running.saturating_sub(1);
            }
        }
        let _ = sender.send(Err(RenderFailure::JobTimeout));
        QueueCore::advance(&core);
    }

    /// Client-initiated cancellation; idempotent and safe in any state.
    async fn cancel_job(core: Arc<Self>, job_id: Uuid) {
        let (sender, task, event) = {
            let mut state = lock(&core.state);
            let Some(entry) = state.entries.get_mut(&job_id) else {
                return;
            };
            let Some(sender) = entry.settle.take() else {
                return;
            };
            if let Some(timer) = entry.timer.take() {
                timer.abort();
            }
            let task = Arc::clone(&entry.task);
            let was_waiting = matches!(entry.phase, Phase::Waiting);
            let waited = entry.added_at.elapsed();
            let ran = entry
                .started_at
                .map(|started| started.elapsed())
                .unwrap_or_default();
            state.entries.remove(&job_id);
            let event = if was_waiting {
                state.waiting.retain(|id| *id != job_id);
                QueueEvent::WaitAborted {
                    job_id,
                    waited,
                    depth: state.depth(),
                }
            } else {
                state.running = state.running.saturating_sub(1);
                QueueEvent::RunAborted {
                    job_id,
                    ran,
                    depth: state.depth(),
                }
            };
            (sender, task, event)
        };
        core.emit(&event);
        task.cancel().await;
        let _ = sender.send(Err(RenderFailure::Cancelled));
        QueueCore::advance(&core);
    }
}

/// Admission-controlled, bounded, strictly FIFO render queue.
pub struct RenderQueue {
    core: Arc<QueueCore>,
}

impl RenderQueue {
    pub fn new(settings: QueueSettings, observer: Arc<dyn QueueObserver>) -> Self {
        Self {
            core: Arc::new(QueueCore {
                settings,
                observer,
                state: Mutex::new(QueueState {
                    waiting: VecDeque::new(),
                    running: 0,
                    entries: HashMap::new(),
                    pulling: false,
                    repull: false,
                }),
            }),
        }
    }

    /// Admit a task or reject it immediately when the queue is at capacity.
    ///
    /// The admission decision is synchronous: a rejected task is never
    /// registered and its `process` is never called. Timers are spawned on
    /// the ambient Tokio runtime.
    pub fn submit(&self, task: Arc<dyn QueueTask>) -> Result<JobTicket, RenderFailure> {
        let job_id = task.job_id();
        let (sender, receiver) = oneshot::channel();
        let event = {
            let mut state = lock(&self.core.state);
            if state.population() >= self.core.settings.max_task_count {
                let event = QueueEvent::Rejected {
                    job_id,
                    depth: state.depth(),
                };
                drop(state);
                self.core.emit(&event);
                return Err(RenderFailure::QueueFull);
            }
            let timer = QueueCore::spawn_wait_timer(&self.core, job_id);
            state.entries.insert(
                job_id,
                JobEntry {
                    task,
                    phase: Phase::Waiting,
                    added_at: Instant::now(),
                    started_at: None,
                    settle: Some(sender),
                    timer: Some(timer),
                },
            );
            state.waiting.push_back(job_id);
            QueueEvent::Admitted {
                job_id,
                depth: state.depth(),
            }
        };
        self.core.emit(&event);
        QueueCore::advance(&self.core);
        Ok(JobTicket {
            job_id,
            core: Arc::clone(&self.core),
            receiver: Some(receiver),
            finished: AtomicBool::new(false),
        })
    }

    pub fn is_queue_full(&self) -> bool {
        let state = lock(&self.core.state);
        state.population() >= self.core.settings.max_task_count
    }

    pub fn count_waiting(&self) -> usize {
        lock(&self.core.state).waiting.len()
    }

    pub fn count_running(&self) -> usize {
        lock(&self.core.state).running
    }
}

/// Result-bearing handle for one submitted job.
///
/// Dropping an unsettled ticket cancels the job; this is how a client
/// disconnect reaches the queue.
pub struct JobTicket {
    job_id: Uuid,
    core: Arc<QueueCore>,
    receiver: Option<oneshot::Receiver<Outcome>>,
    finished: AtomicBool,
}

impl JobTicket {
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    /// Wait for the job to settle. Exactly one of: a PDF, or one failure
    /// kind.
    pub async fn wait(mut self) -> Result<PdfDocument, RenderFailure> {
        let Some(receiver) = self.receiver.take() else {
            return Err(RenderFailure::internal("job ticket already consumed"));
        };
        let outcome = match receiver.await {
            Ok(outcome) => outcome,
            Err(_) => Err(RenderFailure::internal(
                "queue dropped the job before settlement",
            )),
        };
        self.finished.store(true, Ordering::SeqCst);
        outcome
    }

    /// Cancel the job and release its resources. Idempotent and safe in any
    /// state; resolves once the task's own cancellation has completed.
    pub async fn cancel(&self) {
        self.finished.store(true, Ordering::SeqCst);
        QueueCore::cancel_job(Arc::clone(&self.core), self.job_id).await;
    }
}

impl std::fmt::Debug for JobTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobTicket")
            .field("job_id", &self.job_id)
            .finish_non_exhaustive()
    }
}

impl Drop for JobTicket {
    fn drop(&mut self) {
        if self.finished.load(Ordering::SeqCst) {
            return;
        }
        let core = Arc::clone(&self.core);
        let job_id = self.job_id;
        // The request future may be dropped at any await point (client
        // disconnect); route the teardown through the runtime instead.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                QueueCore::cancel_job(core, job_id).await;
            });
        }
    }
}
