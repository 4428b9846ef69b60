//! Scheduling behaviour of the render queue: admission, FIFO promotion,
//! both timeout budgets, and cancellation at every lifecycle point.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::sleep;
use uuid::Uuid;

use stampa::application::error::RenderFailure;
use stampa::application::queue::events::{NullObserver, QueueEvent, QueueObserver};
use stampa::application::queue::task::QueueTask;
use stampa::application::queue::{QueueSettings, RenderQueue};
use stampa::domain::types::PdfDocument;

struct StubTask {
    id: Uuid,
    duration: Duration,
    fail: bool,
    started: AtomicUsize,
    cancelled: AtomicUsize,
}

impl StubTask {
    fn new(duration: Duration) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            duration,
            fail: false,
            started: AtomicUsize::new(0),
            cancelled: AtomicUsize::new(0),
        })
    }

    fn failing(duration: Duration) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            duration,
            fail: true,
            started: AtomicUsize::new(0),
            cancelled: AtomicUsize::new(0),
        })
    }

    fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueueTask for StubTask {
    fn job_id(&self) -> Uuid {
        self.id
    }

    async fn process(&self) -> Result<PdfDocument, RenderFailure> {
        self.started.fetch_add(1, Ordering::SeqCst);
        sleep(self.duration).await;
        if self.fail {
            Err(RenderFailure::navigation(502, "Bad Gateway"))
        } else {
            Ok(sample_pdf())
        }
    }

    async fn cancel(&self) {
        self.cancelled.fetch_add(1, Ordering::SeqCst);
    }
}

fn sample_pdf() -> PdfDocument {
    PdfDocument {
        bytes: Bytes::from_static(b"%PDF-1.7 stub"),
        last_modified: "Wed, 01 Jan 2025 00:00:00 GMT".to_string(),
    }
}

fn queue(concurrency: usize, max_task_count: usize, queue_ms: u64, exec_ms: u64) -> RenderQueue {
    RenderQueue::new(
        QueueSettings {
            concurrency,
            queue_timeout: Duration::from_millis(queue_ms),
            execution_timeout: Duration::from_millis(exec_ms),
            max_task_count,
        },
        Arc::new(NullObserver),
    )
}

#[derive(Default)]
struct RecordingObserver {
    events: Mutex<Vec<QueueEvent>>,
}

impl RecordingObserver {
    fn names_for(&self, job_id: Uuid) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.job_id() == job_id)
            .map(QueueEvent::name)
            .collect()
    }
}

impl QueueObserver for RecordingObserver {
    fn handle(&self, event: &QueueEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

#[tokio::test(start_paused = true)]
async fn overflow_rejects_synchronously_and_first_job_completes() {
    let queue = queue(1, 1, 5_000, 90_000);

    let first = StubTask::new(Duration::from_millis(3_000));
    let ticket = queue.submit(first.clone()).expect("first job admitted");

    let second = StubTask::new(Duration::from_millis(10));
    let error = queue
        .submit(second.clone())
        .expect_err("second job must be rejected before the first settles");
    assert!(matches!(error, RenderFailure::QueueFull));

    let document = ticket.wait().await.expect("first job resolves");
    assert_eq!(document.bytes, sample_pdf().bytes);
    assert_eq!(second.started(), 0);
}

#[tokio::test(start_paused = true)]
async fn waiting_job_times_out_without_processing() {
    let queue = queue(0, 1, 1, 90_000);

    let task = StubTask::new(Duration::from_millis(10));
    let ticket = queue.submit(task.clone()).expect("job admitted");
    assert_eq!(queue.count_waiting(), 1);
    assert_eq!(queue.count_running(), 0);

    let error = ticket.wait().await.expect_err("job must age out");
    assert!(matches!(error, RenderFailure::QueueTimeout));
    assert_eq!(task.started(), 0);
    assert_eq!(queue.count_waiting(), 0);
}

#[tokio::test(start_paused = true)]
async fn running_job_times_out_and_is_cancelled() {
    let queue = queue(1, 1, 60_000, 1);

    let task = StubTask::new(Duration::from_millis(3_000));
    let ticket = queue.submit(task.clone()).expect("job admitted");

    let error = ticket.wait().await.expect_err("job must hit the budget");
    assert!(matches!(error, RenderFailure::JobTimeout));
    assert_eq!(task.cancelled(), 1);

    // The stale completion must be a no-op once the budget already settled
    // the job.
    sleep(Duration::from_millis(4_000)).await;
    assert_eq!(queue.count_running(), 0);
    assert_eq!(queue.count_waiting(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancelling_a_waiting_job_leaves_the_rest_untouched() {
    let queue = queue(1, 5, 60_000, 90_000);

    let a = StubTask::new(Duration::from_millis(50));
    let b = StubTask::new(Duration::from_millis(50));
    let c = StubTask::new(Duration::from_millis(10));
    let ticket_a = queue.submit(a.clone()).expect("a admitted");
    let ticket_b = queue.submit(b.clone()).expect("b admitted");
    let ticket_c = queue.submit(c.clone()).expect("c admitted");

    ticket_c.cancel().await;
    assert_eq!(queue.count_waiting(), 1);
    assert_eq!(queue.count_running(), 1);
    assert_eq!(c.cancelled(), 1);
    assert_eq!(c.started(), 0);

    let error = ticket_c.wait().await.expect_err("cancelled job rejects");
    assert!(matches!(error, RenderFailure::Cancelled));

    ticket_a.wait().await.expect("a resolves");
    ticket_b.wait().await.expect("b resolves");
}

#[tokio::test(start_paused = true)]
async fn cancelling_a_running_job_invokes_its_teardown() {
    let queue = queue(2, 2, 60_000, 90_000);

    let a = StubTask::new(Duration::from_millis(100));
    let b = StubTask::new(Duration::from_millis(50));
    let ticket_a = queue.submit(a.clone()).expect("a admitted");
    let ticket_b = queue.submit(b.clone()).expect("b admitted");

    sleep(Duration::from_millis(1)).await;
    assert_eq!(queue.count_running(), 2);

    ticket_b.cancel().await;
    assert_eq!(b.cancelled(), 1);
    let error = ticket_b.wait().await.expect_err("cancelled job rejects");
    assert!(matches!(error, RenderFailure::Cancelled));

    ticket_a.wait().await.expect("a resolves");
}

#[tokio::test(start_paused = true)]
async fn jobs_resolve_in_admission_order() {
    let queue = queue(1, 5, 60_000, 90_000);

    let one = StubTask::new(Duration::from_millis(250));
    let two = StubTask::new(Duration::from_millis(100));
    let three = StubTask::new(Duration::from_millis(20));
    let ticket_one = queue.submit(one).expect("one admitted");
    let ticket_two = queue.submit(two).expect("two admitted");
    let ticket_three = queue.submit(three).expect("three admitted");

    let order = Arc::new(Mutex::new(Vec::new()));
    let record = |name: &'static str, order: Arc<Mutex<Vec<&'static str>>>| {
        move || order.lock().unwrap().push(name)
    };

    let done_one = record("one", order.clone());
    let done_two = record("two", order.clone());
    let done_three = record("three", order.clone());
    tokio::join!(
        async {
            ticket_one.wait().await.expect("one resolves");
            done_one();
        },
        async {
            ticket_two.wait().await.expect("two resolves");
            done_two();
        },
        async {
            ticket_three.wait().await.expect("three resolves");
            done_three();
        },
    );

    assert_eq!(*order.lock().unwrap(), vec!["one", "two", "three"]);
}

#[tokio::test(start_paused = true)]
async fn cancel_is_idempotent_in_any_state() {
    let queue = queue(1, 2, 60_000, 90_000);

    let running = StubTask::new(Duration::from_millis(100));
    let waiting = StubTask::new(Duration::from_millis(100));
    let ticket_running = queue.submit(running.clone()).expect("running admitted");
    let ticket_waiting = queue.submit(waiting.clone()).expect("waiting admitted");

    ticket_waiting.cancel().await;
    ticket_waiting.cancel().await;
    assert_eq!(waiting.cancelled(), 1);

    ticket_running.cancel().await;
    ticket_running.cancel().await;
    assert_eq!(running.cancelled(), 1);

    // Cancelling after settlement is a no-op as well.
    let settled = StubTask::new(Duration::from_millis(1));
    let ticket = queue.submit(settled.clone()).expect("admitted");
    sleep(Duration::from_millis(5)).await;
    ticket.cancel().await;
    assert_eq!(settled.cancelled(), 0);
    assert_eq!(settled.started(), 1);
}

#[tokio::test(start_paused = true)]
async fn dropping_a_ticket_cancels_the_job() {
    let queue = queue(1, 1, 60_000, 90_000);

    let task = StubTask::new(Duration::from_millis(5_000));
    let ticket = queue.submit(task.clone()).expect("job admitted");
    drop(ticket);

    sleep(Duration::from_millis(1)).await;
    assert_eq!(task.cancelled(), 1);
    assert_eq!(queue.count_running(), 0);
    assert_eq!(queue.count_waiting(), 0);
    assert!(!queue.is_queue_full());
}

#[tokio::test(start_paused = true)]
async fn population_never_exceeds_the_ceiling() {
    let queue = queue(1, 3, 60_000, 90_000);

    let tasks: Vec<_> = (0..3).map(|_| StubTask::new(Duration::from_millis(50))).collect();
    let tickets: Vec<_> = tasks
        .iter()
        .map(|task| queue.submit(task.clone()).expect("admitted"))
        .collect();

    assert!(queue.is_queue_full());
    assert_eq!(queue.count_waiting() + queue.count_running(), 3);

    let rejected = StubTask::new(Duration::from_millis(1));
    assert!(matches!(
        queue.submit(rejected),
        Err(RenderFailure::QueueFull)
    ));

    for ticket in tickets {
        ticket.wait().await.expect("job resolves");
    }
    assert!(!queue.is_queue_full());
}

#[tokio::test(start_paused = true)]
async fn failing_job_surfaces_its_error_unchanged() {
    let queue = queue(1, 1, 60_000, 90_000);

    let task = StubTask::failing(Duration::from_millis(10));
    let ticket = queue.submit(task).expect("job admitted");
    let error = ticket.wait().await.expect_err("job fails");
    assert!(matches!(
        error,
        RenderFailure::Navigation { status: 502, .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn events_follow_the_lifecycle_and_respect_the_cap() {
    let observer = Arc::new(RecordingObserver::default());
    let queue = RenderQueue::new(
        QueueSettings {
            concurrency: 1,
            queue_timeout: Duration::from_millis(60_000),
            execution_timeout: Duration::from_millis(90_000),
            max_task_count: 5,
        },
        observer.clone(),
    );

    let tasks: Vec<_> = (0..3).map(|_| StubTask::new(Duration::from_millis(10))).collect();
    let tickets: Vec<_> = tasks
        .iter()
        .map(|task| queue.submit(task.clone()).expect("admitted"))
        .collect();
    for ticket in tickets {
        ticket.wait().await.expect("job resolves");
    }

    for task in &tasks {
        assert_eq!(
            observer.names_for(task.job_id()),
            vec!["queue.new", "process.started", "process.success"]
        );
    }

    // Under saturation the count of started minus settled jobs never
    // exceeds the concurrency cap.
    let mut in_flight: i64 = 0;
    for event in observer.events.lock().unwrap().iter() {
        match event.name() {
            "process.started" => in_flight += 1,
            "process.success" | "process.failure" | "process.abort" | "process.timeout" => {
                in_flight -= 1
            }
            _ => {}
        }
        assert!(in_flight <= 1);
    }
}

#[tokio::test(start_paused = true)]
async fn rejected_jobs_emit_a_capacity_event() {
    let observer = Arc::new(RecordingObserver::default());
    let queue = RenderQueue::new(
        QueueSettings {
            concurrency: 1,
            queue_timeout: Duration::from_millis(60_000),
            execution_timeout: Duration::from_millis(90_000),
            max_task_count: 1,
        },
        observer.clone(),
    );

    let admitted = StubTask::new(Duration::from_millis(50));
    let ticket = queue.submit(admitted).expect("admitted");
    let rejected = StubTask::new(Duration::from_millis(1));
    let rejected_id = rejected.job_id();
    assert!(queue.submit(rejected).is_err());

    assert_eq!(observer.names_for(rejected_id), vec!["queue.full"]);
    ticket.wait().await.expect("admitted job resolves");
}
