//! Task processor: concurrent worker loops with weighted queue selection.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::store::TaskStore;
use super::types::{Queue, Task, TaskOutcome, TaskStatus};

/// Handler for one task kind.
///
/// Invoked at-least-once per logical task; implementations must be
/// idempotent.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: &Task) -> TaskOutcome;
}

/// Processor configuration, built once at startup.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Queues and their service weights; higher weight means serviced more
    /// often. Order is irrelevant.
    pub queue_weights: Vec<(Queue, u32)>,
    /// Number of concurrent worker loops.
    pub workers: usize,
    /// How long to sleep when every queue is empty.
    pub poll_interval: Duration,
    /// Claim lease: a task running longer than this is assumed orphaned and
    /// returned to its queue.
    pub lease: Duration,
    /// Name for logging.
    pub name: String,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            queue_weights: vec![(Queue::Critical, 7), (Queue::Default, 3)],
            workers: 2,
            poll_interval: Duration::from_millis(100),
            lease: Duration::from_secs(60),
            name: "task-processor".to_string(),
        }
    }
}

/// Deterministic weighted round-robin over named queues.
#[derive(Debug, Clone)]
pub struct QueueRotation {
    entries: Vec<(Queue, u32)>,
    total: u32,
}

impl QueueRotation {
    pub fn new(weights: &[(Queue, u32)]) -> Self {
        let mut entries: Vec<(Queue, u32)> =
            weights.iter().copied().filter(|(_, w)| *w > 0).collect();
        if entries.is_empty() {
            entries.push((Queue::Default, 1));
        }
        // Highest weight first so fall-through order matches priority.
        entries.sort_by(|a, b| b.1.cmp(&a.1));
        let total = entries.iter().map(|(_, w)| w).sum();
        Self { entries, total }
    }

    /// Queue preferred on the given tick. Over `total` consecutive ticks
    /// each queue is picked exactly `weight` times.
    pub fn pick(&self, tick: u64) -> Queue {
        let mut slot = (tick % self.total as u64) as u32;
        for (queue, weight) in &self.entries {
            if slot < *weight {
                return *queue;
            }
            slot -= weight;
        }
        self.entries[0].0
    }

    /// All queues, `primary` first, the rest by descending weight. Workers
    /// fall through so no queue starves while another has work.
    pub fn ordered_from(&self, primary: Queue) -> Vec<Queue> {
        let mut order = vec![primary];
        order.extend(
            self.entries
                .iter()
                .map(|(q, _)| *q)
                .filter(|q| *q != primary),
        );
        order
    }
}

/// Handle to a running processor.
pub struct ProcessorHandle {
    shutdown: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl ProcessorHandle {
    /// Request graceful shutdown and wait for all workers to stop.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for join in self.joins {
            let _ = join.await;
        }
    }
}

/// Consumes tasks from the store and dispatches them to registered
/// handlers, retrying with backoff up to each task's budget.
pub struct TaskProcessor {
    store: Arc<dyn TaskStore>,
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
    config: ProcessorConfig,
}

impl TaskProcessor {
    pub fn new(store: Arc<dyn TaskStore>, config: ProcessorConfig) -> Self {
        Self {
            store,
            handlers: HashMap::new(),
            config,
        }
    }

    /// Register a handler for a task kind. Unregistered kinds are dropped
    /// with a warning when claimed.
    pub fn register_handler(&mut self, kind: impl Into<String>, handler: Arc<dyn TaskHandler>) {
        self.handlers.insert(kind.into(), handler);
    }

    /// Spawn the worker loops and the stale-claim reaper.
    pub fn start(self) -> ProcessorHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handlers = Arc::new(self.handlers);
        let rotation = QueueRotation::new(&self.config.queue_weights);

        info!(
            processor = %self.config.name,
            workers = self.config.workers,
            "task processor started"
        );

        let mut joins = Vec::with_capacity(self.config.workers + 1);
        for worker_idx in 0..self.config.workers {
            joins.push(tokio::spawn(worker_loop(
                self.store.clone(),
                handlers.clone(),
                rotation.clone(),
                self.config.clone(),
                shutdown_rx.clone(),
                worker_idx,
            )));
        }
        joins.push(tokio::spawn(reaper_loop(
            self.store.clone(),
            self.config.clone(),
            shutdown_rx,
        )));

        ProcessorHandle {
            shutdown: shutdown_tx,
            joins,
        }
    }

    /// Process claimable tasks until every queue is drained. Returns the
    /// number of tasks processed. Intended for tests and one-shot tools;
    /// production uses `start`.
    pub async fn drain(&self) -> usize {
        let rotation = QueueRotation::new(&self.config.queue_weights);
        let mut processed = 0;

        loop {
            let mut claimed_any = false;
            for queue in rotation.ordered_from(rotation.pick(0)) {
                while let Ok(Some(task)) = self.store.claim_next(queue).await {
                    process_task(self.store.as_ref(), &self.handlers, task).await;
                    processed += 1;
                    claimed_any = true;
                }
            }
            if !claimed_any {
                return processed;
            }
        }
    }
}

async fn worker_loop(
    store: Arc<dyn TaskStore>,
    handlers: Arc<HashMap<String, Arc<dyn TaskHandler>>>,
    rotation: QueueRotation,
    config: ProcessorConfig,
    mut shutdown: watch::Receiver<bool>,
    worker_idx: usize,
) {
    // Stagger workers so they don't all prefer the same queue on a tick.
    let mut tick = worker_idx as u64;

    loop {
        if *shutdown.borrow() {
            break;
        }

        let primary = rotation.pick(tick);
        tick = tick.wrapping_add(1);

        let mut processed = false;
        for queue in rotation.ordered_from(primary) {
            match store.claim_next(queue).await {
                Ok(Some(task)) => {
                    process_task(store.as_ref(), &handlers, task).await;
                    processed = true;
                    break;
                }
                Ok(None) => {}
                Err(e) => {
                    error!(processor = %config.name, error = %e, "failed to claim task");
                    break;
                }
            }
        }

        if !processed {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(config.poll_interval) => {}
            }
        }
    }

    debug!(processor = %config.name, worker = worker_idx, "worker stopped");
}

async fn reaper_loop(
    store: Arc<dyn TaskStore>,
    config: ProcessorConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(config.lease) => {}
        }

        match store.reap_stale(config.lease).await {
            Ok(0) => {}
            Ok(n) => warn!(processor = %config.name, reaped = n, "requeued stale running tasks"),
            Err(e) => error!(processor = %config.name, error = %e, "failed to reap stale tasks"),
        }
    }
}

async fn process_task(
    store: &dyn TaskStore,
    handlers: &HashMap<String, Arc<dyn TaskHandler>>,
    mut task: Task,
) {
    let Some(handler) = handlers.get(&task.kind) else {
        warn!(task_id = %task.id, kind = %task.kind, "no handler registered for task kind, dropping");
        if let Err(e) = store.remove(task.id).await {
            error!(task_id = %task.id, error = %e, "failed to remove task");
        }
        return;
    };

    match handler.handle(&task).await {
        TaskOutcome::Success => {
            debug!(task_id = %task.id, kind = %task.kind, "processed task");
            if let Err(e) = store.remove(task.id).await {
                error!(task_id = %task.id, error = %e, "failed to remove completed task");
            }
        }
        TaskOutcome::Retry(reason) => {
            task.mark_failed(reason.clone());
            if matches!(task.status, TaskStatus::Terminal { .. }) {
                warn!(
                    task_id = %task.id,
                    kind = %task.kind,
                    attempts = task.attempt,
                    error = %reason,
                    "task exhausted retry budget, dropping"
                );
                if let Err(e) = store.remove(task.id).await {
                    error!(task_id = %task.id, error = %e, "failed to remove terminal task");
                }
            } else {
                debug!(
                    task_id = %task.id,
                    kind = %task.kind,
                    attempt = task.attempt,
                    error = %reason,
                    "task failed, scheduled retry"
                );
                if let Err(e) = store.update(&task).await {
                    error!(task_id = %task.id, error = %e, "failed to reschedule task");
                }
            }
        }
        TaskOutcome::Discard(reason) => {
            warn!(task_id = %task.id, kind = %task.kind, error = %reason, "task discarded");
            if let Err(e) = store.remove(task.id).await {
                error!(task_id = %task.id, error = %e, "failed to remove discarded task");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::jobs::store::InMemoryTaskStore;
    use crate::jobs::types::RetryPolicy;

    #[test]
    fn rotation_services_queues_proportionally() {
        let rotation = QueueRotation::new(&[(Queue::Critical, 7), (Queue::Default, 3)]);

        let critical_picks = (0..10)
            .filter(|t| rotation.pick(*t) == Queue::Critical)
            .count();
        assert_eq!(critical_picks, 7);

        // The cycle repeats.
        assert_eq!(rotation.pick(0), rotation.pick(10));
    }

    #[test]
    fn rotation_falls_back_to_default_when_unconfigured() {
        let rotation = QueueRotation::new(&[]);
        assert_eq!(rotation.pick(0), Queue::Default);

        let rotation = QueueRotation::new(&[(Queue::Critical, 0)]);
        assert_eq!(rotation.pick(5), Queue::Default);
    }

    #[test]
    fn ordered_from_puts_primary_first() {
        let rotation = QueueRotation::new(&[(Queue::Critical, 7), (Queue::Default, 3)]);

        assert_eq!(
            rotation.ordered_from(Queue::Default),
            vec![Queue::Default, Queue::Critical]
        );
        assert_eq!(
            rotation.ordered_from(Queue::Critical),
            vec![Queue::Critical, Queue::Default]
        );
    }

    struct CountingHandler {
        calls: AtomicU32,
        fail_first: u32,
    }

    #[async_trait]
    impl TaskHandler for CountingHandler {
        async fn handle(&self, _task: &Task) -> TaskOutcome {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                TaskOutcome::Retry("transient".to_string())
            } else {
                TaskOutcome::Success
            }
        }
    }

    fn instant_retry(max_retries: u32) -> RetryPolicy {
        RetryPolicy::fixed(max_retries, Duration::ZERO)
    }

    #[tokio::test]
    async fn drain_processes_successful_task() {
        let store = Arc::new(InMemoryTaskStore::new());
        let handler = Arc::new(CountingHandler {
            calls: AtomicU32::new(0),
            fail_first: 0,
        });

        let mut processor = TaskProcessor::new(store.clone(), ProcessorConfig::default());
        processor.register_handler("test", handler.clone());

        store
            .enqueue(Task::new("test", serde_json::json!({})))
            .await
            .unwrap();

        assert_eq!(processor.drain().await, 1);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.pending_count(Queue::Default).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failing_task_is_retried_until_success() {
        let store = Arc::new(InMemoryTaskStore::new());
        let handler = Arc::new(CountingHandler {
            calls: AtomicU32::new(0),
            fail_first: 2,
        });

        let mut processor = TaskProcessor::new(store.clone(), ProcessorConfig::default());
        processor.register_handler("test", handler.clone());

        store
            .enqueue(
                Task::new("test", serde_json::json!({})).with_retry_policy(instant_retry(5)),
            )
            .await
            .unwrap();

        processor.drain().await;
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
        assert_eq!(store.pending_count(Queue::Default).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn task_is_dropped_after_exhausting_retries() {
        let store = Arc::new(InMemoryTaskStore::new());
        let handler = Arc::new(CountingHandler {
            calls: AtomicU32::new(0),
            fail_first: u32::MAX,
        });

        let mut processor = TaskProcessor::new(store.clone(), ProcessorConfig::default());
        processor.register_handler("test", handler.clone());

        store
            .enqueue(
                Task::new("test", serde_json::json!({})).with_retry_policy(instant_retry(2)),
            )
            .await
            .unwrap();

        processor.drain().await;
        // Initial attempt plus two retries, then dropped.
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
        assert_eq!(store.pending_count(Queue::Default).await.unwrap(), 0);
    }

    struct DiscardingHandler;

    #[async_trait]
    impl TaskHandler for DiscardingHandler {
        async fn handle(&self, _task: &Task) -> TaskOutcome {
            TaskOutcome::Discard("malformed payload".to_string())
        }
    }

    #[tokio::test]
    async fn discarded_task_is_not_retried() {
        let store = Arc::new(InMemoryTaskStore::new());

        let mut processor = TaskProcessor::new(store.clone(), ProcessorConfig::default());
        processor.register_handler("test", Arc::new(DiscardingHandler));

        store
            .enqueue(
                Task::new("test", serde_json::json!({})).with_retry_policy(instant_retry(5)),
            )
            .await
            .unwrap();

        assert_eq!(processor.drain().await, 1);
        assert_eq!(store.pending_count(Queue::Default).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unregistered_kind_is_dropped() {
        let store = Arc::new(InMemoryTaskStore::new());
        let processor = TaskProcessor::new(store.clone(), ProcessorConfig::default());

        store
            .enqueue(Task::new("unknown", serde_json::json!({})))
            .await
            .unwrap();

        assert_eq!(processor.drain().await, 1);
        assert_eq!(store.pending_count(Queue::Default).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn started_processor_drains_the_queue() {
        let store = Arc::new(InMemoryTaskStore::new());
        let handler = Arc::new(CountingHandler {
            calls: AtomicU32::new(0),
            fail_first: 0,
        });

        let mut processor = TaskProcessor::new(
            store.clone(),
            ProcessorConfig {
                poll_interval: Duration::from_millis(5),
                ..ProcessorConfig::default()
            },
        );
        processor.register_handler("test", handler.clone());

        for _ in 0..5 {
            store
                .enqueue(Task::new("test", serde_json::json!({})).on_queue(Queue::Critical))
                .await
                .unwrap();
        }

        let handle = processor.start();
        for _ in 0..100 {
            if handler.calls.load(Ordering::SeqCst) == 5 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.shutdown().await;

        assert_eq!(handler.calls.load(Ordering::SeqCst), 5);
        assert_eq!(store.pending_count(Queue::Critical).await.unwrap(), 0);
    }
}
