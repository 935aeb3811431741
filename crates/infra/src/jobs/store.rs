//! Task storage: the broker abstraction and an in-memory implementation.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use super::types::{Queue, Task, TaskId, TaskStatus};

/// Broker-side task persistence.
///
/// `enqueue` acknowledging means the task has been durably accepted; that is
/// the only admission guarantee the distributor awaits. Claiming marks a
/// task `Running`; a claimed task whose worker dies is returned to the queue
/// by `reap_stale`, which is what makes delivery at-least-once.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Durably accept a task. Does not wait for processing.
    async fn enqueue(&self, task: Task) -> Result<TaskId, TaskStoreError>;

    /// Claim the next ready task on `queue`, marking it running.
    async fn claim_next(&self, queue: Queue) -> Result<Option<Task>, TaskStoreError>;

    /// Persist an updated task (retry scheduling).
    async fn update(&self, task: &Task) -> Result<(), TaskStoreError>;

    /// Remove a finished (completed or terminal) task.
    async fn remove(&self, id: TaskId) -> Result<(), TaskStoreError>;

    /// Return tasks stuck in `Running` longer than `lease` to the queue.
    /// Returns the number of tasks reaped.
    async fn reap_stale(&self, lease: Duration) -> Result<u64, TaskStoreError>;

    /// Number of claimable tasks on `queue` (ready or not).
    async fn pending_count(&self, queue: Queue) -> Result<u64, TaskStoreError>;
}

/// Task store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TaskStoreError {
    #[error("task not found: {0}")]
    NotFound(TaskId),
    #[error("could not encode task payload: {0}")]
    Encoding(String),
    #[error("storage error: {0}")]
    Storage(String),
}

/// In-memory task store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tasks: Mutex<HashMap<TaskId, Task>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn enqueue(&self, task: Task) -> Result<TaskId, TaskStoreError> {
        let mut tasks = self.tasks.lock().unwrap();
        let id = task.id;
        tasks.insert(id, task);
        Ok(id)
    }

    async fn claim_next(&self, queue: Queue) -> Result<Option<Task>, TaskStoreError> {
        let mut tasks = self.tasks.lock().unwrap();

        // Oldest ready claimable task on this queue, FIFO by creation
        // (task ids are time-ordered, breaking created_at ties).
        let candidate = tasks
            .values()
            .filter(|t| t.queue == queue && t.status.is_claimable() && t.is_ready())
            .min_by_key(|t| (t.created_at, t.id.0))
            .map(|t| t.id);

        if let Some(id) = candidate {
            if let Some(task) = tasks.get_mut(&id) {
                task.mark_running();
                return Ok(Some(task.clone()));
            }
        }

        Ok(None)
    }

    async fn update(&self, task: &Task) -> Result<(), TaskStoreError> {
        let mut tasks = self.tasks.lock().unwrap();
        if !tasks.contains_key(&task.id) {
            return Err(TaskStoreError::NotFound(task.id));
        }
        tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn remove(&self, id: TaskId) -> Result<(), TaskStoreError> {
        self.tasks.lock().unwrap().remove(&id);
        Ok(())
    }

    async fn reap_stale(&self, lease: Duration) -> Result<u64, TaskStoreError> {
        let mut tasks = self.tasks.lock().unwrap();
        let cutoff = Utc::now() - chrono::Duration::from_std(lease).unwrap_or_default();

        let mut reaped = 0;
        for task in tasks.values_mut() {
            if matches!(task.status, TaskStatus::Running) && task.updated_at < cutoff {
                task.status = TaskStatus::Pending;
                task.scheduled_at = None;
                task.updated_at = Utc::now();
                reaped += 1;
            }
        }

        Ok(reaped)
    }

    async fn pending_count(&self, queue: Queue) -> Result<u64, TaskStoreError> {
        let tasks = self.tasks.lock().unwrap();
        Ok(tasks
            .values()
            .filter(|t| t.queue == queue && t.status.is_claimable())
            .count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enqueue_and_claim_fifo() {
        let store = InMemoryTaskStore::new();

        let first = Task::new("test", serde_json::json!({"n": 1}));
        let second = Task::new("test", serde_json::json!({"n": 2}));
        let first_id = store.enqueue(first).await.unwrap();
        store.enqueue(second).await.unwrap();

        let claimed = store.claim_next(Queue::Default).await.unwrap().unwrap();
        assert_eq!(claimed.id, first_id);
        assert!(matches!(claimed.status, TaskStatus::Running));
        assert_eq!(claimed.attempt, 1);
    }

    #[tokio::test]
    async fn queues_are_isolated() {
        let store = InMemoryTaskStore::new();

        let task = Task::new("test", serde_json::json!({})).on_queue(Queue::Critical);
        store.enqueue(task).await.unwrap();

        assert!(store.claim_next(Queue::Default).await.unwrap().is_none());
        assert!(store.claim_next(Queue::Critical).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delayed_task_is_not_claimable_until_due() {
        let store = InMemoryTaskStore::new();

        let task = Task::new("test", serde_json::json!({})).delayed(Duration::from_secs(300));
        store.enqueue(task).await.unwrap();

        assert!(store.claim_next(Queue::Default).await.unwrap().is_none());
        assert_eq!(store.pending_count(Queue::Default).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn reap_returns_stale_running_tasks() {
        let store = InMemoryTaskStore::new();

        let task = Task::new("test", serde_json::json!({}));
        store.enqueue(task).await.unwrap();
        store.claim_next(Queue::Default).await.unwrap().unwrap();

        // Nothing is stale under a generous lease.
        assert_eq!(store.reap_stale(Duration::from_secs(60)).await.unwrap(), 0);

        // A zero lease makes the running task immediately stale.
        assert_eq!(store.reap_stale(Duration::ZERO).await.unwrap(), 1);
        assert!(store.claim_next(Queue::Default).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn remove_drops_the_task() {
        let store = InMemoryTaskStore::new();

        let id = store
            .enqueue(Task::new("test", serde_json::json!({})))
            .await
            .unwrap();
        store.remove(id).await.unwrap();

        assert_eq!(store.pending_count(Queue::Default).await.unwrap(), 0);
    }
}
