//! Task distributor: the producer-side enqueue API.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::info;

use super::store::{TaskStore, TaskStoreError};
use super::types::{Queue, RetryPolicy, Task, TaskId};

/// Hands tasks to the broker. Returns once the store has durably accepted
/// the row; never waits for processing.
#[derive(Clone)]
pub struct TaskDistributor {
    store: Arc<dyn TaskStore>,
}

impl TaskDistributor {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    pub async fn enqueue<P: Serialize>(
        &self,
        kind: &str,
        payload: &P,
        queue: Queue,
        max_retries: u32,
        delay: Option<Duration>,
    ) -> Result<TaskId, TaskStoreError> {
        let payload =
            serde_json::to_value(payload).map_err(|e| TaskStoreError::Encoding(e.to_string()))?;

        let mut task = Task::new(kind, payload)
            .on_queue(queue)
            .with_retry_policy(RetryPolicy::with_max_retries(max_retries));
        if let Some(delay) = delay {
            task = task.delayed(delay);
        }

        let id = self.store.enqueue(task).await?;

        info!(
            task_id = %id,
            %kind,
            %queue,
            max_retries,
            delay_ms = delay.map(|d| d.as_millis() as u64),
            "enqueued task"
        );

        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::store::InMemoryTaskStore;
    use crate::jobs::types::TaskStatus;

    #[derive(Serialize)]
    struct Payload {
        wallet_address: String,
    }

    #[tokio::test]
    async fn enqueue_is_an_admission_ack_only() {
        let store = Arc::new(InMemoryTaskStore::new());
        let distributor = TaskDistributor::new(store.clone());

        let payload = Payload {
            wallet_address: "0xAAA".into(),
        };
        distributor
            .enqueue("test_kind", &payload, Queue::Critical, 10, None)
            .await
            .unwrap();

        // The task sits in the store untouched until a processor claims it.
        let claimed = store.claim_next(Queue::Critical).await.unwrap().unwrap();
        assert_eq!(claimed.kind, "test_kind");
        assert_eq!(claimed.retry_policy.max_retries, 10);
        assert_eq!(claimed.payload["wallet_address"], "0xAAA");
        assert!(matches!(claimed.status, TaskStatus::Running));
    }

    #[tokio::test]
    async fn enqueue_with_delay_schedules_admission() {
        let store = Arc::new(InMemoryTaskStore::new());
        let distributor = TaskDistributor::new(store.clone());

        distributor
            .enqueue(
                "test_kind",
                &serde_json::json!({}),
                Queue::Default,
                3,
                Some(Duration::from_secs(600)),
            )
            .await
            .unwrap();

        assert!(store.claim_next(Queue::Default).await.unwrap().is_none());
    }
}
