//! Background task hand-off.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use homeman_bootstrap::Dependency;
use homeman_core::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::connector::RedisConnector;

/// Name of the worker health-check task.
pub const HEALTH_CHECK_TASK: &str = "tasks.check_health";

/// A unit of background work as it sits on the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMessage {
    /// Unique message id.
    pub id: Uuid,
    /// Registered task name.
    pub task: String,
    /// When the message was enqueued.
    pub enqueued_at: DateTime<Utc>,
}

impl TaskMessage {
    /// Creates a message for `task`, stamped now.
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            task: task.into(),
            enqueued_at: Utc::now(),
        }
    }

    /// The worker health-check message.
    pub fn health_check() -> Self {
        Self::new(HEALTH_CHECK_TASK)
    }
}

/// Somewhere to hand off background work.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Enqueues a message. Fails with `ServiceUnavailable` when the broker
    /// is not connected.
    async fn enqueue(&self, message: &TaskMessage) -> Result<()>;
}

/// [`TaskQueue`] that pushes onto a Redis list.
pub struct RedisTaskQueue {
    broker: Arc<Dependency<RedisConnector>>,
    queue: String,
}

impl RedisTaskQueue {
    /// Pushes onto the list named `queue`.
    pub fn new(broker: Arc<Dependency<RedisConnector>>, queue: impl Into<String>) -> Self {
        Self {
            broker,
            queue: queue.into(),
        }
    }

    /// The list name.
    pub fn queue(&self) -> &str {
        &self.queue
    }
}

#[async_trait]
impl TaskQueue for RedisTaskQueue {
    async fn enqueue(&self, message: &TaskMessage) -> Result<()> {
        let handle = self.broker.handle().await?;
        let payload =
            serde_json::to_string(message).map_err(|e| Error::invalid_data(e.to_string()))?;
        let mut conn = (*handle).clone();
        let depth: i64 = redis::cmd("LPUSH")
            .arg(&self.queue)
            .arg(payload)
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::backend(e.to_string()))?;
        debug!(queue = %self.queue, task = %message.task, depth, "task enqueued");
        Ok(())
    }
}

/// [`TaskQueue`] that keeps messages in memory.
#[derive(Debug, Default)]
pub struct MemoryTaskQueue {
    messages: Mutex<Vec<TaskMessage>>,
}

impl MemoryTaskQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages enqueued so far, oldest first.
    pub fn messages(&self) -> Vec<TaskMessage> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl TaskQueue for MemoryTaskQueue {
    async fn enqueue(&self, message: &TaskMessage) -> Result<()> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.clone());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use homeman_bootstrap::{BackoffPolicy, DependencyState, ManagedDependency, RecordingTimer};

    #[tokio::test]
    async fn test_redis_queue_fails_fast_when_disconnected() {
        let broker = Arc::new(Dependency::new(RedisConnector::new(
            "redis://localhost:6379/0",
        )));
        let queue = RedisTaskQueue::new(broker, "celery");

        let err = queue
            .enqueue(&TaskMessage::health_check())
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Service unavailable: redis is disconnected");
        assert_eq!(queue.queue(), "celery");
    }

    #[tokio::test]
    async fn test_memory_queue_records_messages() {
        let queue = MemoryTaskQueue::new();
        queue.enqueue(&TaskMessage::health_check()).await.unwrap();
        queue.enqueue(&TaskMessage::new("tasks.other")).await.unwrap();

        let tasks: Vec<String> = queue.messages().into_iter().map(|m| m.task).collect();
        assert_eq!(tasks, vec![HEALTH_CHECK_TASK, "tasks.other"]);
    }

    #[tokio::test]
    async fn test_redis_queue_fails_fast_when_degraded() {
        let broker = Arc::new(Dependency::new(RedisConnector::new("redis://127.0.0.1:1/0")));
        let policy = BackoffPolicy::new().with_max_attempts(1);
        let state = broker
            .start(&policy, Arc::new(RecordingTimer::default()))
            .await;
        assert_eq!(state, DependencyState::Degraded);
        let queue = RedisTaskQueue::new(broker, "celery");

        let err = queue
            .enqueue(&TaskMessage::health_check())
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Service unavailable: redis is degraded");
    }

    #[test]
    fn test_message_json_shape() {
        let msg = TaskMessage::health_check();
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["task"], "tasks.check_health");
        assert!(json["id"].is_string());
    }
}
