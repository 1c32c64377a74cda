use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// What happened to a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskEventKind {
    /// The task was accepted and persisted.
    Created,
    /// A run started.
    Started,
    /// A run finished successfully and the task reached `completed`.
    Completed,
    /// A run failed and the task reached `failed`.
    Failed,
    /// A recurring task finished a run and went back to `scheduled`.
    Rescheduled,
    /// The task and its history were removed.
    Deleted,
}

impl std::fmt::Display for TaskEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskEventKind::Created => write!(f, "created"),
            TaskEventKind::Started => write!(f, "started"),
            TaskEventKind::Completed => write!(f, "completed"),
            TaskEventKind::Failed => write!(f, "failed"),
            TaskEventKind::Rescheduled => write!(f, "rescheduled"),
            TaskEventKind::Deleted => write!(f, "deleted"),
        }
    }
}

/// A task status-change notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskEvent {
    /// Task the event concerns.
    pub task_id: Uuid,
    /// Kind of change.
    pub kind: TaskEventKind,
    /// Status of the task after the change, in its wire form (`running`, `failed`, ...).
    pub status: String,
    /// Error text for `failed` events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the change was recorded.
    pub at: DateTime<Utc>,
}

impl TaskEvent {
    /// Creates an event stamped with the current time.
    pub fn new(task_id: Uuid, kind: TaskEventKind, status: impl Into<String>) -> Self {
        Self {
            task_id,
            kind,
            status: status.into(),
            error: None,
            at: Utc::now(),
        }
    }

    /// Attach an error message.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Fan-out of [`TaskEvent`]s to observers.
///
/// Delivery is at-most-once with no replay: a subscriber only sees events
/// published after it subscribed, and a lagging subscriber loses the oldest
/// events once the channel capacity is exceeded.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TaskEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Register a new observer.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Returns the number of observers it reached.
    pub fn publish(&self, event: TaskEvent) -> usize {
        tracing::debug!(
            task_id = %event.task_id,
            kind = %event.kind,
            status = %event.status,
            "Publishing task event"
        );
        // No subscribers is not an error: nobody is watching right now.
        self.tx.send(event).unwrap_or(0)
    }

    /// Number of active observers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
