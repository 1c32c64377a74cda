#![allow(clippy::unwrap_used, clippy::expect_used)]

use taskloom_core::*;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// 1. Error Display for every tagged variant
// ---------------------------------------------------------------------------

#[test]
fn error_display_carries_tags() {
    let err = TaskloomError::Validation("collaborative mode requires at least one agent".into());
    assert_eq!(
        err.to_string(),
        "Validation error: collaborative mode requires at least one agent"
    );

    let err = TaskloomError::search_backend("serpapi", "HTTP 502 Bad Gateway");
    assert_eq!(err.to_string(), "Search backend error [serpapi]: HTTP 502 Bad Gateway");
    assert_eq!(err.kind(), "search_backend");

    let id = Uuid::new_v4();
    let err = TaskloomError::ConcurrentRun(id);
    assert_eq!(err.to_string(), format!("Task {id} is already running"));

    let err = TaskloomError::InvalidTransition {
        task_id: id,
        from: "completed".into(),
        to: "running".into(),
    };
    assert!(err.to_string().contains("cannot move from completed to running"));
    assert_eq!(err.kind(), "invalid_transition");
}

// ---------------------------------------------------------------------------
// 2. From impls
// ---------------------------------------------------------------------------

#[test]
fn error_from_json_and_io() {
    let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
    let err: TaskloomError = json_err.into();
    assert_eq!(err.kind(), "json");

    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
    let err: TaskloomError = io_err.into();
    assert!(err.to_string().starts_with("IO error"));
}

// ---------------------------------------------------------------------------
// 3. Event bus fan-out to several observers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn event_bus_fans_out_in_order() {
    let bus = EventBus::new(16);
    let mut first = bus.subscribe();
    let mut second = bus.subscribe();
    let id = Uuid::new_v4();

    bus.publish(TaskEvent::new(id, TaskEventKind::Created, "pending"));
    bus.publish(TaskEvent::new(id, TaskEventKind::Started, "running"));

    for rx in [&mut first, &mut second] {
        assert_eq!(rx.recv().await.unwrap().kind, TaskEventKind::Created);
        assert_eq!(rx.recv().await.unwrap().kind, TaskEventKind::Started);
    }
}

#[tokio::test]
async fn late_subscriber_sees_no_replay() {
    let bus = EventBus::new(16);
    let id = Uuid::new_v4();
    bus.publish(TaskEvent::new(id, TaskEventKind::Created, "pending"));

    let mut late = bus.subscribe();
    bus.publish(TaskEvent::new(id, TaskEventKind::Deleted, "deleted"));

    assert_eq!(late.recv().await.unwrap().kind, TaskEventKind::Deleted);
}
