use crate::coordinator::AgentCoordinator;
use crate::schedule::{initial_next_run, next_after, parse_cron, starts_scheduled};
use crate::store::TaskStore;
use crate::types::{
    Agent, AgentRole, ExecutionMode, Recurrence, Task, TaskResult, TaskSpec, TaskStatus,
};
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use taskloom_core::{EventBus, TaskEvent, TaskEventKind, TaskloomError, TaskloomResult};
use tokio::sync::Mutex;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{error, info, warn};
use uuid::Uuid;

struct ActiveRun {
    run_id: Uuid,
    abort: Option<AbortHandle>,
}

struct TaskEntry {
    task: Task,
    active_run: Option<ActiveRun>,
}

/// A started run. Await [`RunHandle::wait`] for the task state it left behind.
pub struct RunHandle {
    /// Task the run belongs to.
    pub task_id: Uuid,
    /// Identifier of this particular run.
    pub run_id: Uuid,
    handle: JoinHandle<TaskloomResult<Task>>,
}

impl RunHandle {
    /// Wait for the run to finish.
    ///
    /// Returns the task as recorded after the run, or `Cancelled` if the task
    /// was deleted while the run was in flight.
    pub async fn wait(self) -> TaskloomResult<Task> {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                if e.is_panic() {
                    error!(task_id = %self.task_id, run_id = %self.run_id, "Run panicked");
                }
                Err(TaskloomError::Cancelled(self.task_id))
            }
        }
    }
}

/// Owns task state and drives the lifecycle
/// `pending|scheduled -> running -> completed|failed`, returning recurring
/// tasks to `scheduled` after each successful run.
///
/// The in-memory registry is the source of truth; the [`TaskStore`] mirrors
/// it. At most one run per task is active: the status check and the switch
/// to `running` happen under one write lock. A run whose task was deleted, or
/// whose run id no longer matches, is discarded without touching state.
pub struct TaskManager {
    tasks: RwLock<HashMap<Uuid, TaskEntry>>,
    store: Arc<dyn TaskStore>,
    coordinator: Arc<AgentCoordinator>,
    events: EventBus,
    persist_lock: Mutex<()>,
    persist_failures: AtomicU64,
}

impl TaskManager {
    /// Create an empty manager. Call [`load`](Self::load) to restore stored tasks.
    pub fn new(
        store: Arc<dyn TaskStore>,
        coordinator: Arc<AgentCoordinator>,
        events: EventBus,
    ) -> Arc<Self> {
        Arc::new(Self {
            tasks: RwLock::new(HashMap::new()),
            store,
            coordinator,
            events,
            persist_lock: Mutex::new(()),
            persist_failures: AtomicU64::new(0),
        })
    }

    /// Bus on which every task status change is published.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// `createTask(spec)`.
    ///
    /// Validates the spec, persists the task and publishes `created`. A task
    /// with no future start time starts running immediately, so the returned
    /// snapshot is already `running`.
    pub async fn create_task(self: &Arc<Self>, spec: TaskSpec) -> TaskloomResult<Task> {
        let (task, _) = self.submit(spec).await?;
        Ok(task)
    }

    /// Like [`create_task`](Self::create_task), also returning the handle of
    /// the immediate run when one was started.
    pub async fn submit(
        self: &Arc<Self>,
        spec: TaskSpec,
    ) -> TaskloomResult<(Task, Option<RunHandle>)> {
        let now = Utc::now();
        let task = self.build_task(spec, now)?;

        {
            let _guard = self.persist_lock.lock().await;
            self.store.create(&task).await?;
            self.tasks.write().insert(
                task.id,
                TaskEntry {
                    task: task.clone(),
                    active_run: None,
                },
            );
        }

        info!(
            task_id = %task.id,
            title = %task.title,
            mode = ?task.mode,
            agents = task.agents.len(),
            status = %task.status,
            "Task created"
        );
        self.publish(TaskEvent::new(task.id, TaskEventKind::Created, task.status.to_string()));

        if task.status == TaskStatus::Pending {
            let handle = self.start_run(task.id).await?;
            let snapshot = self.get_task(task.id).unwrap_or(task);
            return Ok((snapshot, Some(handle)));
        }
        Ok((task, None))
    }

    /// `deleteTask(id)`: removes the task and its history.
    ///
    /// The stored copy goes first; if the store fails the task is kept and the
    /// error returned. An in-flight run is aborted on a best-effort basis; if
    /// it still completes, its outcome is discarded.
    pub async fn delete_task(&self, id: Uuid) -> TaskloomResult<()> {
        let entry = {
            let _guard = self.persist_lock.lock().await;
            if !self.tasks.read().contains_key(&id) {
                return Err(TaskloomError::TaskNotFound(id));
            }
            self.store.delete(id).await.map_err(|e| {
                error!(task_id = %id, error = %e, "Failed to delete stored task");
                e
            })?;
            self.tasks
                .write()
                .remove(&id)
                .ok_or(TaskloomError::TaskNotFound(id))?
        };

        if let Some(run) = entry.active_run {
            info!(task_id = %id, run_id = %run.run_id, "Cancelling in-flight run of deleted task");
            if let Some(abort) = run.abort {
                abort.abort();
            }
        }

        info!(task_id = %id, "Task deleted");
        self.publish(TaskEvent::new(id, TaskEventKind::Deleted, "deleted"));
        Ok(())
    }

    /// Manually trigger a run.
    ///
    /// Allowed from `pending` and `scheduled`. A running task yields
    /// `ConcurrentRun`; a terminal one yields `InvalidTransition`.
    pub async fn run_task(self: &Arc<Self>, id: Uuid) -> TaskloomResult<RunHandle> {
        self.start_run(id).await
    }

    /// Current snapshot of a task, if it exists.
    pub fn get_task(&self, id: Uuid) -> Option<Task> {
        self.tasks.read().get(&id).map(|e| e.task.clone())
    }

    /// All tasks, oldest first.
    pub fn list_tasks(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.tasks.read().values().map(|e| e.task.clone()).collect();
        tasks.sort_by_key(|t| t.created_at);
        tasks
    }

    /// Scheduled tasks whose `next_run` has been reached.
    pub fn due_tasks(&self, now: DateTime<Utc>) -> Vec<Uuid> {
        self.tasks
            .read()
            .values()
            .filter(|e| e.task.status == TaskStatus::Scheduled)
            .filter(|e| e.task.next_run().is_some_and(|next| next <= now))
            .map(|e| e.task.id)
            .collect()
    }

    /// Start every due task. Tasks that changed state in between are skipped.
    pub async fn tick(self: &Arc<Self>, now: DateTime<Utc>) -> Vec<RunHandle> {
        let mut handles = Vec::new();
        for id in self.due_tasks(now) {
            match self.start_run(id).await {
                Ok(handle) => handles.push(handle),
                Err(e) => warn!(task_id = %id, error = %e, "Scheduler: skipping due task"),
            }
        }
        handles
    }

    /// Restore tasks from the store.
    ///
    /// A task persisted as `running` was interrupted: a recurring one goes
    /// back to `scheduled`, any other becomes `failed`. Tasks still `pending`
    /// are started. Returns the number of tasks loaded.
    pub async fn load(self: &Arc<Self>) -> TaskloomResult<usize> {
        let now = Utc::now();
        let stored = self.store.list().await?;
        let count = stored.len();
        let mut repaired = Vec::new();
        let mut pending = Vec::new();

        {
            let mut tasks = self.tasks.write();
            for mut task in stored {
                if task.status == TaskStatus::Running {
                    if task.is_recurring() {
                        task.status = TaskStatus::Scheduled;
                        if let Some(schedule) = task.schedule.as_mut() {
                            if schedule.next_run.is_none() {
                                schedule.next_run = Some(now);
                            }
                        }
                    } else {
                        task.status = TaskStatus::Failed;
                        task.error = Some("run interrupted by restart".to_string());
                        task.completed_at = Some(now);
                        task.result = None;
                    }
                    warn!(task_id = %task.id, status = %task.status, "Recovered interrupted task");
                    repaired.push(task.id);
                }
                if task.status == TaskStatus::Pending {
                    pending.push(task.id);
                }
                tasks.insert(
                    task.id,
                    TaskEntry {
                        task,
                        active_run: None,
                    },
                );
            }
        }

        for id in repaired {
            self.persist_logged(id).await;
        }
        for id in pending {
            if let Err(e) = self.start_run(id).await {
                warn!(task_id = %id, error = %e, "Could not start restored task");
            }
        }

        info!(tasks = count, "Tasks loaded from store");
        Ok(count)
    }

    fn build_task(&self, spec: TaskSpec, now: DateTime<Utc>) -> TaskloomResult<Task> {
        validate_spec(&spec)?;

        let mut agents = spec.agents;
        if spec.mode == ExecutionMode::Single && agents.is_empty() {
            let default_provider = self.coordinator.gateway().settings().default_provider.clone();
            agents.push(
                Agent::new(AgentRole::Analyst, default_provider).with_name("Assistant"),
            );
        }
        for agent in &mut agents {
            if agent.id.trim().is_empty() {
                agent.id = Uuid::new_v4().to_string();
            }
        }

        let mut schedule = spec.schedule;
        let mut status = TaskStatus::Pending;
        if let Some(schedule) = schedule.as_mut() {
            schedule.next_run = initial_next_run(schedule, now)?;
            if starts_scheduled(schedule, now) {
                status = TaskStatus::Scheduled;
            }
        }

        Ok(Task {
            id: Uuid::new_v4(),
            title: spec.title.trim().to_string(),
            description: spec.description,
            priority: spec.priority,
            mode: spec.mode,
            agents,
            schedule,
            status,
            created_at: now,
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
        })
    }

    /// Check-and-set to `running`, then spawn the coordinator.
    async fn start_run(self: &Arc<Self>, id: Uuid) -> TaskloomResult<RunHandle> {
        let run_id = Uuid::new_v4();
        let snapshot = {
            let mut tasks = self.tasks.write();
            let entry = tasks.get_mut(&id).ok_or(TaskloomError::TaskNotFound(id))?;
            match entry.task.status {
                TaskStatus::Running => return Err(TaskloomError::ConcurrentRun(id)),
                status if status.is_terminal() => {
                    return Err(TaskloomError::InvalidTransition {
                        task_id: id,
                        from: status.to_string(),
                        to: TaskStatus::Running.to_string(),
                    })
                }
                _ => {}
            }
            entry.task.status = TaskStatus::Running;
            entry.task.started_at = Some(Utc::now());
            entry.active_run = Some(ActiveRun {
                run_id,
                abort: None,
            });
            entry.task.clone()
        };

        info!(task_id = %id, run_id = %run_id, "Task run started");
        self.publish(TaskEvent::new(id, TaskEventKind::Started, TaskStatus::Running.to_string()));
        self.persist_logged(id).await;

        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let attempt = AssertUnwindSafe(manager.execute(id, run_id, &snapshot))
                .catch_unwind()
                .await;
            match attempt {
                Ok(task) => task,
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    error!(task_id = %id, run_id = %run_id, panic = %message, "Run panicked");
                    manager
                        .finish_run(id, run_id, Err(TaskloomError::RunPanicked(message)))
                        .await
                }
            }
        });

        if let Some(entry) = self.tasks.write().get_mut(&id) {
            if let Some(run) = entry.active_run.as_mut().filter(|r| r.run_id == run_id) {
                run.abort = Some(handle.abort_handle());
            }
        }

        Ok(RunHandle {
            task_id: id,
            run_id,
            handle,
        })
    }

    async fn execute(&self, id: Uuid, run_id: Uuid, snapshot: &Task) -> TaskloomResult<Task> {
        let outcome = self.coordinator.run(snapshot).await;
        self.finish_run(id, run_id, outcome).await
    }

    /// Record a run's outcome if the run is still the task's active run.
    async fn finish_run(
        &self,
        id: Uuid,
        run_id: Uuid,
        outcome: TaskloomResult<TaskResult>,
    ) -> TaskloomResult<Task> {
        let now = Utc::now();
        let (task, events) = {
            let mut tasks = self.tasks.write();
            let Some(entry) = tasks
                .get_mut(&id)
                .filter(|e| e.active_run.as_ref().is_some_and(|r| r.run_id == run_id))
            else {
                info!(task_id = %id, run_id = %run_id, "Discarding outcome of cancelled run");
                return Err(TaskloomError::Cancelled(id));
            };
            entry.active_run = None;
            let task = &mut entry.task;
            task.completed_at = Some(now);

            let outcome = match outcome {
                Ok(result) => reschedule(task, now).map(|next| (result, next)),
                Err(e) => Err(e),
            };
            let events = match outcome {
                Ok((result, next_run)) => {
                    task.result = Some(result);
                    task.error = None;
                    match next_run {
                        Some(next) => {
                            task.status = TaskStatus::Scheduled;
                            if let Some(schedule) = task.schedule.as_mut() {
                                schedule.next_run = Some(next);
                            }
                            info!(task_id = %id, next_run = %next, "Recurring task rescheduled");
                            vec![
                                TaskEvent::new(id, TaskEventKind::Completed, "scheduled"),
                                TaskEvent::new(id, TaskEventKind::Rescheduled, "scheduled"),
                            ]
                        }
                        None => {
                            task.status = TaskStatus::Completed;
                            info!(task_id = %id, "Task completed");
                            vec![TaskEvent::new(id, TaskEventKind::Completed, "completed")]
                        }
                    }
                }
                Err(e) => {
                    task.status = TaskStatus::Failed;
                    task.result = None;
                    task.error = Some(e.to_string());
                    error!(task_id = %id, error = %e, "Task failed");
                    vec![TaskEvent::new(id, TaskEventKind::Failed, "failed").with_error(e.to_string())]
                }
            };
            (task.clone(), events)
        };

        self.persist_logged(id).await;
        for event in events {
            self.publish(event);
        }
        Ok(task)
    }

    /// Number of state changes that could not be written to the store.
    ///
    /// The in-memory state stays authoritative; a non-zero count means the
    /// store is behind and a restart would lose those changes.
    pub fn persist_failures(&self) -> u64 {
        self.persist_failures.load(Ordering::Relaxed)
    }

    /// Mirror the in-memory state of `id` into the store. A task that is no
    /// longer registered was removed by [`delete_task`](Self::delete_task).
    async fn persist(&self, id: Uuid) -> TaskloomResult<()> {
        let _guard = self.persist_lock.lock().await;
        let snapshot = self.tasks.read().get(&id).map(|e| e.task.clone());
        match snapshot {
            Some(task) => self.store.update(&task).await,
            None => Ok(()),
        }
    }

    /// [`persist`](Self::persist) for state changes made inside a run, where
    /// there is no caller to return the error to.
    async fn persist_logged(&self, id: Uuid) {
        if let Err(e) = self.persist(id).await {
            let failures = self.persist_failures.fetch_add(1, Ordering::Relaxed) + 1;
            error!(task_id = %id, error = %e, failures, "Failed to persist task");
        }
    }

    fn publish(&self, event: TaskEvent) {
        self.events.publish(event);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Next run for a recurring task finishing at `now`, or `None` if it does not recur.
fn reschedule(task: &Task, now: DateTime<Utc>) -> TaskloomResult<Option<DateTime<Utc>>> {
    let Some(schedule) = task.schedule.as_ref() else {
        return Ok(None);
    };
    match (&schedule.recurring_pattern, schedule.start_at) {
        (Some(pattern), Some(start)) => next_after(start, pattern, now).map(Some),
        _ => Ok(None),
    }
}

/// Reject a spec before anything is persisted.
pub fn validate_spec(spec: &TaskSpec) -> TaskloomResult<()> {
    if spec.title.trim().is_empty() {
        return Err(TaskloomError::Validation("title must not be empty".into()));
    }
    if spec.mode == ExecutionMode::Collaborative && spec.agents.is_empty() {
        return Err(TaskloomError::Validation(
            "collaborative mode requires at least one agent".into(),
        ));
    }
    if let Some(agent) = spec.agents.iter().find(|a| a.provider.trim().is_empty()) {
        return Err(TaskloomError::Validation(format!(
            "agent '{}' ({}) has no provider",
            agent.label(),
            agent.role
        )));
    }
    if let Some(schedule) = &spec.schedule {
        if let Some(pattern) = &schedule.recurring_pattern {
            if schedule.start_at.is_none() {
                return Err(TaskloomError::Validation(
                    "a recurring schedule requires a start time".into(),
                ));
            }
            match pattern {
                Recurrence::Cron(expr) => {
                    parse_cron(expr)?;
                }
                interval => {
                    if let Some(start) = schedule.start_at {
                        next_after(start, interval, start)?;
                    }
                }
            }
        }
    }
    Ok(())
}
