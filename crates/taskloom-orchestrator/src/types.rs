use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use taskloom_core::TaskloomError;
use uuid::Uuid;

/// Task priority. Informational only; it does not affect run order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Low priority.
    Low,
    /// Default priority.
    #[default]
    Medium,
    /// High priority.
    High,
    /// Highest priority.
    Urgent,
}

/// How a task's agents are used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// One agent produces the whole result.
    #[default]
    Single,
    /// Agents run as a role pipeline, each seeing earlier output.
    Collaborative,
}

impl FromStr for ExecutionMode {
    type Err = TaskloomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(Self::Single),
            "collaborative" => Ok(Self::Collaborative),
            other => Err(TaskloomError::Validation(format!(
                "unknown execution mode '{other}'"
            ))),
        }
    }
}

/// Role of an agent in the collaborative pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    /// Plans the work.
    Coordinator,
    /// Gathers material.
    Researcher,
    /// Interprets the material.
    Analyst,
    /// Drafts the result.
    Writer,
    /// Checks the draft.
    Reviewer,
}

impl AgentRole {
    /// Fixed pipeline order.
    pub const PIPELINE: [AgentRole; 5] = [
        AgentRole::Coordinator,
        AgentRole::Researcher,
        AgentRole::Analyst,
        AgentRole::Writer,
        AgentRole::Reviewer,
    ];

    /// Position in [`AgentRole::PIPELINE`].
    pub fn pipeline_rank(&self) -> usize {
        match self {
            AgentRole::Coordinator => 0,
            AgentRole::Researcher => 1,
            AgentRole::Analyst => 2,
            AgentRole::Writer => 3,
            AgentRole::Reviewer => 4,
        }
    }
}

impl FromStr for AgentRole {
    type Err = TaskloomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let role = s.trim().to_ascii_lowercase();
        Self::PIPELINE
            .into_iter()
            .find(|r| r.to_string() == role)
            .ok_or_else(|| TaskloomError::Validation(format!("unknown agent role '{role}'")))
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentRole::Coordinator => write!(f, "coordinator"),
            AgentRole::Researcher => write!(f, "researcher"),
            AgentRole::Analyst => write!(f, "analyst"),
            AgentRole::Writer => write!(f, "writer"),
            AgentRole::Reviewer => write!(f, "reviewer"),
        }
    }
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Created, not yet run.
    Pending,
    /// Waiting for `next_run`.
    Scheduled,
    /// A run is in flight.
    Running,
    /// Last run succeeded and nothing is planned.
    Completed,
    /// Last run failed.
    Failed,
}

impl TaskStatus {
    /// `completed` or `failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Whether a run may start from this state.
    pub fn is_triggerable(&self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Scheduled)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Scheduled => write!(f, "scheduled"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A role-bound worker owned by one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    /// Assigned at task creation when empty.
    #[serde(default)]
    pub id: String,
    /// Display name; empty falls back to the role.
    #[serde(default)]
    pub name: String,
    /// Position in the collaborative pipeline.
    pub role: AgentRole,
    /// Provider identifier resolved through the provider gateway.
    #[serde(default)]
    pub provider: String,
    /// Model override; empty uses the provider's configured model.
    #[serde(default)]
    pub model: String,
}

impl Agent {
    /// Agent for `role` on `provider`, using the provider's model.
    pub fn new(role: AgentRole, provider: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: String::new(),
            role,
            provider: provider.into(),
            model: String::new(),
        }
    }

    /// Set the identifier.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Override the provider's model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Display name, falling back to the role.
    pub fn label(&self) -> String {
        if self.name.trim().is_empty() {
            self.role.to_string()
        } else {
            self.name.clone()
        }
    }
}

/// Recurrence rule of a schedule.
///
/// Serialized as `"daily"`, `"weekly"`, `"monthly"`, or a cron expression
/// (7-field format: sec min hour day-of-month month day-of-week year).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Recurrence {
    /// Every day at the start time.
    Daily,
    /// Every week at the start time.
    Weekly,
    /// Every month on the start day, clamped to shorter months.
    Monthly,
    /// Cron expression.
    Cron(String),
}

impl From<String> for Recurrence {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "daily" => Recurrence::Daily,
            "weekly" => Recurrence::Weekly,
            "monthly" => Recurrence::Monthly,
            _ => Recurrence::Cron(value.trim().to_string()),
        }
    }
}

impl From<Recurrence> for String {
    fn from(value: Recurrence) -> Self {
        match value {
            Recurrence::Daily => "daily".to_string(),
            Recurrence::Weekly => "weekly".to_string(),
            Recurrence::Monthly => "monthly".to_string(),
            Recurrence::Cron(expr) => expr,
        }
    }
}

/// Optional timing attached to a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    /// Anchor of the schedule and time of the first run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_at: Option<DateTime<Utc>>,
    /// Repeat pattern; `None` runs once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurring_pattern: Option<Recurrence>,
    /// Computed; ignored on input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_run: Option<DateTime<Utc>>,
}

impl Schedule {
    /// One run at `start_at`.
    pub fn at(start_at: DateTime<Utc>) -> Self {
        Self {
            start_at: Some(start_at),
            ..Self::default()
        }
    }

    /// Runs from `start_at` on, repeating per `pattern`.
    pub fn recurring(start_at: DateTime<Utc>, pattern: Recurrence) -> Self {
        Self {
            start_at: Some(start_at),
            recurring_pattern: Some(pattern),
            next_run: None,
        }
    }

    /// Whether a pattern is set.
    pub fn is_recurring(&self) -> bool {
        self.recurring_pattern.is_some()
    }
}

/// One agent's output within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentContribution {
    /// Agent that produced the output.
    pub agent_id: String,
    /// Role the agent ran in.
    pub role: AgentRole,
    /// The agent's output.
    pub contribution: String,
    /// When the output was received.
    pub timestamp: DateTime<Utc>,
}

/// Outcome of one successful run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    /// Final output of the run.
    pub summary: String,
    /// Every contribution, labelled by agent.
    pub details: String,
    /// References used by the run, such as enrichment source URLs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<String>,
    /// In execution order.
    #[serde(default)]
    pub agent_contributions: Vec<AgentContribution>,
}

/// Input to task creation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSpec {
    /// Required; blank titles are rejected.
    #[serde(default)]
    pub title: String,
    /// Free text sent to the agents with the title.
    #[serde(default)]
    pub description: String,
    /// Informational only.
    #[serde(default)]
    pub priority: Priority,
    /// How the agents run.
    #[serde(default)]
    pub mode: ExecutionMode,
    /// May be empty in single mode; the default provider is used.
    #[serde(default)]
    pub agents: Vec<Agent>,
    /// `None` runs the task immediately.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Schedule>,
}

impl TaskSpec {
    /// Single-mode spec with no agents or schedule.
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            ..Self::default()
        }
    }

    /// Set the execution mode.
    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Append an agent.
    pub fn with_agent(mut self, agent: Agent) -> Self {
        self.agents.push(agent);
        self
    }

    /// Set the schedule.
    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = Some(schedule);
        self
    }
}

/// A unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Assigned at creation.
    pub id: Uuid,
    /// Trimmed title.
    pub title: String,
    /// Task description.
    pub description: String,
    /// Informational priority.
    pub priority: Priority,
    /// Execution mode.
    pub mode: ExecutionMode,
    /// Agents with identifiers assigned.
    pub agents: Vec<Agent>,
    /// Schedule with `next_run` computed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Schedule>,
    /// Current lifecycle state.
    pub status: TaskStatus,
    /// When the task was created.
    pub created_at: DateTime<Utc>,
    /// Start of the latest run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// End of the latest run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Result of the latest successful run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskResult>,
    /// Error of the latest failed run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Task {
    /// Whether the schedule repeats.
    pub fn is_recurring(&self) -> bool {
        self.schedule.as_ref().is_some_and(Schedule::is_recurring)
    }

    /// Next planned run, if any.
    pub fn next_run(&self) -> Option<DateTime<Utc>> {
        self.schedule.as_ref().and_then(|s| s.next_run)
    }

    /// Title and description as one prompt block.
    pub fn prompt_text(&self) -> String {
        if self.description.trim().is_empty() {
            self.title.clone()
        } else {
            format!("{}\n\n{}", self.title, self.description)
        }
    }
}
