//! Task lifecycle and multi-agent coordination for taskloom.
//!
//! A [`TaskManager`] owns every task and drives it through
//! `pending|scheduled -> running -> completed|failed`. Each run is handed to
//! the [`AgentCoordinator`], which sends the task to one agent or through a
//! fixed role pipeline, with every call going through the provider gateway.
//! The [`Scheduler`] starts scheduled tasks when they come due.
//!
//! # Main types
//!
//! - [`TaskManager`]: Task registry, state machine and run bookkeeping.
//! - [`AgentCoordinator`]: Executes one run in single or collaborative mode.
//! - [`Scheduler`]: Background loop triggering due tasks.
//! - [`TaskStore`]: Persistence contract, with in-memory and JSON-file stores.
//! - [`Assistant`]: Retrieval-augmented chat.

/// Retrieval-augmented chat.
pub mod assistant;
/// Single and collaborative run execution.
pub mod coordinator;
/// Task registry and lifecycle state machine.
pub mod manager;
/// Default system prompts per agent role.
pub mod profiles;
/// Recurrence arithmetic.
pub mod schedule;
/// Background trigger loop.
pub mod scheduler;
/// Task persistence.
pub mod store;
/// Task, agent, schedule and result types.
pub mod types;

pub use assistant::{Assistant, ChatReply};
pub use coordinator::{render_context, AgentCoordinator, Enrichment};
pub use manager::{validate_spec, RunHandle, TaskManager};
pub use profiles::{default_profiles, system_prompt, RoleProfile};
pub use schedule::{next_after, parse_cron};
pub use scheduler::{Scheduler, DEFAULT_TICK};
pub use store::{FileTaskStore, InMemoryTaskStore, TaskStore};
pub use types::{
    Agent, AgentContribution, AgentRole, ExecutionMode, Priority, Recurrence, Schedule, Task,
    TaskResult, TaskSpec, TaskStatus,
};
