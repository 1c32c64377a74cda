use crate::profiles::system_prompt;
use crate::types::{Agent, AgentContribution, ExecutionMode, Task, TaskResult};
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use taskloom_core::{TaskloomError, TaskloomResult};
use taskloom_llm::{retry_with_backoff, ChatRequest, ProviderGateway, RetryPolicy};
use taskloom_retrieval::{RetrievalFusion, SearchResult, SearchSource, WebEngine};
use tracing::{info, warn};

/// Retrieval run once per task run to ground the agents' prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Enrichment {
    /// Where to search.
    pub source: SearchSource,
    /// Web engine for the web branch.
    pub engine: WebEngine,
}

/// Executes one run of a task.
///
/// Single mode sends the task text to the task's agent. Collaborative mode
/// runs the agents in pipeline order (coordinator, researcher, analyst,
/// writer, reviewer; absent roles are skipped), giving each agent the task
/// text plus every earlier contribution. Any failed call aborts the run and
/// no partial result is returned.
pub struct AgentCoordinator {
    gateway: Arc<ProviderGateway>,
    fusion: Option<Arc<RetrievalFusion>>,
    enrichment: Option<Enrichment>,
    retry: RetryPolicy,
    timeout: Option<Duration>,
}

impl AgentCoordinator {
    /// Coordinator calling providers through `gateway`, with no retries.
    pub fn new(gateway: Arc<ProviderGateway>) -> Self {
        Self {
            gateway,
            fusion: None,
            enrichment: None,
            retry: RetryPolicy::default(),
            timeout: None,
        }
    }

    /// Enrich task prompts with search results from `fusion`.
    pub fn with_enrichment(mut self, fusion: Arc<RetrievalFusion>, enrichment: Enrichment) -> Self {
        self.fusion = Some(fusion);
        self.enrichment = Some(enrichment);
        self
    }

    /// Retry transient provider failures. The default policy never retries.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Bound each agent call; `None` uses the gateway's default.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Gateway the agents call.
    pub fn gateway(&self) -> &Arc<ProviderGateway> {
        &self.gateway
    }

    /// Agents of a collaborative task in execution order.
    ///
    /// A stable sort by pipeline rank: agents sharing a role keep the order
    /// they were given in.
    pub fn pipeline(agents: &[Agent]) -> Vec<&Agent> {
        let mut ordered: Vec<&Agent> = agents.iter().collect();
        ordered.sort_by_key(|agent| agent.role.pipeline_rank());
        ordered
    }

    /// Run the task once and build its result.
    pub async fn run(&self, task: &Task) -> TaskloomResult<TaskResult> {
        let start = Instant::now();
        let (context, artifacts) = self.enrich(task).await?;
        let task_text = match context {
            Some(context) => format!("{}\n\n{}", task.prompt_text(), context),
            None => task.prompt_text(),
        };

        let mut result = match task.mode {
            ExecutionMode::Single => self.run_single(task, &task_text).await?,
            ExecutionMode::Collaborative => self.run_collaborative(task, &task_text).await?,
        };
        result.artifacts = artifacts;

        info!(
            task_id = %task.id,
            mode = ?task.mode,
            contributions = result.agent_contributions.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Coordinator: run complete"
        );
        Ok(result)
    }

    async fn run_single(&self, task: &Task, task_text: &str) -> TaskloomResult<TaskResult> {
        let agent = task.agents.first().ok_or_else(|| {
            TaskloomError::Validation(format!("task {} has no agent to run", task.id))
        })?;
        if task.agents.len() > 1 {
            warn!(
                task_id = %task.id,
                agents = task.agents.len(),
                "Single mode with several agents, only the first one runs"
            );
        }

        let contribution = self.call_agent(task, agent, task_text.to_string()).await?;
        Ok(TaskResult {
            summary: contribution.contribution.clone(),
            details: contribution.contribution.clone(),
            artifacts: Vec::new(),
            agent_contributions: vec![contribution],
        })
    }

    async fn run_collaborative(&self, task: &Task, task_text: &str) -> TaskloomResult<TaskResult> {
        let pipeline = Self::pipeline(&task.agents);
        if pipeline.is_empty() {
            return Err(TaskloomError::Validation(
                "collaborative mode requires at least one agent".into(),
            ));
        }

        let mut contributions: Vec<AgentContribution> = Vec::with_capacity(pipeline.len());
        for agent in pipeline {
            let prompt = Self::stage_prompt(task_text, &task.agents, &contributions);
            let contribution = self.call_agent(task, agent, prompt).await?;
            contributions.push(contribution);
        }

        let summary = contributions
            .last()
            .map(|c| c.contribution.clone())
            .unwrap_or_default();
        let details = Self::format_contributions(&task.agents, &contributions);

        Ok(TaskResult {
            summary,
            details,
            artifacts: Vec::new(),
            agent_contributions: contributions,
        })
    }

    /// Task text followed by all earlier contributions in pipeline order.
    fn stage_prompt(task_text: &str, agents: &[Agent], prior: &[AgentContribution]) -> String {
        if prior.is_empty() {
            return task_text.to_string();
        }
        format!(
            "{task_text}\n\nContributions from earlier agents:\n\n{}",
            Self::format_contributions(agents, prior)
        )
    }

    fn format_contributions(agents: &[Agent], contributions: &[AgentContribution]) -> String {
        contributions
            .iter()
            .map(|c| {
                let label = agents
                    .iter()
                    .find(|a| a.id == c.agent_id)
                    .map(Agent::label)
                    .unwrap_or_else(|| c.role.to_string());
                format!("## {} ({label})\n{}", c.role, c.contribution)
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    async fn call_agent(
        &self,
        task: &Task,
        agent: &Agent,
        prompt: String,
    ) -> TaskloomResult<AgentContribution> {
        let mut request = ChatRequest::new(prompt)
            .with_provider(agent.provider.clone())
            .with_system_prompt(system_prompt(agent.role));
        if !agent.model.trim().is_empty() {
            request = request.with_model(agent.model.clone());
        }
        if let Some(timeout) = self.timeout {
            request = request.with_timeout(timeout);
        }

        info!(
            task_id = %task.id,
            agent_id = %agent.id,
            role = %agent.role,
            provider = %agent.provider,
            "Coordinator: calling agent"
        );

        let label = format!("agent {}", agent.id);
        let response = retry_with_backoff(&self.retry, &label, || {
            self.gateway.complete(request.clone())
        })
        .await
        .inspect_err(|e| {
            warn!(task_id = %task.id, agent_id = %agent.id, role = %agent.role, error = %e, "Agent call failed");
        })?;

        Ok(AgentContribution {
            agent_id: agent.id.clone(),
            role: agent.role,
            contribution: response.content,
            timestamp: Utc::now(),
        })
    }

    /// Search once for the task and render the hits as prompt context.
    async fn enrich(&self, task: &Task) -> TaskloomResult<(Option<String>, Vec<String>)> {
        let (Some(fusion), Some(enrichment)) = (&self.fusion, &self.enrichment) else {
            return Ok((None, Vec::new()));
        };

        let results = fusion
            .search(&task.title, enrichment.source, enrichment.engine)
            .await?;
        if results.is_empty() {
            return Ok((None, Vec::new()));
        }

        let urls = results.iter().map(|r| r.url.clone()).collect();
        Ok((Some(render_context(&results)), urls))
    }
}

/// Number search hits for inclusion in a prompt.
pub fn render_context(results: &[SearchResult]) -> String {
    let mut out = String::from("Relevant context:\n");
    for (i, r) in results.iter().enumerate() {
        out.push_str(&format!("[{}] {} ({})\n{}\n", i + 1, r.title, r.url, r.snippet));
    }
    out
}
