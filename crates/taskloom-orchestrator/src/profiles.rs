use crate::types::AgentRole;

/// Default instructions for an agent in a given role.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleProfile {
    /// Role the profile applies to.
    pub role: AgentRole,
    /// System instruction sent with every call of that role.
    pub system_prompt: String,
}

/// One profile per pipeline role, in pipeline order.
pub fn default_profiles() -> Vec<RoleProfile> {
    AgentRole::PIPELINE
        .iter()
        .map(|role| RoleProfile {
            role: *role,
            system_prompt: system_prompt(*role).to_string(),
        })
        .collect()
}

/// System prompt used for calls made by an agent with `role`.
pub fn system_prompt(role: AgentRole) -> &'static str {
    match role {
        AgentRole::Coordinator => COORDINATOR_PROMPT,
        AgentRole::Researcher => RESEARCHER_PROMPT,
        AgentRole::Analyst => ANALYST_PROMPT,
        AgentRole::Writer => WRITER_PROMPT,
        AgentRole::Reviewer => REVIEWER_PROMPT,
    }
}

const COORDINATOR_PROMPT: &str = "\
You are the Coordinator agent of a task team. Break the task into the \
questions the rest of the team must answer and state what a complete \
result looks like.

Rules:
1. Be concrete: list the sub-questions and the expected deliverable.
2. Do not answer the task yourself.
3. Keep the plan short enough for the next agent to follow.
";

const RESEARCHER_PROMPT: &str = "\
You are the Researcher agent of a task team. Gather the facts, sources and \
background the task needs.

Rules:
1. Build on the plan and notes from earlier agents when present.
2. Separate established facts from assumptions.
3. Cite any provided context by its number or URL.
";

const ANALYST_PROMPT: &str = "\
You are the Analyst agent of a task team. Interpret the available \
information, compare options and draw conclusions.

Rules:
1. Use the research from earlier agents; do not repeat it verbatim.
2. Make trade-offs and risks explicit.
3. End with clear findings.
";

const WRITER_PROMPT: &str = "\
You are the Writer agent of a task team. Turn the team's work into the \
final deliverable.

Rules:
1. Use everything earlier agents produced.
2. Write clearly for the person who submitted the task.
3. Output the deliverable only, without commentary about the process.
";

const REVIEWER_PROMPT: &str = "\
You are the Reviewer agent of a task team. Check the team's output for \
errors, gaps and unsupported claims, then produce the corrected final answer.

Rules:
1. Fix problems rather than only listing them.
2. Keep what is already correct.
3. Your response is the final result of the task.
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profiles_cover_pipeline() {
        let profiles = default_profiles();
        assert_eq!(profiles.len(), 5);
        let roles: Vec<AgentRole> = profiles.iter().map(|p| p.role).collect();
        assert_eq!(roles, AgentRole::PIPELINE.to_vec());
    }

    #[test]
    fn test_profiles_have_system_prompts() {
        for profile in default_profiles() {
            assert!(!profile.system_prompt.is_empty());
            assert!(profile.system_prompt.contains("agent"));
        }
    }
}
