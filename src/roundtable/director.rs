//! The Director's planning duties.
//!
//! The Director is an ordinary [`Agent`] with the [`AgentRole::Director`] seat; this
//! module adds the three structured calls only it makes:
//!
//! - [`plan_initial_agent_tasks`](Director::plan_initial_agent_tasks): who answers the
//!   incoming message first, and with what task ([`Plan`])
//! - [`plan_next_agent_interaction`](Director::plan_next_agent_interaction): each
//!   collaboration round, who speaks next and to whom ([`InteractionProposal`])
//! - [`synthesize_discussion`](Director::synthesize_discussion): the closing summary
//!
//! Plans and proposals are requested as JSON. Plan entries that resolve to no available
//! agent are dropped. A plan that cannot be parsed, or that is left with no participant,
//! is replaced by [`Plan::fallback`]; an unparseable
//! proposal is reported as `Ok(None)` and left to the caller to treat as a rejection.

use crate::roundtable::agent::{Agent, AgentRole, AgentTurn};
use crate::roundtable::client_wrapper::ModelRequest;
use crate::roundtable::conversation::ConversationMessage;
use crate::roundtable::error::DiscussionError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const PLAN_INSTRUCTIONS: &str = r#"Decide which participants should respond first to the user's message and what each should focus on.
Reply with JSON of the form:
{"participants": [{"agentId": "<id>", "role": "<Role>", "task": "<what to address>"}]}
Only use participants from the roster. Do not include yourself."#;

const NEXT_INTERACTION_INSTRUCTIONS: &str = r#"Choose the next participant to move the discussion forward.
Reply with JSON of the form:
{"nextAgent": "<Role>", "respondTo": ["<Role>", ...], "task": "<what to address>"}
"respondTo" may only name roles that have already spoken. Never pick the role that spoke last, never pick yourself, and never ask a role to respond to itself."#;

const SYNTHESIS_INSTRUCTIONS: &str =
    "Summarize the discussion so far: the main positions, where participants agree, what remains open and a recommended next step.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanParticipant {
    #[serde(default)]
    pub agent_id: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub task: String,
}

impl PlanParticipant {
    fn is_usable(&self) -> bool {
        !self.task.trim().is_empty()
            && !(self.agent_id.trim().is_empty() && self.role.trim().is_empty())
    }

    /// The role this entry names, read from `role` or, failing that, from `agentId`.
    pub fn role_hint(&self) -> Option<AgentRole> {
        AgentRole::from_label(&self.role).or_else(|| AgentRole::from_label(&self.agent_id))
    }

    /// The agent in `available` this entry refers to: by id first, then by role.
    pub fn resolve<'a>(&self, available: &'a [Arc<Agent>]) -> Option<&'a Arc<Agent>> {
        let id = self.agent_id.trim();
        available.iter().find(|a| a.id() == id).or_else(|| {
            let role = self.role_hint()?;
            available.iter().find(|a| a.role() == role)
        })
    }
}

/// Ordered assignments for the response phase. Never empty once returned by the Director.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub participants: Vec<PlanParticipant>,
}

impl Plan {
    /// Single-participant plan giving the first available agent a generic analysis task.
    pub fn fallback(available: &[Arc<Agent>], message: &str) -> Option<Plan> {
        let first = available.first()?;
        Some(Plan {
            participants: vec![PlanParticipant {
                agent_id: first.id().to_string(),
                role: first.role().label().to_string(),
                task: format!(
                    "Analyze the following message and share your perspective: {}",
                    message
                ),
            }],
        })
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}

/// The Director's choice for one collaboration round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionProposal {
    pub next_agent: String,
    #[serde(default)]
    pub respond_to: Vec<String>,
    #[serde(default)]
    pub task: String,
}

pub struct Director {
    agent: Arc<Agent>,
}

impl Director {
    pub fn new(agent: Arc<Agent>) -> Self {
        Self { agent }
    }

    pub fn agent(&self) -> &Arc<Agent> {
        &self.agent
    }

    pub fn id(&self) -> &str {
        self.agent.id()
    }

    pub async fn plan_initial_agent_tasks(
        &self,
        message: &str,
        available: &[Arc<Agent>],
    ) -> Result<Plan, DiscussionError> {
        if available.is_empty() {
            return Err(DiscussionError::NoAgentsAvailable);
        }

        let roster = available
            .iter()
            .map(|a| {
                format!(
                    "- {} ({}): {}",
                    a.id(),
                    a.role().label(),
                    a.profile().persona
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        let request = ModelRequest::new(
            AgentRole::Director.agent_type(),
            format!(
                "{}\n\n{}",
                self.agent.construct_system_prompt(),
                PLAN_INSTRUCTIONS
            ),
            format!("Roster:\n{}\n\nUser message:\n{}", roster, message),
        )
        .with_json_response();

        let response = self.agent.call_model(request).await?;
        let parsed = response.parse_json::<Plan>().map(|mut plan| {
            plan.participants
                .retain(|p| p.is_usable() && p.resolve(available).is_some());
            plan
        });

        match parsed {
            Ok(plan) if !plan.is_empty() => {
                log::debug!(
                    "Director::plan_initial_agent_tasks(...): {} participant(s) planned",
                    plan.len()
                );
                Ok(plan)
            }
            outcome => {
                if let Err(err) = &outcome {
                    log::warn!(
                        "Director::plan_initial_agent_tasks(...): unparseable plan, using fallback: {}",
                        err
                    );
                } else {
                    log::warn!(
                        "Director::plan_initial_agent_tasks(...): plan has no usable participants, using fallback"
                    );
                }
                Plan::fallback(available, message).ok_or(DiscussionError::NoAgentsAvailable)
            }
        }
    }

    /// Ask who should speak next. `Ok(None)` means the reply held no usable proposal.
    pub async fn plan_next_agent_interaction(
        &self,
        messages: &[ConversationMessage],
        responses: &[AgentTurn],
    ) -> Result<Option<InteractionProposal>, DiscussionError> {
        let spoken: Vec<&str> = responses.iter().map(|r| r.role.label()).collect();
        let last = responses
            .last()
            .map(|r| r.role.label())
            .unwrap_or("nobody");
        let request = ModelRequest::new(
            AgentRole::Director.agent_type(),
            format!(
                "{}\n\n{}",
                self.agent.construct_system_prompt(),
                NEXT_INTERACTION_INSTRUCTIONS
            ),
            format!(
                "Roles that have spoken: {}.\nLast speaker: {}.\nWho should speak next?",
                spoken.join(", "),
                last
            ),
        )
        .with_context(self.agent.validate_context(messages))
        .with_json_response();

        let response = self.agent.call_model(request).await?;
        match response.parse_json::<InteractionProposal>() {
            Ok(proposal) => Ok(Some(proposal)),
            Err(err) => {
                log::warn!(
                    "Director::plan_next_agent_interaction(...): unparseable proposal: {}",
                    err
                );
                Ok(None)
            }
        }
    }

    pub async fn synthesize_discussion(
        &self,
        messages: &[ConversationMessage],
    ) -> Result<String, DiscussionError> {
        self.agent
            .generate_response(messages, SYNTHESIS_INSTRUCTIONS)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_tolerates_missing_fields() {
        let plan: Plan = serde_json::from_str(
            r#"{"participants": [{"role": "Critic", "task": "poke holes"}, {"agentId": "x"}]}"#,
        )
        .unwrap();
        assert_eq!(plan.participants[0].agent_id, "");
        assert!(plan.participants[0].is_usable());
        assert!(!plan.participants[1].is_usable());
    }

    #[test]
    fn proposal_uses_camel_case_keys() {
        let proposal: InteractionProposal = serde_json::from_str(
            r#"{"nextAgent": "Expert", "respondTo": ["Critic"], "task": "ground it"}"#,
        )
        .unwrap();
        assert_eq!(proposal.next_agent, "Expert");
        assert_eq!(proposal.respond_to, vec!["Critic"]);
    }
}
