//! Agent registry and turn-legality rules.
//!
//! The [`AgentManager`] is built once from the declared roster and owns every
//! [`Agent`] for the lifetime of the process. Besides lookup it holds the rules that
//! decide whether a turn may happen:
//!
//! - [`is_consecutive_response`](AgentManager::is_consecutive_response): nobody speaks
//!   twice in a row
//! - [`validate_interaction`](AgentManager::validate_interaction): a Director proposal
//!   must name a known participant role, must not ask a role to answer itself, may only
//!   respond to roles that have already spoken and must not repeat the last speaker
//!
//! and the clean-up applied to every reply before it is stored
//! ([`format_agent_response`](AgentManager::format_agent_response)).

use crate::roundtable::agent::{Agent, AgentRole, AgentSettings, AgentTurn};
use crate::roundtable::client_wrapper::ClientWrapper;
use crate::roundtable::config::{AgentConfig, RoundtableConfig};
use crate::roundtable::director::{Director, InteractionProposal, PlanParticipant};
use crate::roundtable::error::DiscussionError;
use crate::roundtable::notify::NotifyManager;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Why a Director proposal was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteractionRejection {
    /// `nextAgent` is not a participant role.
    UnknownRole(String),
    /// `nextAgent` names the Director itself.
    DirectorSelected(String),
    /// `nextAgent` appears in its own `respondTo` list.
    SelfResponse(String),
    /// `respondTo` names a role that has not spoken in this discussion.
    RespondToUnspoken(String),
    /// `nextAgent` spoke last.
    ConsecutiveTurn(String),
    /// The Director's reply held no proposal at all.
    Unparseable,
}

impl fmt::Display for InteractionRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InteractionRejection::UnknownRole(role) => write!(f, "unknown role '{}'", role),
            InteractionRejection::DirectorSelected(role) => {
                write!(f, "'{}' cannot take a discussion turn", role)
            }
            InteractionRejection::SelfResponse(role) => {
                write!(f, "'{}' cannot respond to itself", role)
            }
            InteractionRejection::RespondToUnspoken(role) => {
                write!(f, "'{}' has not spoken yet", role)
            }
            InteractionRejection::ConsecutiveTurn(role) => {
                write!(f, "'{}' spoke last and cannot go again", role)
            }
            InteractionRejection::Unparseable => write!(f, "no usable proposal"),
        }
    }
}

pub struct AgentManager {
    agents: HashMap<String, Arc<Agent>>,
    order: Vec<String>,
    prefix_patterns: HashMap<String, Regex>,
}

impl AgentManager {
    /// Register pre-built agents, in order. Duplicate ids are rejected.
    pub fn from_agents(agents: Vec<Agent>) -> Result<Self, DiscussionError> {
        let mut manager = Self {
            agents: HashMap::new(),
            order: Vec::new(),
            prefix_patterns: HashMap::new(),
        };
        for agent in agents {
            manager.register(agent)?;
        }
        Ok(manager)
    }

    /// Build the roster through the role factory keyed by `agent_type`.
    pub fn from_configs(
        configs: &[AgentConfig],
        client: Arc<dyn ClientWrapper>,
        notifier: Option<NotifyManager>,
        settings: AgentSettings,
    ) -> Result<Self, DiscussionError> {
        let agents = configs
            .iter()
            .map(|config| build_agent(config, client.clone(), notifier.clone(), settings))
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_agents(agents)
    }

    /// Director, Analyst, Critic and Expert with their default profiles.
    pub fn with_default_agents(
        client: Arc<dyn ClientWrapper>,
        notifier: Option<NotifyManager>,
    ) -> Result<Self, DiscussionError> {
        Self::from_configs(
            &RoundtableConfig::default().agents,
            client,
            notifier,
            AgentSettings::default(),
        )
    }

    fn register(&mut self, agent: Agent) -> Result<(), DiscussionError> {
        let id = agent.id().to_string();
        if id.trim().is_empty() {
            return Err(DiscussionError::Configuration(
                "agent id must not be empty".into(),
            ));
        }
        if self.agents.contains_key(&id) {
            return Err(DiscussionError::Configuration(format!(
                "duplicate agent id '{}'",
                id
            )));
        }
        let pattern = prefix_pattern(&[agent.name(), agent.role().label()])
            .map_err(|e| DiscussionError::Configuration(e.to_string()))?;
        log::debug!(
            "AgentManager::register(...): {} as {}",
            id,
            agent.role().label()
        );
        self.prefix_patterns.insert(id.clone(), pattern);
        self.order.push(id.clone());
        self.agents.insert(id, Arc::new(agent));
        Ok(())
    }

    pub fn get_agent(&self, agent_id: &str) -> Option<Arc<Agent>> {
        self.agents.get(agent_id).cloned()
    }

    /// All agents in declaration order.
    pub fn agents(&self) -> Vec<Arc<Agent>> {
        self.order
            .iter()
            .filter_map(|id| self.agents.get(id).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn director(&self) -> Result<Director, DiscussionError> {
        self.agents()
            .into_iter()
            .find(|agent| agent.role().is_director())
            .map(Director::new)
            .ok_or_else(|| DiscussionError::NotFound("director agent".into()))
    }

    /// Every agent except `exclude_id`; an empty result is an error.
    pub fn get_available_agents(
        &self,
        exclude_id: Option<&str>,
    ) -> Result<Vec<Arc<Agent>>, DiscussionError> {
        let available: Vec<Arc<Agent>> = self
            .agents()
            .into_iter()
            .filter(|agent| Some(agent.id()) != exclude_id)
            .collect();
        if available.is_empty() {
            return Err(DiscussionError::NoAgentsAvailable);
        }
        Ok(available)
    }

    pub fn agent_id_for_role(&self, role: AgentRole) -> String {
        role.default_agent_id()
    }

    /// Resolve a role by the `<role>-agent` naming convention.
    pub fn agent_for_role(&self, role: AgentRole) -> Option<Arc<Agent>> {
        self.get_agent(&self.agent_id_for_role(role))
    }

    /// Resolve a planned participant by id, falling back to the role it names.
    pub fn resolve_participant(&self, participant: &PlanParticipant) -> Option<Arc<Agent>> {
        self.get_agent(participant.agent_id.trim()).or_else(|| {
            let role = participant.role_hint()?;
            self.agent_for_role(role)
                .or_else(|| self.agents().into_iter().find(|a| a.role() == role))
        })
    }

    /// Strip an echoed `Name:` / `**Role**:` / `[Role]:` prefix from a reply.
    pub fn format_agent_response(&self, raw: &str, agent_id: &str, role: AgentRole) -> String {
        let trimmed = raw.trim();
        let stripped = match self.prefix_patterns.get(agent_id) {
            Some(pattern) => pattern.replace(trimmed, "").into_owned(),
            None => match prefix_pattern(&[role.label()]) {
                Ok(pattern) => pattern.replace(trimmed, "").into_owned(),
                Err(_) => trimmed.to_string(),
            },
        };
        let stripped = stripped.trim();
        if stripped.is_empty() {
            trimmed.to_string()
        } else {
            stripped.to_string()
        }
    }

    /// True iff the last collected response came from `candidate_id`.
    pub fn is_consecutive_response(responses: &[AgentTurn], candidate_id: &str) -> bool {
        responses
            .last()
            .map(|last| last.agent_id == candidate_id)
            .unwrap_or(false)
    }

    /// Check a Director proposal against the responses collected so far.
    pub fn validate_interaction(
        &self,
        proposal: &InteractionProposal,
        responses: &[AgentTurn],
    ) -> Result<AgentRole, InteractionRejection> {
        let requested = proposal.next_agent.trim();
        let next = match AgentRole::from_label(requested) {
            None => return Err(InteractionRejection::UnknownRole(requested.to_string())),
            Some(role) if role.is_director() => {
                return Err(InteractionRejection::DirectorSelected(requested.to_string()))
            }
            Some(role) => role,
        };

        if proposal
            .respond_to
            .iter()
            .any(|label| AgentRole::from_label(label) == Some(next))
        {
            return Err(InteractionRejection::SelfResponse(next.label().to_string()));
        }

        for label in &proposal.respond_to {
            let spoken = AgentRole::from_label(label)
                .map(|role| responses.iter().any(|r| r.role == role))
                .unwrap_or(false);
            if !spoken {
                return Err(InteractionRejection::RespondToUnspoken(
                    label.trim().to_string(),
                ));
            }
        }

        if responses.last().map(|r| r.role) == Some(next) {
            return Err(InteractionRejection::ConsecutiveTurn(
                next.label().to_string(),
            ));
        }

        Ok(next)
    }
}

fn build_agent(
    config: &AgentConfig,
    client: Arc<dyn ClientWrapper>,
    notifier: Option<NotifyManager>,
    settings: AgentSettings,
) -> Result<Agent, DiscussionError> {
    let role = AgentRole::from_label(&config.agent_type).ok_or_else(|| {
        DiscussionError::Configuration(format!(
            "unknown agent type '{}' for agent '{}'",
            config.agent_type, config.id
        ))
    })?;

    let mut agent = Agent::new(config.id.clone(), config.name.clone(), role, client)
        .with_settings(settings);
    if let Some(persona) = &config.persona {
        agent = agent.with_persona(persona.clone());
    }
    if !config.knowledge_domains.is_empty() {
        agent = agent.with_knowledge_domains(config.knowledge_domains.clone());
    }
    if let Some(notifier) = notifier {
        agent = agent.with_notifier(notifier);
    }
    Ok(agent)
}

fn prefix_pattern(names: &[&str]) -> Result<Regex, regex::Error> {
    let alternatives = names
        .iter()
        .filter(|name| !name.trim().is_empty())
        .map(|name| regex::escape(name.trim()))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(
        r"(?i)^\s*(?:\*\*|\[)?\s*(?:{})\s*(?:\*\*|\])?\s*:\s*(?:\*\*)?\s*",
        alternatives
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_pattern_matches_common_echo_styles() {
        let pattern = prefix_pattern(&["Dr. Reyes", "Expert"]).unwrap();
        for raw in [
            "Expert: ship it",
            "**Expert**: ship it",
            "**Expert:** ship it",
            "[expert]: ship it",
            "Dr. Reyes: ship it",
        ] {
            assert_eq!(pattern.replace(raw, ""), "ship it", "input: {}", raw);
        }
        assert_eq!(pattern.replace("Expertise matters", ""), "Expertise matters");
    }
}
