//! Agent System
//!
//! An [`Agent`] is one seat at the table: a fixed [`AgentRole`], a capability profile
//! (persona text and knowledge domains), a shared model client, a per-turn
//! [`AgentTurnState`] and a bounded FIFO memory of its own (prompt, response) pairs.
//!
//! Roles form a closed set. Behaviour that differs per role (prompt wording, the
//! Director's planning duties) is dispatched on the role tag rather than on distinct
//! agent types; see [`Director`](crate::director::Director) for the planning view over
//! the Director agent.
//!
//! Every model call made through an agent walks the turn state
//! `Thinking -> Generating -> Completed | Failed` and, when a
//! [`NotifyManager`](crate::notify::NotifyManager) is attached, emits one state-change
//! notification per transition.
//!
//! # Example
//!
//! ```rust,no_run
//! use roundtable::agent::{Agent, AgentRole};
//! use roundtable::clients::openai::OpenAIClient;
//! use std::sync::Arc;
//!
//! let agent = Agent::new(
//!     "analyst-agent",
//!     "Data Analyst",
//!     AgentRole::Analyst,
//!     Arc::new(OpenAIClient::new_with_model_string("key", "gpt-4.1-mini")),
//! )
//! .with_persona("Direct, numbers first.")
//! .with_knowledge_domains(vec!["capacity planning".to_string()]);
//!
//! assert!(agent.construct_system_prompt().contains("Direct, numbers first."));
//! ```

use crate::roundtable::client_wrapper::{
    ClientWrapper, Message, ModelRequest, ModelResponse, Role,
};
use crate::roundtable::conversation::{ConversationMessage, USER_AGENT_ID};
use crate::roundtable::error::DiscussionError;
use crate::roundtable::event::AgentTurnState;
use crate::roundtable::notify::NotifyManager;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};

pub const DEFAULT_MEMORY_LIMIT: usize = 50;
pub const DEFAULT_CONTEXT_WINDOW: usize = 20;

/// The closed set of seats a discussion can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentRole {
    Director,
    Analyst,
    Critic,
    Expert,
}

impl AgentRole {
    pub const ALL: [AgentRole; 4] = [
        AgentRole::Director,
        AgentRole::Analyst,
        AgentRole::Critic,
        AgentRole::Expert,
    ];

    /// Case-insensitive lookup by label (`"Critic"`) or agent type (`"critic"`).
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        AgentRole::ALL
            .iter()
            .copied()
            .find(|role| role.label().eq_ignore_ascii_case(label))
    }

    pub fn label(&self) -> &'static str {
        match self {
            AgentRole::Director => "Director",
            AgentRole::Analyst => "Analyst",
            AgentRole::Critic => "Critic",
            AgentRole::Expert => "Expert",
        }
    }

    /// Factory key used in [`AgentConfig::agent_type`](crate::config::AgentConfig).
    pub fn agent_type(&self) -> &'static str {
        match self {
            AgentRole::Director => "director",
            AgentRole::Analyst => "analyst",
            AgentRole::Critic => "critic",
            AgentRole::Expert => "expert",
        }
    }

    /// `<role>-agent`, the id under which the role's agent is registered by default.
    pub fn default_agent_id(&self) -> String {
        format!("{}-agent", self.agent_type())
    }

    pub fn is_director(&self) -> bool {
        matches!(self, AgentRole::Director)
    }

    pub fn default_persona(&self) -> &'static str {
        match self {
            AgentRole::Director => {
                "You moderate the discussion. You decide who speaks, on what, and you close with a synthesis."
            }
            AgentRole::Analyst => {
                "You break problems into parts, quantify where you can and state assumptions explicitly."
            }
            AgentRole::Critic => {
                "You look for weak assumptions, risks and missing evidence, and you propose concrete fixes."
            }
            AgentRole::Expert => {
                "You bring deep domain knowledge and practical experience, citing how things work in practice."
            }
        }
    }

    pub fn default_knowledge_domains(&self) -> Vec<String> {
        let domains: &[&str] = match self {
            AgentRole::Director => &["facilitation", "synthesis"],
            AgentRole::Analyst => &["data analysis", "systems thinking"],
            AgentRole::Critic => &["risk assessment", "logical fallacies"],
            AgentRole::Expert => &["domain practice", "implementation"],
        };
        domains.iter().map(|d| d.to_string()).collect()
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub persona: String,
    pub knowledge_domains: Vec<String>,
}

impl AgentProfile {
    pub fn for_role(role: AgentRole) -> Self {
        Self {
            persona: role.default_persona().to_string(),
            knowledge_domains: role.default_knowledge_domains(),
        }
    }
}

/// A completed, formatted turn collected during a discussion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentTurn {
    pub message_id: Option<u64>,
    pub agent_id: String,
    pub role: AgentRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// One remembered model exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryEntry {
    pub prompt: String,
    pub response: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentSettings {
    pub memory_limit: usize,
    pub context_window: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            memory_limit: DEFAULT_MEMORY_LIMIT,
            context_window: DEFAULT_CONTEXT_WINDOW,
        }
    }
}

pub struct Agent {
    id: String,
    name: String,
    role: AgentRole,
    profile: AgentProfile,
    client: Arc<dyn ClientWrapper>,
    settings: AgentSettings,
    state: Mutex<AgentTurnState>,
    memory: Mutex<VecDeque<MemoryEntry>>,
    notifier: Option<NotifyManager>,
}

impl Agent {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        role: AgentRole,
        client: Arc<dyn ClientWrapper>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role,
            profile: AgentProfile::for_role(role),
            client,
            settings: AgentSettings::default(),
            state: Mutex::new(AgentTurnState::Idle),
            memory: Mutex::new(VecDeque::new()),
            notifier: None,
        }
    }

    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.profile.persona = persona.into();
        self
    }

    pub fn with_knowledge_domains(mut self, domains: Vec<String>) -> Self {
        self.profile.knowledge_domains = domains;
        self
    }

    pub fn with_settings(mut self, settings: AgentSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_notifier(mut self, notifier: NotifyManager) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> AgentRole {
        self.role
    }

    pub fn profile(&self) -> &AgentProfile {
        &self.profile
    }

    pub fn state(&self) -> AgentTurnState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Oldest-first copy of the agent's remembered exchanges.
    pub fn memory(&self) -> Vec<MemoryEntry> {
        self.memory
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    pub fn memory_len(&self) -> usize {
        self.memory.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn construct_system_prompt(&self) -> String {
        let mut prompt = format!(
            "You are {}, the {} in a roundtable discussion between several specialists.\n{}",
            self.name,
            self.role.label(),
            self.profile.persona
        );
        if !self.profile.knowledge_domains.is_empty() {
            prompt.push_str("\nYour areas of knowledge: ");
            prompt.push_str(&self.profile.knowledge_domains.join(", "));
            prompt.push('.');
        }
        prompt.push_str(
            "\nSpeak in your own voice, build on what others said, and do not prefix your reply with your name.",
        );
        prompt
    }

    /// Normalize stored history into model context.
    ///
    /// Empty entries are dropped and only the last `context_window` messages are kept.
    /// The agent's own messages become assistant turns; everything else becomes a user
    /// turn prefixed with the speaker's label.
    pub fn validate_context(&self, context: &[ConversationMessage]) -> Vec<Message> {
        let usable: Vec<&ConversationMessage> = context
            .iter()
            .filter(|m| !m.content.trim().is_empty())
            .collect();
        let skip = usable.len().saturating_sub(self.settings.context_window);

        usable
            .into_iter()
            .skip(skip)
            .map(|m| {
                if m.agent_id == self.id {
                    Message::new(Role::Assistant, m.content.clone())
                } else {
                    let speaker = match (&m.role, m.agent_id.as_str()) {
                        (Some(role), _) => role.as_str(),
                        (None, USER_AGENT_ID) => "User",
                        (None, other) => other,
                    };
                    Message::new(Role::User, format!("[{}]: {}", speaker, m.content))
                }
            })
            .collect()
    }

    pub async fn generate_response(
        &self,
        context: &[ConversationMessage],
        prompt: &str,
    ) -> Result<String, DiscussionError> {
        let request = ModelRequest::new(
            self.role.agent_type(),
            self.construct_system_prompt(),
            prompt,
        )
        .with_context(self.validate_context(context));
        Ok(self.call_model(request).await?.content)
    }

    /// Reply to specific earlier turns with a task set by the Director.
    pub async fn respond_to_agent(
        &self,
        context: &[ConversationMessage],
        previous_turns: &[AgentTurn],
        task: &str,
    ) -> Result<String, DiscussionError> {
        let mut prompt = task.to_string();
        if !previous_turns.is_empty() {
            prompt.push_str("\n\nThe points you are responding to:");
            for turn in previous_turns {
                prompt.push_str(&format!("\n- [{}]: {}", turn.role.label(), turn.content));
            }
        }
        self.generate_response(context, &prompt).await
    }

    /// Send a request on this agent's behalf, tracking turn state and memory.
    pub(crate) async fn call_model(
        &self,
        request: ModelRequest,
    ) -> Result<ModelResponse, DiscussionError> {
        self.transition(AgentTurnState::Thinking).await;
        self.transition(AgentTurnState::Generating).await;

        match self.client.send_request(&request).await {
            Ok(response) => {
                self.remember(&request.user_prompt, &response.content);
                self.transition(AgentTurnState::Completed).await;
                Ok(response)
            }
            Err(err) => {
                let err = DiscussionError::from(err);
                log::error!("Agent::call_model(...): {} failed: {}", self.id, err);
                self.transition(AgentTurnState::Failed).await;
                Err(err)
            }
        }
    }

    fn remember(&self, prompt: &str, response: &str) {
        let mut memory = self.memory.lock().unwrap_or_else(|e| e.into_inner());
        memory.push_back(MemoryEntry {
            prompt: prompt.to_string(),
            response: response.to_string(),
            timestamp: Utc::now(),
        });
        while memory.len() > self.settings.memory_limit.max(1) {
            memory.pop_front();
        }
    }

    async fn transition(&self, state: AgentTurnState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
        if let Some(notifier) = &self.notifier {
            notifier.emit_state_change(&self.id, state).await;
        }
    }
}
