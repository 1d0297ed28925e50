//! The discussion state machine.
//!
//! A [`Coordinator`] runs one discussion at a time through four phases:
//!
//! ```text
//! IDLE ──> PLANNING ──> RESPONSE ──> COLLABORATION ─┐ ──> SUMMARY ──> IDLE
//!                                         ^          │
//!                                         └──────────┘  (until the quality gate,
//!                                                        a rejected proposal, a failed
//!                                                        turn or a cancel ends it)
//! ```
//!
//! - **Planning**: log the user message, find the Director and the available agents,
//!   ask the Director for a [`Plan`] and announce each assignment.
//! - **Response**: planned participants answer in order. A participant that cannot be
//!   resolved or whose call fails is skipped; the others still run.
//! - **Collaboration**: each round checks for cancellation, advances the round counter,
//!   consults the [`QualityGate`], asks the Director for the next speaker, validates the
//!   proposal and runs the turn. Any failure here ends the loop, since later turns build
//!   on earlier ones.
//! - **Summary**: when more than one round ran and nobody cancelled, the Director
//!   synthesizes the discussion. Otherwise the summary is `None`.
//!
//! Errors before the first agent speaks (empty message, a discussion already running,
//! no Director, no available agents, a failed planning call) are returned as `Err`.
//! Past that point the coordinator always returns a [`DiscussionOutcome`].
//!
//! # Example
//!
//! ```rust,no_run
//! use roundtable::clients::openai::OpenAIClient;
//! use roundtable::config::RoundtableConfig;
//! use roundtable::coordinator::Coordinator;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), roundtable::error::DiscussionError> {
//! let client = Arc::new(OpenAIClient::new_with_model_string("key", "gpt-4.1-mini"));
//! let coordinator = Coordinator::from_config(&RoundtableConfig::from_env()?, client)?;
//!
//! let _listener = coordinator
//!     .notify_manager()
//!     .on_response(|r| println!("[{}] {}", r.role, r.content));
//!
//! let outcome = coordinator
//!     .coordinate_discussion("c1", "Should we move the queue to Kafka?")
//!     .await?;
//! println!("summary: {:?}", outcome.result().summary);
//! # Ok(())
//! # }
//! ```

use crate::roundtable::agent::{Agent, AgentRole, AgentSettings, AgentTurn};
use crate::roundtable::agent_manager::{AgentManager, InteractionRejection};
use crate::roundtable::client_wrapper::ClientWrapper;
use crate::roundtable::config::RoundtableConfig;
use crate::roundtable::conversation::{
    Conversation, ConversationManager, ConversationMessage, ConversationStats, NewMessage,
};
use crate::roundtable::director::{Director, Plan, PlanParticipant};
use crate::roundtable::error::DiscussionError;
use crate::roundtable::event::{ResponseKind, ResponseNotification};
use crate::roundtable::notify::NotifyManager;
use crate::roundtable::quality_gate::{
    QualityAnalyzer, QualityGate, StaticQualityAnalyzer, StopReason,
};
use crate::roundtable::rate_limiter::RateLimiter;
use crate::roundtable::retry::RetryingClient;
use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Role label attached to the Director's closing synthesis.
pub const SUMMARY_ROLE: &str = "Summary";

#[derive(Debug, Clone, PartialEq)]
pub struct IncomingMessage {
    pub content: String,
}

impl IncomingMessage {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

impl From<&str> for IncomingMessage {
    fn from(content: &str) -> Self {
        Self::new(content)
    }
}

impl From<String> for IncomingMessage {
    fn from(content: String) -> Self {
        Self::new(content)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscussionResult {
    pub discussion_id: Uuid,
    pub conversation_id: String,
    pub plan: Vec<PlanParticipant>,
    /// Completed turns in speaking order; no two neighbours share an agent.
    pub responses: Vec<AgentTurn>,
    pub summary: Option<String>,
    /// Collaboration rounds started, including the one that ended the loop.
    pub rounds: usize,
    /// Set when the quality gate ended the loop.
    pub stop_reason: Option<StopReason>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", content = "result", rename_all = "snake_case")]
pub enum DiscussionOutcome {
    Completed(DiscussionResult),
    /// The summary could not be produced; responses are intact.
    Degraded(DiscussionResult),
    Cancelled(DiscussionResult),
}

impl DiscussionOutcome {
    pub fn result(&self) -> &DiscussionResult {
        match self {
            DiscussionOutcome::Completed(result)
            | DiscussionOutcome::Degraded(result)
            | DiscussionOutcome::Cancelled(result) => result,
        }
    }

    pub fn into_result(self) -> DiscussionResult {
        match self {
            DiscussionOutcome::Completed(result)
            | DiscussionOutcome::Degraded(result)
            | DiscussionOutcome::Cancelled(result) => result,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, DiscussionOutcome::Completed(_))
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, DiscussionOutcome::Degraded(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, DiscussionOutcome::Cancelled(_))
    }
}

pub struct Coordinator {
    agent_manager: AgentManager,
    conversations: tokio::sync::Mutex<ConversationManager>,
    quality_gate: QualityGate,
    notifier: NotifyManager,
    processing: AtomicBool,
    cancel_token: Mutex<Option<CancellationToken>>,
}

/// Clears the processing flag and the live token when a discussion ends, however it ends.
struct ProcessingGuard<'a> {
    coordinator: &'a Coordinator,
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        *self.coordinator.token_slot() = None;
        self.coordinator.processing.store(false, Ordering::SeqCst);
    }
}

impl Coordinator {
    pub fn new(
        agent_manager: AgentManager,
        conversations: ConversationManager,
        quality_gate: QualityGate,
        notifier: NotifyManager,
    ) -> Self {
        Self {
            agent_manager,
            conversations: tokio::sync::Mutex::new(conversations),
            quality_gate,
            notifier,
            processing: AtomicBool::new(false),
            cancel_token: Mutex::new(None),
        }
    }

    /// Wire a coordinator from configuration.
    ///
    /// `client` is wrapped in a [`RetryingClient`] sharing one [`RateLimiter`], and every
    /// declared agent talks through that wrapper.
    pub fn from_config(
        config: &RoundtableConfig,
        client: Arc<dyn ClientWrapper>,
    ) -> Result<Self, DiscussionError> {
        let max_message_age = config.max_message_age()?;
        let notifier = NotifyManager::new();
        let limiter = Arc::new(RateLimiter::new(
            config.rate_limit.limit,
            config.rate_limit.interval(),
        ));
        let client: Arc<dyn ClientWrapper> = Arc::new(
            RetryingClient::new(client)
                .with_max_retries(config.retry.max_retries)
                .with_base_delay(config.retry.base_delay())
                .with_rate_limiter(limiter),
        );
        let agent_manager = AgentManager::from_configs(
            &config.agents,
            client,
            Some(notifier.clone()),
            AgentSettings {
                memory_limit: config.agent_memory_limit,
                context_window: config.context_window,
            },
        )?;

        Ok(Self::new(
            agent_manager,
            ConversationManager::new(max_message_age, config.max_conversations),
            QualityGate::new(config.max_rounds, Arc::new(StaticQualityAnalyzer::default())),
            notifier,
        ))
    }

    /// Replace the analyzer behind the quality gate, keeping the round limit.
    pub fn with_quality_analyzer(mut self, analyzer: Arc<dyn QualityAnalyzer>) -> Self {
        self.quality_gate = QualityGate::new(self.quality_gate.max_rounds(), analyzer);
        self
    }

    pub fn notify_manager(&self) -> &NotifyManager {
        &self.notifier
    }

    pub fn agent_manager(&self) -> &AgentManager {
        &self.agent_manager
    }

    pub fn quality_gate(&self) -> &QualityGate {
        &self.quality_gate
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }

    /// Ask the running discussion to stop at its next round boundary.
    ///
    /// Returns `false` when nothing is running or a cancel was already requested.
    pub fn cancel_current_process(&self) -> bool {
        match self.token_slot().as_ref() {
            Some(token) if !token.is_cancelled() => {
                log::info!("Coordinator::cancel_current_process(...): cancellation requested");
                token.cancel();
                true
            }
            _ => false,
        }
    }

    pub async fn conversation(&self, conversation_id: &str) -> Option<Conversation> {
        self.conversations
            .lock()
            .await
            .get_conversation(conversation_id)
            .cloned()
    }

    pub async fn conversation_stats(&self, conversation_id: &str) -> Option<ConversationStats> {
        self.conversations
            .lock()
            .await
            .get_conversation_stats(conversation_id)
    }

    pub async fn coordinate_discussion(
        &self,
        conversation_id: &str,
        message: impl Into<IncomingMessage>,
    ) -> Result<DiscussionOutcome, DiscussionError> {
        let message = message.into();
        if conversation_id.trim().is_empty() {
            return Err(DiscussionError::Validation(
                "conversation id must not be empty".into(),
            ));
        }
        if message.content.trim().is_empty() {
            return Err(DiscussionError::Validation(
                "message content must not be empty".into(),
            ));
        }
        if self
            .processing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(DiscussionError::AlreadyProcessing);
        }
        let _guard = ProcessingGuard { coordinator: self };
        let token = CancellationToken::new();
        *self.token_slot() = Some(token.clone());

        let discussion_id = Uuid::new_v4();
        log::info!(
            "Coordinator::coordinate_discussion(...): discussion {} on conversation '{}'",
            discussion_id,
            conversation_id
        );

        // Planning
        self.conversations
            .lock()
            .await
            .log_message(conversation_id, NewMessage::user(message.content.clone()))?;
        let director = self.agent_manager.director()?;
        let available = self
            .agent_manager
            .get_available_agents(Some(director.id()))?;
        let plan = director
            .plan_initial_agent_tasks(&message.content, &available)
            .await
            .map_err(|err| match err {
                DiscussionError::NoAgentsAvailable => err,
                other => DiscussionError::Planning(other.to_string()),
            })?;
        self.announce_assignments(conversation_id, &director, &plan)
            .await;

        let mut result = DiscussionResult {
            discussion_id,
            conversation_id: conversation_id.to_string(),
            plan: plan.participants.clone(),
            responses: Vec::new(),
            summary: None,
            rounds: 0,
            stop_reason: None,
        };

        self.run_response_phase(conversation_id, &plan, &mut result.responses)
            .await;

        let mut cancel_announced = self
            .run_collaboration_phase(conversation_id, &director, &token, &mut result)
            .await;

        let mut degraded = false;
        if !cancel_announced && result.rounds > 1 {
            match self.summarize(conversation_id, &director).await {
                Ok(summary) => result.summary = Some(summary),
                Err(err) => {
                    log::error!(
                        "Coordinator::coordinate_discussion(...): summary failed: {}",
                        err
                    );
                    self.notifier
                        .emit_error(Some(director.id()), format!("Summary failed: {}", err))
                        .await;
                    degraded = true;
                }
            }
        }

        if token.is_cancelled() && !cancel_announced {
            self.notifier.emit_cancellation(conversation_id).await;
            cancel_announced = true;
        }

        log::info!(
            "Coordinator::coordinate_discussion(...): discussion {} finished after {} round(s) with {} response(s)",
            discussion_id,
            result.rounds,
            result.responses.len()
        );

        Ok(if cancel_announced {
            DiscussionOutcome::Cancelled(result)
        } else if degraded {
            DiscussionOutcome::Degraded(result)
        } else {
            DiscussionOutcome::Completed(result)
        })
    }

    async fn announce_assignments(&self, conversation_id: &str, director: &Director, plan: &Plan) {
        for participant in &plan.participants {
            let target = if participant.role.trim().is_empty() {
                participant.agent_id.as_str()
            } else {
                participant.role.as_str()
            };
            self.notifier
                .emit_response(ResponseNotification {
                    conversation_id: conversation_id.to_string(),
                    message_id: None,
                    agent_id: director.id().to_string(),
                    role: AgentRole::Director.label().to_string(),
                    content: format!("Assigning {}: {}", target, participant.task),
                    kind: ResponseKind::Assignment,
                    timestamp: Utc::now(),
                })
                .await;
        }
    }

    async fn run_response_phase(
        &self,
        conversation_id: &str,
        plan: &Plan,
        responses: &mut Vec<AgentTurn>,
    ) {
        for participant in &plan.participants {
            let agent = match self.agent_manager.resolve_participant(participant) {
                Some(agent) if !agent.role().is_director() => agent,
                Some(_) => {
                    log::warn!(
                        "Coordinator::run_response_phase(...): skipping planned turn for the Director"
                    );
                    continue;
                }
                None => {
                    log::warn!(
                        "Coordinator::run_response_phase(...): no agent for participant '{}' ({}), skipping",
                        participant.agent_id,
                        participant.role
                    );
                    continue;
                }
            };
            if AgentManager::is_consecutive_response(responses, agent.id()) {
                log::warn!(
                    "Coordinator::run_response_phase(...): {} already spoke last, skipping",
                    agent.id()
                );
                continue;
            }

            let messages = self.messages(conversation_id).await;
            let outcome = match agent.generate_response(&messages, &participant.task).await {
                Ok(raw) => self.record_turn(conversation_id, &agent, &raw).await,
                Err(err) => Err(err),
            };
            match outcome {
                Ok(turn) => responses.push(turn),
                Err(err) => {
                    log::warn!(
                        "Coordinator::run_response_phase(...): {} failed, continuing: {}",
                        agent.id(),
                        err
                    );
                    self.notifier
                        .emit_error(Some(agent.id()), err.to_string())
                        .await;
                }
            }
        }
    }

    /// Returns true when the loop ended on a cancel request (and announced it).
    async fn run_collaboration_phase(
        &self,
        conversation_id: &str,
        director: &Director,
        token: &CancellationToken,
        result: &mut DiscussionResult,
    ) -> bool {
        self.quality_gate.reset_round_counter();

        loop {
            if token.is_cancelled() {
                log::info!(
                    "Coordinator::run_collaboration_phase(...): cancelled before round {}",
                    self.quality_gate.current_round() + 1
                );
                result.rounds = self.quality_gate.current_round();
                self.notifier.emit_cancellation(conversation_id).await;
                return true;
            }

            let round = self.quality_gate.increment_round();
            result.rounds = round;
            let messages = self.messages(conversation_id).await;

            let decision = self
                .quality_gate
                .perform_quality_check(&messages, &result.responses)
                .await;
            if !decision.should_continue {
                log::info!(
                    "Coordinator::run_collaboration_phase(...): stopping at round {}: {:?}",
                    round,
                    decision.reason
                );
                result.stop_reason = decision.reason;
                return false;
            }

            let proposal = match director
                .plan_next_agent_interaction(&messages, &result.responses)
                .await
            {
                Ok(Some(proposal)) => proposal,
                Ok(None) => {
                    log::warn!(
                        "Coordinator::run_collaboration_phase(...): proposal rejected: {}",
                        InteractionRejection::Unparseable
                    );
                    return false;
                }
                Err(err) => {
                    log::error!(
                        "Coordinator::run_collaboration_phase(...): director failed in round {}: {}",
                        round,
                        err
                    );
                    self.notifier
                        .emit_error(Some(director.id()), err.to_string())
                        .await;
                    return false;
                }
            };

            let role = match self
                .agent_manager
                .validate_interaction(&proposal, &result.responses)
            {
                Ok(role) => role,
                Err(rejection) => {
                    log::warn!(
                        "Coordinator::run_collaboration_phase(...): proposal rejected: {}",
                        rejection
                    );
                    return false;
                }
            };

            let agent = match self.agent_manager.agent_for_role(role) {
                Some(agent) => agent,
                None => {
                    let message = format!(
                        "no agent registered as '{}'",
                        self.agent_manager.agent_id_for_role(role)
                    );
                    log::error!("Coordinator::run_collaboration_phase(...): {}", message);
                    self.notifier.emit_error(None, message).await;
                    return false;
                }
            };
            if AgentManager::is_consecutive_response(&result.responses, agent.id()) {
                log::warn!(
                    "Coordinator::run_collaboration_phase(...): {} spoke last, ending collaboration",
                    agent.id()
                );
                return false;
            }

            let previous = previous_turns(&proposal.respond_to, &result.responses);
            let task = compose_task(&proposal.respond_to, &proposal.task);
            let outcome = match agent.respond_to_agent(&messages, &previous, &task).await {
                Ok(raw) => self.record_turn(conversation_id, &agent, &raw).await,
                Err(err) => Err(err),
            };
            match outcome {
                Ok(turn) => result.responses.push(turn),
                Err(err) => {
                    log::error!(
                        "Coordinator::run_collaboration_phase(...): {} failed in round {}, ending collaboration: {}",
                        agent.id(),
                        round,
                        err
                    );
                    self.notifier
                        .emit_error(Some(agent.id()), err.to_string())
                        .await;
                    return false;
                }
            }
        }
    }

    async fn summarize(
        &self,
        conversation_id: &str,
        director: &Director,
    ) -> Result<String, DiscussionError> {
        let messages = self.messages(conversation_id).await;
        let raw = director.synthesize_discussion(&messages).await?;
        let content =
            self.agent_manager
                .format_agent_response(&raw, director.id(), AgentRole::Director);

        let stored = self.conversations.lock().await.log_message(
            conversation_id,
            NewMessage::from_agent(director.id(), SUMMARY_ROLE, content.clone()),
        )?;
        self.notifier
            .emit_response(ResponseNotification {
                conversation_id: conversation_id.to_string(),
                message_id: Some(stored.id),
                agent_id: director.id().to_string(),
                role: SUMMARY_ROLE.to_string(),
                content: content.clone(),
                kind: ResponseKind::Summary,
                timestamp: stored.timestamp,
            })
            .await;
        Ok(content)
    }

    /// Format, log and announce one turn.
    async fn record_turn(
        &self,
        conversation_id: &str,
        agent: &Agent,
        raw: &str,
    ) -> Result<AgentTurn, DiscussionError> {
        let content = self
            .agent_manager
            .format_agent_response(raw, agent.id(), agent.role());
        let stored = self.conversations.lock().await.log_message(
            conversation_id,
            NewMessage::from_agent(agent.id(), agent.role().label(), content.clone()),
        )?;

        self.notifier
            .emit_response(ResponseNotification {
                conversation_id: conversation_id.to_string(),
                message_id: Some(stored.id),
                agent_id: agent.id().to_string(),
                role: agent.role().label().to_string(),
                content: content.clone(),
                kind: ResponseKind::Turn,
                timestamp: stored.timestamp,
            })
            .await;

        Ok(AgentTurn {
            message_id: Some(stored.id),
            agent_id: agent.id().to_string(),
            role: agent.role(),
            content,
            timestamp: stored.timestamp,
        })
    }

    async fn messages(&self, conversation_id: &str) -> Vec<ConversationMessage> {
        self.conversations.lock().await.messages(conversation_id)
    }

    fn token_slot(&self) -> std::sync::MutexGuard<'_, Option<CancellationToken>> {
        self.cancel_token.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// The most recent turn of each role named in `respond_to`.
fn previous_turns(respond_to: &[String], responses: &[AgentTurn]) -> Vec<AgentTurn> {
    respond_to
        .iter()
        .filter_map(|label| AgentRole::from_label(label))
        .filter_map(|role| responses.iter().rev().find(|r| r.role == role).cloned())
        .collect()
}

/// `"Respond to Critic and Expert's points: <task>"`.
fn compose_task(respond_to: &[String], task: &str) -> String {
    let task = if task.trim().is_empty() {
        "Continue the discussion with your perspective."
    } else {
        task.trim()
    };
    let names: Vec<&str> = respond_to
        .iter()
        .map(|label| {
            AgentRole::from_label(label)
                .map(|role| role.label())
                .unwrap_or_else(|| label.trim())
        })
        .collect();

    match names.split_last() {
        None => task.to_string(),
        Some((last, [])) => format!("Respond to {}'s points: {}", last, task),
        Some((last, rest)) => format!(
            "Respond to {} and {}'s points: {}",
            rest.join(", "),
            last,
            task
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composed_task_names_every_addressee() {
        let labels = |xs: &[&str]| xs.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(compose_task(&[], "dig in"), "dig in");
        assert_eq!(
            compose_task(&labels(&["critic"]), "dig in"),
            "Respond to Critic's points: dig in"
        );
        assert_eq!(
            compose_task(&labels(&["Analyst", "Critic", "expert"]), "dig in"),
            "Respond to Analyst, Critic and Expert's points: dig in"
        );
    }
}
