//! Continuation policy for the collaboration loop.
//!
//! The [`QualityGate`] owns the discussion-scoped round counter and, once per round,
//! decides whether the discussion goes on. The decision is taken in a fixed order:
//!
//! 1. `current_round > max_rounds` stops with [`StopReason::MaxRoundsReached`] before
//!    any analysis runs
//! 2. otherwise a pluggable [`QualityAnalyzer`] scores the discussion
//! 3. `topic_drift > 0.3` stops with [`StopReason::TopicDrift`]
//! 4. `consensus_reached` stops with [`StopReason::ConsensusReached`]
//! 5. anything else continues, carrying the metrics
//!
//! # Example
//!
//! ```rust
//! use roundtable::quality_gate::{QualityGate, StaticQualityAnalyzer, StopReason};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let gate = QualityGate::new(1, Arc::new(StaticQualityAnalyzer::default()));
//! gate.reset_round_counter();
//!
//! gate.increment_round();
//! assert!(gate.perform_quality_check(&[], &[]).await.should_continue);
//!
//! gate.increment_round();
//! let decision = gate.perform_quality_check(&[], &[]).await;
//! assert_eq!(decision.reason, Some(StopReason::MaxRoundsReached));
//! # }
//! ```

use crate::roundtable::agent::AgentTurn;
use crate::roundtable::client_wrapper::{ClientWrapper, ModelRequest};
use crate::roundtable::conversation::ConversationMessage;
use crate::roundtable::error::ClientError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Drift above this stops the discussion.
pub const TOPIC_DRIFT_THRESHOLD: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StopReason {
    MaxRoundsReached,
    TopicDrift,
    ConsensusReached,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityMetrics {
    pub topic_relevance: f64,
    pub topic_drift: f64,
    pub consensus_reached: bool,
    pub response_coherence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityDecision {
    pub should_continue: bool,
    pub reason: Option<StopReason>,
    pub metrics: Option<QualityMetrics>,
}

impl QualityDecision {
    fn stop(reason: StopReason, metrics: Option<QualityMetrics>) -> Self {
        Self {
            should_continue: false,
            reason: Some(reason),
            metrics,
        }
    }

    fn proceed(metrics: Option<QualityMetrics>) -> Self {
        Self {
            should_continue: true,
            reason: None,
            metrics,
        }
    }
}

/// Scores a discussion in progress.
#[async_trait]
pub trait QualityAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        messages: &[ConversationMessage],
        responses: &[AgentTurn],
    ) -> Result<QualityMetrics, ClientError>;
}

/// Returns the same metrics every time.
pub struct StaticQualityAnalyzer {
    metrics: QualityMetrics,
}

impl StaticQualityAnalyzer {
    pub fn new(metrics: QualityMetrics) -> Self {
        Self { metrics }
    }
}

impl Default for StaticQualityAnalyzer {
    fn default() -> Self {
        Self::new(QualityMetrics {
            topic_relevance: 0.9,
            topic_drift: 0.1,
            consensus_reached: false,
            response_coherence: 0.9,
        })
    }
}

#[async_trait]
impl QualityAnalyzer for StaticQualityAnalyzer {
    async fn analyze(
        &self,
        _messages: &[ConversationMessage],
        _responses: &[AgentTurn],
    ) -> Result<QualityMetrics, ClientError> {
        Ok(self.metrics.clone())
    }
}

const ANALYSIS_PROMPT: &str = r#"You evaluate the quality of a multi-agent discussion.
Score the transcript and reply with JSON of the form:
{"topicRelevance": 0.0-1.0, "topicDrift": 0.0-1.0, "consensusReached": true|false, "responseCoherence": 0.0-1.0}"#;

/// Asks a model to score the transcript.
pub struct ModelQualityAnalyzer {
    client: Arc<dyn ClientWrapper>,
}

impl ModelQualityAnalyzer {
    pub fn new(client: Arc<dyn ClientWrapper>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl QualityAnalyzer for ModelQualityAnalyzer {
    async fn analyze(
        &self,
        messages: &[ConversationMessage],
        _responses: &[AgentTurn],
    ) -> Result<QualityMetrics, ClientError> {
        let transcript = messages
            .iter()
            .map(|m| format!("[{}]: {}", m.role.as_deref().unwrap_or(&m.agent_id), m.content))
            .collect::<Vec<_>>()
            .join("\n");
        let request =
            ModelRequest::new("quality", ANALYSIS_PROMPT, transcript).with_json_response();
        self.client.send_request(&request).await?.parse_json()
    }
}

pub struct QualityGate {
    current_round: AtomicUsize,
    max_rounds: usize,
    analyzer: Arc<dyn QualityAnalyzer>,
}

impl QualityGate {
    pub fn new(max_rounds: usize, analyzer: Arc<dyn QualityAnalyzer>) -> Self {
        Self {
            current_round: AtomicUsize::new(0),
            max_rounds,
            analyzer,
        }
    }

    pub fn reset_round_counter(&self) {
        self.current_round.store(0, Ordering::SeqCst);
    }

    /// Advance to the next round and return its number.
    pub fn increment_round(&self) -> usize {
        self.current_round.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current_round(&self) -> usize {
        self.current_round.load(Ordering::SeqCst)
    }

    pub fn max_rounds(&self) -> usize {
        self.max_rounds
    }

    pub async fn perform_quality_check(
        &self,
        messages: &[ConversationMessage],
        responses: &[AgentTurn],
    ) -> QualityDecision {
        let round = self.current_round();
        if round > self.max_rounds {
            log::info!(
                "QualityGate::perform_quality_check(...): round {} exceeds limit of {}",
                round,
                self.max_rounds
            );
            return QualityDecision::stop(StopReason::MaxRoundsReached, None);
        }

        let metrics = match self.analyzer.analyze(messages, responses).await {
            Ok(metrics) => metrics,
            Err(err) => {
                log::warn!(
                    "QualityGate::perform_quality_check(...): analysis failed, continuing without metrics: {}",
                    err
                );
                return QualityDecision::proceed(None);
            }
        };

        let decision = if metrics.topic_drift > TOPIC_DRIFT_THRESHOLD {
            QualityDecision::stop(StopReason::TopicDrift, Some(metrics))
        } else if metrics.consensus_reached {
            QualityDecision::stop(StopReason::ConsensusReached, Some(metrics))
        } else {
            QualityDecision::proceed(Some(metrics))
        };
        log::debug!(
            "QualityGate::perform_quality_check(...): round {} -> continue={} reason={:?}",
            round,
            decision.should_continue,
            decision.reason
        );
        decision
    }
}

