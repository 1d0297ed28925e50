use async_trait::async_trait;
use roundtable::agent::AgentTurn;
use roundtable::client_wrapper::{ClientWrapper, ModelRequest, ModelResponse};
use roundtable::conversation::ConversationMessage;
use roundtable::error::ClientError;
use roundtable::quality_gate::{
    ModelQualityAnalyzer, QualityAnalyzer, QualityGate, QualityMetrics, StaticQualityAnalyzer,
    StopReason,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn metrics(topic_drift: f64, consensus_reached: bool) -> QualityMetrics {
    QualityMetrics {
        topic_relevance: 0.8,
        topic_drift,
        consensus_reached,
        response_coherence: 0.8,
    }
}

fn gate(max_rounds: usize, metrics: QualityMetrics) -> QualityGate {
    QualityGate::new(max_rounds, Arc::new(StaticQualityAnalyzer::new(metrics)))
}

struct CountingAnalyzer {
    calls: AtomicUsize,
}

#[async_trait]
impl QualityAnalyzer for CountingAnalyzer {
    async fn analyze(
        &self,
        _messages: &[ConversationMessage],
        _responses: &[AgentTurn],
    ) -> Result<QualityMetrics, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(metrics(0.0, false))
    }
}

struct FailingAnalyzer;

#[async_trait]
impl QualityAnalyzer for FailingAnalyzer {
    async fn analyze(
        &self,
        _messages: &[ConversationMessage],
        _responses: &[AgentTurn],
    ) -> Result<QualityMetrics, ClientError> {
        Err("analysis service unavailable".into())
    }
}

struct MetricsClient;

#[async_trait]
impl ClientWrapper for MetricsClient {
    async fn send_request(&self, request: &ModelRequest) -> Result<ModelResponse, ClientError> {
        assert!(request.force_json_response);
        Ok(ModelResponse::text(
            "```json\n{\"topicRelevance\": 0.7, \"topicDrift\": 0.5, \"consensusReached\": false, \"responseCoherence\": 0.6}\n```",
        ))
    }

    fn model_name(&self) -> &str {
        "metrics"
    }
}

#[test]
fn test_round_counter_resets_and_increments_by_one() {
    let gate = gate(3, metrics(0.0, false));
    assert_eq!(gate.current_round(), 0);
    assert_eq!(gate.increment_round(), 1);
    assert_eq!(gate.increment_round(), 2);
    gate.reset_round_counter();
    assert_eq!(gate.current_round(), 0);
    assert_eq!(gate.increment_round(), 1);
    assert_eq!(gate.max_rounds(), 3);
}

#[tokio::test]
async fn test_round_cap_wins_over_every_metric() {
    let analyzer = Arc::new(CountingAnalyzer {
        calls: AtomicUsize::new(0),
    });
    let capped = QualityGate::new(2, analyzer.clone());
    for _ in 0..3 {
        capped.increment_round();
    }

    let decision = capped.perform_quality_check(&[], &[]).await;
    assert!(!decision.should_continue);
    assert_eq!(decision.reason, Some(StopReason::MaxRoundsReached));
    // the cap short-circuits before analysis
    assert_eq!(analyzer.calls.load(Ordering::SeqCst), 0);

    let drifting = gate(2, metrics(0.9, true));
    for _ in 0..3 {
        drifting.increment_round();
    }
    let decision = drifting.perform_quality_check(&[], &[]).await;
    assert_eq!(decision.reason, Some(StopReason::MaxRoundsReached));
}

#[tokio::test]
async fn test_round_equal_to_cap_still_runs() {
    let gate = gate(2, metrics(0.0, false));
    gate.increment_round();
    gate.increment_round();
    assert!(gate.perform_quality_check(&[], &[]).await.should_continue);
}

#[tokio::test]
async fn test_drift_is_checked_before_consensus() {
    let gate = gate(5, metrics(0.31, true));
    gate.increment_round();
    let decision = gate.perform_quality_check(&[], &[]).await;
    assert_eq!(decision.reason, Some(StopReason::TopicDrift));
    assert_eq!(decision.metrics, Some(metrics(0.31, true)));
}

#[tokio::test]
async fn test_drift_at_threshold_does_not_stop() {
    let gate = gate(5, metrics(0.3, false));
    gate.increment_round();
    let decision = gate.perform_quality_check(&[], &[]).await;
    assert!(decision.should_continue);
    assert_eq!(decision.reason, None);
    assert!(decision.metrics.is_some());
}

#[tokio::test]
async fn test_consensus_stops_the_discussion() {
    let gate = gate(5, metrics(0.1, true));
    gate.increment_round();
    let decision = gate.perform_quality_check(&[], &[]).await;
    assert!(!decision.should_continue);
    assert_eq!(decision.reason, Some(StopReason::ConsensusReached));
}

#[tokio::test]
async fn test_analyzer_failure_continues_without_metrics() {
    let gate = QualityGate::new(5, Arc::new(FailingAnalyzer));
    gate.increment_round();
    let decision = gate.perform_quality_check(&[], &[]).await;
    assert!(decision.should_continue);
    assert_eq!(decision.metrics, None);
}

#[tokio::test]
async fn test_model_analyzer_reads_metrics_from_json() {
    let gate = QualityGate::new(5, Arc::new(ModelQualityAnalyzer::new(Arc::new(MetricsClient))));
    gate.increment_round();
    let decision = gate.perform_quality_check(&[], &[]).await;
    assert_eq!(decision.reason, Some(StopReason::TopicDrift));
    assert_eq!(decision.metrics.map(|m| m.topic_drift), Some(0.5));
}
