use async_trait::async_trait;
use chrono::Utc;
use roundtable::event::{
    AgentTurnState, EventHandler, NotificationEvent, ResponseKind, ResponseNotification,
};
use roundtable::notify::NotifyManager;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<NotificationEvent>>,
}

impl Recorder {
    fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventHandler for Recorder {
    async fn on_event(&self, event: &NotificationEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

fn response(agent_id: &str) -> ResponseNotification {
    ResponseNotification {
        conversation_id: "c1".to_string(),
        message_id: Some(2),
        agent_id: agent_id.to_string(),
        role: "Analyst".to_string(),
        content: "numbers".to_string(),
        kind: ResponseKind::Turn,
        timestamp: Utc::now(),
    }
}

#[tokio::test]
async fn test_response_clears_pending_thinking_state() {
    let notifier = NotifyManager::new();
    let recorder = Arc::new(Recorder::default());
    let _subscription = notifier.subscribe(recorder.clone());

    notifier
        .emit_state_change("analyst-agent", AgentTurnState::Thinking)
        .await;
    assert!(notifier.is_thinking("analyst-agent"));

    notifier.emit_response(response("analyst-agent")).await;

    assert!(!notifier.is_thinking("analyst-agent"));
    let events = recorder.events();
    assert_eq!(events.len(), 3);
    let cleared = events[1].as_state_change().unwrap();
    assert_eq!(cleared.agent_id, "analyst-agent");
    assert_eq!(cleared.state, AgentTurnState::Completed);
    assert!(events[2].as_response().is_some());
}

#[tokio::test]
async fn test_response_without_pending_state_emits_only_the_response() {
    let notifier = NotifyManager::new();
    let recorder = Arc::new(Recorder::default());
    let _subscription = notifier.subscribe(recorder.clone());

    notifier
        .emit_state_change("critic-agent", AgentTurnState::Generating)
        .await;
    notifier
        .emit_state_change("critic-agent", AgentTurnState::Completed)
        .await;
    notifier.emit_response(response("critic-agent")).await;

    let events = recorder.events();
    assert_eq!(events.len(), 3);
    assert!(events[2].as_response().is_some());
}

#[tokio::test]
async fn test_dispose_removes_exactly_its_own_listeners() {
    let notifier = NotifyManager::new();
    let other = Arc::new(Recorder::default());
    let _kept = notifier.subscribe(other.clone());

    let responses = Arc::new(AtomicUsize::new(0));
    let thinking = Arc::new(AtomicUsize::new(0));

    for _ in 0..3 {
        let r = responses.clone();
        let t = thinking.clone();
        let disposer = notifier.initialize(
            move |_| {
                r.fetch_add(1, Ordering::SeqCst);
            },
            move |_| {
                t.fetch_add(1, Ordering::SeqCst);
            },
        );
        assert_eq!(notifier.listener_count(), 3);
        assert_eq!(disposer.dispose(), 2);
        assert_eq!(notifier.listener_count(), 1);
    }

    let r = responses.clone();
    let t = thinking.clone();
    let disposer = notifier.initialize(
        move |_| {
            r.fetch_add(1, Ordering::SeqCst);
        },
        move |_| {
            t.fetch_add(1, Ordering::SeqCst);
        },
    );
    notifier
        .emit_state_change("expert-agent", AgentTurnState::Thinking)
        .await;
    notifier.emit_response(response("expert-agent")).await;

    // one callback set, no duplicates from earlier cycles
    assert_eq!(responses.load(Ordering::SeqCst), 1);
    assert_eq!(thinking.load(Ordering::SeqCst), 2);
    assert_eq!(other.events().len(), 3);

    disposer.dispose();
    assert_eq!(notifier.listener_count(), 1);
}

#[tokio::test]
async fn test_subscription_unsubscribe_is_idempotent() {
    let notifier = NotifyManager::new();
    let first = notifier.on_response(|_| {});
    let second = notifier.on_agent_thinking(|_| {});
    let second_id = second.id();

    assert!(first.unsubscribe());
    assert!(notifier.unsubscribe(second_id));
    assert!(!second.unsubscribe());
    assert_eq!(notifier.listener_count(), 0);
}

#[tokio::test]
async fn test_clones_share_listeners_and_errors_are_delivered() {
    let notifier = NotifyManager::new();
    let handle = notifier.clone();
    let recorder = Arc::new(Recorder::default());
    let _subscription = notifier.subscribe(recorder.clone());

    handle.emit_error(Some("critic-agent"), "timeout").await;
    handle.emit_cancellation("c1").await;

    assert_eq!(
        recorder.events(),
        vec![
            NotificationEvent::Error {
                agent_id: Some("critic-agent".to_string()),
                message: "timeout".to_string()
            },
            NotificationEvent::Cancellation {
                conversation_id: "c1".to_string()
            },
        ]
    );
}

#[test]
fn test_disposer_outliving_manager_is_harmless() {
    let notifier = NotifyManager::new();
    let disposer = notifier.initialize(|_| {}, |_| {});
    drop(notifier);
    assert_eq!(disposer.dispose(), 0);
}
