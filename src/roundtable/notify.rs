//! Fan-out of discussion events to registered listeners.
//!
//! [`NotifyManager`] is a cheap, cloneable handle: the coordinator, every agent and any
//! number of consumers can hold one and they all address the same listener list.
//!
//! Two guarantees matter to consumers:
//!
//! 1. Emitting a response for an agent that still has a pending `Thinking`/`Generating`
//!    state first emits `StateChange { Completed }` for it, so "is typing" indicators
//!    can never be left dangling.
//! 2. [`initialize`](NotifyManager::initialize) returns a [`Disposer`] that removes
//!    exactly the two listeners it registered, so repeated initialize/dispose cycles
//!    neither leak nor duplicate callbacks.
//!
//! # Example
//!
//! ```rust
//! use roundtable::notify::NotifyManager;
//!
//! let notifier = NotifyManager::new();
//! let disposer = notifier.initialize(
//!     |response| println!("{}: {}", response.role, response.content),
//!     |change| println!("{} is {:?}", change.agent_id, change.state),
//! );
//! assert_eq!(notifier.listener_count(), 2);
//! disposer.dispose();
//! assert_eq!(notifier.listener_count(), 0);
//! ```

use crate::roundtable::event::{
    AgentTurnState, EventHandler, NotificationEvent, ResponseNotification,
    StateChangeNotification,
};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

type ListenerId = u64;

#[derive(Default)]
struct NotifyInner {
    listeners: Mutex<Vec<(ListenerId, Arc<dyn EventHandler>)>>,
    pending: Mutex<HashSet<String>>,
    next_id: AtomicU64,
}

impl NotifyInner {
    fn listeners(&self) -> MutexGuard<'_, Vec<(ListenerId, Arc<dyn EventHandler>)>> {
        self.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn pending(&self) -> MutexGuard<'_, HashSet<String>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn remove(&self, ids: &[ListenerId]) -> usize {
        let mut listeners = self.listeners();
        let before = listeners.len();
        listeners.retain(|(id, _)| !ids.contains(id));
        before - listeners.len()
    }
}

#[derive(Clone, Default)]
pub struct NotifyManager {
    inner: Arc<NotifyInner>,
}

impl NotifyManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for every event kind.
    pub fn subscribe(&self, handler: Arc<dyn EventHandler>) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners().push((id, handler));
        Subscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Register a callback for response notifications only.
    pub fn on_response<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ResponseNotification) + Send + Sync + 'static,
    {
        self.subscribe(Arc::new(ResponseCallback(callback)))
    }

    /// Register a callback for agent state transitions only.
    pub fn on_agent_thinking<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&StateChangeNotification) + Send + Sync + 'static,
    {
        self.subscribe(Arc::new(StateCallback(callback)))
    }

    /// Register a response and a state callback as one unit.
    pub fn initialize<R, T>(&self, on_response: R, on_thinking: T) -> Disposer
    where
        R: Fn(&ResponseNotification) + Send + Sync + 'static,
        T: Fn(&StateChangeNotification) + Send + Sync + 'static,
    {
        let response = self.on_response(on_response);
        let thinking = self.on_agent_thinking(on_thinking);
        Disposer {
            ids: vec![response.id, thinking.id],
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.inner.remove(&[id]) > 0
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners().len()
    }

    /// Whether `agent_id` has an unfinished `Thinking`/`Generating` state.
    pub fn is_thinking(&self, agent_id: &str) -> bool {
        self.inner.pending().contains(agent_id)
    }

    /// Deliver an event to every listener, in registration order.
    pub async fn emit(&self, event: NotificationEvent) {
        let listeners: Vec<Arc<dyn EventHandler>> = self
            .inner
            .listeners()
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect();
        for handler in listeners {
            handler.on_event(&event).await;
        }
    }

    pub async fn emit_response(&self, response: ResponseNotification) {
        let was_pending = self.inner.pending().remove(&response.agent_id);
        if was_pending {
            self.emit(NotificationEvent::StateChange(StateChangeNotification {
                agent_id: response.agent_id.clone(),
                state: AgentTurnState::Completed,
            }))
            .await;
        }
        self.emit(NotificationEvent::Response(response)).await;
    }

    pub async fn emit_state_change(&self, agent_id: &str, state: AgentTurnState) {
        {
            let mut pending = self.inner.pending();
            match state {
                AgentTurnState::Thinking | AgentTurnState::Generating => {
                    pending.insert(agent_id.to_string());
                }
                AgentTurnState::Idle | AgentTurnState::Completed | AgentTurnState::Failed => {
                    pending.remove(agent_id);
                }
            }
        }
        self.emit(NotificationEvent::StateChange(StateChangeNotification {
            agent_id: agent_id.to_string(),
            state,
        }))
        .await;
    }

    pub async fn emit_error(&self, agent_id: Option<&str>, message: impl Into<String>) {
        self.emit(NotificationEvent::Error {
            agent_id: agent_id.map(str::to_string),
            message: message.into(),
        })
        .await;
    }

    pub async fn emit_cancellation(&self, conversation_id: &str) {
        self.emit(NotificationEvent::Cancellation {
            conversation_id: conversation_id.to_string(),
        })
        .await;
    }
}

/// Handle to a single registered listener.
#[must_use = "dropping a Subscription keeps the listener registered"]
pub struct Subscription {
    id: ListenerId,
    inner: Weak<NotifyInner>,
}

impl Subscription {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Remove the listener; returns false if it was already gone.
    pub fn unsubscribe(self) -> bool {
        match self.inner.upgrade() {
            Some(inner) => inner.remove(&[self.id]) > 0,
            None => false,
        }
    }
}

/// Removes the listeners registered by one [`NotifyManager::initialize`] call.
#[must_use = "dropping a Disposer keeps its listeners registered"]
pub struct Disposer {
    ids: Vec<ListenerId>,
    inner: Weak<NotifyInner>,
}

impl Disposer {
    /// Returns how many listeners were removed.
    pub fn dispose(self) -> usize {
        match self.inner.upgrade() {
            Some(inner) => inner.remove(&self.ids),
            None => 0,
        }
    }
}

struct ResponseCallback<F>(F);

#[async_trait]
impl<F> EventHandler for ResponseCallback<F>
where
    F: Fn(&ResponseNotification) + Send + Sync + 'static,
{
    async fn on_event(&self, event: &NotificationEvent) {
        if let NotificationEvent::Response(response) = event {
            (self.0)(response);
        }
    }
}

struct StateCallback<F>(F);

#[async_trait]
impl<F> EventHandler for StateCallback<F>
where
    F: Fn(&StateChangeNotification) + Send + Sync + 'static,
{
    async fn on_event(&self, event: &NotificationEvent) {
        if let NotificationEvent::StateChange(change) = event {
            (self.0)(change);
        }
    }
}
