//! Discussion event types.
//!
//! Everything a UI, CLI or HTTP layer needs to render a discussion live flows out of
//! the core as a [`NotificationEvent`]:
//!
//! - **Response**: one per completed, formatted agent turn, plus one per Director
//!   assignment and one for the closing summary (see [`ResponseKind`])
//! - **StateChange**: an agent moved through `Thinking -> Generating -> Completed | Failed`
//! - **Error**: a failure the discussion survived (skipped participant, aborted round)
//! - **Cancellation**: the running discussion observed a cancel request
//!
//! Listeners implement [`EventHandler`] and are registered on the
//! [`NotifyManager`](crate::notify::NotifyManager).
//!
//! # Example
//!
//! ```rust,no_run
//! use roundtable::event::{EventHandler, NotificationEvent};
//! use async_trait::async_trait;
//!
//! struct Printer;
//!
//! #[async_trait]
//! impl EventHandler for Printer {
//!     async fn on_event(&self, event: &NotificationEvent) {
//!         if let NotificationEvent::Response(response) = event {
//!             println!("[{}] {}", response.role, response.content);
//!         }
//!     }
//! }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Per-turn lifecycle of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentTurnState {
    Idle,
    Thinking,
    Generating,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    /// A turn produced by an agent.
    Turn,
    /// The Director handing a task to a participant during planning.
    Assignment,
    /// The Director's closing synthesis.
    Summary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseNotification {
    pub conversation_id: String,
    /// Id of the logged conversation message, when the content was logged.
    pub message_id: Option<u64>,
    pub agent_id: String,
    pub role: String,
    pub content: String,
    pub kind: ResponseKind,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateChangeNotification {
    pub agent_id: String,
    pub state: AgentTurnState,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationEvent {
    Response(ResponseNotification),
    StateChange(StateChangeNotification),
    Error {
        agent_id: Option<String>,
        message: String,
    },
    Cancellation {
        conversation_id: String,
    },
}

impl NotificationEvent {
    pub fn as_response(&self) -> Option<&ResponseNotification> {
        match self {
            NotificationEvent::Response(response) => Some(response),
            _ => None,
        }
    }

    pub fn as_state_change(&self) -> Option<&StateChangeNotification> {
        match self {
            NotificationEvent::StateChange(change) => Some(change),
            _ => None,
        }
    }
}

/// Receives every notification emitted by the discussion core.
///
/// Handlers are awaited in registration order on the emitting task, so a slow handler
/// slows the discussion down; hand work off to a channel if that matters.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_event(&self, _event: &NotificationEvent) {}
}
