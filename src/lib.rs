//! # Roundtable
//!
//! Roundtable runs bounded, Director-led discussions between a fixed set of role-bound
//! agents, each turn being one call to a remote Large Language Model.
//!
//! The crate provides carefully layered abstractions for:
//!
//! * **Phase sequencing**: the [`Coordinator`] drives every discussion through Planning,
//!   Response, a gated Collaboration loop and a closing Summary
//! * **Turn legality**: the [`agent_manager::AgentManager`] owns the roster and refuses
//!   back-to-back turns, self-responses and replies to roles that have not spoken
//! * **Continuation control**: the [`quality_gate::QualityGate`] bounds the discussion by
//!   a round cap first and by drift or consensus second
//! * **Bounded history**: the [`conversation::ConversationManager`] evicts conversations
//!   by age and by recency
//! * **Live events**: the [`notify::NotifyManager`] fans responses and agent state changes
//!   out to any number of listeners
//! * **A careful model boundary**: every call passes a shared [`rate_limiter::RateLimiter`]
//!   and the [`retry::RetryingClient`]'s exponential backoff
//!
//! ## Getting Started
//!
//! ```rust,no_run
//! use roundtable::clients::openai::OpenAIClient;
//! use roundtable::{Coordinator, RoundtableConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     roundtable::init_logger();
//!
//!     let api_key = std::env::var("OPEN_AI_SECRET")?;
//!     let client = Arc::new(OpenAIClient::new_with_model_string(&api_key, "gpt-4.1-mini"));
//!     let coordinator = Coordinator::from_config(&RoundtableConfig::default(), client)?;
//!
//!     let disposer = coordinator.notify_manager().initialize(
//!         |response| println!("[{}] {}", response.role, response.content),
//!         |change| log::debug!("{} -> {:?}", change.agent_id, change.state),
//!     );
//!
//!     let outcome = coordinator
//!         .coordinate_discussion("demo", "How should we roll out the new billing service?")
//!         .await?;
//!     println!("{} turn(s)", outcome.result().responses.len());
//!
//!     disposer.dispose();
//!     Ok(())
//! }
//! ```

use std::sync::Once;

static INIT_LOGGER: Once = Once::new();

/// Initialise the global [`env_logger`] subscriber exactly once.
///
/// Applications embedding roundtable opt in to `RUST_LOG` driven diagnostics by calling
/// this; the crate itself only ever talks to the `log` facade.
///
/// ```rust
/// roundtable::init_logger();
/// roundtable::init_logger();
/// log::info!("Logger is ready");
/// ```
pub fn init_logger() {
    INIT_LOGGER.call_once(|| {
        env_logger::init();
    });
}

// Import the top-level `roundtable` module.
pub mod roundtable;

pub use roundtable::agent;
pub use roundtable::agent::{Agent, AgentRole};
pub use roundtable::agent_manager;
pub use roundtable::client_wrapper;
pub use roundtable::client_wrapper::{ClientWrapper, ModelRequest, ModelResponse};
pub use roundtable::clients;
pub use roundtable::config;
pub use roundtable::config::RoundtableConfig;
pub use roundtable::conversation;
pub use roundtable::coordinator;
pub use roundtable::coordinator::{Coordinator, DiscussionOutcome};
pub use roundtable::director;
pub use roundtable::error;
pub use roundtable::error::DiscussionError;
pub use roundtable::event;
pub use roundtable::event::{EventHandler, NotificationEvent};
pub use roundtable::notify;
pub use roundtable::quality_gate;
pub use roundtable::rate_limiter;
pub use roundtable::retry;
