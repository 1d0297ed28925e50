//! Error taxonomy shared by every component of a discussion.
//!
//! [`DiscussionError`] is the single error type surfaced by the conversation store,
//! the agent registry, the Director and the [`Coordinator`](crate::coordinator::Coordinator).
//! The external model boundary speaks in boxed errors ([`ClientError`]) so provider
//! implementations stay free to return whatever their SDK produces; the conversion
//! into [`DiscussionError`] keeps an already-typed error intact.
//!
//! Cancellation is deliberately absent from this enum. A cancelled discussion is a
//! [`DiscussionOutcome::Cancelled`](crate::coordinator::DiscussionOutcome::Cancelled)
//! value accompanied by a cancellation notification, never an `Err`.
//!
//! # Example
//!
//! ```
//! use roundtable::error::DiscussionError;
//!
//! let err = DiscussionError::NotFound("director-agent".into());
//! assert_eq!(err.to_string(), "Not found: director-agent");
//! ```

use std::error::Error;
use std::fmt;

/// Boxed error returned by [`ClientWrapper`](crate::client_wrapper::ClientWrapper)
/// implementations.
pub type ClientError = Box<dyn Error + Send + Sync>;

/// Errors that can occur while validating input, resolving agents or calling the model.
#[derive(Debug, Clone, PartialEq)]
pub enum DiscussionError {
    /// Malformed input rejected at a component boundary (empty message content,
    /// empty agent id, empty incoming message).
    Validation(String),

    /// A required agent or conversation is missing (e.g. no Director registered).
    NotFound(String),

    /// The Director could not produce a usable plan and no fallback was possible.
    Planning(String),

    /// The model call failed after the retry budget was exhausted.
    TransientRequest {
        /// Number of attempts that were made before giving up.
        attempts: usize,
        /// Message of the final attempt's failure.
        message: String,
    },

    /// No non-Director agent is available to take part in the discussion.
    NoAgentsAvailable,

    /// A discussion is already running on this coordinator instance.
    AlreadyProcessing,

    /// The declared agent roster or settings are inconsistent.
    Configuration(String),
}

impl fmt::Display for DiscussionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscussionError::Validation(msg) => write!(f, "Validation error: {}", msg),
            DiscussionError::NotFound(what) => write!(f, "Not found: {}", what),
            DiscussionError::Planning(msg) => write!(f, "Planning failed: {}", msg),
            DiscussionError::TransientRequest { attempts, message } => write!(
                f,
                "Model request failed after {} attempt(s): {}",
                attempts, message
            ),
            DiscussionError::NoAgentsAvailable => write!(f, "No agents available"),
            DiscussionError::AlreadyProcessing => {
                write!(f, "A discussion is already being processed")
            }
            DiscussionError::Configuration(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl Error for DiscussionError {}

impl From<ClientError> for DiscussionError {
    fn from(err: ClientError) -> Self {
        match err.downcast::<DiscussionError>() {
            Ok(typed) => *typed,
            Err(other) => DiscussionError::TransientRequest {
                attempts: 1,
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boxed_discussion_error_survives_conversion() {
        let boxed: ClientError = Box::new(DiscussionError::TransientRequest {
            attempts: 3,
            message: "503".into(),
        });
        assert_eq!(
            DiscussionError::from(boxed),
            DiscussionError::TransientRequest {
                attempts: 3,
                message: "503".into()
            }
        );
    }

    #[test]
    fn foreign_error_becomes_transient_request() {
        let boxed: ClientError = "connection reset".into();
        match DiscussionError::from(boxed) {
            DiscussionError::TransientRequest { attempts, message } => {
                assert_eq!(attempts, 1);
                assert_eq!(message, "connection reset");
            }
            other => panic!("unexpected conversion: {:?}", other),
        }
    }
}
