//! Configuration for a roundtable deployment.
//!
//! [`RoundtableConfig`] bundles every tunable the [`Coordinator`](crate::Coordinator)
//! needs: the round cap, the conversation store bounds, the rate-limit and retry budget
//! and the declared agent roster. It can be built by hand, parsed from JSON, or read
//! from `ROUNDTABLE_*` environment variables layered over the defaults.
//!
//! # Example
//!
//! ```rust
//! use roundtable::config::RoundtableConfig;
//!
//! let config = RoundtableConfig::from_json_str(r#"{ "max_rounds": 3 }"#).unwrap();
//! assert_eq!(config.max_rounds, 3);
//! // unspecified fields keep their defaults
//! assert_eq!(config.max_conversations, 100);
//! assert_eq!(config.agents.len(), 4);
//! ```

use crate::roundtable::agent::AgentRole;
use crate::roundtable::error::DiscussionError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Admissions per window.
    pub limit: usize,
    pub interval_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            limit: 20,
            interval_ms: 60_000,
        }
    }
}

impl RateLimitConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per model call, including the first.
    pub max_retries: usize,
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

/// One declared agent. `agent_type` selects the role variant the factory builds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: String,
    pub agent_type: String,
    pub name: String,
    #[serde(default)]
    pub persona: Option<String>,
    #[serde(default)]
    pub knowledge_domains: Vec<String>,
}

impl AgentConfig {
    /// The default declaration for a role: id `<role>-agent`, display name = role label.
    pub fn for_role(role: AgentRole) -> Self {
        Self {
            id: role.default_agent_id(),
            agent_type: role.agent_type().to_string(),
            name: role.label().to_string(),
            persona: None,
            knowledge_domains: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoundtableConfig {
    /// Collaboration rounds allowed per discussion.
    pub max_rounds: usize,
    pub max_message_age_secs: i64,
    pub max_conversations: usize,
    /// Cap on each agent's remembered (prompt, response) pairs.
    pub agent_memory_limit: usize,
    /// Messages of history handed to an agent per turn.
    pub context_window: usize,
    pub rate_limit: RateLimitConfig,
    pub retry: RetryConfig,
    pub agents: Vec<AgentConfig>,
}

impl Default for RoundtableConfig {
    fn default() -> Self {
        Self {
            max_rounds: 5,
            max_message_age_secs: 24 * 60 * 60,
            max_conversations: 100,
            agent_memory_limit: 50,
            context_window: 20,
            rate_limit: RateLimitConfig::default(),
            retry: RetryConfig::default(),
            agents: AgentRole::ALL
                .iter()
                .copied()
                .map(AgentConfig::for_role)
                .collect(),
        }
    }
}

impl RoundtableConfig {
    pub fn from_json_str(json: &str) -> Result<Self, DiscussionError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| DiscussionError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with any `ROUNDTABLE_*` variables present in the environment.
    pub fn from_env() -> Result<Self, DiscussionError> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// Unparseable values are ignored with a warning; values that parse but are out of
    /// range are a `Configuration` error.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, DiscussionError>
    where
        F: Fn(&str) -> Option<String>,
    {
        override_from(&lookup, "ROUNDTABLE_MAX_ROUNDS", &mut self.max_rounds);
        override_from(
            &lookup,
            "ROUNDTABLE_MAX_CONVERSATIONS",
            &mut self.max_conversations,
        );
        override_from(
            &lookup,
            "ROUNDTABLE_MAX_MESSAGE_AGE_SECS",
            &mut self.max_message_age_secs,
        );
        override_from(&lookup, "ROUNDTABLE_RATE_LIMIT", &mut self.rate_limit.limit);
        override_from(
            &lookup,
            "ROUNDTABLE_RATE_INTERVAL_MS",
            &mut self.rate_limit.interval_ms,
        );
        override_from(&lookup, "ROUNDTABLE_MAX_RETRIES", &mut self.retry.max_retries);
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), DiscussionError> {
        self.max_message_age().map(|_| ())
    }

    /// Conversation retention; negative or unrepresentable ages are rejected.
    pub fn max_message_age(&self) -> Result<chrono::Duration, DiscussionError> {
        if self.max_message_age_secs < 0 {
            return Err(DiscussionError::Configuration(format!(
                "max_message_age_secs must not be negative, got {}",
                self.max_message_age_secs
            )));
        }
        chrono::Duration::try_seconds(self.max_message_age_secs).ok_or_else(|| {
            DiscussionError::Configuration(format!(
                "max_message_age_secs out of range: {}",
                self.max_message_age_secs
            ))
        })
    }
}

fn override_from<F, T>(lookup: &F, key: &str, slot: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    if let Some(raw) = lookup(key) {
        match raw.trim().parse::<T>() {
            Ok(value) => *slot = value,
            Err(_) => log::warn!(
                "RoundtableConfig::from_env(...): ignoring unparseable {}={:?}",
                key,
                raw
            ),
        }
    }
}
