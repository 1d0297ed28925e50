//! Bounded, per-conversation message history.
//!
//! The [`ConversationManager`] owns every [`Conversation`] the system knows about. A
//! conversation is created on the first [`log_message`](ConversationManager::log_message)
//! for an unseen id, only ever grows through that method, and is evicted by the cleanup
//! pass that runs after each mutation:
//!
//! 1. every conversation whose `metadata.last_updated` is older than `max_message_age`
//!    is dropped, then
//! 2. while more than `max_conversations` remain, the least recently *updated* one is
//!    dropped (insertion order is irrelevant).
//!
//! # Example
//!
//! ```
//! use roundtable::conversation::{ConversationManager, NewMessage};
//!
//! let mut store = ConversationManager::default();
//! let first = store.log_message("c1", NewMessage::user("How do we shard this?")).unwrap();
//! let second = store
//!     .log_message("c1", NewMessage::from_agent("analyst-agent", "Analyst", "By tenant."))
//!     .unwrap();
//! assert_eq!((first.id, second.id), (1, 2));
//!
//! let stats = store.get_conversation_stats("c1").unwrap();
//! assert_eq!(stats.participant_count, 2);
//! ```

use crate::roundtable::error::DiscussionError;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Agent id under which incoming user messages are recorded.
pub const USER_AGENT_ID: &str = "user";

pub const DEFAULT_MAX_CONVERSATIONS: usize = 100;
pub const DEFAULT_MAX_MESSAGE_AGE_SECS: i64 = 24 * 60 * 60;

/// A message stored in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationMessage {
    /// Sequence id, unique and increasing within the owning conversation.
    pub id: u64,
    pub agent_id: String,
    /// Optional role label (`"Analyst"`, `"Summary"`, ...). User messages carry none.
    pub role: Option<String>,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// A message about to be logged; the store assigns id and timestamp.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub agent_id: String,
    pub role: Option<String>,
    pub content: String,
}

impl NewMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            agent_id: USER_AGENT_ID.to_string(),
            role: None,
            content: content.into(),
        }
    }

    pub fn from_agent(
        agent_id: impl Into<String>,
        role: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            role: Some(role.into()),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationMetadata {
    pub participants: BTreeSet<String>,
    pub message_count: usize,
    pub last_updated: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    pub id: String,
    pub messages: Vec<ConversationMessage>,
    pub created_at: DateTime<Utc>,
    pub metadata: ConversationMetadata,
    #[serde(skip)]
    next_message_id: u64,
}

impl Conversation {
    fn new(id: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            messages: Vec::new(),
            created_at: now,
            metadata: ConversationMetadata {
                participants: BTreeSet::new(),
                message_count: 0,
                last_updated: now,
                last_accessed: now,
            },
            next_message_id: 1,
        }
    }
}

/// Summary figures for one conversation, computed without touching it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationStats {
    pub message_count: usize,
    pub participant_count: usize,
    /// Wall-clock span between the first and last message.
    pub duration_ms: i64,
    /// Mean gap between consecutive messages; `None` with fewer than two messages.
    pub mean_response_latency_ms: Option<f64>,
    pub messages_by_agent: BTreeMap<String, usize>,
}

/// Owns all conversations and enforces the age/count bounds.
pub struct ConversationManager {
    conversations: HashMap<String, Conversation>,
    max_message_age: Duration,
    max_conversations: usize,
}

impl Default for ConversationManager {
    fn default() -> Self {
        Self::new(
            Duration::seconds(DEFAULT_MAX_MESSAGE_AGE_SECS),
            DEFAULT_MAX_CONVERSATIONS,
        )
    }
}

impl ConversationManager {
    /// A `max_conversations` of zero is clamped to one and a negative age to zero, so the
    /// conversation being written is never evicted by its own cleanup pass.
    pub fn new(max_message_age: Duration, max_conversations: usize) -> Self {
        Self {
            conversations: HashMap::new(),
            max_message_age: max_message_age.max(Duration::zero()),
            max_conversations: max_conversations.max(1),
        }
    }

    /// Append a message, creating the conversation on first reference.
    pub fn log_message(
        &mut self,
        conversation_id: &str,
        message: NewMessage,
    ) -> Result<ConversationMessage, DiscussionError> {
        if message.content.trim().is_empty() {
            return Err(DiscussionError::Validation(
                "message content must not be empty".into(),
            ));
        }
        if message.agent_id.trim().is_empty() {
            return Err(DiscussionError::Validation(
                "message agent id must not be empty".into(),
            ));
        }

        let now = Utc::now();
        let conversation = self
            .conversations
            .entry(conversation_id.to_string())
            .or_insert_with(|| Conversation::new(conversation_id, now));

        let stored = ConversationMessage {
            id: conversation.next_message_id,
            agent_id: message.agent_id,
            role: message.role,
            content: message.content,
            timestamp: now,
        };
        conversation.next_message_id += 1;
        conversation
            .metadata
            .participants
            .insert(stored.agent_id.clone());
        conversation.messages.push(stored.clone());
        conversation.metadata.message_count = conversation.messages.len();
        conversation.metadata.last_updated = now;

        self.cleanup_at(now);
        Ok(stored)
    }

    /// Look up a conversation, marking it as accessed.
    pub fn get_conversation(&mut self, conversation_id: &str) -> Option<&Conversation> {
        let conversation = self.conversations.get_mut(conversation_id)?;
        conversation.metadata.last_accessed = Utc::now();
        Some(conversation)
    }

    /// Cloned, ordered history of a conversation (empty if unknown).
    pub fn messages(&self, conversation_id: &str) -> Vec<ConversationMessage> {
        self.conversations
            .get(conversation_id)
            .map(|c| c.messages.clone())
            .unwrap_or_default()
    }

    pub fn contains(&self, conversation_id: &str) -> bool {
        self.conversations.contains_key(conversation_id)
    }

    pub fn conversation_ids(&self) -> Vec<String> {
        self.conversations.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    pub fn remove(&mut self, conversation_id: &str) -> Option<Conversation> {
        self.conversations.remove(conversation_id)
    }

    /// Evict stale and surplus conversations as of now.
    pub fn cleanup(&mut self) -> usize {
        self.cleanup_at(Utc::now())
    }

    /// Evict stale and surplus conversations as of `now`; returns how many were removed.
    pub fn cleanup_at(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.conversations.len();
        let max_age = self.max_message_age;
        self.conversations
            .retain(|_, c| now.signed_duration_since(c.metadata.last_updated) <= max_age);

        if self.conversations.len() > self.max_conversations {
            let mut by_recency: Vec<(DateTime<Utc>, String)> = self
                .conversations
                .values()
                .map(|c| (c.metadata.last_updated, c.id.clone()))
                .collect();
            by_recency.sort();
            let surplus = self.conversations.len() - self.max_conversations;
            for (_, id) in by_recency.into_iter().take(surplus) {
                self.conversations.remove(&id);
            }
        }

        let removed = before - self.conversations.len();
        if removed > 0 {
            log::debug!(
                "ConversationManager::cleanup(...): evicted {} conversation(s), {} remain",
                removed,
                self.conversations.len()
            );
        }
        removed
    }

    /// Message, participant and latency figures for one conversation.
    pub fn get_conversation_stats(&self, conversation_id: &str) -> Option<ConversationStats> {
        let conversation = self.conversations.get(conversation_id)?;
        let messages = &conversation.messages;

        let mut messages_by_agent = BTreeMap::new();
        for message in messages {
            *messages_by_agent
                .entry(message.agent_id.clone())
                .or_insert(0usize) += 1;
        }

        let span = match (messages.first(), messages.last()) {
            (Some(first), Some(last)) => last.timestamp - first.timestamp,
            _ => Duration::zero(),
        };

        // consecutive gaps telescope, so their mean is the span over the gap count
        let mean_response_latency_ms = if messages.len() < 2 {
            None
        } else {
            let span_us = span.num_microseconds().unwrap_or(i64::MAX) as f64;
            Some(span_us / 1000.0 / (messages.len() - 1) as f64)
        };

        Some(ConversationStats {
            message_count: messages.len(),
            participant_count: messages_by_agent.len(),
            duration_ms: span.num_milliseconds(),
            mean_response_latency_ms,
            messages_by_agent,
        })
    }
}
