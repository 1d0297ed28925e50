use crate::roundtable::error::ClientError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;

/// A ClientWrapper is a wrapper around a specific cloud LLM service.
/// It provides a common interface to interact with the LLMs.
/// It does not keep track of the discussion, for that we use the
/// [`ConversationManager`](crate::conversation::ConversationManager); every agent turn
/// is a single self-contained [`ModelRequest`] built from the shared history.
// src/roundtable/client_wrapper

/// Represents the possible roles for a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    System,
    // set by the developer to steer the model's responses
    User,
    // a message sent by a human user or, from one agent's point of view, by another agent
    Assistant, // lets the model know the content was generated by the agent itself
}

impl Role {
    /// Wire name used by chat-completion style APIs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// How many tokens were spent on prompt vs. completion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub total_tokens: usize,
}

/// Represents a generic message to be sent to an LLM.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    /// The role associated with the message.
    pub role: Role,
    /// The actual content of the message.
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// One model invocation on behalf of an agent.
///
/// `context` carries the already-normalized prior discussion (see
/// [`Agent::validate_context`](crate::Agent::validate_context)); the provider is expected
/// to send `system_prompt`, then `context`, then `user_prompt`.
#[derive(Clone, Debug)]
pub struct ModelRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub context: Vec<Message>,
    /// Declared agent type of the caller (`"director"`, `"analyst"`, ...). Providers may
    /// use it for routing; scripted test clients use it to pick canned replies.
    pub agent_type: String,
    /// Ask the provider for a single JSON object instead of free text.
    pub force_json_response: bool,
}

impl ModelRequest {
    pub fn new(
        agent_type: impl Into<String>,
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
    ) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            context: Vec::new(),
            agent_type: agent_type.into(),
            force_json_response: false,
        }
    }

    pub fn with_context(mut self, context: Vec<Message>) -> Self {
        self.context = context;
        self
    }

    pub fn with_json_response(mut self) -> Self {
        self.force_json_response = true;
        self
    }
}

/// The text returned by a model, plus usage if the provider reported it.
#[derive(Clone, Debug)]
pub struct ModelResponse {
    pub content: String,
    pub tokens_used: Option<TokenUsage>,
}

impl ModelResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tokens_used: None,
        }
    }

    /// Deserialize the structured part of the response.
    ///
    /// Models asked for JSON frequently wrap it in a Markdown fence or add a sentence
    /// around it, so the first balanced `{ ... }` object is extracted before parsing.
    ///
    /// ```
    /// use roundtable::client_wrapper::ModelResponse;
    /// use serde_json::Value;
    ///
    /// let reply = ModelResponse::text("Sure!\n```json\n{\"nextAgent\": \"Critic\"}\n```");
    /// let value: Value = reply.parse_json().unwrap();
    /// assert_eq!(value["nextAgent"], "Critic");
    /// ```
    pub fn parse_json<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        let fragment = extract_json_object(&self.content)
            .ok_or_else(|| -> ClientError { "response does not contain a JSON object".into() })?;
        serde_json::from_str(fragment).map_err(|e| -> ClientError { Box::new(e) })
    }
}

/// Locate the first balanced top-level JSON object inside `text`.
///
/// String literals are honoured so braces inside quoted values do not confuse the scan.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Trait defining the interface to interact with various LLM services.
#[async_trait]
pub trait ClientWrapper: Send + Sync {
    /// Send one request to the model and return its reply.
    async fn send_request(&self, request: &ModelRequest) -> Result<ModelResponse, ClientError>;

    /// Identifier of the model behind this client, for logging.
    fn model_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_object_with_braces_inside_strings() {
        let text = r#"Plan: {"task": "use {braces} wisely", "n": {"a": 1}} trailing"#;
        assert_eq!(
            extract_json_object(text),
            Some(r#"{"task": "use {braces} wisely", "n": {"a": 1}}"#)
        );
    }

    #[test]
    fn unbalanced_object_is_not_extracted() {
        assert_eq!(extract_json_object("{\"open\": true"), None);
        assert_eq!(extract_json_object("no json here"), None);
    }
}
