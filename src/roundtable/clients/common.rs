use crate::roundtable::client_wrapper::{Message, ModelRequest, Role, TokenUsage};
use crate::roundtable::error::ClientError;
use lazy_static::lazy_static;
use openai_rust::chat;
use openai_rust2 as openai_rust;
use std::time::Duration;

/// Appended to the system prompt when a request asks for structured output.
pub const JSON_RESPONSE_INSTRUCTION: &str =
    "Respond with a single valid JSON object and nothing else. Do not wrap it in Markdown.";

lazy_static! {
    /// One pooled HTTP client shared by every provider client in the process.
    static ref SHARED_HTTP_CLIENT: reqwest::Client = reqwest::ClientBuilder::new()
        .pool_idle_timeout(Some(Duration::from_secs(90)))
        .pool_max_idle_per_host(10)
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .timeout(Duration::from_secs(300))
        .build()
        .unwrap_or_else(|err| {
            log::warn!(
                "roundtable::clients::common: falling back to default HTTP client: {}",
                err
            );
            reqwest::Client::new()
        });
}

pub fn get_shared_http_client() -> &'static reqwest::Client {
    &SHARED_HTTP_CLIENT
}

/// Flatten a [`ModelRequest`] into the system, context, user message order chat APIs expect.
pub fn request_to_messages(request: &ModelRequest) -> Vec<Message> {
    let mut system_prompt = request.system_prompt.clone();
    if request.force_json_response {
        if !system_prompt.is_empty() {
            system_prompt.push_str("\n\n");
        }
        system_prompt.push_str(JSON_RESPONSE_INSTRUCTION);
    }

    let mut messages = Vec::with_capacity(request.context.len() + 2);
    if !system_prompt.is_empty() {
        messages.push(Message::new(Role::System, system_prompt));
    }
    messages.extend(request.context.iter().cloned());
    messages.push(Message::new(Role::User, request.user_prompt.clone()));
    messages
}

/// Send a chat request and return the assistant's content together with its usage.
pub async fn send_and_track(
    api: &openai_rust::Client,
    model: &str,
    messages: &[Message],
    url_path: Option<String>,
) -> Result<(String, TokenUsage), ClientError> {
    let formatted: Vec<chat::Message> = messages
        .iter()
        .map(|msg| chat::Message {
            role: msg.role.as_str().to_owned(),
            content: msg.content.clone(),
        })
        .collect();

    let arguments = chat::ChatArguments::new(model, formatted);
    let response = api.create_chat(arguments, url_path).await.map_err(|err| {
        log::error!(
            "roundtable::clients::common::send_and_track(...): API error: {}",
            err
        );
        ClientError::from(err.to_string())
    })?;

    let usage = TokenUsage {
        input_tokens: response.usage.prompt_tokens as usize,
        output_tokens: response.usage.completion_tokens as usize,
        total_tokens: response.usage.total_tokens as usize,
    };
    let content = response
        .choices
        .first()
        .map(|choice| choice.message.content.clone())
        .ok_or_else(|| ClientError::from("response contained no choices"))?;

    Ok((content, usage))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_requests_extend_the_system_prompt() {
        let request = ModelRequest::new("director", "You lead.", "Plan it.")
            .with_context(vec![Message::new(Role::User, "[Analyst]: data first")])
            .with_json_response();
        let messages = request_to_messages(&request);

        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.starts_with("You lead."));
        assert!(messages[0].content.ends_with(JSON_RESPONSE_INSTRUCTION));
        assert_eq!(messages[1].content, "[Analyst]: data first");
        assert_eq!(messages[2], Message::new(Role::User, "Plan it."));
    }

    #[test]
    fn empty_system_prompt_is_omitted() {
        let messages = request_to_messages(&ModelRequest::new("analyst", "", "hi"));
        assert_eq!(messages, vec![Message::new(Role::User, "hi")]);
    }
}
