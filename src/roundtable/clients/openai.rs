//! The `OpenAIClient` struct implements `ClientWrapper` for OpenAI's Chat API (and any
//! OpenAI compatible endpoint), capturing the assistant response and the token usage
//! reported for it.
//!
//! # Example
//!
//! ```rust,no_run
//! use roundtable::client_wrapper::{ClientWrapper, ModelRequest};
//! use roundtable::clients::openai::OpenAIClient;
//!
//! #[tokio::main]
//! async fn main() {
//!     let secret_key = std::env::var("OPEN_AI_SECRET").unwrap_or_default();
//!     let client = OpenAIClient::new_with_model_string(&secret_key, "gpt-4.1-nano");
//!
//!     let request = ModelRequest::new("analyst", "You are a data analyst.", "Hello!");
//!     match client.send_request(&request).await {
//!         Ok(reply) => println!("{} ({:?})", reply.content, reply.tokens_used),
//!         Err(err) => eprintln!("request failed: {}", err),
//!     }
//! }
//! ```
use async_trait::async_trait;
use openai_rust2 as openai_rust;

use crate::roundtable::client_wrapper::{ClientWrapper, ModelRequest, ModelResponse};
use crate::roundtable::clients::common::{
    get_shared_http_client, request_to_messages, send_and_track,
};
use crate::roundtable::error::ClientError;

const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// Client wrapper for OpenAI's Chat Completions API.
pub struct OpenAIClient {
    client: openai_rust::Client,
    model: String,
}

impl OpenAIClient {
    /// Construct a new client using the provided API key and explicit model name.
    pub fn new_with_model_string(secret_key: &str, model_name: &str) -> Self {
        OpenAIClient {
            client: openai_rust::Client::new_with_client(
                secret_key,
                get_shared_http_client().clone(),
            ),
            model: model_name.to_string(),
        }
    }

    /// Construct a client targeting a custom OpenAI compatible base URL.
    pub fn new_with_base_url(secret_key: &str, model_name: &str, base_url: &str) -> Self {
        OpenAIClient {
            client: openai_rust::Client::new_with_client_and_base_url(
                secret_key,
                get_shared_http_client().clone(),
                base_url,
            ),
            model: model_name.to_string(),
        }
    }
}

#[async_trait]
impl ClientWrapper for OpenAIClient {
    async fn send_request(&self, request: &ModelRequest) -> Result<ModelResponse, ClientError> {
        let messages = request_to_messages(request);
        log::debug!(
            "OpenAIClient::send_request(...): {} message(s) for '{}' on {}",
            messages.len(),
            request.agent_type,
            self.model
        );

        let (content, usage) = send_and_track(
            &self.client,
            &self.model,
            &messages,
            Some(CHAT_COMPLETIONS_PATH.to_string()),
        )
        .await?;

        Ok(ModelResponse {
            content,
            tokens_used: Some(usage),
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
