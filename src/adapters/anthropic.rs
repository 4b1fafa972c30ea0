//! Live adapter for the `LlmClient` port backed by the Anthropic messages
//! API.

use std::env;
use std::error::Error;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::ports::llm::{CompletionFuture, CompletionRequest, CompletionResponse, LlmClient};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// LLM client that calls the Anthropic Claude API over HTTPS.
///
/// The API key is read from `ANTHROPIC_API_KEY` at call time.
pub struct AnthropicClient {
    http: Client,
}

impl AnthropicClient {
    /// Creates a new client with a default HTTP connection pool.
    #[must_use]
    pub fn new() -> Self {
        Self {
            http: Client::new(),
        }
    }
}

impl Default for AnthropicClient {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
}

#[derive(Deserialize)]
struct ContentBlock {
    text: String,
}

#[derive(Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

fn boxed(message: String) -> Box<dyn Error + Send + Sync> {
    message.into()
}

impl LlmClient for AnthropicClient {
    fn complete(&self, request: &CompletionRequest) -> CompletionFuture<'_> {
        let model = request.model.clone();
        let prompt = request.prompt.clone();
        let max_tokens = request.max_tokens;

        Box::pin(async move {
            let api_key = env::var("ANTHROPIC_API_KEY")
                .map_err(|_| boxed("ANTHROPIC_API_KEY environment variable not set".into()))?;

            let body = MessagesRequest {
                model: &model,
                max_tokens,
                messages: vec![Message {
                    role: "user",
                    content: &prompt,
                }],
            };

            let response = self
                .http
                .post(ANTHROPIC_API_URL)
                .header("x-api-key", &api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&body)
                .send()
                .await
                .map_err(|err| boxed(format!("Anthropic API request failed: {err}")))?;

            let status = response.status();
            let text = response
                .text()
                .await
                .map_err(|err| boxed(format!("failed to read Anthropic API response: {err}")))?;

            if !status.is_success() {
                let message = serde_json::from_str::<ApiError>(&text)
                    .map(|parsed| parsed.error.message)
                    .unwrap_or(text);
                return Err(boxed(format!(
                    "Anthropic API error ({}): {message}",
                    status.as_u16()
                )));
            }

            let parsed: MessagesResponse = serde_json::from_str(&text)
                .map_err(|err| boxed(format!("failed to parse Anthropic API response: {err}")))?;

            let text = parsed
                .content
                .into_iter()
                .map(|block| block.text)
                .collect::<String>();

            Ok(CompletionResponse {
                text,
                prompt_tokens: parsed.usage.input_tokens,
                completion_tokens: parsed.usage.output_tokens,
            })
        })
    }
}
