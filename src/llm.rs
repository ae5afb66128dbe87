use std::future::Future;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

/// Stop sequences for code generation; they cut the model off before fences or prose.
pub const CODE_STOP_SEQUENCES: [&str; 3] = ["```", "Note:", "Example:"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_owned(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_owned(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("failed to call chat completion endpoint: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("chat completion endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to decode chat completion response: {0}")]
    Decode(#[source] reqwest::Error),
    #[error("chat completion response had no text content")]
    EmptyResponse,
    #[error("chat backend unavailable: {0}")]
    Unavailable(String),
}

/// A chat-completion endpoint. Returns the generated text of the first choice.
pub trait ChatBackend {
    fn complete(
        &self,
        request: &ChatRequest,
    ) -> impl Future<Output = Result<String, ChatError>> + Send;
}

/// Client for an OpenAI-compatible chat completion API (Groq by default).
#[derive(Debug, Clone)]
pub struct GroqClient {
    http: Client,
    api_key: String,
    endpoint: Url,
}

impl GroqClient {
    pub fn new(http: Client, api_key: String, base_url: &str) -> Result<Self, url::ParseError> {
        Ok(Self {
            http,
            api_key,
            endpoint: chat_endpoint(base_url)?,
        })
    }
}

impl ChatBackend for GroqClient {
    async fn complete(&self, request: &ChatRequest) -> Result<String, ChatError> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(ChatError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let decoded: ChatCompletionResponse = response.json().await.map_err(ChatError::Decode)?;
        first_choice_text(decoded).ok_or(ChatError::EmptyResponse)
    }
}

fn chat_endpoint(base_url: &str) -> Result<Url, url::ParseError> {
    Url::parse(&format!(
        "{}/chat/completions",
        base_url.trim().trim_end_matches('/')
    ))
}

fn first_choice_text(response: ChatCompletionResponse) -> Option<String> {
    response
        .choices
        .into_iter()
        .find_map(|choice| choice.message.content)
        .map(|text| text.trim().to_owned())
        .filter(|text| !text.is_empty())
}

#[derive(Debug, Clone, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}
