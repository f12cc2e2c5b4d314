use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use crate::constants;
use crate::error::ChainError;

/// Text-in, text-out completion capability.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, ChainError>;

    fn model(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Provider {
    /// OpenAI-compatible /chat/completions endpoint
    Openai,
    /// Ollama /api/generate endpoint
    Ollama,
}

/// Everything needed to build a completion client.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub provider: Provider,
    pub api_base: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: Option<f32>,
}

impl LlmSettings {
    /// Defaults for a provider, taken from the environment.
    pub fn for_provider(provider: Provider) -> Self {
        match provider {
            Provider::Openai => Self {
                provider,
                api_base: constants::OPENAI_API_BASE.clone(),
                api_key: Some(constants::OPENAI_API_KEY.clone()).filter(|key| !key.is_empty()),
                model: constants::TASKFORGE_MODEL.clone(),
                temperature: None,
            },
            Provider::Ollama => Self {
                provider,
                api_base: constants::OLLAMA_URL.clone(),
                api_key: None,
                model: constants::OLLAMA_MODEL.clone(),
                temperature: None,
            },
        }
    }
}

pub fn build_client(settings: &LlmSettings) -> Arc<dyn CompletionClient> {
    match settings.provider {
        Provider::Openai => Arc::new(OpenAiClient::new(
            &settings.api_base,
            settings.api_key.clone(),
            &settings.model,
            settings.temperature,
        )),
        Provider::Ollama => Arc::new(OllamaClient::new(&settings.api_base, &settings.model)),
    }
}

// Structures matching the OpenAI chat completions endpoint
#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize, Debug)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize, Debug)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: Option<f32>,
}

impl OpenAiClient {
    pub fn new(base_url: &str, api_key: Option<String>, model: &str, temperature: Option<f32>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            temperature,
        }
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    #[instrument(skip(self, prompt), fields(model = %self.model, prompt_len = prompt.len()))]
    async fn complete(&self, prompt: &str) -> Result<String, ChainError> {
        let url = format!("{}/chat/completions", self.base_url);
        // The whole rendered prompt goes out as a single user message.
        let payload = ChatCompletionRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
        };

        let mut request = self.http.post(&url).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await.map_err(|source| ChainError::Transport {
            url: url.clone(),
            source,
        })?;

        let response = check_status(response).await?;
        let body = response
            .json::<ChatCompletionResponse>()
            .await
            .map_err(|e| ChainError::Decode(e.to_string()))?;

        let reply = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(ChainError::EmptyReply)?;
        debug!(reply_len = reply.len(), "Received chat completion");
        Ok(reply)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// Structures matching Ollama's /api/generate endpoint
#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool, // We want the full response, not a stream
}

#[derive(Deserialize, Debug)]
struct OllamaResponse {
    response: String,
}

#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl CompletionClient for OllamaClient {
    #[instrument(skip(self, prompt), fields(model = %self.model, prompt_len = prompt.len()))]
    async fn complete(&self, prompt: &str) -> Result<String, ChainError> {
        let url = format!("{}/api/generate", self.base_url);
        let payload = OllamaRequest {
            model: &self.model,
            prompt,
            stream: false,
        };

        let response = self
            .http
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|source| ChainError::Transport {
                url: url.clone(),
                source,
            })?;

        let response = check_status(response).await?;
        let body = response
            .json::<OllamaResponse>()
            .await
            .map_err(|e| ChainError::Decode(e.to_string()))?;

        debug!(reply_len = body.response.len(), "Received Ollama response");
        Ok(body.response)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ChainError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Failed to read error body".to_string());
    error!(%status, %body, "Completion request failed");
    Err(ChainError::Api {
        status: status.as_u16(),
        body,
    })
}
