//! Completion providers for SQL generation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::QuerysmithError;

/// Produces a completion for a prompt. Generation is not required to be
/// byte-identical across calls; only retrieval ranking is deterministic.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, QuerysmithError>;
}

/// Returns a fixed response regardless of the prompt. Used in tests and as
/// a stand-in when wiring pipelines offline.
#[derive(Clone, Debug)]
pub struct CannedCompletionProvider {
    response: String,
}

impl CannedCompletionProvider {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
        }
    }
}

#[async_trait]
impl CompletionProvider for CannedCompletionProvider {
    async fn complete(&self, _prompt: &str, _max_tokens: u32) -> Result<String, QuerysmithError> {
        Ok(self.response.clone())
    }
}

/// OpenAI-compatible `/chat/completions` HTTP provider.
#[derive(Clone, Debug)]
pub struct HttpCompletionProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl HttpCompletionProvider {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            // SQL generation wants the most deterministic sampling available.
            temperature: 0.0,
        }
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[async_trait]
impl CompletionProvider for HttpCompletionProvider {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, QuerysmithError> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&ChatRequest {
                model: &self.model,
                messages: vec![ChatMessage {
                    role: "user",
                    content: prompt,
                }],
                max_tokens,
                temperature: self.temperature,
            })
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(QuerysmithError::RateLimited(
                "completion service returned 429".into(),
            ));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(QuerysmithError::UpstreamError(format!(
                "completion service returned {status}: {body}"
            )));
        }

        let payload: ChatResponse = response.json().await?;
        payload
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| {
                QuerysmithError::UpstreamError("completion service returned no choices".into())
            })
    }
}
