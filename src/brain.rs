//! Language-model clients. The rest of the crate only sees [`Brain::generate`].

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::config::{AgentConfig, Provider};
use crate::error::{AgentError, Result};

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";

const TEMPERATURE: f32 = 0.2;

/// A hosted model that turns a prompt (and optionally a screenshot) into text.
#[async_trait]
pub trait Brain: Send + Sync {
    fn name(&self) -> &str;

    /// `image` is a PNG attached as vision input.
    async fn generate(&self, prompt: &str, image: Option<&[u8]>) -> Result<String>;
}

/// Build the brain selected by the configuration.
pub fn from_config(config: &AgentConfig) -> Result<Arc<dyn Brain>> {
    let api_key = config.api_key()?;
    let model = config.model_name().to_string();
    let brain: Arc<dyn Brain> = match config.provider {
        Provider::Gemini => Arc::new(GeminiBrain::new(api_key, model)),
        Provider::Openai => Arc::new(OpenAiBrain::new(api_key, model)),
    };
    Ok(brain)
}

/// Pull the `error.message` field out of an API error body.
fn api_error(status: reqwest::StatusCode, body: &Value) -> AgentError {
    let message = body["error"]["message"]
        .as_str()
        .unwrap_or("Unknown API error");
    warn!(%status, reason = message, "model API returned an error");
    AgentError::Brain(format!("API error ({status}): {message}"))
}

/// Google Gemini `generateContent`.
pub struct GeminiBrain {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiBrain {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: GEMINI_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn request_body(prompt: &str, image: Option<&[u8]>) -> Value {
        let mut parts = vec![json!({ "text": prompt })];
        if let Some(bytes) = image.filter(|b| !b.is_empty()) {
            parts.push(json!({
                "inline_data": { "mime_type": "image/png", "data": STANDARD.encode(bytes) }
            }));
        }
        json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": { "temperature": TEMPERATURE },
        })
    }
}

#[async_trait]
impl Brain for GeminiBrain {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, prompt: &str, image: Option<&[u8]>) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        debug!(model = %self.model, with_image = image.is_some(), "gemini generate_content");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&Self::request_body(prompt, image))
            .send()
            .await?;

        let status = response.status();
        let body: Value = response.json().await?;
        if !status.is_success() {
            return Err(api_error(status, &body));
        }

        let text: String = body["candidates"][0]["content"]["parts"]
            .as_array()
            .map(|parts| parts.iter().filter_map(|p| p["text"].as_str()).collect())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(AgentError::Brain(format!("No content in Gemini response: {body}")));
        }
        debug!(reply = %text, "gemini replied");
        Ok(text)
    }
}

/// OpenAI chat completions.
pub struct OpenAiBrain {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiBrain {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: OPENAI_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn user_content(prompt: &str, image: Option<&[u8]>) -> Value {
        match image.filter(|b| !b.is_empty()) {
            Some(bytes) => json!([
                { "type": "text", "text": prompt },
                {
                    "type": "image_url",
                    "image_url": { "url": format!("data:image/png;base64,{}", STANDARD.encode(bytes)) }
                }
            ]),
            None => json!(prompt),
        }
    }
}

#[async_trait]
impl Brain for OpenAiBrain {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, prompt: &str, image: Option<&[u8]>) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        debug!(model = %self.model, with_image = image.is_some(), "openai chat completion");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&json!({
                "model": self.model,
                "messages": [{ "role": "user", "content": Self::user_content(prompt, image) }],
                "temperature": TEMPERATURE,
            }))
            .send()
            .await?;

        let status = response.status();
        let body: Value = response.json().await?;
        if !status.is_success() {
            return Err(api_error(status, &body));
        }

        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| AgentError::Brain(format!("No content in LLM response: {body}")))?;
        debug!(reply = %content, "openai replied");
        Ok(content.to_string())
    }
}
