//! Optional LLM reply generation.
//!
//! When configured, a generated reply takes precedence over the rule table;
//! any failure falls back silently to the classifier. The engine never
//! surfaces generation errors as invocation errors.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

/// System prompt for generated replies
const SYSTEM_PROMPT: &str = "You are a helpful WhatsApp assistant. Generate brief, friendly replies. Keep responses under 50 words.";

/// Default inference model
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Errors from reply generation
#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("inference call failed with status {0}")]
    Status(reqwest::StatusCode),

    #[error("inference response carried no reply text")]
    EmptyReply,
}

/// A source of generated replies
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    /// Generate a reply to one inbound message
    async fn generate(&self, text: &str) -> Result<String, GeneratorError>;
}

/// Type-erased generator for injection
pub type DynReplyGenerator = Arc<dyn ReplyGenerator>;

/// Reply generator backed by the platform's inference API
pub struct HttpReplyGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl HttpReplyGenerator {
    /// Create a generator with a bounded per-call timeout
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GeneratorError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }
}

#[async_trait]
impl ReplyGenerator for HttpReplyGenerator {
    async fn generate(&self, text: &str) -> Result<String, GeneratorError> {
        let url = format!("{}/llm/execute/calls", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": text},
            ],
        });
        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(GeneratorError::Status(response.status()));
        }
        let data: Value = response.json().await?;
        extract_reply(&data).ok_or(GeneratorError::EmptyReply)
    }
}

/// The reply text, checked under `choices[0].message.content`, then the
/// top-level `response`, then `content`.
fn extract_reply(data: &Value) -> Option<String> {
    let from_choices = data
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str);
    let reply = from_choices
        .or_else(|| data.get("response").and_then(Value::as_str))
        .or_else(|| data.get("content").and_then(Value::as_str))?;
    if reply.is_empty() {
        return None;
    }
    Some(reply.to_string())
}
