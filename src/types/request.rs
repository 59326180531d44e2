//! Inference request types and the validating request builder

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{CostwiseError, Result};

/// Request priority levels affecting batching strategy.
///
/// Ordered so that `Express > Standard > Batch` — a batch's effective
/// priority is the maximum over its members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Best effort, maximum batching.
    Batch,
    /// Moderate batching, the default.
    Standard,
    /// Minimal batching, tight latency target.
    Express,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Express => "express",
            Priority::Standard => "standard",
            Priority::Batch => "batch",
        }
    }
}

/// One chat turn (role + content).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Model generation parameters.
///
/// Validated when the owning request is built: temperature ∈ [0, 2],
/// top_p ∈ [0, 1], max_tokens ≥ 1, top_k ≥ 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParameters {
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
    pub top_k: u32,
    pub frequency_penalty: f64,
    pub presence_penalty: f64,
    pub stop_sequences: Vec<String>,
}

impl Default for GenerationParameters {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 1024,
            top_p: 0.9,
            top_k: 50,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            stop_sequences: Vec::new(),
        }
    }
}

impl GenerationParameters {
    pub(crate) fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(CostwiseError::InvalidRequest(
                "temperature must be between 0 and 2".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(CostwiseError::InvalidRequest(
                "top_p must be between 0 and 1".into(),
            ));
        }
        if self.max_tokens < 1 {
            return Err(CostwiseError::InvalidRequest(
                "max_tokens must be at least 1".into(),
            ));
        }
        if self.top_k < 1 {
            return Err(CostwiseError::InvalidRequest(
                "top_k must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Metadata for request tracking and cost attribution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMetadata {
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub feature_name: Option<String>,
    pub experiment_id: Option<String>,
    pub application: String,
    pub environment: String,
    pub custom_tags: BTreeMap<String, String>,
}

impl RequestMetadata {
    pub fn new() -> Self {
        Self {
            application: "default".into(),
            environment: "production".into(),
            ..Self::default()
        }
    }
}

/// Complete inference request.
///
/// Immutable once built. Construct through [`InferenceRequest::builder`],
/// which enforces the validation invariants (non-empty input, parameter
/// ranges) so invalid requests never reach the caches or the batcher.
#[derive(Debug, Clone)]
pub struct InferenceRequest {
    pub id: Uuid,
    pub prompt: String,
    pub messages: Vec<ChatMessage>,
    pub parameters: GenerationParameters,
    pub priority: Priority,
    pub metadata: RequestMetadata,
    pub use_cache: bool,
    pub cache_ttl_seconds: Option<u64>,
    pub preferred_model: Option<String>,
    pub created_at: Instant,
}

impl InferenceRequest {
    pub fn builder() -> InferenceRequestBuilder {
        InferenceRequestBuilder::new()
    }

    /// The textual content of the request — the prompt, or the joined
    /// message contents for chat-shaped requests.
    pub fn text(&self) -> String {
        if !self.prompt.is_empty() {
            self.prompt.clone()
        } else {
            self.messages
                .iter()
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        }
    }

    /// Rough input token estimate: one token per four characters, min 1.
    pub fn estimated_input_tokens(&self) -> u32 {
        ((self.text().len() / 4).max(1)) as u32
    }

    /// Cache key: SHA-256 over `content ‖ "_" ‖ temperature ‖ "_" ‖ max_tokens`.
    pub fn cache_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.text().as_bytes());
        hasher.update(b"_");
        hasher.update(self.parameters.temperature.to_string().as_bytes());
        hasher.update(b"_");
        hasher.update(self.parameters.max_tokens.to_string().as_bytes());
        hex_digest(&hasher.finalize())
    }

    /// Milliseconds since the request was created.
    pub fn age_ms(&self) -> u64 {
        self.created_at.elapsed().as_millis() as u64
    }
}

fn hex_digest(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

/// First 16 hex characters of the SHA-256 of `text`.
///
/// Shared between the composite cache key and the prefix cache.
pub(crate) fn short_hash(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    let mut out = hex_digest(&digest);
    out.truncate(16);
    out
}

/// Builder for [`InferenceRequest`].
///
/// ```rust
/// # use costwise::{InferenceRequest, Priority};
/// let request = InferenceRequest::builder()
///     .prompt("What is the capital of France?")
///     .priority(Priority::Express)
///     .build()
///     .unwrap();
/// assert!(request.use_cache);
/// ```
#[derive(Debug, Clone)]
pub struct InferenceRequestBuilder {
    prompt: String,
    messages: Vec<ChatMessage>,
    parameters: GenerationParameters,
    priority: Priority,
    metadata: RequestMetadata,
    use_cache: bool,
    cache_ttl_seconds: Option<u64>,
    preferred_model: Option<String>,
}

impl InferenceRequestBuilder {
    pub fn new() -> Self {
        Self {
            prompt: String::new(),
            messages: Vec::new(),
            parameters: GenerationParameters::default(),
            priority: Priority::Standard,
            metadata: RequestMetadata::new(),
            use_cache: true,
            cache_ttl_seconds: None,
            preferred_model: None,
        }
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn message(mut self, role: impl Into<String>, content: impl Into<String>) -> Self {
        self.messages.push(ChatMessage::new(role, content));
        self
    }

    pub fn parameters(mut self, parameters: GenerationParameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.parameters.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.parameters.max_tokens = max_tokens;
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn metadata(mut self, metadata: RequestMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.metadata.user_id = Some(user_id.into());
        self
    }

    pub fn feature(mut self, feature_name: impl Into<String>) -> Self {
        self.metadata.feature_name = Some(feature_name.into());
        self
    }

    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    pub fn cache_ttl_seconds(mut self, ttl: u64) -> Self {
        self.cache_ttl_seconds = Some(ttl);
        self
    }

    pub fn preferred_model(mut self, model: impl Into<String>) -> Self {
        self.preferred_model = Some(model.into());
        self
    }

    /// Validate and build the request.
    ///
    /// Returns `InvalidRequest` when both prompt and messages are empty or
    /// a generation parameter is out of range.
    pub fn build(self) -> Result<InferenceRequest> {
        if self.prompt.is_empty() && self.messages.is_empty() {
            return Err(CostwiseError::InvalidRequest(
                "either prompt or messages must be provided".into(),
            ));
        }
        self.parameters.validate()?;
        Ok(InferenceRequest {
            id: Uuid::new_v4(),
            prompt: self.prompt,
            messages: self.messages,
            parameters: self.parameters,
            priority: self.priority,
            metadata: self.metadata,
            use_cache: self.use_cache,
            cache_ttl_seconds: self.cache_ttl_seconds,
            preferred_model: self.preferred_model,
            created_at: Instant::now(),
        })
    }
}

impl Default for InferenceRequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_ordering() {
        assert!(Priority::Express > Priority::Standard);
        assert!(Priority::Standard > Priority::Batch);
    }

    #[test]
    fn build_requires_content() {
        let err = InferenceRequest::builder().build().unwrap_err();
        assert!(matches!(err, CostwiseError::InvalidRequest(_)));
    }

    #[test]
    fn build_rejects_bad_temperature() {
        let err = InferenceRequest::builder()
            .prompt("hi")
            .temperature(2.5)
            .build()
            .unwrap_err();
        assert!(matches!(err, CostwiseError::InvalidRequest(_)));
    }

    #[test]
    fn build_rejects_zero_max_tokens() {
        let err = InferenceRequest::builder()
            .prompt("hi")
            .max_tokens(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, CostwiseError::InvalidRequest(_)));
    }

    #[test]
    fn cache_key_is_deterministic_and_parameter_sensitive() {
        let a = InferenceRequest::builder()
            .prompt("What is 2+2?")
            .temperature(0.7)
            .max_tokens(50)
            .build()
            .unwrap();
        let b = InferenceRequest::builder()
            .prompt("What is 2+2?")
            .temperature(0.7)
            .max_tokens(50)
            .build()
            .unwrap();
        let c = InferenceRequest::builder()
            .prompt("What is 2+2?")
            .temperature(0.9)
            .max_tokens(50)
            .build()
            .unwrap();
        assert_eq!(a.cache_key(), b.cache_key());
        assert_ne!(a.cache_key(), c.cache_key());
    }

    #[test]
    fn messages_feed_text_and_tokens() {
        let request = InferenceRequest::builder()
            .message("system", "You are terse.")
            .message("user", "Hello there")
            .build()
            .unwrap();
        assert_eq!(request.text(), "You are terse. Hello there");
        assert!(request.estimated_input_tokens() >= 1);
    }
}
