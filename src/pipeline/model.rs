//! Model invocation boundary.
//!
//! The pipeline talks to generative models only through [`ModelClient`].
//! Responses are plain text; callers must treat them as untrusted and parse
//! them explicitly.

use async_trait::async_trait;
use std::time::Duration;

/// An image attached to a model request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    /// MIME type, e.g. `image/jpeg`.
    pub mime_type: String,
    /// Encoded image bytes.
    pub bytes: Vec<u8>,
}

/// A single model call.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    /// Model identifier.
    pub model: String,
    /// Natural-language instruction.
    pub instruction: String,
    /// Optional image.
    pub image: Option<ImagePayload>,
    /// Sampling temperature (0 for deterministic output).
    pub temperature: f32,
    /// Maximum output tokens.
    pub max_tokens: u32,
}

/// Text returned by a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelResponse {
    pub text: String,
}

impl ModelResponse {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Transport-level failures of a model call.
#[derive(thiserror::Error, Debug)]
pub enum ModelError {
    /// The call did not finish in time.
    #[error("Model call timed out after {0:?}")]
    Timeout(Duration),

    /// The request could not be sent or the connection failed.
    #[error("Model transport error: {0}")]
    Transport(String),

    /// The service answered with a non-success status.
    #[error("Model service returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body (truncated)
        body: String,
    },

    /// The service answered but the envelope carried no text.
    #[error("Model response carried no content")]
    EmptyResponse,
}

/// A generative model endpoint.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Run one request and return the model's text.
    async fn invoke(&self, request: &ModelRequest) -> Result<ModelResponse, ModelError>;

    /// Short provider name for logs.
    fn provider_name(&self) -> &'static str;
}
