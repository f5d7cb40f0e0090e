//! HTTP model client for OpenAI-compatible chat-completions endpoints.

use async_trait::async_trait;
use base64::Engine;
use serde_json::json;
use std::time::Duration;

use super::model::{ModelClient, ModelError, ModelRequest, ModelResponse};

/// Longest error body kept in [`ModelError::Status`].
const MAX_ERROR_BODY: usize = 512;

/// Chat-completions client.
pub struct HttpModelClient {
    base_url: String,
    api_key: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpModelClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpModelClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl HttpModelClient {
    /// Create a client for `base_url` (e.g. `https://api.openai.com/v1`).
    ///
    /// `timeout` bounds the whole HTTP exchange.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ModelError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ModelError::Transport(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            timeout,
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

/// Build the chat-completions request body.
pub(crate) fn request_body(request: &ModelRequest) -> serde_json::Value {
    let content = match &request.image {
        Some(image) => {
            let encoded = base64::engine::general_purpose::STANDARD.encode(&image.bytes);
            json!([
                { "type": "text", "text": request.instruction },
                {
                    "type": "image_url",
                    "image_url": { "url": format!("data:{};base64,{}", image.mime_type, encoded) }
                }
            ])
        }
        None => json!(request.instruction),
    };

    json!({
        "model": request.model,
        "messages": [{ "role": "user", "content": content }],
        "temperature": request.temperature,
        "max_tokens": request.max_tokens,
    })
}

#[async_trait]
impl ModelClient for HttpModelClient {
    async fn invoke(&self, request: &ModelRequest) -> Result<ModelResponse, ModelError> {
        log::debug!(
            "POST {} model={} image={}",
            self.endpoint(),
            request.model,
            request.image.is_some()
        );

        let resp = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&request_body(request))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ModelError::Timeout(self.timeout)
                } else {
                    ModelError::Transport(e.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let mut body = resp.text().await.unwrap_or_default();
            body.truncate(
                body.char_indices()
                    .nth(MAX_ERROR_BODY)
                    .map_or(body.len(), |(i, _)| i),
            );
            return Err(ModelError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ModelError::Transport(e.to_string()))?;

        let text = json
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
            .ok_or(ModelError::EmptyResponse)?;

        Ok(ModelResponse::new(text))
    }

    fn provider_name(&self) -> &'static str {
        "openai-compatible"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::model::ImagePayload;

    fn request(image: Option<ImagePayload>) -> ModelRequest {
        ModelRequest {
            model: "vision-small".to_string(),
            instruction: "Describe".to_string(),
            image,
            temperature: 0.0,
            max_tokens: 100,
        }
    }

    #[test]
    fn test_text_only_body() {
        let body = request_body(&request(None));
        assert_eq!(body["model"], "vision-small");
        assert_eq!(body["messages"][0]["content"], "Describe");
        assert_eq!(body["max_tokens"], 100);
    }

    #[test]
    fn test_image_body_uses_data_url() {
        let body = request_body(&request(Some(ImagePayload {
            mime_type: "image/png".to_string(),
            bytes: vec![1, 2, 3],
        })));
        let parts = &body["messages"][0]["content"];
        assert_eq!(parts[0]["text"], "Describe");
        assert_eq!(parts[1]["image_url"]["url"], "data:image/png;base64,AQID");
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client =
            HttpModelClient::new("https://example.test/v1/", "k", Duration::from_secs(1)).unwrap();
        assert_eq!(client.endpoint(), "https://example.test/v1/chat/completions");
        assert!(!format!("{:?}", client).contains("\"k\""));
    }
}
