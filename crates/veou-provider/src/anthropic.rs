use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::{ContentBlock, LlmProvider, LlmRequest, LlmResponse, ProviderError};

pub const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const DEFAULT_API_BASE: &str = "https://api.anthropic.com";

#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
    timeout: Duration,
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self::with_timeout(api_key, api_base, Duration::from_secs(60))
    }

    pub fn with_timeout(
        api_key: impl Into<String>,
        api_base: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    pub(crate) fn to_api_request(request: LlmRequest) -> ApiRequest {
        ApiRequest {
            model: request.model,
            max_tokens: request.max_tokens,
            messages: request
                .messages
                .into_iter()
                .map(|m| ApiMessage {
                    role: m.role,
                    content: m.content,
                })
                .collect(),
        }
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn chat(&self, request: LlmRequest) -> Result<LlmResponse, ProviderError> {
        if self.api_key.trim().is_empty() {
            return Err(ProviderError::MissingCredential);
        }

        let url = format!("{}/v1/messages", self.api_base);
        let payload = Self::to_api_request(request);
        let body = serde_json::to_vec(&payload)
            .map_err(|e| ProviderError::InvalidRequest(e.to_string()))?;

        let req = self
            .client
            .post(url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .body(body);

        let resp = match req.send().await {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                return Err(ProviderError::Transport(format!(
                    "request timed out after {}s",
                    self.timeout.as_secs()
                )));
            }
            Err(e) if e.is_builder() => {
                return Err(ProviderError::InvalidRequest(e.to_string()));
            }
            Err(e) => return Err(ProviderError::Transport(e.to_string())),
        };

        let status = resp.status();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        if !status.is_success() {
            tracing::warn!(
                status = status.as_u16(),
                body = %String::from_utf8_lossy(&bytes),
                "anthropic api returned an error"
            );
            return Err(classify_error(status, &bytes));
        }

        let body: ApiResponse = serde_json::from_slice(&bytes)
            .map_err(|e| ProviderError::Decoding(e.to_string()))?;

        let content = body
            .content
            .into_iter()
            .map(|block| match (block.block_type.as_str(), block.text) {
                ("text", Some(text)) => ContentBlock::Text { text },
                _ => ContentBlock::Other {
                    block_type: block.block_type,
                },
            })
            .collect();

        Ok(LlmResponse {
            content,
            input_tokens: body.usage.as_ref().map(|u| u.input_tokens),
            output_tokens: body.usage.as_ref().map(|u| u.output_tokens),
            stop_reason: body.stop_reason,
        })
    }
}

/// Provider message when the body carries one, `"{type}: Unknown error"` when
/// only the type is present, bare status otherwise.
fn classify_error(status: StatusCode, body: &[u8]) -> ProviderError {
    let status = status.as_u16();
    let detail = serde_json::from_slice::<ApiError>(body)
        .ok()
        .and_then(|e| e.error);

    match detail {
        Some(ApiErrorDetail {
            message: Some(message),
            ..
        }) => ProviderError::Api { status, message },
        Some(ApiErrorDetail {
            r#type: Some(kind),
            message: None,
        }) => ProviderError::Api {
            status,
            message: format!("{kind}: Unknown error"),
        },
        _ => ProviderError::Http(status),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ApiRequest {
    pub model: String,
    pub max_tokens: u32,
    pub messages: Vec<ApiMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ApiMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ApiResponse {
    pub content: Vec<ApiContentBlock>,
    #[serde(default)]
    pub usage: Option<ApiUsage>,
    #[serde(default)]
    pub stop_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ApiContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ApiUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ApiError {
    #[serde(default)]
    pub error: Option<ApiErrorDetail>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ApiErrorDetail {
    #[serde(rename = "type", default)]
    pub r#type: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LlmMessage;

    #[test]
    fn anthropic_new_trims_trailing_slash() {
        let provider = AnthropicProvider::new("test-key", "https://api.anthropic.com/");

        assert_eq!(provider.api_key, "test-key");
        assert_eq!(provider.api_base, "https://api.anthropic.com");
        assert_eq!(provider.timeout, Duration::from_secs(60));
    }

    #[test]
    fn api_request_serialization_matches_expected_shape() {
        let req = LlmRequest {
            model: "claude-3-5-sonnet-20241022".to_string(),
            max_tokens: 1024,
            messages: vec![LlmMessage::user("hello")],
        };
        let api_req = AnthropicProvider::to_api_request(req);

        let value = serde_json::to_value(api_req).unwrap();
        let expected = serde_json::json!({
            "model": "claude-3-5-sonnet-20241022",
            "max_tokens": 1024,
            "messages": [
                { "role": "user", "content": "hello" }
            ]
        });

        assert_eq!(value, expected);
    }

    #[test]
    fn api_response_deserialization_works() {
        let raw = serde_json::json!({
            "content": [
                {"type": "text", "text": "line 1"},
                {"type": "text", "text": "line 2"}
            ],
            "usage": {"input_tokens": 12, "output_tokens": 34},
            "stop_reason": "end_turn"
        });

        let parsed: ApiResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(parsed.content.len(), 2);
        assert_eq!(parsed.content[0].text.as_deref(), Some("line 1"));
        assert_eq!(parsed.usage.as_ref().map(|u| u.input_tokens), Some(12));
        assert_eq!(parsed.stop_reason.as_deref(), Some("end_turn"));
    }

    #[test]
    fn classify_error_prefers_provider_message() {
        let body = serde_json::json!({
            "type": "error",
            "error": {
                "type": "invalid_request_error",
                "message": "messages: field required"
            }
        })
        .to_string();

        let err = classify_error(StatusCode::BAD_REQUEST, body.as_bytes());
        assert_eq!(
            err,
            ProviderError::Api {
                status: 400,
                message: "messages: field required".into()
            }
        );
    }

    #[test]
    fn classify_error_falls_back_to_type() {
        let body = r#"{"error": {"type": "overloaded_error"}}"#;
        let err = classify_error(StatusCode::SERVICE_UNAVAILABLE, body.as_bytes());
        assert_eq!(
            err,
            ProviderError::Api {
                status: 503,
                message: "overloaded_error: Unknown error".into()
            }
        );
    }

    #[test]
    fn classify_error_without_parsable_body() {
        let err = classify_error(StatusCode::BAD_GATEWAY, b"<html>bad gateway</html>");
        assert_eq!(err, ProviderError::Http(502));

        let err = classify_error(StatusCode::NOT_FOUND, b"{}");
        assert_eq!(err, ProviderError::Http(404));
    }

    #[tokio::test]
    async fn empty_api_key_fails_before_network() {
        // Port 9 is discard; nothing should be sent anyway.
        let provider = AnthropicProvider::new("  ", "http://127.0.0.1:9");
        let err = provider
            .chat(LlmRequest::simple("m", 16, "ping"))
            .await
            .unwrap_err();
        assert_eq!(err, ProviderError::MissingCredential);
    }

    #[tokio::test]
    #[ignore]
    async fn integration_real_api_call() {
        let api_key = match std::env::var("ANTHROPIC_API_KEY") {
            Ok(api_key) if !api_key.is_empty() => api_key,
            _ => return,
        };
        let provider = AnthropicProvider::new(api_key, DEFAULT_API_BASE);

        let request = LlmRequest::simple(
            "claude-3-5-haiku-latest",
            32,
            "Reply with exactly: pong",
        );

        let response = provider.chat(request).await.unwrap();
        assert!(response.first_text().is_some());
    }
}
