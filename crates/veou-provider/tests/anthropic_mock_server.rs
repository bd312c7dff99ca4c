use veou_provider::{AnthropicProvider, LlmProvider, LlmRequest, ProviderError};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn mock_text_response(text: &str) -> serde_json::Value {
    serde_json::json!({
        "content": [{"type": "text", "text": text}],
        "usage": {"input_tokens": 10, "output_tokens": 5},
        "stop_reason": "end_turn"
    })
}

#[tokio::test]
async fn chat_sends_expected_headers_and_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "test-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(header("content-type", "application/json"))
        .and(body_json(serde_json::json!({
            "model": "claude-3-5-sonnet-20241022",
            "max_tokens": 1024,
            "messages": [{"role": "user", "content": "summarize please"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(mock_text_response("{}")))
        .expect(1)
        .mount(&server)
        .await;

    let provider = AnthropicProvider::new("test-key", server.uri());
    let resp = provider
        .chat(LlmRequest::simple(
            "claude-3-5-sonnet-20241022",
            1024,
            "summarize please",
        ))
        .await
        .unwrap();

    assert_eq!(resp.first_text(), Some("{}"));
    assert_eq!(resp.input_tokens, Some(10));
    assert_eq!(resp.output_tokens, Some(5));
    assert_eq!(resp.stop_reason.as_deref(), Some("end_turn"));
}

#[tokio::test]
async fn non_success_with_message_maps_to_api_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "type": "error",
            "error": {"type": "authentication_error", "message": "invalid x-api-key"}
        })))
        .mount(&server)
        .await;

    let provider = AnthropicProvider::new("bad-key", server.uri());
    let err = provider
        .chat(LlmRequest::simple("m", 16, "hi"))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        ProviderError::Api {
            status: 401,
            message: "invalid x-api-key".into()
        }
    );
    assert_eq!(err.to_string(), "API error: invalid x-api-key");
}

#[tokio::test]
async fn non_success_without_body_maps_to_http_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&server)
        .await;

    let provider = AnthropicProvider::new("test-key", server.uri());
    let err = provider
        .chat(LlmRequest::simple("m", 16, "hi"))
        .await
        .unwrap_err();

    assert_eq!(err, ProviderError::Http(500));
}

#[tokio::test]
async fn malformed_success_body_is_decoding_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"unexpected": true})),
        )
        .mount(&server)
        .await;

    let provider = AnthropicProvider::new("test-key", server.uri());
    let err = provider
        .chat(LlmRequest::simple("m", 16, "hi"))
        .await
        .unwrap_err();

    assert!(matches!(err, ProviderError::Decoding(_)), "got {err:?}");
}

#[tokio::test]
async fn slow_endpoint_times_out_as_transport_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(mock_text_response("late"))
                .set_delay(std::time::Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let provider = AnthropicProvider::with_timeout(
        "test-key",
        server.uri(),
        std::time::Duration::from_millis(50),
    );
    let err = provider
        .chat(LlmRequest::simple("m", 16, "hi"))
        .await
        .unwrap_err();

    assert!(matches!(err, ProviderError::Transport(_)), "got {err:?}");
}
