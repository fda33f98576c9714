use std::time::Duration;

use row_audit::llm::chat::build_http_client;
use row_audit::llm::{ChatCompletionClient, GenerationRequest, LlmProvider, Message};
use row_audit::LlmError;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> ChatCompletionClient {
    let http = build_http_client(Duration::from_secs(5)).unwrap();
    ChatCompletionClient::new(http, server.uri(), "llama-test", Some("gsk-test".to_string()))
}

fn request() -> GenerationRequest {
    GenerationRequest::new(vec![
        Message::system("You are a data quality expert."),
        Message::user("source: Hello"),
    ])
}

#[tokio::test]
async fn chat_client_parses_content_and_usage() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer gsk-test"))
        .and(body_partial_json(json!({
            "model": "llama-test",
            "messages": [
                { "role": "system", "content": "You are a data quality expert." },
                { "role": "user", "content": "source: Hello" }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "llama-test",
            "choices": [{
                "message": { "role": "assistant", "content": "{\"issues\": [\"none\"], \"bias\": [\"none\"]}" },
                "finish_reason": "stop"
            }],
            "usage": { "prompt_tokens": 12, "completion_tokens": 9, "total_tokens": 21 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let resp = client(&server).generate(request()).await.unwrap();
    assert_eq!(resp.content, r#"{"issues": ["none"], "bias": ["none"]}"#);
    assert_eq!(resp.model, "llama-test");
    let usage = resp.usage.unwrap();
    assert_eq!(usage.prompt_tokens, 12);
    assert_eq!(usage.total_tokens, 21);
}

#[tokio::test]
async fn chat_client_sends_sampling_options() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({ "temperature": 0.0, "max_tokens": 128 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "content": "ok" } }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let resp = client(&server)
        .generate(request().with_temperature(0.0).with_max_tokens(128))
        .await
        .unwrap();
    assert_eq!(resp.content, "ok");
    // Falls back to the configured model when the response omits it.
    assert_eq!(resp.model, "llama-test");
}

#[tokio::test]
async fn chat_client_maps_429_to_rate_limited() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": { "message": "Rate limit reached for model llama-test", "code": "rate_limit_exceeded" }
        })))
        .mount(&server)
        .await;

    let err = client(&server).generate(request()).await.unwrap_err();
    match &err {
        LlmError::RateLimited(message) => {
            assert!(message.contains("Rate limit reached"));
            assert!(message.contains("rate_limit_exceeded"));
        }
        other => panic!("expected RateLimited, got {:?}", other),
    }
    assert!(err.is_rate_limited());
}

#[tokio::test]
async fn chat_client_detects_resource_exhausted_marker() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED" }
        })))
        .mount(&server)
        .await;

    let err = client(&server).generate(request()).await.unwrap_err();
    assert!(matches!(err, LlmError::ApiError { code: 400, .. }));
    assert!(err.is_rate_limited());
}

#[tokio::test]
async fn chat_client_server_error_is_not_rate_limited() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&server)
        .await;

    let err = client(&server).generate(request()).await.unwrap_err();
    match &err {
        LlmError::ApiError { code, message } => {
            assert_eq!(*code, 500);
            assert_eq!(message, "upstream exploded");
        }
        other => panic!("expected ApiError, got {:?}", other),
    }
    assert!(!err.is_rate_limited());
}

#[tokio::test]
async fn chat_client_empty_choices_is_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
        .mount(&server)
        .await;

    let err = client(&server).generate(request()).await.unwrap_err();
    assert!(matches!(err, LlmError::EmptyResponse));
}
