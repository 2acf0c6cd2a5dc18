/// End-to-end dispatch tests against a mock completion endpoint

use budget_core::context::TokenCounter;
use budget_core::dispatch::{CompletionDispatcher, DispatchStatus, FailureKind, OpenAiClient, TokenUsage};
use budget_core::{Conversation, ModelRegistry};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn dispatcher(server: &MockServer) -> CompletionDispatcher {
    let client = OpenAiClient::new("sk-test").with_base_url(server.uri());
    CompletionDispatcher::new(
        Arc::new(ModelRegistry::new()),
        Arc::new(TokenCounter::new()),
        Arc::new(client),
    )
    .with_model("gpt-4o")
}

fn conversation() -> Conversation {
    let mut conversation = Conversation::with_id("chat-42");
    conversation.push_user("Hello!").unwrap();
    conversation
}

#[tokio::test]
async fn test_success_with_usage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-4o",
            "temperature": 0.7,
            "max_tokens": 1000,
            "messages": [{"role": "user", "content": "Hello!"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-test",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "hi"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut conversation = conversation();
    let outcome = dispatcher(&server).dispatch(&mut conversation).await;

    assert_eq!(outcome.status, DispatchStatus::Succeeded);
    assert_eq!(outcome.content, "hi");
    assert_eq!(
        outcome.usage,
        Some(TokenUsage { input_tokens: 12, output_tokens: 3, total_tokens: 15 })
    );
    assert_eq!(conversation.model_used(), Some("gpt-4o"));
}

#[tokio::test]
async fn test_success_without_usage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "hi"}}]
        })))
        .mount(&server)
        .await;

    let dispatcher = dispatcher(&server);
    let outcome = dispatcher.dispatch(&mut conversation()).await;

    assert_eq!(outcome.status, DispatchStatus::DegradedNoUsage);
    let usage = outcome.usage.unwrap();
    assert_eq!(usage.output_tokens, dispatcher.token_counter().count("hi", "gpt-4o"));
    assert_eq!(usage.total_tokens, usage.input_tokens + usage.output_tokens);
}

#[tokio::test]
async fn test_rate_limit_status_with_error_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {
                "message": "Rate limit reached for requests",
                "type": "rate_limit_exceeded",
                "param": null,
                "code": null
            }
        })))
        .mount(&server)
        .await;

    let outcome = dispatcher(&server).dispatch(&mut conversation()).await;

    assert_eq!(outcome.status, DispatchStatus::Rejected(FailureKind::RateLimited));
    assert!(outcome.usage.is_none());
}

#[tokio::test]
async fn test_context_length_error_code() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {
                "message": "This model's maximum context length is 128000 tokens.",
                "type": "invalid_request_error",
                "code": "context_length_exceeded"
            }
        })))
        .mount(&server)
        .await;

    let outcome = dispatcher(&server).dispatch(&mut conversation()).await;
    assert_eq!(outcome.status, DispatchStatus::Rejected(FailureKind::InvalidRequestLength));
}

#[tokio::test]
async fn test_unparseable_body_is_transport_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(502).set_body_string("<html>Bad Gateway</html>"))
        .mount(&server)
        .await;

    let mut conversation = conversation();
    let outcome = dispatcher(&server).dispatch(&mut conversation).await;

    assert_eq!(outcome.status, DispatchStatus::Failed(FailureKind::TransportFailure));
    assert!(outcome.usage.is_none());
    assert_eq!(conversation.model_used(), None);
}

#[tokio::test]
async fn test_slow_endpoint_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"choices": [{"message": {"content": "late"}}]}))
                .set_delay(std::time::Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let dispatcher = dispatcher(&server).with_timeout(std::time::Duration::from_millis(100));
    let outcome = dispatcher.dispatch(&mut conversation()).await;

    assert_eq!(outcome.status, DispatchStatus::Failed(FailureKind::TransportFailure));
}
