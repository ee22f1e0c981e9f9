//! Wiremock integration tests for the remote LLM adapter.

use std::time::Duration;

use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use callsift::providers::{LlmProvider, RemoteLlmClient, RemoteLlmConfig};
use callsift::{CallsiftError, InferenceRequest};

fn client_for(server: &MockServer) -> RemoteLlmClient {
    RemoteLlmClient::new(
        RemoteLlmConfig::new(server.uri(), "big-hosted-model", "test-token")
            .timeout(Duration::from_secs(5)),
    )
}

#[tokio::test]
async fn generate_formats_the_chat_template_and_parses_the_reply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .and(header("Authorization", "Bearer test-token"))
        .and(body_string_contains("<|begin_of_text|>"))
        .and(body_string_contains("analyze the call"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            { "generated_text": "a useful analysis" }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let request = InferenceRequest::new("analyze the call").system_prompt("You analyze calls.");
    let response = client
        .generate(&request, "ignored")
        .await
        .expect("generate should succeed");

    assert_eq!(response.content, "a useful analysis");
    assert_eq!(response.model, "big-hosted-model");
    assert_eq!(response.tokens_used, 3); // approximated by word count
}

#[tokio::test]
async fn unwrapped_object_response_is_also_accepted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "generated_text": "bare object" })),
        )
        .mount(&server)
        .await;

    let client = client_for(&server);
    let response = client
        .generate(&InferenceRequest::new("q"), "ignored")
        .await
        .unwrap();
    assert_eq!(response.content, "bare object");
}

#[tokio::test]
async fn hebrew_prompt_carries_the_hebrew_directive() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_string_contains("Respond in Hebrew"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            { "generated_text": "תשובה בעברית" }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    client
        .generate(&InferenceRequest::new("מה מצב החשבון שלי"), "ignored")
        .await
        .expect("generate should succeed");
}

#[tokio::test]
async fn control_token_artifacts_are_stripped() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            { "generated_text": "clean answer<|eot_id|>" }
        ])))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let response = client
        .generate(&InferenceRequest::new("q"), "ignored")
        .await
        .unwrap();
    assert_eq!(response.content, "clean answer");
}

#[tokio::test]
async fn auth_failure_maps_to_backend_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client
        .generate(&InferenceRequest::new("q"), "ignored")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CallsiftError::BackendError { status: 401, .. }
    ));
}

#[tokio::test]
async fn malformed_payload_is_a_backend_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "unexpected": true })),
        )
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client
        .generate(&InferenceRequest::new("q"), "ignored")
        .await
        .unwrap_err();

    match err {
        CallsiftError::BackendError { message, .. } => {
            assert!(message.contains("unexpected response shape"));
        }
        other => panic!("expected BackendError, got {other:?}"),
    }
}

#[tokio::test]
async fn slow_endpoint_times_out_as_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!([{ "generated_text": "late" }]))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let client = RemoteLlmClient::new(
        RemoteLlmConfig::new(server.uri(), "model", "token").timeout(Duration::from_millis(100)),
    );
    let err = client
        .generate(&InferenceRequest::new("q"), "ignored")
        .await
        .unwrap_err();

    assert!(err.is_unavailable(), "timeout must read as unavailability, got {err:?}");
}

#[tokio::test]
async fn health_check_posts_a_minimal_generation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_string_contains("\"max_new_tokens\":1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!([{ "generated_text": "." }])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    assert!(client.health_check().await);
}
