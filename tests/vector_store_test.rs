//! Wiremock integration tests for the vector store client.

use std::time::Duration;

use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use callsift::{CallRecord, CallsiftError, SearchFilters, VectorStoreClient};

fn client_for(server: &MockServer) -> VectorStoreClient {
    VectorStoreClient::with_base_url(server.uri(), Duration::from_secs(5))
}

fn record(call_id: &str) -> CallRecord {
    CallRecord {
        call_id: call_id.to_string(),
        customer_id: Some("cust-1".to_string()),
        transcription_text: "שלום, יש לי בעיה עם האינטרנט".to_string(),
        language: "he".to_string(),
        ..CallRecord::default()
    }
}

/// Mount a schema that already exists, so inserts skip creation.
async fn mount_existing_schema(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/v1/schema/CallTranscription"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "class": "CallTranscription"
        })))
        .mount(server)
        .await;
}

// ============================================================================
// Schema bootstrap
// ============================================================================

#[tokio::test]
async fn ensure_schema_is_idempotent_when_present() {
    let server = MockServer::start().await;
    mount_existing_schema(&server).await;
    // Creation must never be attempted.
    Mock::given(method("POST"))
        .and(path("/v1/schema"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_for(&server);
    client.ensure_schema().await.expect("existing schema is ok");
}

#[tokio::test]
async fn ensure_schema_creates_the_collection_when_missing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/schema/CallTranscription"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/schema"))
        .and(body_string_contains("CallTranscription"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    client.ensure_schema().await.expect("schema creation should succeed");
}

// ============================================================================
// Insert & retry
// ============================================================================

#[tokio::test]
async fn insert_maps_the_record_to_store_properties() {
    let server = MockServer::start().await;
    mount_existing_schema(&server).await;
    Mock::given(method("POST"))
        .and(path("/v1/objects"))
        .and(body_string_contains("\"callId\":\"c-1\""))
        .and(body_string_contains("\"class\":\"CallTranscription\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    client.insert(&record("c-1")).await.expect("insert should succeed");
}

#[tokio::test]
async fn insert_retries_transient_failures_then_succeeds() {
    let server = MockServer::start().await;
    mount_existing_schema(&server).await;
    // First two attempts hit a transient 503, the third lands.
    Mock::given(method("POST"))
        .and(path("/v1/objects"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/objects"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    client
        .insert(&record("c-2"))
        .await
        .expect("third attempt should succeed");
}

#[tokio::test]
async fn insert_gives_up_after_three_transient_failures() {
    let server = MockServer::start().await;
    mount_existing_schema(&server).await;
    Mock::given(method("POST"))
        .and(path("/v1/objects"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.insert(&record("c-3")).await.unwrap_err();
    assert!(matches!(
        err,
        CallsiftError::BackendError { status: 503, .. }
    ));
}

#[tokio::test]
async fn permanent_failures_are_not_retried() {
    let server = MockServer::start().await;
    mount_existing_schema(&server).await;
    Mock::given(method("POST"))
        .and(path("/v1/objects"))
        .respond_with(ResponseTemplate::new(422).set_body_string("bad payload"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.insert(&record("c-4")).await.unwrap_err();
    assert!(matches!(
        err,
        CallsiftError::BackendError { status: 422, .. }
    ));
}

#[tokio::test]
async fn batch_insert_reports_per_item_counts() {
    let server = MockServer::start().await;
    mount_existing_schema(&server).await;
    Mock::given(method("POST"))
        .and(path("/v1/batch/objects"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            { "result": { "status": "SUCCESS" } },
            { "result": { "status": "FAILED", "errors": ["bad date"] } },
            { "result": { "status": "SUCCESS" } },
        ])))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let report = client
        .batch_insert(&[record("a"), record("b"), record("c")])
        .await
        .expect("batch insert should succeed");

    assert_eq!(report.total, 3);
    assert_eq!(report.successful, 2);
    assert_eq!(report.errors, 1);
}

// ============================================================================
// Semantic search
// ============================================================================

#[tokio::test]
async fn semantic_search_parses_hits_with_scores() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/graphql"))
        .and(body_string_contains("nearText"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": { "Get": { "CallTranscription": [
                {
                    "callId": "c-9",
                    "customerId": "cust-1",
                    "transcriptionText": "בעיה באינטרנט",
                    "language": "he",
                    "_additional": { "certainty": 0.91, "distance": 0.09 }
                }
            ] } }
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let hits = client
        .semantic_search("בעיית אינטרנט", Some("cust-1"), 10, 0.7, None)
        .await
        .expect("search should succeed");

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].record.call_id, "c-9");
    assert!((hits[0].certainty - 0.91).abs() < 1e-9);
    assert!((hits[0].distance - 0.09).abs() < 1e-9);
}

#[tokio::test]
async fn customer_scoping_and_filters_appear_in_the_query() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/graphql"))
        .and(body_string_contains("customerId"))
        .and(body_string_contains("language"))
        .and(body_string_contains("operator: And"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": { "Get": { "CallTranscription": [] } }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let filters = SearchFilters {
        language: Some("he".to_string()),
        ..SearchFilters::default()
    };
    let hits = client
        .semantic_search("query", Some("cust-1"), 5, 0.8, Some(&filters))
        .await
        .unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn graphql_errors_surface_as_backend_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "errors": [{ "message": "invalid filter" }]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client
        .semantic_search("query", None, 10, 0.7, None)
        .await
        .unwrap_err();
    match err {
        CallsiftError::BackendError { message, .. } => {
            assert!(message.contains("invalid filter"));
        }
        other => panic!("expected BackendError, got {other:?}"),
    }
}

// ============================================================================
// Lookup & stats
// ============================================================================

#[tokio::test]
async fn get_by_call_id_returns_the_record() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/graphql"))
        .and(body_string_contains("callId"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": { "Get": { "CallTranscription": [
                { "callId": "c-5", "transcriptionText": "text", "language": "he" }
            ] } }
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let found = client.get_by_call_id("c-5", None).await.unwrap();
    assert_eq!(found.unwrap().call_id, "c-5");
}

#[tokio::test]
async fn get_stats_reports_counts_when_connected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/objects"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "totalResults": 1234 })),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/schema"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "classes": [{ "class": "CallTranscription" }]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let stats = client.get_stats().await;
    assert!(stats.connected);
    assert_eq!(stats.total_objects, 1234);
    assert_eq!(stats.collections, vec!["CallTranscription".to_string()]);
}

#[tokio::test]
async fn get_stats_never_fails_when_the_store_is_down() {
    // Nothing listens here.
    let client = VectorStoreClient::with_base_url("http://127.0.0.1:9", Duration::from_millis(300));
    let stats = client.get_stats().await;
    assert!(!stats.connected);
    assert_eq!(stats.total_objects, 0);
    assert!(stats.error.is_some());
}

#[tokio::test]
async fn health_check_reflects_the_meta_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/meta"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let client = client_for(&server);
    assert!(client.health_check().await);

    let down = VectorStoreClient::with_base_url("http://127.0.0.1:9", Duration::from_millis(300));
    assert!(!down.health_check().await);
}
