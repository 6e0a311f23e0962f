#![cfg(feature = "anthropic")]

use batch_gateway::{
    AnthropicProvider, BatchGateway, BatchProvider, BatchStatus, CallOptions, CreateBatchRequest,
    ErrorKind, ListParams, StaticCredential,
};
use display_error_chain::DisplayErrorChain;
use futures::TryStreamExt;
use httpmock::{
    Method::{GET, POST},
    MockServer,
};
use serde_json::json;
use std::{sync::Arc, time::Duration};

fn gateway(server: &MockServer) -> BatchGateway<AnthropicProvider> {
    let provider = AnthropicProvider::with_base_url(&server.base_url()).unwrap();
    BatchGateway::new(provider, Arc::new(StaticCredential::new("sk-ant-test")))
}

fn batch_json(id: &str, status: &str, counts: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "type": "message_batch",
        "processing_status": status,
        "request_counts": counts,
        "created_at": "2024-09-24T18:37:24.100435Z",
        "ended_at": null,
        "expires_at": "2024-09-25T18:37:24.100435Z",
        "cancel_initiated_at": null,
        "results_url": null,
    })
}

#[tokio::test]
async fn create_encodes_chat_lines_into_message_requests() {
    let server = MockServer::start_async().await;
    let create = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/messages/batches")
                .header("x-api-key", "sk-ant-test")
                .header("anthropic-version", "2023-06-01")
                .body_includes("\"custom_id\":\"r1\"")
                .body_includes("\"model\":\"claude-3-5-haiku-latest\"")
                .body_includes("\"max_tokens\":64")
                .body_includes("\"system\":\"Be brief.\"");
            then.status(200)
                .header("content-type", "application/json")
                .body(
                    batch_json(
                        "msgbatch_01",
                        "in_progress",
                        json!({"processing": 1, "succeeded": 0, "errored": 0, "canceled": 0, "expired": 0}),
                    )
                    .to_string(),
                );
        })
        .await;

    let jsonl = concat!(
        r#"{"custom_id": "r1", "method": "POST", "url": "/v1/chat/completions", "body": {"model": "claude-3-5-haiku-latest", "max_tokens": 64, "messages": [{"role": "system", "content": "Be brief."}, {"role": "user", "content": "hello"}]}}"#,
        "\n",
        "\n",
        "not json\n",
    );
    let batch = gateway(&server)
        .create_batch(CreateBatchRequest::inline(jsonl))
        .await
        .unwrap();

    create.assert_async().await;
    assert_eq!(batch.id, "msgbatch_01");
    assert_eq!(batch.status, BatchStatus::InProgress);
    assert_eq!(batch.endpoint, "/v1/messages");
    assert_eq!(batch.request_counts.total, 1);
    assert_eq!(batch.created_at, 1_727_203_044);
    assert!(batch.terminal_fields().iter().all(Option::is_none));
}

#[tokio::test]
async fn create_without_usable_lines_fails_before_sending() {
    let server = MockServer::start_async().await;
    let create = server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/messages/batches");
            then.status(200);
        })
        .await;

    let gateway = gateway(&server);
    let encoding = gateway
        .create_batch(CreateBatchRequest::inline(
            "{\"custom_id\": \"x\", \"body\": \"text\"}\n[1, 2]\n",
        ))
        .await
        .unwrap_err();
    assert_eq!(encoding.kind(), ErrorKind::EncodingFailed);

    let empty = gateway
        .create_batch(CreateBatchRequest::inline("  \n"))
        .await
        .unwrap_err();
    assert_eq!(empty.kind(), ErrorKind::InvalidRequest);

    create.assert_calls_async(0).await;
}

#[tokio::test]
async fn cancel_reads_the_batch_back() {
    let server = MockServer::start_async().await;
    let cancel = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/messages/batches/msgbatch_02/cancel");
            then.status(200)
                .header("content-type", "application/json")
                .body(batch_json("msgbatch_02", "in_progress", json!({})).to_string());
        })
        .await;
    let retrieve = server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/messages/batches/msgbatch_02");
            then.status(200)
                .header("content-type", "application/json")
                .body(
                    json!({
                        "id": "msgbatch_02",
                        "processing_status": "canceling",
                        "request_counts": {"processing": 5},
                        "created_at": "2024-01-01T00:00:00Z",
                        "cancel_initiated_at": "2024-01-01T00:30:00Z",
                    })
                    .to_string(),
                );
        })
        .await;

    let batch = gateway(&server).cancel_batch("msgbatch_02").await.unwrap();

    cancel.assert_async().await;
    retrieve.assert_async().await;
    assert_eq!(batch.status, BatchStatus::Cancelling);
    assert_eq!(batch.cancelling_at, Some(1_704_069_000));
    assert_eq!(batch.cancelled_at, None);
}

#[tokio::test]
async fn ended_batch_results_are_downloaded_with_credentials() {
    let server = MockServer::start_async().await;
    let results_url = server.url("/v1/messages/batches/msgbatch_03/results");
    let mut ended = batch_json(
        "msgbatch_03",
        "ended",
        json!({"processing": 0, "succeeded": 2, "errored": 0, "canceled": 0, "expired": 0}),
    );
    ended["ended_at"] = json!("2024-09-24T19:00:00Z");
    ended["results_url"] = json!(results_url);

    server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/messages/batches/msgbatch_03");
            then.status(200)
                .header("content-type", "application/json")
                .body(ended.to_string());
        })
        .await;
    let results = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/v1/messages/batches/msgbatch_03/results")
                .header("x-api-key", "sk-ant-test");
            then.status(200)
                .header("content-type", "application/binary")
                .body("{\"custom_id\":\"a\"}\n{\"custom_id\":\"b\"}\n");
        })
        .await;

    let handle = gateway(&server).get_batch("msgbatch_03");
    let batch = handle.status().await.unwrap();
    assert_eq!(batch.status, BatchStatus::Completed);
    assert_eq!(batch.completed_at, Some(1_727_204_400));
    assert_eq!(batch.output_file_id.as_deref(), Some(results_url.as_str()));

    let body = handle.results().await.unwrap();
    results.assert_async().await;
    assert_eq!(body.as_ref(), b"{\"custom_id\":\"a\"}\n{\"custom_id\":\"b\"}\n");
}

#[tokio::test]
async fn results_on_another_host_are_fetched_without_credentials() {
    let server = MockServer::start_async().await;
    let foreign = MockServer::start_async().await;
    let keyed = foreign
        .mock_async(|when, then| {
            when.method(GET)
                .path("/exfil")
                .header_exists("x-api-key");
            then.status(200).body("leaked");
        })
        .await;
    let plain = foreign
        .mock_async(|when, then| {
            when.method(GET).path("/exfil").header_missing("x-api-key");
            then.status(200).body("{\"custom_id\":\"a\"}\n");
        })
        .await;

    let gateway = gateway(&server);
    let body = gateway
        .result_locator()
        .locate_and_fetch(&foreign.url("/exfil"))
        .await
        .unwrap();
    assert_eq!(body.as_ref(), b"{\"custom_id\":\"a\"}\n");

    keyed.assert_calls_async(0).await;
    plain.assert_async().await;
}

#[tokio::test]
async fn results_of_unfinished_batch_are_not_found() {
    let server = MockServer::start_async().await;
    let gateway = gateway(&server);
    let batch = gateway
        .provider()
        .map_status(batch_json("msgbatch_04", "in_progress", json!({})), 0)
        .unwrap();
    let error = gateway.fetch_results(&batch).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::ResultsNotFound);
}

#[tokio::test]
async fn list_pages_follow_last_id() {
    let server = MockServer::start_async().await;
    let first = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/v1/messages/batches")
                .query_param("limit", "2")
                .query_param_missing("after_id");
            then.status(200)
                .header("content-type", "application/json")
                .body(
                    json!({
                        "data": [
                            batch_json("msgbatch_a", "in_progress", json!({})),
                            batch_json("msgbatch_b", "in_progress", json!({})),
                        ],
                        "has_more": true,
                        "first_id": "msgbatch_a",
                        "last_id": "msgbatch_b",
                    })
                    .to_string(),
                );
        })
        .await;
    let second = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/v1/messages/batches")
                .query_param("limit", "2")
                .query_param("after_id", "msgbatch_b");
            then.status(200)
                .header("content-type", "application/json")
                .body(
                    json!({
                        "data": [batch_json("msgbatch_c", "canceling", json!({}))],
                        "has_more": false,
                        "first_id": "msgbatch_c",
                        "last_id": "msgbatch_c",
                    })
                    .to_string(),
                );
        })
        .await;

    let gateway = gateway(&server);
    let page = gateway
        .list_batches(ListParams::default().with_limit(2))
        .await
        .unwrap();
    assert!(page.has_more);
    assert_eq!(page.next_page_token.as_deref(), Some("msgbatch_b"));

    let all: Vec<_> = gateway.list_all_batches(Some(2)).try_collect().await.unwrap();
    let ids: Vec<_> = all.iter().map(|batch| batch.id.as_str()).collect();
    assert_eq!(ids, ["msgbatch_a", "msgbatch_b", "msgbatch_c"]);

    first.assert_calls_async(2).await;
    second.assert_async().await;
}

#[tokio::test]
async fn list_all_stops_when_the_page_token_repeats() {
    let server = MockServer::start_async().await;
    let first = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/v1/messages/batches")
                .query_param_missing("after_id");
            then.status(200)
                .header("content-type", "application/json")
                .body(
                    json!({
                        "data": [batch_json("msgbatch_a", "in_progress", json!({}))],
                        "has_more": true,
                        "first_id": "msgbatch_a",
                        "last_id": "msgbatch_a",
                    })
                    .to_string(),
                );
        })
        .await;
    let stuck = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/v1/messages/batches")
                .query_param("after_id", "msgbatch_a");
            then.status(200)
                .header("content-type", "application/json")
                .body(
                    json!({
                        "data": [batch_json("msgbatch_b", "in_progress", json!({}))],
                        "has_more": true,
                        "first_id": "msgbatch_b",
                        "last_id": "msgbatch_a",
                    })
                    .to_string(),
                );
        })
        .await;

    let all: Vec<_> = gateway(&server)
        .list_all_batches(None)
        .try_collect()
        .await
        .unwrap();
    let ids: Vec<_> = all.iter().map(|batch| batch.id.as_str()).collect();
    assert_eq!(ids, ["msgbatch_a", "msgbatch_b"]);

    first.assert_async().await;
    stuck.assert_async().await;
}

#[tokio::test]
async fn vendor_errors_are_classified() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/messages/batches/msgbatch_missing");
            then.status(404)
                .header("content-type", "application/json")
                .body(
                    json!({"type": "error", "error": {"type": "not_found_error", "message": "batch not found"}})
                        .to_string(),
                );
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/messages/batches/msgbatch_busy");
            then.status(429).body("slow down");
        })
        .await;

    let gateway = gateway(&server);
    let missing = gateway.retrieve_batch("msgbatch_missing").await.unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::NotFound);
    assert_eq!(missing.status(), Some(404));
    assert!(missing.to_string().contains("batch not found"));
    assert!(!missing.is_retryable());

    let busy = gateway.retrieve_batch("msgbatch_busy").await.unwrap_err();
    assert_eq!(busy.kind(), ErrorKind::RateLimited);
    assert!(busy.is_retryable());
    assert!(busy.to_string().contains("slow down"));

    let blank = gateway.retrieve_batch(" ").await.unwrap_err();
    assert_eq!(blank.kind(), ErrorKind::InvalidRequest);
}

#[tokio::test]
async fn per_call_key_overrides_the_credential_provider() {
    let server = MockServer::start_async().await;
    let retrieve = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/v1/messages/batches/msgbatch_05")
                .header("x-api-key", "sk-ant-override");
            then.status(200)
                .header("content-type", "application/json")
                .body(batch_json("msgbatch_05", "in_progress", json!({})).to_string());
        })
        .await;

    let options = CallOptions::default()
        .with_api_key("sk-ant-override")
        .with_timeout(Duration::from_secs(5));
    assert!(!format!("{options:?}").contains("sk-ant-override"));

    gateway(&server)
        .with_options(options)
        .retrieve_batch("msgbatch_05")
        .await
        .unwrap();
    retrieve.assert_async().await;
}

#[tokio::test]
async fn wait_for_completion_polls_until_terminal() {
    let server = MockServer::start_async().await;
    let mut ended = batch_json(
        "msgbatch_06",
        "ended",
        json!({"succeeded": 1, "errored": 1}),
    );
    ended["ended_at"] = json!("2024-09-24T19:00:00Z");
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/messages/batches/msgbatch_06");
            then.status(200)
                .header("content-type", "application/json")
                .body(ended.to_string());
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/messages/batches/msgbatch_07");
            then.status(200)
                .header("content-type", "application/json")
                .body(batch_json("msgbatch_07", "in_progress", json!({})).to_string());
        })
        .await;

    let gateway = gateway(&server);
    let done = gateway
        .get_batch("msgbatch_06")
        .wait_for_completion(Duration::from_millis(10), Some(Duration::from_secs(5)))
        .await
        .unwrap();
    assert_eq!(done.status, BatchStatus::Failed);
    assert_eq!(done.failed_at, Some(1_727_204_400));

    let (handle, error) = gateway
        .get_batch("msgbatch_07")
        .wait_for_completion(Duration::from_millis(10), Some(Duration::from_millis(50)))
        .await
        .unwrap_err();
    assert_eq!(handle.id(), "msgbatch_07");
    assert_eq!(error.kind(), ErrorKind::Timeout);
}

#[tokio::test]
async fn unrecognized_status_ends_an_unbounded_wait() {
    let server = MockServer::start_async().await;
    let paused = server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/messages/batches/msgbatch_08");
            then.status(200)
                .header("content-type", "application/json")
                .body(batch_json("msgbatch_08", "paused", json!({})).to_string());
        })
        .await;

    let batch = gateway(&server)
        .get_batch("msgbatch_08")
        .wait_for_completion(Duration::from_millis(10), None)
        .await
        .unwrap();
    assert_eq!(batch.status, BatchStatus::Other("paused".into()));
    paused.assert_async().await;
}

#[tokio::test]
async fn unreachable_provider_is_a_connection_failure() {
    let provider = AnthropicProvider::with_base_url("http://127.0.0.1:1").unwrap();
    let gateway = BatchGateway::new(provider, Arc::new(StaticCredential::new("sk-ant-test")))
        .with_options(CallOptions::default().with_timeout(Duration::from_secs(2)));

    let error = gateway.retrieve_batch("msgbatch_x").await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::ConnectionFailed);
    assert_eq!(error.status(), None);

    let chain = DisplayErrorChain::new(&error).to_string();
    assert!(chain.starts_with("Retrieve batch failed before a response was received"));
    assert!(chain.contains("Caused by"));
}
