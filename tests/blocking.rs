#![cfg(all(feature = "blocking", feature = "anthropic"))]

use batch_gateway::{
    AnthropicProvider, BatchGateway, BatchStatus, ErrorKind, ListParams, StaticCredential,
};
use httpmock::{Method::GET, MockServer};
use serde_json::json;
use std::{sync::Arc, time::Duration};

fn gateway(server: &MockServer) -> batch_gateway::BlockingBatchGateway<AnthropicProvider> {
    let provider = AnthropicProvider::with_base_url(&server.base_url()).unwrap();
    BatchGateway::new(provider, Arc::new(StaticCredential::new("sk-ant-test")))
        .blocking()
        .unwrap()
}

#[test]
fn blocking_calls_drive_the_async_gateway() {
    let server = MockServer::start();
    let retrieve = server.mock(|when, then| {
        when.method(GET)
            .path("/v1/messages/batches/msgbatch_1")
            .header("x-api-key", "sk-ant-test");
        then.status(200)
            .header("content-type", "application/json")
            .body(
                json!({
                    "id": "msgbatch_1",
                    "processing_status": "ended",
                    "request_counts": {"expired": 3},
                    "created_at": "2024-01-01T00:00:00Z",
                    "ended_at": "2024-01-02T00:00:00Z",
                })
                .to_string(),
            );
    });
    let list = server.mock(|when, then| {
        when.method(GET).path("/v1/messages/batches");
        then.status(200)
            .header("content-type", "application/json")
            .body(json!({"data": [], "has_more": false}).to_string());
    });

    let gateway = gateway(&server);
    let batch = gateway.retrieve_batch("msgbatch_1").unwrap();
    assert_eq!(batch.status, BatchStatus::Expired);
    assert_eq!(batch.expired_at, Some(1_704_153_600));
    assert_eq!(batch.request_counts.failed, 3);

    let waited = gateway
        .wait_for_completion("msgbatch_1", Duration::from_millis(10), None)
        .unwrap();
    assert_eq!(waited, batch);

    let page = gateway.list_batches(ListParams::default()).unwrap();
    assert!(page.data.is_empty());
    assert!(!page.has_more);
    assert_eq!(page.next_page_token, None);

    retrieve.assert_calls(2);
    list.assert();
}

#[test]
fn blocking_errors_keep_their_kind() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/v1/messages/batches/msgbatch_2");
        then.status(401)
            .header("content-type", "application/json")
            .body(
                json!({"error": {"type": "authentication_error", "message": "invalid x-api-key"}})
                    .to_string(),
            );
    });

    let error = gateway(&server).retrieve_batch("msgbatch_2").unwrap_err();
    assert_eq!(error.kind(), ErrorKind::AuthenticationFailed);
    assert_eq!(error.status(), Some(401));
}
