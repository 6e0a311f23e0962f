//! Anthropic Message Batches.
//!
//! - `POST /v1/messages/batches`
//! - `GET /v1/messages/batches/{id}`
//! - `POST /v1/messages/batches/{id}/cancel`
//! - `GET /v1/messages/batches?limit=&after_id=`
//! - `GET /v1/messages/batches/{id}/results` (JSONL)

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use snafu::ResultExt;
use url::Url;

use crate::{
    batch::{
        encoder::encode_required,
        model::{BatchInput, BatchPage, CanonicalBatch, CreateBatchRequest, ListParams},
        reconciler::{reconcile, RawPhase, StatusVocabulary},
    },
    common::paths::{join_segments, parse_base},
    error::{DecodeSnafu, InvalidHeaderSnafu, InvalidRequestSnafu},
    providers::{map_items, BatchProvider},
    Result,
};

pub mod dialect;
pub mod model;

pub use dialect::AnthropicDialect;
use model::{CreateMessageBatchRequest, ListMessageBatchesResponse, MessageBatch};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const API_VERSION: &str = "2023-06-01";
/// The logical endpoint reported on every Anthropic batch.
pub const MESSAGES_ENDPOINT: &str = "/v1/messages";
/// Prefix of Anthropic batch ids, which double as results handles.
pub const BATCH_ID_PREFIX: &str = "msgbatch_";

pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
pub const API_BASE_ENV: &str = "ANTHROPIC_API_BASE";

const VOCABULARY: StatusVocabulary = StatusVocabulary::new(&[
    ("in_progress", RawPhase::InProgress),
    ("canceling", RawPhase::Cancelling),
    ("ended", RawPhase::Ended),
]);

#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    base_url: Url,
    api_version: String,
}

impl AnthropicProvider {
    pub fn new() -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self> {
        Ok(Self {
            base_url: parse_base(base_url)?,
            api_version: API_VERSION.to_string(),
        })
    }

    /// Reads the base URL from `ANTHROPIC_API_BASE`, falling back to the
    /// public endpoint.
    pub fn from_env() -> Result<Self> {
        match std::env::var(API_BASE_ENV) {
            Ok(base) if !base.trim().is_empty() => Self::with_base_url(base.trim()),
            _ => Self::new(),
        }
    }

    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    fn batches_url<'a>(&self, extra: impl IntoIterator<Item = &'a str>) -> Result<Url> {
        join_segments(
            &self.base_url,
            ["v1", "messages", "batches"].into_iter().chain(extra),
        )
    }
}

impl BatchProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn credential_vars(&self) -> &'static [&'static str] {
        &[API_KEY_ENV]
    }

    fn encode_request(&self, request: &CreateBatchRequest) -> Result<Value> {
        let BatchInput::Inline(raw) = &request.input else {
            return InvalidRequestSnafu {
                message: "anthropic batches take inline JSONL requests, not a file reference",
            }
            .fail();
        };
        let requests = encode_required(raw, &AnthropicDialect)?;
        serde_json::to_value(CreateMessageBatchRequest { requests }).context(DecodeSnafu {
            operation: "Encode message batch",
        })
    }

    fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn build_create_url(&self) -> Result<Url> {
        self.batches_url([])
    }

    fn build_retrieve_url(&self, batch_id: &str) -> Result<Url> {
        self.batches_url([batch_id])
    }

    fn build_cancel_url(&self, batch_id: &str) -> Result<Url> {
        self.batches_url([batch_id, "cancel"])
    }

    fn build_list_url(&self, params: &ListParams) -> Result<Url> {
        let mut url = self.batches_url([])?;
        if let Some(limit) = params.limit {
            url.query_pairs_mut()
                .append_pair("limit", &limit.to_string());
        }
        if let Some(after) = &params.after {
            url.query_pairs_mut().append_pair("after_id", after);
        }
        Ok(url)
    }

    fn build_results_url(&self, handle: &str) -> Option<Result<Url>> {
        handle
            .starts_with(BATCH_ID_PREFIX)
            .then(|| self.batches_url([handle, "results"]))
    }

    fn auth_headers(&self, credential: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        for (name, value) in [
            ("x-api-key", credential),
            ("anthropic-version", self.api_version.as_str()),
        ] {
            let mut value = HeaderValue::from_str(value).context(InvalidHeaderSnafu { name })?;
            if name == "x-api-key" {
                value.set_sensitive(true);
            }
            headers.insert(HeaderName::from_static(name), value);
        }
        Ok(headers)
    }

    fn map_status(&self, raw: Value, now: i64) -> Result<CanonicalBatch> {
        let batch: MessageBatch = serde_json::from_value(raw).context(DecodeSnafu {
            operation: "Decode message batch",
        })?;
        Ok(reconcile(batch.into_raw(MESSAGES_ENDPOINT), &VOCABULARY, now))
    }

    fn map_list(&self, raw: Value, now: i64) -> Result<BatchPage> {
        let page: ListMessageBatchesResponse =
            serde_json::from_value(raw).context(DecodeSnafu {
                operation: "Decode message batch list",
            })?;
        let next_page_token = page.has_more.then(|| page.last_id.clone()).flatten();
        Ok(BatchPage {
            data: map_items(self, page.data, now),
            has_more: page.has_more,
            first_id: page.first_id,
            last_id: page.last_id,
            next_page_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{batch::model::BatchStatus, ErrorKind};
    use serde_json::json;

    fn provider() -> AnthropicProvider {
        AnthropicProvider::with_base_url("https://api.anthropic.test/").unwrap()
    }

    #[test]
    fn builds_urls() {
        let provider = provider();
        assert_eq!(
            provider.build_create_url().unwrap().as_str(),
            "https://api.anthropic.test/v1/messages/batches"
        );
        assert_eq!(
            provider.build_cancel_url("msgbatch_1").unwrap().as_str(),
            "https://api.anthropic.test/v1/messages/batches/msgbatch_1/cancel"
        );
        assert_eq!(
            provider
                .build_list_url(&ListParams::default().with_limit(5).after("msgbatch_9"))
                .unwrap()
                .as_str(),
            "https://api.anthropic.test/v1/messages/batches?limit=5&after_id=msgbatch_9"
        );
        assert_eq!(
            provider
                .build_results_url("msgbatch_1")
                .unwrap()
                .unwrap()
                .as_str(),
            "https://api.anthropic.test/v1/messages/batches/msgbatch_1/results"
        );
        assert!(provider.build_results_url("file-abc").is_none());
    }

    #[test]
    fn ended_batches_resolve_from_counts() {
        let provider = provider();
        let completed = provider
            .map_status(
                json!({
                    "id": "msgbatch_1",
                    "type": "message_batch",
                    "processing_status": "ended",
                    "request_counts": {"processing": 0, "succeeded": 3, "errored": 0, "canceled": 0, "expired": 0},
                    "created_at": "2024-09-24T18:37:24.100435Z",
                    "ended_at": "2024-09-24T19:00:00Z",
                    "results_url": "https://api.anthropic.test/v1/messages/batches/msgbatch_1/results",
                }),
                0,
            )
            .unwrap();
        assert_eq!(completed.status, BatchStatus::Completed);
        assert_eq!(completed.request_counts.completed, 3);
        assert_eq!(completed.request_counts.total, 3);
        assert_eq!(completed.endpoint, MESSAGES_ENDPOINT);
        assert!(completed.completed_at.is_some());
        assert!(completed.output_file_id.unwrap().ends_with("/results"));

        let mixed = provider
            .map_status(
                json!({
                    "id": "msgbatch_2",
                    "processing_status": "ended",
                    "request_counts": {"succeeded": 1, "errored": 1},
                }),
                0,
            )
            .unwrap();
        assert_eq!(mixed.status, BatchStatus::Failed);
        assert_eq!(mixed.request_counts.failed, 1);
        assert_eq!(mixed.request_counts.total, 2);
    }

    #[test]
    fn canceling_sets_only_cancelling_at() {
        let batch = provider()
            .map_status(
                json!({
                    "id": "msgbatch_3",
                    "processing_status": "canceling",
                    "request_counts": null,
                    "created_at": "2024-01-01T00:00:00Z",
                    "cancel_initiated_at": "2024-01-01T00:10:00Z",
                }),
                0,
            )
            .unwrap();
        assert_eq!(batch.status, BatchStatus::Cancelling);
        assert_eq!(batch.cancelling_at, Some(1_704_067_800));
        assert!(batch.terminal_fields().iter().all(Option::is_none));
    }

    #[test]
    fn malformed_counts_do_not_fail_the_read() {
        let batch = provider()
            .map_status(
                json!({
                    "id": "msgbatch_1",
                    "processing_status": "in_progress",
                    "request_counts": "n/a",
                }),
                0,
            )
            .unwrap();
        assert_eq!(batch.status, BatchStatus::InProgress);
        assert_eq!(batch.request_counts.total, 0);

        let error = provider().map_status(json!("msgbatch_1"), 0).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::ProviderError);
        assert_eq!(error.to_string(), "Decode message batch could not be decoded");
    }

    #[test]
    fn file_input_is_rejected() {
        let error = provider()
            .encode_request(&CreateBatchRequest::from_file("file-123"))
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidRequest);
    }

    #[test]
    fn api_key_header_is_sensitive() {
        let headers = provider().auth_headers("sk-ant-1").unwrap();
        assert!(headers["x-api-key"].is_sensitive());
        assert_eq!(headers["anthropic-version"], API_VERSION);
        assert!(provider().auth_headers("bad\nkey").is_err());
    }
}
