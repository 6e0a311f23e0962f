use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    batch::{
        model::BatchRequestItem,
        reconciler::{ProviderCounts, RawBatchStatus},
    },
    common::serde::{lenient_object, lenient_string, lenient_u64, null_as_default},
};

/// Body of `POST /v1/messages/batches`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateMessageBatchRequest {
    pub requests: Vec<BatchRequestItem>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct MessageBatchRequestCounts {
    #[serde(with = "lenient_u64")]
    pub processing: u64,
    #[serde(with = "lenient_u64")]
    pub succeeded: u64,
    #[serde(with = "lenient_u64")]
    pub errored: u64,
    #[serde(with = "lenient_u64")]
    pub canceled: u64,
    #[serde(with = "lenient_u64")]
    pub expired: u64,
}

impl From<MessageBatchRequestCounts> for ProviderCounts {
    fn from(counts: MessageBatchRequestCounts) -> Self {
        ProviderCounts {
            processing: counts.processing,
            succeeded: counts.succeeded,
            errored: counts.errored,
            canceled: counts.canceled,
            expired: counts.expired,
        }
    }
}

/// A `message_batch` object.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MessageBatch {
    #[serde(deserialize_with = "lenient_string::deserialize")]
    pub id: Option<String>,
    #[serde(deserialize_with = "lenient_string::deserialize")]
    pub processing_status: Option<String>,
    #[serde(deserialize_with = "lenient_object")]
    pub request_counts: MessageBatchRequestCounts,
    #[serde(deserialize_with = "lenient_string::deserialize")]
    pub created_at: Option<String>,
    #[serde(deserialize_with = "lenient_string::deserialize")]
    pub ended_at: Option<String>,
    #[serde(deserialize_with = "lenient_string::deserialize")]
    pub expires_at: Option<String>,
    #[serde(deserialize_with = "lenient_string::deserialize")]
    pub cancel_initiated_at: Option<String>,
    #[serde(deserialize_with = "lenient_string::deserialize")]
    pub results_url: Option<String>,
}

impl MessageBatch {
    pub fn into_raw(self, endpoint: &str) -> RawBatchStatus {
        RawBatchStatus {
            id: self.id.unwrap_or_default(),
            status: self.processing_status,
            endpoint: Some(endpoint.to_string()),
            input_file_id: None,
            created_at: self.created_at,
            // the Messages API reports no separate start time
            started_at: None,
            ended_at: self.ended_at,
            expires_at: self.expires_at,
            cancel_initiated_at: self.cancel_initiated_at,
            counts: self.request_counts.into(),
            output_file_id: self.results_url,
            error_file_id: None,
            metadata: None,
            usage: None,
            errors: None,
        }
    }
}

/// Response of `GET /v1/messages/batches`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ListMessageBatchesResponse {
    #[serde(deserialize_with = "null_as_default")]
    pub data: Vec<Value>,
    #[serde(deserialize_with = "null_as_default")]
    pub has_more: bool,
    #[serde(deserialize_with = "lenient_string::deserialize")]
    pub first_id: Option<String>,
    #[serde(deserialize_with = "lenient_string::deserialize")]
    pub last_id: Option<String>,
}
