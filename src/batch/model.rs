//! # Canonical Batch Model
//!
//! The vendor-independent shape every provider adapter translates into and out
//! of. A [`CanonicalBatch`] is a value object: it is derived fresh from each
//! vendor response and never mutated in place.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{collections::BTreeMap, fmt};

/// The logical endpoint chat-style batch items are submitted against.
pub const DEFAULT_ENDPOINT: &str = "/v1/chat/completions";

/// The completion window reported for every batch.
pub const DEFAULT_COMPLETION_WINDOW: &str = "24h";

/// Lifecycle status of a batch.
///
/// `Other` carries a vendor status string that no vocabulary recognized; it is
/// passed through unchanged instead of failing the read.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BatchStatus {
    Validating,
    InProgress,
    Finalizing,
    Completed,
    Failed,
    Expired,
    Cancelling,
    Cancelled,
    Other(String),
}

impl BatchStatus {
    pub fn as_str(&self) -> &str {
        match self {
            BatchStatus::Validating => "validating",
            BatchStatus::InProgress => "in_progress",
            BatchStatus::Finalizing => "finalizing",
            BatchStatus::Completed => "completed",
            BatchStatus::Failed => "failed",
            BatchStatus::Expired => "expired",
            BatchStatus::Cancelling => "cancelling",
            BatchStatus::Cancelled => "cancelled",
            BatchStatus::Other(raw) => raw,
        }
    }

    /// Whether no further transition can happen from this status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BatchStatus::Completed
                | BatchStatus::Failed
                | BatchStatus::Expired
                | BatchStatus::Cancelled
        )
    }
}

impl From<String> for BatchStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "validating" => BatchStatus::Validating,
            "in_progress" => BatchStatus::InProgress,
            "finalizing" => BatchStatus::Finalizing,
            "completed" => BatchStatus::Completed,
            "failed" => BatchStatus::Failed,
            "expired" => BatchStatus::Expired,
            "cancelling" => BatchStatus::Cancelling,
            "cancelled" => BatchStatus::Cancelled,
            _ => BatchStatus::Other(value),
        }
    }
}

impl From<BatchStatus> for String {
    fn from(value: BatchStatus) -> Self {
        match value {
            BatchStatus::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical per-item counters. `completed + failed <= total` always holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestCounts {
    pub completed: u64,
    pub failed: u64,
    pub total: u64,
}

/// A batch job as seen through the canonical lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalBatch {
    /// Provider-assigned identifier.
    pub id: String,
    /// Always `"batch"`.
    pub object: String,
    /// The logical API path the batch was submitted against.
    pub endpoint: String,
    pub status: BatchStatus,
    /// Pointer to the original submission; empty when the provider does not echo it.
    pub input_file_id: String,
    pub completion_window: String,
    pub created_at: i64,
    pub in_progress_at: Option<i64>,
    pub finalizing_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub failed_at: Option<i64>,
    pub expired_at: Option<i64>,
    pub cancelling_at: Option<i64>,
    pub cancelled_at: Option<i64>,
    /// When the provider will give up on the batch.
    pub expires_at: Option<i64>,
    pub request_counts: RequestCounts,
    /// Inline results handle, results URL, or storage prefix.
    pub output_file_id: Option<String>,
    pub error_file_id: Option<String>,
    pub metadata: Option<Value>,
    pub usage: Option<Value>,
    pub errors: Option<Value>,
}

impl CanonicalBatch {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// The timestamp of the terminal field matching the current status, if any.
    pub fn terminal_timestamp(&self) -> Option<i64> {
        match self.status {
            BatchStatus::Completed => self.completed_at,
            BatchStatus::Failed => self.failed_at,
            BatchStatus::Expired => self.expired_at,
            BatchStatus::Cancelled => self.cancelled_at,
            _ => None,
        }
    }

    /// All four terminal `*_at` fields, in a fixed order.
    pub fn terminal_fields(&self) -> [Option<i64>; 4] {
        [
            self.completed_at,
            self.failed_at,
            self.expired_at,
            self.cancelled_at,
        ]
    }
}

/// One line of a submitted batch, encoded in a provider's native shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRequestItem {
    pub custom_id: String,
    pub params: Value,
}

/// Where the submission for a new batch comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchInput {
    /// Line-delimited JSON request bodies held in memory.
    Inline(String),
    /// A reference to input the provider can read itself, such as a `gs://` URI.
    File(String),
}

impl BatchInput {
    /// Interprets an OpenAI-style `input_file_id`, which callers also use to
    /// carry JSONL content directly.
    pub fn from_input_file_id(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.trim_start().starts_with('{') {
            BatchInput::Inline(value)
        } else {
            BatchInput::File(value)
        }
    }
}

/// A canonical batch-creation request.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateBatchRequest {
    pub input: BatchInput,
    pub endpoint: String,
    pub completion_window: String,
    /// Model for providers that bind the model at job level rather than per line.
    pub model: Option<String>,
    pub display_name: Option<String>,
    pub metadata: Option<BTreeMap<String, String>>,
}

impl CreateBatchRequest {
    pub fn new(input: BatchInput) -> Self {
        Self {
            input,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            completion_window: DEFAULT_COMPLETION_WINDOW.to_string(),
            model: None,
            display_name: None,
            metadata: None,
        }
    }

    /// A request whose items are the given JSONL content.
    pub fn inline(jsonl: impl Into<String>) -> Self {
        Self::new(BatchInput::Inline(jsonl.into()))
    }

    /// A request whose input the provider reads from the given location.
    pub fn from_file(location: impl Into<String>) -> Self {
        Self::new(BatchInput::File(location.into()))
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }
}

/// Paging parameters for a single list call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListParams {
    pub limit: Option<u32>,
    /// Opaque page token returned by the previous page.
    pub after: Option<String>,
}

impl ListParams {
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn after(mut self, token: impl Into<String>) -> Self {
        self.after = Some(token.into());
        self
    }
}

/// One page of batches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchPage {
    pub data: Vec<CanonicalBatch>,
    pub has_more: bool,
    pub first_id: Option<String>,
    pub last_id: Option<String>,
    /// Token to pass as [`ListParams::after`] for the next page.
    pub next_page_token: Option<String>,
}
