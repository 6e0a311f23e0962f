//! Vertex AI wire types: Gemini request lines and `batchPredictionJobs` resources.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::{
    batch::reconciler::{ProviderCounts, RawBatchStatus},
    common::serde::{lenient_object, lenient_string, lenient_u64, null_as_default},
};

/// Role of a turn in a Gemini conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// Content part of a turn
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: Blob,
    },
    FileData {
        #[serde(rename = "fileData")]
        file_data: FileData,
    },
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: FunctionCall,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: FunctionResponse,
    },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }
}

/// Base64 data embedded in a request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub mime_type: String,
    pub data: String,
}

/// Data the model reads from a URI
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileData {
    pub mime_type: String,
    pub file_uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    pub args: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionResponse {
    pub name: String,
    pub response: Value,
}

/// One turn of a conversation
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    pub parts: Vec<Part>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

impl Content {
    pub fn new(role: Role, parts: Vec<Part>) -> Self {
        Self {
            parts,
            role: Some(role),
        }
    }

    /// A role-less text content, as system instructions are sent.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            parts: vec![Part::text(text)],
            role: None,
        }
    }
}

/// Sampling and output settings
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<Value>,
}

impl GenerationConfig {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Declaration of a function the model may call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionDeclaration {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ToolConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_calling_config: Option<FunctionCallingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCallingConfig {
    pub mode: FunctionCallingMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_function_names: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FunctionCallingMode {
    Auto,
    Any,
    None,
}

/// The `request` of one batch line
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_config: Option<ToolConfig>,
}

/// One line of a batch prediction input file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchLine {
    pub key: String,
    pub request: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GcsSource {
    pub uris: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GcsDestination {
    pub output_uri_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InputConfig {
    pub instances_format: String,
    pub gcs_source: GcsSource,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OutputConfig {
    pub predictions_format: String,
    pub gcs_destination: GcsDestination,
}

/// Body of `POST .../batchPredictionJobs`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateBatchPredictionJob {
    pub display_name: String,
    pub model: String,
    pub input_config: InputConfig,
    pub output_config: OutputConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompletionStats {
    #[serde(with = "lenient_u64")]
    pub successful_count: u64,
    #[serde(with = "lenient_u64")]
    pub failed_count: u64,
    #[serde(with = "lenient_u64")]
    pub incomplete_count: u64,
}

impl From<CompletionStats> for ProviderCounts {
    fn from(stats: CompletionStats) -> Self {
        ProviderCounts {
            processing: stats.incomplete_count,
            succeeded: stats.successful_count,
            errored: stats.failed_count,
            canceled: 0,
            expired: 0,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OutputInfo {
    #[serde(deserialize_with = "lenient_string::deserialize")]
    pub gcs_output_directory: Option<String>,
}

/// A `batchPredictionJobs` resource.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BatchPredictionJob {
    #[serde(deserialize_with = "lenient_string::deserialize")]
    pub name: Option<String>,
    #[serde(deserialize_with = "lenient_string::deserialize")]
    pub display_name: Option<String>,
    #[serde(deserialize_with = "lenient_string::deserialize")]
    pub model: Option<String>,
    #[serde(deserialize_with = "lenient_string::deserialize")]
    pub state: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub input_config: Option<Value>,
    #[serde(deserialize_with = "lenient_object")]
    pub output_info: OutputInfo,
    #[serde(deserialize_with = "lenient_object")]
    pub completion_stats: CompletionStats,
    pub error: Option<Value>,
    pub labels: Option<Value>,
    #[serde(deserialize_with = "lenient_string::deserialize")]
    pub create_time: Option<String>,
    #[serde(deserialize_with = "lenient_string::deserialize")]
    pub start_time: Option<String>,
    #[serde(deserialize_with = "lenient_string::deserialize")]
    pub end_time: Option<String>,
}

impl BatchPredictionJob {
    /// The job id: the last segment of the resource name.
    pub fn id(&self) -> String {
        self.name
            .as_deref()
            .and_then(|name| name.rsplit('/').next())
            .unwrap_or_default()
            .to_string()
    }

    fn input_uri(&self) -> Option<String> {
        self.input_config
            .as_ref()?
            .pointer("/gcsSource/uris/0")?
            .as_str()
            .map(str::to_string)
    }

    pub fn into_raw(self, endpoint: &str) -> RawBatchStatus {
        RawBatchStatus {
            id: self.id(),
            input_file_id: self.input_uri(),
            status: self.state,
            endpoint: Some(endpoint.to_string()),
            created_at: self.create_time,
            started_at: self.start_time,
            ended_at: self.end_time,
            expires_at: None,
            cancel_initiated_at: None,
            counts: self.completion_stats.into(),
            output_file_id: self.output_info.gcs_output_directory,
            error_file_id: None,
            metadata: self.labels,
            usage: None,
            errors: self.error,
        }
    }
}

/// Response of `GET .../batchPredictionJobs`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ListBatchPredictionJobsResponse {
    #[serde(deserialize_with = "null_as_default")]
    pub batch_prediction_jobs: Vec<Value>,
    #[serde(deserialize_with = "lenient_string::deserialize")]
    pub next_page_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn job_decodes_string_counters_and_nulls() {
        let job: BatchPredictionJob = serde_json::from_value(json!({
            "name": "projects/p/locations/us-central1/batchPredictionJobs/123",
            "state": "JOB_STATE_RUNNING",
            "completionStats": {"successfulCount": "4", "failedCount": null, "incompleteCount": 6},
            "outputInfo": null,
            "inputConfig": {"instancesFormat": "jsonl", "gcsSource": {"uris": ["gs://b/in.jsonl"]}},
        }))
        .unwrap();
        assert_eq!(job.id(), "123");
        assert_eq!(job.completion_stats.successful_count, 4);
        assert_eq!(job.completion_stats.failed_count, 0);
        assert_eq!(job.input_uri().as_deref(), Some("gs://b/in.jsonl"));
        assert!(job.output_info.gcs_output_directory.is_none());
    }

    #[test]
    fn request_line_uses_camel_case() {
        let request = GenerateContentRequest {
            contents: vec![Content::new(Role::User, vec![Part::text("hi")])],
            system_instruction: Some(Content::text("be brief")),
            generation_config: Some(GenerationConfig {
                max_output_tokens: Some(10),
                ..Default::default()
            }),
            tools: None,
            tool_config: None,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "contents": [{"parts": [{"text": "hi"}], "role": "user"}],
                "systemInstruction": {"parts": [{"text": "be brief"}]},
                "generationConfig": {"maxOutputTokens": 10},
            })
        );
    }
}
