//! Vertex AI batch prediction.
//!
//! - `POST /v1/projects/{project}/locations/{location}/batchPredictionJobs`
//! - `GET  .../batchPredictionJobs/{id}`
//! - `POST .../batchPredictionJobs/{id}:cancel`
//! - `GET  .../batchPredictionJobs?pageSize=&pageToken=`
//!
//! Jobs read their input from Cloud Storage and write results under a
//! storage prefix, which [`crate::results::ResultLocator`] resolves.

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;
use snafu::ResultExt;
use url::Url;
use uuid::Uuid;

use crate::{
    batch::{
        encoder::encode_required,
        model::{
            BatchInput, BatchPage, CanonicalBatch, CreateBatchRequest, ListParams,
            DEFAULT_ENDPOINT,
        },
        reconciler::{reconcile, RawPhase, StatusVocabulary},
    },
    common::paths::{join_segments, parse_base},
    error::{DecodeSnafu, InvalidHeaderSnafu, InvalidRequestSnafu},
    providers::{map_items, BatchProvider},
    Result,
};

pub mod dialect;
pub mod model;

pub use dialect::VertexDialect;
use model::{
    BatchLine, BatchPredictionJob, CreateBatchPredictionJob, GcsDestination, GcsSource,
    InputConfig, ListBatchPredictionJobsResponse, OutputConfig,
};

pub const DEFAULT_LOCATION: &str = "us-central1";
const API_VERSION: &str = "v1";
const JSONL_FORMAT: &str = "jsonl";
const DISPLAY_NAME_PREFIX: &str = "batch-gateway-";

pub const PROJECT_ENV: &str = "VERTEXAI_PROJECT";
pub const LOCATION_ENV: &str = "VERTEXAI_LOCATION";
pub const API_BASE_ENV: &str = "VERTEXAI_API_BASE";
pub const ACCESS_TOKEN_ENV: &str = "VERTEXAI_ACCESS_TOKEN";

const VOCABULARY: StatusVocabulary = StatusVocabulary::new(&[
    ("JOB_STATE_QUEUED", RawPhase::Validating),
    ("JOB_STATE_PENDING", RawPhase::Validating),
    ("JOB_STATE_RUNNING", RawPhase::InProgress),
    ("JOB_STATE_UPDATING", RawPhase::InProgress),
    ("JOB_STATE_PAUSED", RawPhase::InProgress),
    ("JOB_STATE_CANCELLING", RawPhase::Cancelling),
    ("JOB_STATE_SUCCEEDED", RawPhase::Ended),
    ("JOB_STATE_PARTIALLY_SUCCEEDED", RawPhase::Ended),
    ("JOB_STATE_FAILED", RawPhase::Failed),
    ("JOB_STATE_CANCELLED", RawPhase::Cancelled),
    ("JOB_STATE_EXPIRED", RawPhase::Expired),
]);

#[derive(Debug, Clone)]
pub struct VertexProvider {
    project: String,
    location: String,
    base_url: Url,
}

impl VertexProvider {
    pub fn new(project: impl Into<String>, location: impl Into<String>) -> Result<Self> {
        let location = location.into();
        let base_url = parse_base(&format!("https://{location}-aiplatform.googleapis.com/"))?;
        Ok(Self {
            project: project.into(),
            location,
            base_url,
        })
    }

    /// Reads `VERTEXAI_PROJECT`, `VERTEXAI_LOCATION` and `VERTEXAI_API_BASE`.
    pub fn from_env() -> Result<Self> {
        let Some(project) = env_var(PROJECT_ENV) else {
            return InvalidRequestSnafu {
                message: format!("{PROJECT_ENV} is not set"),
            }
            .fail();
        };
        let location = env_var(LOCATION_ENV).unwrap_or_else(|| DEFAULT_LOCATION.to_string());
        let provider = Self::new(project, location)?;
        match env_var(API_BASE_ENV) {
            Some(base) => provider.with_base_url(&base),
            None => Ok(provider),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Result<Self> {
        self.base_url = parse_base(base_url)?;
        Ok(self)
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    fn jobs_url(&self, job: Option<&str>) -> Result<Url> {
        let segments: [&str; 6] = [
            API_VERSION,
            "projects",
            &self.project,
            "locations",
            &self.location,
            "batchPredictionJobs",
        ];
        join_segments(&self.base_url, segments.into_iter().chain(job))
    }

    /// Renders a submission as the JSONL input file a job reads, one
    /// `{"key", "request"}` line per usable item.
    pub fn encode_lines(&self, raw: &str) -> Result<String> {
        let mut jsonl = String::new();
        for item in encode_required(raw, &VertexDialect)? {
            let line = BatchLine {
                key: item.custom_id,
                request: item.params,
            };
            jsonl.push_str(&serde_json::to_string(&line).context(DecodeSnafu {
                operation: "Encode batch line",
            })?);
            jsonl.push('\n');
        }
        Ok(jsonl)
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// `publishers/<publisher>/models/<model>` from a storage path that embeds it.
fn model_from_uri(uri: &str) -> Option<String> {
    let segments: Vec<&str> = uri.split('/').collect();
    segments.windows(4).find_map(|window| match window {
        ["publishers", publisher, "models", model] if !publisher.is_empty() && !model.is_empty() => {
            Some(format!("publishers/{publisher}/models/{model}"))
        }
        _ => None,
    })
}

fn qualify_model(model: &str) -> String {
    if model.contains('/') {
        model.to_string()
    } else {
        format!("publishers/google/models/{model}")
    }
}

impl BatchProvider for VertexProvider {
    fn name(&self) -> &'static str {
        "vertex_ai"
    }

    fn credential_vars(&self) -> &'static [&'static str] {
        &[ACCESS_TOKEN_ENV]
    }

    fn encode_request(&self, request: &CreateBatchRequest) -> Result<Value> {
        let input_uri = match &request.input {
            BatchInput::File(uri) if uri.starts_with("gs://") => uri.as_str(),
            BatchInput::File(uri) => {
                return InvalidRequestSnafu {
                    message: format!("vertex batch input must be a gs:// uri, got '{uri}'"),
                }
                .fail()
            }
            BatchInput::Inline(_) => {
                return InvalidRequestSnafu {
                    message: "vertex batches read their input from cloud storage; upload the \
                              output of `encode_lines` and pass its gs:// uri",
                }
                .fail()
            }
        };

        let Some(model) = request
            .model
            .as_deref()
            .map(qualify_model)
            .or_else(|| model_from_uri(input_uri))
        else {
            return InvalidRequestSnafu {
                message: format!("no model given and none found in '{input_uri}'"),
            }
            .fail();
        };

        let output_uri_prefix = input_uri
            .rsplit_once('/')
            .map(|(parent, _)| parent)
            .unwrap_or(input_uri)
            .to_string();

        let job = CreateBatchPredictionJob {
            display_name: request
                .display_name
                .clone()
                .unwrap_or_else(|| format!("{DISPLAY_NAME_PREFIX}{}", Uuid::new_v4())),
            model,
            input_config: InputConfig {
                instances_format: JSONL_FORMAT.to_string(),
                gcs_source: GcsSource {
                    uris: vec![input_uri.to_string()],
                },
            },
            output_config: OutputConfig {
                predictions_format: JSONL_FORMAT.to_string(),
                gcs_destination: GcsDestination { output_uri_prefix },
            },
            labels: request.metadata.clone(),
        };
        serde_json::to_value(job).context(DecodeSnafu {
            operation: "Encode batch prediction job",
        })
    }

    fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn build_create_url(&self) -> Result<Url> {
        self.jobs_url(None)
    }

    fn build_retrieve_url(&self, batch_id: &str) -> Result<Url> {
        self.jobs_url(Some(batch_id))
    }

    fn build_cancel_url(&self, batch_id: &str) -> Result<Url> {
        self.jobs_url(Some(format!("{batch_id}:cancel").as_str()))
    }

    fn build_list_url(&self, params: &ListParams) -> Result<Url> {
        let mut url = self.jobs_url(None)?;
        if let Some(limit) = params.limit {
            url.query_pairs_mut()
                .append_pair("pageSize", &limit.to_string());
        }
        if let Some(token) = &params.after {
            url.query_pairs_mut().append_pair("pageToken", token);
        }
        Ok(url)
    }

    fn auth_headers(&self, credential: &str) -> Result<HeaderMap> {
        let mut value = HeaderValue::from_str(&format!("Bearer {credential}"))
            .context(InvalidHeaderSnafu { name: "authorization" })?;
        value.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value);
        Ok(headers)
    }

    fn map_status(&self, raw: Value, now: i64) -> Result<CanonicalBatch> {
        let job: BatchPredictionJob = serde_json::from_value(raw).context(DecodeSnafu {
            operation: "Decode batch prediction job",
        })?;
        Ok(reconcile(job.into_raw(DEFAULT_ENDPOINT), &VOCABULARY, now))
    }

    fn map_list(&self, raw: Value, now: i64) -> Result<BatchPage> {
        let page: ListBatchPredictionJobsResponse =
            serde_json::from_value(raw).context(DecodeSnafu {
                operation: "Decode batch prediction job list",
            })?;
        let data = map_items(self, page.batch_prediction_jobs, now);
        let next_page_token = page.next_page_token.filter(|token| !token.is_empty());
        Ok(BatchPage {
            first_id: data.first().map(|batch| batch.id.clone()),
            last_id: data.last().map(|batch| batch.id.clone()),
            has_more: next_page_token.is_some(),
            next_page_token,
            data,
        })
    }
}
