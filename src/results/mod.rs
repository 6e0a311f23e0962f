//! # Result Locator
//!
//! Turns a batch's result pointer into result bytes. A pointer is one of:
//!
//! * an `http(s)` URL, fetched directly;
//! * `gs://bucket/path/file.jsonl`, a single object;
//! * `gs://bucket/prefix`, a folder whose objects are listed and one selected;
//! * any other string, a provider handle the adapter resolves to a URL.
//!
//! Selection under a prefix prefers the predictions file, then the first
//! object that is not the echoed input, then the first object.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::{
    error::{InvalidRequestSnafu, ResultsNotFoundSnafu},
    Result,
};

pub mod storage;

pub use storage::{GcsObjectStore, ObjectMeta, ObjectStore};

pub const PREDICTIONS_FILE: &str = "predictions.jsonl";
pub const INPUT_FILE: &str = "input.jsonl";
const RESULTS_SUFFIX: &str = ".jsonl";
const GCS_SCHEME: &str = "gs://";

/// A parsed result pointer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultPointer {
    Url(Url),
    Object { bucket: String, object: String },
    Prefix { bucket: String, prefix: String },
    Handle(String),
}

impl ResultPointer {
    pub fn parse(pointer: &str) -> Result<Self> {
        let pointer = pointer.trim();
        if pointer.is_empty() {
            return InvalidRequestSnafu {
                message: "batch has no result pointer",
            }
            .fail();
        }

        if let Some(location) = pointer.strip_prefix(GCS_SCHEME) {
            let (bucket, path) = location.split_once('/').unwrap_or((location, ""));
            if bucket.is_empty() {
                return InvalidRequestSnafu {
                    message: format!("storage location '{pointer}' names no bucket"),
                }
                .fail();
            }
            let bucket = bucket.to_string();
            return Ok(if path.ends_with(RESULTS_SUFFIX) {
                ResultPointer::Object {
                    bucket,
                    object: path.to_string(),
                }
            } else {
                ResultPointer::Prefix {
                    bucket,
                    prefix: path.to_string(),
                }
            });
        }

        if pointer.starts_with("http://") || pointer.starts_with("https://") {
            if let Ok(url) = Url::parse(pointer) {
                return Ok(ResultPointer::Url(url));
            }
        }
        Ok(ResultPointer::Handle(pointer.to_string()))
    }
}

/// Picks the result object among the objects listed under a prefix.
pub fn select_result_object(objects: &[ObjectMeta]) -> Option<&ObjectMeta> {
    if let Some(predictions) = objects.iter().find(|o| o.name.ends_with(PREDICTIONS_FILE)) {
        return Some(predictions);
    }
    let fallback = objects
        .iter()
        .find(|o| !o.name.is_empty() && !o.name.ends_with(INPUT_FILE))
        .or_else(|| objects.first());
    if let Some(object) = fallback {
        warn!(object = %object.name, "no {PREDICTIONS_FILE} under prefix, using fallback object");
    }
    fallback
}

/// Fetches result content the provider serves over plain HTTP.
#[async_trait]
pub trait DirectFetch: Send + Sync {
    /// Resolves a provider handle, such as a batch id, to its results URL.
    fn resolve_handle(&self, handle: &str) -> Result<Url>;

    /// Downloads `url` with the provider's credentials.
    async fn fetch(&self, url: Url) -> Result<Bytes>;
}

/// Resolves result pointers to bytes.
#[derive(Clone)]
pub struct ResultLocator {
    direct: Arc<dyn DirectFetch>,
    storage: Option<Arc<dyn ObjectStore>>,
}

impl ResultLocator {
    pub fn new(direct: Arc<dyn DirectFetch>) -> Self {
        Self {
            direct,
            storage: None,
        }
    }

    pub fn with_storage(mut self, storage: Arc<dyn ObjectStore>) -> Self {
        self.storage = Some(storage);
        self
    }

    fn storage(&self, bucket: &str) -> Result<&dyn ObjectStore> {
        match &self.storage {
            Some(storage) => Ok(storage.as_ref()),
            None => InvalidRequestSnafu {
                message: format!("no object store configured to read bucket '{bucket}'"),
            }
            .fail(),
        }
    }

    /// Locates the result object under a prefix without downloading it.
    pub async fn locate(&self, bucket: &str, prefix: &str) -> Result<String> {
        let objects = self.storage(bucket)?.list(bucket, prefix).await?;
        debug!(bucket, prefix, count = objects.len(), "listed result objects");
        match select_result_object(&objects) {
            Some(object) => Ok(object.name.clone()),
            None => ResultsNotFoundSnafu {
                location: format!("{GCS_SCHEME}{bucket}/{prefix}"),
            }
            .fail(),
        }
    }

    /// Fetches the content a pointer refers to.
    #[instrument(skip_all, fields(pointer = %pointer))]
    pub async fn locate_and_fetch(&self, pointer: &str) -> Result<Bytes> {
        match ResultPointer::parse(pointer)? {
            ResultPointer::Url(url) => self.direct.fetch(url).await,
            ResultPointer::Handle(handle) => {
                let url = self.direct.resolve_handle(&handle)?;
                self.direct.fetch(url).await
            }
            ResultPointer::Object { bucket, object } => {
                self.storage(&bucket)?.get(&bucket, &object).await
            }
            ResultPointer::Prefix { bucket, prefix } => {
                let object = self.locate(&bucket, &prefix).await?;
                self.storage(&bucket)?.get(&bucket, &object).await
            }
        }
    }
}
