//! Object storage reads for prefix-style result locations.

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use std::{fmt, sync::Arc, time::Duration};
use tracing::instrument;
use url::Url;

use crate::{
    client::{send_bytes, send_json},
    common::paths::{join_segments, parse_base},
    credentials::CredentialProvider,
    error::DecodeSnafu,
    Result,
};
use snafu::ResultExt;

pub const DEFAULT_STORAGE_BASE_URL: &str = "https://storage.googleapis.com/";

/// An object found under a listed prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default, with = "crate::common::serde::lenient_u64")]
    pub size: u64,
}

impl ObjectMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: 0,
        }
    }
}

/// Read access to a bucket-style object store.
#[async_trait]
pub trait ObjectStore: Send + Sync + fmt::Debug {
    /// Lists every object whose name starts with `prefix`, in store order.
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectMeta>>;

    /// Downloads one object.
    async fn get(&self, bucket: &str, object: &str) -> Result<Bytes>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListObjectsResponse {
    #[serde(default)]
    items: Vec<ObjectMeta>,
    next_page_token: Option<String>,
}

/// [`ObjectStore`] over the Google Cloud Storage JSON API.
#[derive(Debug, Clone)]
pub struct GcsObjectStore {
    http: reqwest::Client,
    credentials: Arc<dyn CredentialProvider>,
    base_url: Url,
    timeout: Option<Duration>,
}

impl GcsObjectStore {
    pub fn new(credentials: Arc<dyn CredentialProvider>) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::new(),
            credentials,
            base_url: parse_base(DEFAULT_STORAGE_BASE_URL)?,
            timeout: None,
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Result<Self> {
        self.base_url = parse_base(base_url)?;
        Ok(self)
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn objects_url(&self, bucket: &str) -> Result<Url> {
        join_segments(&self.base_url, ["storage", "v1", "b", bucket, "o"])
    }

    async fn request(&self, url: Url) -> Result<reqwest::RequestBuilder> {
        let token = self.credentials.credential("gcs").await?;
        let mut request = self.http.get(url).bearer_auth(token);
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }
        Ok(request)
    }
}

#[async_trait]
impl ObjectStore for GcsObjectStore {
    #[instrument(skip_all, fields(bucket = %bucket, prefix = %prefix))]
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectMeta>> {
        let mut objects = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut url = self.objects_url(bucket)?;
            url.query_pairs_mut().append_pair("prefix", prefix);
            if let Some(token) = &page_token {
                url.query_pairs_mut().append_pair("pageToken", token);
            }

            let value = send_json("List result objects", self.request(url).await?).await?;
            let page: ListObjectsResponse = serde_json::from_value(value).context(DecodeSnafu {
                operation: "List result objects",
            })?;
            objects.extend(page.items);

            match page.next_page_token.filter(|token| !token.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(objects)
    }

    #[instrument(skip_all, fields(bucket = %bucket, object = %object))]
    async fn get(&self, bucket: &str, object: &str) -> Result<Bytes> {
        let mut url = join_segments(&self.objects_url(bucket)?, [object])?;
        url.query_pairs_mut().append_pair("alt", "media");
        send_bytes("Download result object", self.request(url).await?).await
    }
}
