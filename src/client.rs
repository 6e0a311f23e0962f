use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::Stream;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use snafu::ResultExt;
use std::{fmt, sync::Arc, time::Duration};
use tracing::{debug, instrument, warn};
use url::Url;

use crate::{
    batch::{
        handle::BatchHandle,
        model::{BatchPage, CanonicalBatch, CreateBatchRequest, ListParams},
    },
    common::time::now_epoch,
    credentials::CredentialProvider,
    error::{
        map_http_error, DecodeSnafu, InvalidRequestSnafu, ResultsNotFoundSnafu, TransportSnafu,
        UnsupportedPointerSnafu,
    },
    providers::BatchProvider,
    results::{DirectFetch, ObjectStore, ResultLocator},
    Result,
};

/// Applied to every call that does not set its own timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Per-call settings.
#[derive(Clone, Default)]
pub struct CallOptions {
    pub timeout: Option<Duration>,
    /// Overrides the gateway's credential provider for these calls.
    pub api_key: Option<String>,
}

impl CallOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

impl fmt::Debug for CallOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallOptions")
            .field("timeout", &self.timeout)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Sends a request and returns the body of a 2xx response.
pub(crate) async fn send_bytes(operation: &str, request: RequestBuilder) -> Result<Bytes> {
    let response = request.send().await.context(TransportSnafu { operation })?;
    let status = response.status();
    let body = response.bytes().await.context(TransportSnafu { operation })?;
    if !status.is_success() {
        return Err(map_http_error(operation, status.as_u16(), &body));
    }
    Ok(body)
}

/// Like [`send_bytes`], decoding the body as JSON. An empty body is `null`.
pub(crate) async fn send_json(operation: &str, request: RequestBuilder) -> Result<Value> {
    let body = send_bytes(operation, request).await?;
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(&body).context(DecodeSnafu { operation })
}

/// Internal client for one provider's batch API
pub(crate) struct GatewayClient<P> {
    http: Client,
    provider: P,
    credentials: Arc<dyn CredentialProvider>,
}

impl<P: BatchProvider> GatewayClient<P> {
    async fn authorize(
        &self,
        request: RequestBuilder,
        options: &CallOptions,
    ) -> Result<RequestBuilder> {
        let credential = match &options.api_key {
            Some(api_key) => api_key.clone(),
            None => self.credentials.credential(self.provider.name()).await?,
        };
        let headers = self.provider.auth_headers(&credential)?;
        Ok(request
            .headers(headers)
            .timeout(options.timeout.unwrap_or(DEFAULT_TIMEOUT)))
    }

    async fn get_json(&self, operation: &str, url: Url, options: &CallOptions) -> Result<Value> {
        let request = self.authorize(self.http.get(url), options).await?;
        send_json(operation, request).await
    }

    async fn post_json(
        &self,
        operation: &str,
        url: Url,
        body: &Value,
        options: &CallOptions,
    ) -> Result<Value> {
        let request = self.authorize(self.http.post(url).json(body), options).await?;
        send_json(operation, request).await
    }

    async fn retrieve(&self, batch_id: &str, options: &CallOptions) -> Result<CanonicalBatch> {
        let url = self.provider.build_retrieve_url(batch_id)?;
        let raw = self.get_json("Retrieve batch", url, options).await?;
        self.provider.map_status(raw, now_epoch())
    }
}

/// Fetches provider-served results. Credentials are only attached to URLs on
/// the provider's own origin.
struct ProviderFetch<P> {
    client: Arc<GatewayClient<P>>,
    options: CallOptions,
}

#[async_trait]
impl<P: BatchProvider> DirectFetch for ProviderFetch<P> {
    fn resolve_handle(&self, handle: &str) -> Result<Url> {
        match self.client.provider.build_results_url(handle) {
            Some(url) => url,
            None => UnsupportedPointerSnafu {
                pointer: handle,
                provider: self.client.provider.name(),
            }
            .fail(),
        }
    }

    async fn fetch(&self, url: Url) -> Result<Bytes> {
        let trusted = url.origin() == self.client.provider.base_url().origin();
        let request = if trusted {
            self.client
                .authorize(self.client.http.get(url), &self.options)
                .await?
        } else {
            debug!(
                host = url.host_str(),
                "fetching results off the provider origin without credentials"
            );
            self.client
                .http
                .get(url)
                .timeout(self.options.timeout.unwrap_or(DEFAULT_TIMEOUT))
        };
        send_bytes("Download batch results", request).await
    }
}

fn require_id(batch_id: &str) -> Result<()> {
    if batch_id.trim().is_empty() {
        return InvalidRequestSnafu {
            message: "batch id is empty",
        }
        .fail();
    }
    Ok(())
}

/// The canonical batch lifecycle over one provider.
///
/// Cloning is cheap: clones share the HTTP client and the provider.
pub struct BatchGateway<P: BatchProvider> {
    client: Arc<GatewayClient<P>>,
    storage: Option<Arc<dyn ObjectStore>>,
    options: CallOptions,
}

impl<P: BatchProvider> Clone for BatchGateway<P> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            storage: self.storage.clone(),
            options: self.options.clone(),
        }
    }
}

impl<P: BatchProvider> fmt::Debug for BatchGateway<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchGateway")
            .field("provider", &self.client.provider)
            .field("storage", &self.storage)
            .field("options", &self.options)
            .finish()
    }
}

impl<P: BatchProvider> BatchGateway<P> {
    /// Create a gateway with a default HTTP client
    pub fn new(provider: P, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self::with_http_client(provider, credentials, Client::new())
    }

    /// Create a gateway sending through the given HTTP client
    pub fn with_http_client(
        provider: P,
        credentials: Arc<dyn CredentialProvider>,
        http: Client,
    ) -> Self {
        Self {
            client: Arc::new(GatewayClient {
                http,
                provider,
                credentials,
            }),
            storage: None,
            options: CallOptions::default(),
        }
    }

    /// Sets the object store used to read prefix-style results.
    pub fn with_storage(mut self, storage: Arc<dyn ObjectStore>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// A gateway sharing this one's client that applies `options` to every call.
    pub fn with_options(&self, options: CallOptions) -> Self {
        Self {
            options,
            ..self.clone()
        }
    }

    pub fn provider(&self) -> &P {
        &self.client.provider
    }

    pub fn options(&self) -> &CallOptions {
        &self.options
    }

    /// Submits a new batch.
    #[instrument(skip_all, fields(provider = self.client.provider.name(), batch.id = tracing::field::Empty))]
    pub async fn create_batch(&self, request: CreateBatchRequest) -> Result<CanonicalBatch> {
        let provider = &self.client.provider;
        let body = provider.encode_request(&request)?;
        let url = provider.build_create_url()?;
        let raw = self
            .client
            .post_json("Create batch", url, &body, &self.options)
            .await?;
        let batch = provider.map_status(raw, now_epoch())?;
        tracing::Span::current().record("batch.id", batch.id.as_str());
        debug!(status = %batch.status, "created batch");
        Ok(batch)
    }

    /// Reads the current state of a batch.
    #[instrument(skip_all, fields(provider = self.client.provider.name(), batch.id = %batch_id))]
    pub async fn retrieve_batch(&self, batch_id: &str) -> Result<CanonicalBatch> {
        require_id(batch_id)?;
        self.client.retrieve(batch_id, &self.options).await
    }

    /// Requests cancellation, then reads the batch back.
    ///
    /// The returned status is usually `cancelling`; the provider may also
    /// report a terminal status if the batch finished first.
    #[instrument(skip_all, fields(provider = self.client.provider.name(), batch.id = %batch_id))]
    pub async fn cancel_batch(&self, batch_id: &str) -> Result<CanonicalBatch> {
        require_id(batch_id)?;
        let url = self.client.provider.build_cancel_url(batch_id)?;
        self.client
            .post_json("Cancel batch", url, &Value::Object(Default::default()), &self.options)
            .await?;
        self.client.retrieve(batch_id, &self.options).await
    }

    /// Fetches one page of batches.
    #[instrument(skip_all, fields(provider = self.client.provider.name(), limit = ?params.limit))]
    pub async fn list_batches(&self, params: ListParams) -> Result<BatchPage> {
        let url = self.client.provider.build_list_url(&params)?;
        let raw = self.client.get_json("List batches", url, &self.options).await?;
        self.client.provider.map_list(raw, now_epoch())
    }

    /// Lists every batch, fetching the next page only once the current one
    /// has been consumed. Stops if the provider hands back the token it was
    /// just given.
    pub fn list_all_batches(
        &self,
        page_size: Option<u32>,
    ) -> impl Stream<Item = Result<CanonicalBatch>> + Send {
        let gateway = self.clone();
        let mut params = ListParams {
            limit: page_size,
            after: None,
        };
        async_stream::try_stream! {
            loop {
                let page = gateway.list_batches(params.clone()).await?;

                for batch in page.data {
                    yield batch;
                }

                match page.next_page_token {
                    Some(token) if page.has_more => {
                        if params.after.as_deref() == Some(token.as_str()) {
                            warn!(token = %token, "provider repeated a page token, stopping");
                            break;
                        }
                        params.after = Some(token);
                    }
                    _ => break,
                }
            }
        }
    }

    /// Get a handle to a batch by its id.
    pub fn get_batch(&self, batch_id: &str) -> BatchHandle<P> {
        BatchHandle::new(batch_id.to_string(), self.clone())
    }

    /// The locator this gateway resolves result pointers with.
    pub fn result_locator(&self) -> ResultLocator {
        let direct = ProviderFetch {
            client: self.client.clone(),
            options: self.options.clone(),
        };
        let locator = ResultLocator::new(Arc::new(direct));
        match &self.storage {
            Some(storage) => locator.with_storage(storage.clone()),
            None => locator,
        }
    }

    /// Downloads the results of a batch.
    #[instrument(skip_all, fields(provider = self.client.provider.name(), batch.id = %batch.id))]
    pub async fn fetch_results(&self, batch: &CanonicalBatch) -> Result<Bytes> {
        let Some(pointer) = batch.output_file_id.as_deref() else {
            return ResultsNotFoundSnafu {
                location: format!("batch {} ({})", batch.id, batch.status),
            }
            .fail();
        };
        self.result_locator().locate_and_fetch(pointer).await
    }
}

#[cfg(feature = "anthropic")]
impl BatchGateway<crate::providers::AnthropicProvider> {
    /// Gateway to the public Anthropic API with a fixed key.
    pub fn anthropic(api_key: impl Into<String>) -> Result<Self> {
        let provider = crate::providers::AnthropicProvider::new()?;
        let credentials = crate::credentials::StaticCredential::new(api_key);
        Ok(Self::new(provider, Arc::new(credentials)))
    }

    /// Gateway configured from `ANTHROPIC_API_KEY` and `ANTHROPIC_API_BASE`.
    pub fn anthropic_from_env() -> Result<Self> {
        let provider = crate::providers::AnthropicProvider::from_env()?;
        let credentials =
            crate::credentials::EnvCredential::new(provider.credential_vars().iter().copied());
        Ok(Self::new(provider, Arc::new(credentials)))
    }
}

#[cfg(feature = "vertex")]
impl BatchGateway<crate::providers::VertexProvider> {
    /// Gateway to Vertex AI with a fixed OAuth access token.
    ///
    /// The token is also used to read results from Cloud Storage.
    pub fn vertex(
        project: impl Into<String>,
        location: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Result<Self> {
        let provider = crate::providers::VertexProvider::new(project, location)?;
        let credentials: Arc<dyn CredentialProvider> =
            Arc::new(crate::credentials::StaticCredential::new(access_token));
        Self::vertex_with(provider, credentials)
    }

    /// Gateway configured from the `VERTEXAI_*` environment variables.
    pub fn vertex_from_env() -> Result<Self> {
        let provider = crate::providers::VertexProvider::from_env()?;
        let credentials: Arc<dyn CredentialProvider> = Arc::new(
            crate::credentials::EnvCredential::new(provider.credential_vars().iter().copied()),
        );
        Self::vertex_with(provider, credentials)
    }

    fn vertex_with(
        provider: crate::providers::VertexProvider,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self> {
        let storage = crate::results::GcsObjectStore::new(credentials.clone())?;
        Ok(Self::new(provider, credentials).with_storage(Arc::new(storage)))
    }
}
