//! Provider adapters.
//!
//! Every vendor implements [`BatchProvider`]; [`crate::BatchGateway`] is
//! generic over it and owns the HTTP plumbing, so an adapter is only URL
//! building, payload translation and status mapping.

use reqwest::header::HeaderMap;
use serde_json::Value;
use std::fmt;
use tracing::warn;
use url::Url;

use crate::{
    batch::model::{BatchPage, CanonicalBatch, CreateBatchRequest, ListParams},
    Result,
};

#[cfg(feature = "anthropic")]
pub mod anthropic;
#[cfg(feature = "vertex")]
pub mod vertex;

#[cfg(feature = "anthropic")]
pub use anthropic::AnthropicProvider;
#[cfg(feature = "vertex")]
pub use vertex::VertexProvider;

/// The capability set of one batch vendor.
pub trait BatchProvider: Send + Sync + fmt::Debug + 'static {
    /// Short provider name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Environment variables the credential may be read from, in order.
    fn credential_vars(&self) -> &'static [&'static str];

    /// Builds the vendor-native creation payload.
    fn encode_request(&self, request: &CreateBatchRequest) -> Result<Value>;

    /// The API root; only URLs on its origin are sent credentials.
    fn base_url(&self) -> &Url;

    fn build_create_url(&self) -> Result<Url>;

    fn build_retrieve_url(&self, batch_id: &str) -> Result<Url>;

    fn build_cancel_url(&self, batch_id: &str) -> Result<Url>;

    fn build_list_url(&self, params: &ListParams) -> Result<Url>;

    /// Resolves a results handle, such as a bare batch id, to a URL. `None`
    /// when the provider has no such handles.
    fn build_results_url(&self, handle: &str) -> Option<Result<Url>> {
        let _ = handle;
        None
    }

    /// Headers authenticating a request with `credential`.
    fn auth_headers(&self, credential: &str) -> Result<HeaderMap>;

    /// Reconciles one raw status payload. `now` stands in for a missing
    /// creation time.
    fn map_status(&self, raw: Value, now: i64) -> Result<CanonicalBatch>;

    /// Maps one raw list page.
    fn map_list(&self, raw: Value, now: i64) -> Result<BatchPage>;
}

/// Reconciles every list item that decodes, skipping the rest.
pub(crate) fn map_items<P>(provider: &P, items: Vec<Value>, now: i64) -> Vec<CanonicalBatch>
where
    P: BatchProvider + ?Sized,
{
    items
        .into_iter()
        .filter_map(|item| match provider.map_status(item, now) {
            Ok(batch) => Some(batch),
            Err(error) => {
                warn!(provider = provider.name(), %error, "skipping undecodable batch in list");
                None
            }
        })
        .collect()
}
