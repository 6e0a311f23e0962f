//! # batch-gateway
//!
//! One batch-job lifecycle (create, retrieve, cancel, list and fetch results)
//! over the Anthropic Message Batches and Vertex AI batch prediction APIs.
//!
//! Every provider response is reconciled into a [`CanonicalBatch`] with the
//! same status vocabulary, request counters and timestamps, and every failure
//! is classified into an [`ErrorKind`].

pub mod batch;
#[cfg(feature = "blocking")]
pub mod blocking;
mod client;
mod common;
pub mod credentials;
pub mod error;
pub mod prelude;
pub mod providers;
pub mod results;


pub use batch::{
    BatchHandle, BatchInput, BatchPage, BatchStatus, CanonicalBatch, CreateBatchRequest,
    ListParams, RequestCounts,
};
#[cfg(feature = "blocking")]
pub use blocking::BlockingBatchGateway;
pub use client::{BatchGateway, CallOptions, DEFAULT_TIMEOUT};
pub use common::time::{iso_to_epoch, now_epoch};
pub use credentials::{CredentialProvider, EnvCredential, StaticCredential};
pub use error::{Error, ErrorKind, Result};
pub use providers::BatchProvider;
#[cfg(feature = "anthropic")]
pub use providers::AnthropicProvider;
#[cfg(feature = "vertex")]
pub use providers::VertexProvider;
pub use results::{GcsObjectStore, ObjectMeta, ObjectStore, ResultLocator, ResultPointer};
