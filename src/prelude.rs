//! # Prelude
//!
//! Re-exports the types most callers need:
//!
//! ```rust,ignore
//! use batch_gateway::prelude::*;
//! ```

#[cfg(feature = "blocking")]
pub use crate::blocking::BlockingBatchGateway;
#[cfg(feature = "anthropic")]
pub use crate::providers::AnthropicProvider;
#[cfg(feature = "vertex")]
pub use crate::providers::VertexProvider;

pub use crate::batch::{
    BatchHandle, BatchPage, BatchStatus, CanonicalBatch, CreateBatchRequest, ListParams,
};
pub use crate::client::{BatchGateway, CallOptions};
pub use crate::credentials::{CredentialProvider, EnvCredential, StaticCredential};
pub use crate::error::{Error, ErrorKind};
pub use crate::providers::BatchProvider;
