//! Synchronous wrapper over [`BatchGateway`].
//!
//! Each wrapper owns a single-threaded runtime and blocks on the async
//! operation. Do not call these from inside an async context.

use bytes::Bytes;
use snafu::ResultExt;
use std::{fmt, time::Duration};
use tokio::runtime::{Builder, Runtime};

use crate::{
    batch::model::{BatchPage, CanonicalBatch, CreateBatchRequest, ListParams},
    client::BatchGateway,
    error::RuntimeSnafu,
    providers::BatchProvider,
    Error, Result,
};

pub struct BlockingBatchGateway<P: BatchProvider> {
    inner: BatchGateway<P>,
    runtime: Runtime,
}

impl<P: BatchProvider> fmt::Debug for BlockingBatchGateway<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingBatchGateway")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl<P: BatchProvider> BlockingBatchGateway<P> {
    pub fn new(inner: BatchGateway<P>) -> Result<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .context(RuntimeSnafu)?;
        Ok(Self { inner, runtime })
    }

    /// The async gateway this wrapper drives.
    pub fn inner(&self) -> &BatchGateway<P> {
        &self.inner
    }

    pub fn create_batch(&self, request: CreateBatchRequest) -> Result<CanonicalBatch> {
        self.runtime.block_on(self.inner.create_batch(request))
    }

    pub fn retrieve_batch(&self, batch_id: &str) -> Result<CanonicalBatch> {
        self.runtime.block_on(self.inner.retrieve_batch(batch_id))
    }

    pub fn cancel_batch(&self, batch_id: &str) -> Result<CanonicalBatch> {
        self.runtime.block_on(self.inner.cancel_batch(batch_id))
    }

    pub fn list_batches(&self, params: ListParams) -> Result<BatchPage> {
        self.runtime.block_on(self.inner.list_batches(params))
    }

    pub fn fetch_results(&self, batch: &CanonicalBatch) -> Result<Bytes> {
        self.runtime.block_on(self.inner.fetch_results(batch))
    }

    /// Polls until the batch is terminal. See [`crate::BatchHandle::wait_for_completion`].
    pub fn wait_for_completion(
        &self,
        batch_id: &str,
        interval: Duration,
        timeout: Option<Duration>,
    ) -> Result<CanonicalBatch> {
        let handle = self.inner.get_batch(batch_id);
        self.runtime
            .block_on(handle.wait_for_completion(interval, timeout))
            .map_err(|(_, e): (_, Error)| e)
    }
}

impl<P: BatchProvider> BatchGateway<P> {
    /// Wraps this gateway for use from synchronous code.
    pub fn blocking(self) -> Result<BlockingBatchGateway<P>> {
        BlockingBatchGateway::new(self)
    }
}
