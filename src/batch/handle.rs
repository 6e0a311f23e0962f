use bytes::Bytes;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, instrument};

use crate::{
    batch::model::{BatchStatus, CanonicalBatch},
    client::BatchGateway,
    error::{Error, WaitTimeoutSnafu},
    providers::BatchProvider,
    Result,
};

/// A batch known by its id.
///
/// Obtained from [`BatchGateway::get_batch`]. Operations that consume the
/// handle hand it back alongside the error so the caller can retry.
pub struct BatchHandle<P: BatchProvider> {
    id: String,
    gateway: BatchGateway<P>,
}

impl<P: BatchProvider> Clone for BatchHandle<P> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            gateway: self.gateway.clone(),
        }
    }
}

impl<P: BatchProvider> std::fmt::Debug for BatchHandle<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchHandle")
            .field("id", &self.id)
            .field("provider", &self.gateway.provider().name())
            .finish()
    }
}

impl<P: BatchProvider> BatchHandle<P> {
    pub(crate) fn new(id: String, gateway: BatchGateway<P>) -> Self {
        Self { id, gateway }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Retrieves the current state of the batch.
    pub async fn status(&self) -> Result<CanonicalBatch> {
        self.gateway.retrieve_batch(&self.id).await
    }

    /// Requests cancellation and returns the state read back afterwards.
    pub async fn cancel(self) -> Result<CanonicalBatch, (Self, Error)> {
        match self.gateway.cancel_batch(&self.id).await {
            Ok(batch) => Ok(batch),
            Err(e) => Err((self, e)),
        }
    }

    /// Downloads the results of the batch in its current state.
    pub async fn results(&self) -> Result<Bytes> {
        let batch = self.status().await?;
        self.gateway.fetch_results(&batch).await
    }

    /// Polls until the batch reaches a terminal status.
    ///
    /// Returns the terminal batch whatever its outcome; callers inspect
    /// `status` to tell a completed batch from a failed one. A status no
    /// vocabulary recognizes also ends the wait, since it is not known to
    /// ever become terminal.
    #[instrument(skip_all, fields(
        batch.id = %self.id,
        poll.interval.secs = interval.as_secs(),
        timeout.secs = timeout.as_ref().map(|d| d.as_secs()),
    ))]
    pub async fn wait_for_completion(
        self,
        interval: Duration,
        timeout: Option<Duration>,
    ) -> Result<CanonicalBatch, (Self, Error)> {
        let start = Instant::now();

        loop {
            let batch = match self.status().await {
                Ok(batch) => batch,
                Err(e) => return Err((self, e)),
            };
            if batch.is_terminal() || matches!(batch.status, BatchStatus::Other(_)) {
                return Ok(batch);
            }
            debug!(status = %batch.status, "batch not finished yet");

            if let Some(timeout) = timeout {
                if start.elapsed() >= timeout {
                    let error = WaitTimeoutSnafu {
                        id: self.id.clone(),
                        seconds: timeout.as_secs(),
                    }
                    .build();
                    return Err((self, error));
                }
            }

            tokio::time::sleep(interval).await;
        }
    }
}
