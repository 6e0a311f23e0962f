//! # Status Reconciler
//!
//! Maps a provider's raw status payload onto the canonical lifecycle:
//!
//! ```text
//! validating -> in_progress -> finalizing -> {completed, failed, expired, cancelled}
//!                    \              /
//!                     `-> cancelling -> cancelled (or completed/failed/expired)
//! ```
//!
//! Each provider supplies a [`StatusVocabulary`] naming which of its raw
//! status strings mean what. A raw status in the [`RawPhase::Ended`] phase is
//! ambiguous on its own and is resolved from the per-outcome counters by
//! [`derive_terminal_status`].
//!
//! Reconciliation is pure: the same [`RawBatchStatus`] and `now` always yield
//! the same [`CanonicalBatch`].

use serde_json::Value;
use tracing::warn;

use crate::{
    batch::model::{
        BatchStatus, CanonicalBatch, RequestCounts, DEFAULT_COMPLETION_WINDOW, DEFAULT_ENDPOINT,
    },
    common::time::iso_to_epoch,
};

/// What a raw vendor status string means in canonical terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawPhase {
    Validating,
    InProgress,
    Finalizing,
    Cancelling,
    /// A single terminal value that must be disambiguated by counters.
    Ended,
    Completed,
    Failed,
    Expired,
    Cancelled,
}

/// A provider's raw status vocabulary.
#[derive(Debug, Clone, Copy)]
pub struct StatusVocabulary {
    entries: &'static [(&'static str, RawPhase)],
}

impl StatusVocabulary {
    pub const fn new(entries: &'static [(&'static str, RawPhase)]) -> Self {
        Self { entries }
    }

    /// Looks up the phase of a raw status string.
    pub fn phase(&self, raw: &str) -> Option<RawPhase> {
        self.entries
            .iter()
            .find(|(name, _)| *name == raw)
            .map(|(_, phase)| *phase)
    }
}

/// Raw per-outcome counters as a vendor reports them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ProviderCounts {
    pub processing: u64,
    pub succeeded: u64,
    pub errored: u64,
    pub canceled: u64,
    pub expired: u64,
}

impl ProviderCounts {
    /// Reduces vendor counters to canonical ones.
    ///
    /// Cancelled and expired items are counted as failed; callers that need
    /// the distinction must read the provider-native payload.
    pub fn reduce(&self) -> RequestCounts {
        let failed = self
            .errored
            .saturating_add(self.canceled)
            .saturating_add(self.expired);
        RequestCounts {
            completed: self.succeeded,
            failed,
            total: self
                .processing
                .saturating_add(self.succeeded)
                .saturating_add(failed),
        }
    }
}

/// Resolves an ambiguous "ended" status from the outcome counters.
///
/// A batch is only `completed` when every item succeeded; all-zero counters
/// count as vacuous success.
pub fn derive_terminal_status(counts: &ProviderCounts) -> BatchStatus {
    let ProviderCounts {
        succeeded,
        errored,
        canceled,
        expired,
        ..
    } = *counts;

    if canceled > 0 && succeeded == 0 && errored == 0 && expired == 0 {
        BatchStatus::Cancelled
    } else if expired > 0 && succeeded == 0 && errored == 0 && canceled == 0 {
        BatchStatus::Expired
    } else if errored > 0 || canceled > 0 || expired > 0 {
        // errored-only and mixed outcomes, partial success included
        BatchStatus::Failed
    } else {
        BatchStatus::Completed
    }
}

/// A vendor status payload flattened into the fields reconciliation reads.
///
/// Providers fill this from their own wire types; timestamps stay as the
/// vendor's ISO-8601 strings until reconciliation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawBatchStatus {
    pub id: String,
    pub status: Option<String>,
    pub endpoint: Option<String>,
    pub input_file_id: Option<String>,
    pub created_at: Option<String>,
    pub started_at: Option<String>,
    pub ended_at: Option<String>,
    pub expires_at: Option<String>,
    pub cancel_initiated_at: Option<String>,
    pub counts: ProviderCounts,
    pub output_file_id: Option<String>,
    pub error_file_id: Option<String>,
    pub metadata: Option<Value>,
    pub usage: Option<Value>,
    pub errors: Option<Value>,
}

/// Maps a raw status string to a canonical status.
///
/// A missing status means the submission was just accepted. Unrecognized
/// strings pass through unchanged.
pub fn map_status(
    raw: Option<&str>,
    counts: &ProviderCounts,
    vocabulary: &StatusVocabulary,
) -> BatchStatus {
    let Some(raw) = raw else {
        return BatchStatus::Validating;
    };
    match vocabulary.phase(raw) {
        Some(RawPhase::Validating) => BatchStatus::Validating,
        Some(RawPhase::InProgress) => BatchStatus::InProgress,
        Some(RawPhase::Finalizing) => BatchStatus::Finalizing,
        Some(RawPhase::Cancelling) => BatchStatus::Cancelling,
        Some(RawPhase::Ended) => derive_terminal_status(counts),
        Some(RawPhase::Completed) => BatchStatus::Completed,
        Some(RawPhase::Failed) => BatchStatus::Failed,
        Some(RawPhase::Expired) => BatchStatus::Expired,
        Some(RawPhase::Cancelled) => BatchStatus::Cancelled,
        None => {
            // canonical names come back as their typed variant
            let status = BatchStatus::from(raw.to_string());
            if matches!(status, BatchStatus::Other(_)) {
                warn!(status = raw, "passing through unrecognized batch status");
            }
            status
        }
    }
}

/// Derives the canonical batch for a raw status payload.
///
/// `now` is the creation time used when the vendor reports none.
pub fn reconcile(raw: RawBatchStatus, vocabulary: &StatusVocabulary, now: i64) -> CanonicalBatch {
    let status = map_status(raw.status.as_deref(), &raw.counts, vocabulary);

    let created_at = iso_to_epoch(raw.created_at.as_deref()).unwrap_or(now);
    let in_progress_at = iso_to_epoch(raw.started_at.as_deref());
    let cancelling_at = iso_to_epoch(raw.cancel_initiated_at.as_deref());

    // The vendor's single end time lands only in the field of the derived status.
    let ended_at = status.is_terminal().then(|| {
        iso_to_epoch(raw.ended_at.as_deref())
            .or(cancelling_at)
            .or(in_progress_at)
            .unwrap_or(created_at)
    });
    let terminal_at = |target: BatchStatus| ended_at.filter(|_| status == target);

    CanonicalBatch {
        id: raw.id,
        object: "batch".to_string(),
        endpoint: raw.endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
        input_file_id: raw.input_file_id.unwrap_or_default(),
        completion_window: DEFAULT_COMPLETION_WINDOW.to_string(),
        created_at,
        in_progress_at,
        finalizing_at: None,
        completed_at: terminal_at(BatchStatus::Completed),
        failed_at: terminal_at(BatchStatus::Failed),
        expired_at: terminal_at(BatchStatus::Expired),
        cancelled_at: terminal_at(BatchStatus::Cancelled),
        cancelling_at,
        expires_at: iso_to_epoch(raw.expires_at.as_deref()),
        request_counts: raw.counts.reduce(),
        output_file_id: raw.output_file_id.filter(|id| !id.is_empty()),
        error_file_id: raw.error_file_id.filter(|id| !id.is_empty()),
        metadata: raw.metadata,
        usage: raw.usage,
        errors: raw.errors,
        status,
    }
}
