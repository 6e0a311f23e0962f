pub mod encoder;
pub mod handle;
pub mod model;
pub mod reconciler;

pub use encoder::{encode, encode_line, encode_required, parse_lines, ParsedLine, RequestDialect};
pub use handle::BatchHandle;
pub use model::{
    BatchInput, BatchPage, BatchRequestItem, BatchStatus, CanonicalBatch, CreateBatchRequest,
    ListParams, RequestCounts, DEFAULT_COMPLETION_WINDOW, DEFAULT_ENDPOINT,
};
pub use reconciler::{
    derive_terminal_status, map_status, reconcile, ProviderCounts, RawBatchStatus, RawPhase,
    StatusVocabulary,
};
