use common::{BlankKey, GraphicVariantId};
use thiserror::Error;

/// Errors that abort an engine operation.
///
/// Sibling-level and expected item-level failures (missing mapping, missing
/// stock record, platform rate limits) are contained inside the processing
/// run and recorded in the order log; only these escape.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The variant has no blank association. Fatal only for the manual
    /// override path; the order path records a skip instead.
    #[error("No blank association for variant {0}")]
    MappingNotFound(GraphicVariantId),

    /// An override request named a blank key that contradicts the variant's
    /// association.
    #[error(
        "Blank key mismatch for variant {variant_id}: request says {requested}, association says {actual}"
    )]
    BlankKeyMismatch {
        variant_id: GraphicVariantId,
        requested: BlankKey,
        actual: BlankKey,
    },

    /// Persisted state access failed.
    #[error("Store error: {0}")]
    Store(#[from] store::StoreError),

    /// Job queue access failed.
    #[error("Queue error: {0}")]
    Queue(#[from] queue::QueueError),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
