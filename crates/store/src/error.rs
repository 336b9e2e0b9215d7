use common::{BlankVariantKey, OrderId};
use thiserror::Error;

/// Errors that can occur when interacting with the persisted collections.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The blank-variant stock record does not exist.
    #[error("Stock record not found: {0}")]
    StockRecordNotFound(BlankVariantKey),

    /// The order log does not exist.
    #[error("Order log not found: {0}")]
    OrderLogNotFound(OrderId),

    /// An order log with this id already exists.
    #[error("Order log already exists: {0}")]
    OrderLogExists(OrderId),

    /// The order log has no entry for the given line-item variant.
    #[error("Order log {order_id} has no item entry for variant {variant_id}")]
    ItemNotFound {
        order_id: OrderId,
        variant_id: common::GraphicVariantId,
    },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
