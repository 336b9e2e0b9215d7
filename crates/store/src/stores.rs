//! Async traits over the three persisted collections.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{BlankKey, BlankVariantKey, GraphicVariantId, OrderId};

use crate::Result;
use crate::records::{
    AdjustMode, BlankVariantRecord, GraphicAssociation, ItemLog, ItemStatus, OrderStatus,
    OrderStockLog, SiblingRecord, StockChange,
};

/// Authoritative per-blank-variant stock counters.
///
/// All stock mutations go through this trait; `decrement` and `adjust` are
/// single atomic read-modify-writes, so concurrent orders against the same
/// blank variant never lose an update.
#[async_trait]
pub trait StockStore: Send + Sync {
    /// Fetches a stock record by its full key.
    async fn get(&self, key: &BlankVariantKey) -> Result<Option<BlankVariantRecord>>;

    /// Inserts or replaces a stock record. Used by seeding and reconciliation
    /// tooling, not by the order path.
    async fn put(&self, record: BlankVariantRecord) -> Result<()>;

    /// Lists all size/color records for a blank style.
    async fn list(&self, blank_key: &BlankKey) -> Result<Vec<BlankVariantRecord>>;

    /// Atomically decrements stock by `quantity`, clamping at zero, and
    /// stamps `last_order`. Fails with `StockRecordNotFound` if the record
    /// does not exist.
    async fn decrement(
        &self,
        key: &BlankVariantKey,
        quantity: i64,
        order_ref: Option<&str>,
    ) -> Result<StockChange>;

    /// Atomically applies a manual correction: `Set` replaces the count,
    /// `Add` applies a signed delta. Both clamp at zero.
    async fn adjust(&self, key: &BlankVariantKey, value: i64, mode: AdjustMode)
    -> Result<StockChange>;
}

/// Graphic-to-blank association records.
#[async_trait]
pub trait AssociationStore: Send + Sync {
    /// Looks up the association for a graphic variant. `None` is an expected
    /// outcome: not every sellable variant is blank-backed.
    async fn get(&self, id: &GraphicVariantId) -> Result<Option<GraphicAssociation>>;

    /// Returns every association pointing at the given blank variant — the
    /// fan-out target set, including the originating variant.
    async fn siblings(&self, key: &BlankVariantKey) -> Result<Vec<GraphicAssociation>>;

    /// Inserts or replaces an association. Used by the external
    /// batch-assignment process and test seeding.
    async fn put(&self, association: GraphicAssociation) -> Result<()>;
}

/// Per-order processing/audit logs.
///
/// The log is written incrementally throughout a run so a concurrent
/// observer sees live progress, and item-level completion markers are what
/// make reclaimed-lock re-entry idempotent.
#[async_trait]
pub trait OrderLogStore: Send + Sync {
    /// Fetches the log for an order.
    async fn get(&self, order_id: &OrderId) -> Result<Option<OrderStockLog>>;

    /// Creates a new log. Fails with `OrderLogExists` if one is already
    /// present for the order id.
    async fn create(&self, log: OrderStockLog) -> Result<()>;

    /// Sets the top-level status and lock timestamp.
    async fn set_status(
        &self,
        order_id: &OrderId,
        status: OrderStatus,
        locked_at: Option<DateTime<Utc>>,
    ) -> Result<()>;

    /// Records an error that escaped the per-item boundary, leaving
    /// already-recorded item entries untouched.
    async fn set_critical_error(&self, order_id: &OrderId, error: &str) -> Result<()>;

    /// Inserts or replaces one line item's entry.
    async fn upsert_item(
        &self,
        order_id: &OrderId,
        variant_id: &GraphicVariantId,
        item: ItemLog,
    ) -> Result<()>;

    /// Sets the status of one line item's entry.
    async fn set_item_status(
        &self,
        order_id: &OrderId,
        variant_id: &GraphicVariantId,
        status: ItemStatus,
    ) -> Result<()>;

    /// Appends one sibling fan-out result to an item entry and bumps its
    /// processed counter. Called as each sibling completes.
    async fn record_sibling(
        &self,
        order_id: &OrderId,
        variant_id: &GraphicVariantId,
        record: SiblingRecord,
    ) -> Result<()>;
}
