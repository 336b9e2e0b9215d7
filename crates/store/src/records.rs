//! Record types for the three persisted collections.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::{BlankKey, BlankVariantKey, GraphicVariantId, OrderId};
use serde::{Deserialize, Serialize};

/// Authoritative stock counter for one physically stocked blank variant.
///
/// `stock` is never negative: decrements that would go below zero clamp to
/// zero. The count is a planning aid, not a hard allocation gate, so
/// oversell is tolerated rather than rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlankVariantRecord {
    pub key: BlankVariantKey,
    pub stock: i64,
    /// External inventory item id on the commerce platform, if known.
    pub inventory_handle: Option<String>,
    /// Reference to the last order that decremented this record.
    pub last_order: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl BlankVariantRecord {
    /// Creates a record with the given starting stock.
    pub fn new(key: BlankVariantKey, stock: i64) -> Self {
        Self {
            key,
            stock,
            inventory_handle: None,
            last_order: None,
            updated_at: Utc::now(),
        }
    }

    /// Sets the external inventory handle.
    pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
        self.inventory_handle = Some(handle.into());
        self
    }
}

/// Outcome of an atomic stock mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockChange {
    pub previous: i64,
    pub new: i64,
}

/// Manual correction mode for operator stock adjustments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustMode {
    /// Replace the count with the given value.
    Set,
    /// Apply a signed delta to the current value.
    Add,
}

/// Mapping from a sellable graphic variant to the blank variant whose
/// physical stock it consumes.
///
/// Created by an external batch-assignment process; read-only to the core
/// write protocol. The size/color fields are denormalized from the blank
/// variant so the full stock key can be built without a second lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphicAssociation {
    pub graphic_variant_id: GraphicVariantId,
    pub blank_key: BlankKey,
    pub size: String,
    pub color: String,
    pub inventory_handle: Option<String>,
}

impl GraphicAssociation {
    /// Returns the full key of the backing blank variant.
    pub fn blank_variant(&self) -> BlankVariantKey {
        BlankVariantKey::new(self.blank_key.clone(), self.size.clone(), self.color.clone())
    }
}

/// Top-level status of an order's processing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Received,
    Processing,
    Completed,
    Failed,
}

/// Status of one line item inside an order log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Processing,
    Completed,
    Failed,
    /// The line item has no blank association and was deliberately not
    /// synced. Recorded explicitly so data-quality gaps stay visible.
    Skipped,
}

/// A sibling graphic variant whose inventory update failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiblingFailure {
    pub variant_id: GraphicVariantId,
    pub error: String,
}

/// Incremental per-sibling result appended to an item entry during fan-out.
#[derive(Debug, Clone)]
pub enum SiblingRecord {
    Updated(GraphicVariantId),
    Failed(SiblingFailure),
}

/// Per-line-item progress entry inside an order log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemLog {
    pub status: ItemStatus,
    pub quantity: i64,
    pub blank_key: Option<BlankKey>,
    pub previous_stock: Option<i64>,
    pub new_stock: Option<i64>,
    pub total_graphics: u32,
    pub graphics_processed: u32,
    /// Sibling variants whose inventory was set to the new stock value.
    pub updated: Vec<GraphicVariantId>,
    /// Sibling variants whose update failed, with the error text.
    pub failed: Vec<SiblingFailure>,
    /// Why the item was skipped or failed, when it was.
    pub reason: Option<String>,
}

impl ItemLog {
    /// Entry for an item whose decrement succeeded and whose fan-out is
    /// starting.
    pub fn processing(
        quantity: i64,
        blank_key: BlankKey,
        change: StockChange,
        total_graphics: u32,
    ) -> Self {
        Self {
            status: ItemStatus::Processing,
            quantity,
            blank_key: Some(blank_key),
            previous_stock: Some(change.previous),
            new_stock: Some(change.new),
            total_graphics,
            graphics_processed: 0,
            updated: Vec::new(),
            failed: Vec::new(),
            reason: None,
        }
    }

    /// Entry for an item with no blank association.
    pub fn skipped(quantity: i64, reason: impl Into<String>) -> Self {
        Self {
            status: ItemStatus::Skipped,
            quantity,
            blank_key: None,
            previous_stock: None,
            new_stock: None,
            total_graphics: 0,
            graphics_processed: 0,
            updated: Vec::new(),
            failed: Vec::new(),
            reason: Some(reason.into()),
        }
    }

    /// Entry for an item that failed before fan-out could start.
    pub fn failed(quantity: i64, blank_key: Option<BlankKey>, reason: impl Into<String>) -> Self {
        Self {
            status: ItemStatus::Failed,
            quantity,
            blank_key,
            previous_stock: None,
            new_stock: None,
            total_graphics: 0,
            graphics_processed: 0,
            updated: Vec::new(),
            failed: Vec::new(),
            reason: Some(reason.into()),
        }
    }

    /// Applies an incremental sibling result to this entry.
    pub fn apply(&mut self, record: SiblingRecord) {
        self.graphics_processed += 1;
        match record {
            SiblingRecord::Updated(id) => self.updated.push(id),
            SiblingRecord::Failed(failure) => self.failed.push(failure),
        }
    }
}

/// Per-order processing record: both the idempotency anchor for webhook
/// deliveries and the operator-visible audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStockLog {
    pub order_id: OrderId,
    pub order_number: Option<String>,
    pub status: OrderStatus,
    /// Per-line-item progress, keyed by graphic variant id.
    pub items: HashMap<GraphicVariantId, ItemLog>,
    /// When the current processing run acquired the order. Stale locks
    /// (older than the configured timeout) are reclaimable.
    pub locked_at: Option<DateTime<Utc>>,
    /// Set when an error escaped the per-item boundary and aborted the run.
    pub critical_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderStockLog {
    /// Creates a fresh log in `Received` state for a first-time delivery.
    pub fn received(order_id: OrderId, order_number: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            order_id,
            order_number,
            status: OrderStatus::Received,
            items: HashMap::new(),
            locked_at: None,
            critical_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Age of the current lock, if one is held.
    pub fn lock_age(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.locked_at.map(|at| now - at)
    }
}
