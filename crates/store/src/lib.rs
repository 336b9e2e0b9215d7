//! Persisted state for the stock-sync system.
//!
//! Three keyed collections back the whole write protocol: blank-variant
//! stock records, graphic-to-blank association records, and per-order
//! processing/audit logs. Each collection is exposed as an async trait with
//! an in-memory implementation for tests/dev and a PostgreSQL
//! implementation for production.

mod error;
mod memory;
mod postgres;
mod records;
mod stores;

pub use error::{Result, StoreError};
pub use memory::{InMemoryAssociationStore, InMemoryOrderLogStore, InMemoryStockStore};
pub use postgres::{PgAssociationStore, PgOrderLogStore, PgStockStore, run_migrations};
pub use records::{
    AdjustMode, BlankVariantRecord, GraphicAssociation, ItemLog, ItemStatus, OrderStatus,
    OrderStockLog, SiblingFailure, SiblingRecord, StockChange,
};
pub use stores::{AssociationStore, OrderLogStore, StockStore};
