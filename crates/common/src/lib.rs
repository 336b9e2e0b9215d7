//! Shared identifier types used across the stock-sync crates.

mod types;

pub use types::{BlankKey, BlankVariantKey, GraphicVariantId, OrderId, WorkerId};
