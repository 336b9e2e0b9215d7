//! Authoritative stock counter operations.

use std::sync::Arc;

use common::BlankVariantKey;
use store::{AdjustMode, BlankVariantRecord, StockChange, StockStore};

use crate::Result;

/// The only writer of blank-variant stock.
///
/// Both mutations are single atomic read-modify-writes in the backing
/// store, so concurrent orders against the same blank variant are
/// linearized there; the ledger adds instrumentation on top.
#[derive(Clone)]
pub struct StockLedger {
    stock: Arc<dyn StockStore>,
}

impl StockLedger {
    pub fn new(stock: Arc<dyn StockStore>) -> Self {
        Self { stock }
    }

    /// Fetches the current record for a blank variant.
    pub async fn get(&self, key: &BlankVariantKey) -> Result<Option<BlankVariantRecord>> {
        Ok(self.stock.get(key).await?)
    }

    /// Atomically decrements stock, clamping at zero.
    #[tracing::instrument(skip(self), fields(key = %key))]
    pub async fn decrement(
        &self,
        key: &BlankVariantKey,
        quantity: i64,
        order_ref: Option<&str>,
    ) -> store::Result<StockChange> {
        let change = self.stock.decrement(key, quantity, order_ref).await?;
        metrics::counter!("stock_decrements_total").increment(1);
        if change.new == 0 && change.previous < quantity {
            // Oversell is tolerated by design, but worth flagging.
            tracing::warn!(
                %key,
                previous = change.previous,
                quantity,
                "decrement clamped at zero, order exceeds recorded stock"
            );
            metrics::counter!("stock_decrements_clamped_total").increment(1);
        }
        Ok(change)
    }

    /// Applies a manual operator correction.
    #[tracing::instrument(skip(self), fields(key = %key))]
    pub async fn adjust(
        &self,
        key: &BlankVariantKey,
        value: i64,
        mode: AdjustMode,
    ) -> store::Result<StockChange> {
        let change = self.stock.adjust(key, value, mode).await?;
        metrics::counter!("stock_adjustments_total").increment(1);
        tracing::info!(
            %key,
            previous = change.previous,
            new = change.new,
            ?mode,
            "manual stock adjustment applied"
        );
        Ok(change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::BlankKey;
    use store::InMemoryStockStore;

    fn key() -> BlankVariantKey {
        BlankVariantKey::new(BlankKey::new("BELLA-3001"), "M", "Black")
    }

    async fn ledger_with_stock(stock: i64) -> StockLedger {
        let store = Arc::new(InMemoryStockStore::new());
        store
            .put(BlankVariantRecord::new(key(), stock))
            .await
            .unwrap();
        StockLedger::new(store)
    }

    #[tokio::test]
    async fn decrement_applies_and_reports_change() {
        let ledger = ledger_with_stock(10).await;
        let change = ledger.decrement(&key(), 3, Some("1001")).await.unwrap();
        assert_eq!(change, StockChange { previous: 10, new: 7 });
    }

    #[tokio::test]
    async fn oversell_clamps_to_zero() {
        let ledger = ledger_with_stock(10).await;
        let change = ledger.decrement(&key(), 15, None).await.unwrap();
        assert_eq!(change, StockChange { previous: 10, new: 0 });

        let record = ledger.get(&key()).await.unwrap().unwrap();
        assert_eq!(record.stock, 0);
    }

    #[tokio::test]
    async fn adjust_add_applies_signed_delta() {
        let ledger = ledger_with_stock(7).await;
        let change = ledger.adjust(&key(), 5, AdjustMode::Add).await.unwrap();
        assert_eq!(change, StockChange { previous: 7, new: 12 });
    }
}
