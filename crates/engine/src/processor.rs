//! The idempotent order processor: webhook deliveries in, converged
//! sibling inventories and an audit log out.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::{BlankKey, GraphicVariantId, OrderId, WorkerId};
use queue::{ClaimOutcome, JobQueue};
use store::{
    AdjustMode, AssociationStore, ItemLog, ItemStatus, OrderLogStore, OrderStatus, OrderStockLog,
    SiblingFailure, SiblingRecord, StockStore, StoreError,
};

use commerce::CommerceClient;

use crate::{
    EngineError, Result,
    ledger::StockLedger,
    payload::{LineItem, OrderPayload},
    propagator::{NullSink, ProgressSink, Propagator},
    resolver::MappingResolver,
};

/// Tuning knobs for the processing pipeline.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Age past which a processing lock is considered abandoned.
    pub lock_timeout: chrono::Duration,
    /// Maximum in-flight sibling updates per fan-out.
    pub fanout_concurrency: usize,
    /// Minimum spacing between outbound platform calls.
    pub fanout_min_delay: Duration,
    /// Pause before the single 429 retry when the platform suggests none.
    pub retry_backoff: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            lock_timeout: chrono::Duration::minutes(5),
            fanout_concurrency: 2,
            fanout_min_delay: Duration::from_millis(500),
            retry_backoff: Duration::from_secs(1),
        }
    }
}

/// How a delivery was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessDisposition {
    /// This delivery ran the processing pipeline.
    Processed,
    /// The order had already completed; the delivery was a no-op.
    AlreadyCompleted,
    /// Another worker holds a fresh lock on the order.
    AlreadyProcessing,
}

/// Result of handling one webhook delivery.
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub disposition: ProcessDisposition,
    pub order_number: Option<String>,
    /// Line items that completed (in this run or a previous one).
    pub processed: u32,
    /// Item-level failures plus failed sibling updates.
    pub errors: u32,
}

/// Result of handling one line item.
#[derive(Debug, Clone, Copy)]
enum ItemOutcome {
    Completed { sibling_failures: u32 },
    Skipped,
    Failed,
}

/// A manual stock correction request.
#[derive(Debug, Clone)]
pub struct OverrideRequest {
    pub variant_id: GraphicVariantId,
    /// Expected blank style, checked against the variant's association
    /// when given.
    pub blank_key: Option<BlankKey>,
    pub value: i64,
    pub mode: AdjustMode,
}

/// Result of a manual stock correction.
#[derive(Debug, Clone)]
pub struct OverrideOutcome {
    pub previous_stock: i64,
    pub new_stock: i64,
    pub updated: Vec<GraphicVariantId>,
    pub failed: Vec<SiblingFailure>,
}

/// Feeds fan-out progress for one line item into the order log.
struct LogProgressSink {
    logs: Arc<dyn OrderLogStore>,
    order_id: OrderId,
    variant_id: GraphicVariantId,
}

#[async_trait]
impl ProgressSink for LogProgressSink {
    async fn sibling_done(&self, record: &SiblingRecord) -> std::result::Result<(), StoreError> {
        self.logs
            .record_sibling(&self.order_id, &self.variant_id, record.clone())
            .await
    }
}

/// Drives a paid order through mapping resolution, the stock ledger,
/// sibling fan-out, and the audit log.
///
/// Processing is idempotent at two levels: the order log short-circuits
/// repeat deliveries of completed orders, and item-level completion
/// markers let a reclaimed stale run resume without double-decrementing.
pub struct OrderProcessor<C: CommerceClient> {
    resolver: MappingResolver,
    ledger: StockLedger,
    logs: Arc<dyn OrderLogStore>,
    queue: Arc<dyn JobQueue>,
    propagator: Propagator<C>,
    lock_timeout: chrono::Duration,
    worker: WorkerId,
}

impl<C: CommerceClient> OrderProcessor<C> {
    pub fn new(
        stock: Arc<dyn StockStore>,
        associations: Arc<dyn AssociationStore>,
        logs: Arc<dyn OrderLogStore>,
        queue: Arc<dyn JobQueue>,
        client: Arc<C>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            resolver: MappingResolver::new(associations),
            ledger: StockLedger::new(stock),
            logs,
            queue,
            propagator: Propagator::new(
                client,
                settings.fanout_concurrency,
                settings.fanout_min_delay,
                settings.retry_backoff,
            ),
            lock_timeout: settings.lock_timeout,
            worker: WorkerId::random(),
        }
    }

    /// Handles one paid-order delivery end to end.
    #[tracing::instrument(skip(self, payload), fields(order_id = %payload.id, worker = %self.worker))]
    pub async fn process_order(&self, payload: &OrderPayload) -> Result<ProcessOutcome> {
        metrics::counter!("webhook_orders_total").increment(1);
        let order_id = payload.order_id();
        let now = Utc::now();

        match self.logs.get(&order_id).await? {
            Some(log) if log.status == OrderStatus::Completed => {
                tracing::info!("order already completed, ignoring duplicate delivery");
                metrics::counter!("webhook_duplicates_total").increment(1);
                return Ok(outcome_from_log(ProcessDisposition::AlreadyCompleted, &log));
            }
            Some(log)
                if log.status == OrderStatus::Processing
                    && log.lock_age(now).is_some_and(|age| age < self.lock_timeout) =>
            {
                tracing::info!("order is being processed by another worker");
                return Ok(outcome_from_log(
                    ProcessDisposition::AlreadyProcessing,
                    &log,
                ));
            }
            Some(log) if log.status == OrderStatus::Processing => {
                tracing::warn!(
                    locked_at = ?log.locked_at,
                    "order log holds a stale lock, resuming"
                );
            }
            Some(_) => {}
            None => {
                let log = OrderStockLog::received(order_id.clone(), payload.order_number.clone());
                match self.logs.create(log).await {
                    Ok(()) => {}
                    // Lost the creation race to a concurrent delivery.
                    Err(StoreError::OrderLogExists(_)) => {
                        return Ok(ProcessOutcome {
                            disposition: ProcessDisposition::AlreadyProcessing,
                            order_number: payload.order_number.clone(),
                            processed: 0,
                            errors: 0,
                        });
                    }
                    Err(err) => return Err(err.into()),
                }
            }
        }

        self.queue.enqueue(order_id.clone()).await?;
        match self.queue.claim(&order_id, &self.worker).await? {
            ClaimOutcome::Claimed(job) => {
                tracing::debug!(attempts = job.attempts, "claimed processing job");
            }
            ClaimOutcome::Busy { locked_by, .. } => {
                tracing::info!(?locked_by, "processing job held by another worker");
                return Ok(ProcessOutcome {
                    disposition: ProcessDisposition::AlreadyProcessing,
                    order_number: payload.order_number.clone(),
                    processed: 0,
                    errors: 0,
                });
            }
            ClaimOutcome::Completed => {
                let log = self.logs.get(&order_id).await?;
                return Ok(match log {
                    Some(log) => outcome_from_log(ProcessDisposition::AlreadyCompleted, &log),
                    None => ProcessOutcome {
                        disposition: ProcessDisposition::AlreadyCompleted,
                        order_number: payload.order_number.clone(),
                        processed: 0,
                        errors: 0,
                    },
                });
            }
        }

        self.logs
            .set_status(&order_id, OrderStatus::Processing, Some(Utc::now()))
            .await?;

        let started = std::time::Instant::now();
        match self.run_items(&order_id, payload).await {
            Ok((processed, errors)) => {
                self.logs
                    .set_status(&order_id, OrderStatus::Completed, None)
                    .await?;
                self.queue.complete(&order_id).await?;
                metrics::histogram!("order_processing_duration_seconds")
                    .record(started.elapsed().as_secs_f64());
                tracing::info!(processed, errors, "order processing completed");
                Ok(ProcessOutcome {
                    disposition: ProcessDisposition::Processed,
                    order_number: payload.order_number.clone(),
                    processed,
                    errors,
                })
            }
            Err(err) => {
                metrics::counter!("order_failures_total").increment(1);
                let message = err.to_string();
                tracing::error!(error = %message, "order processing aborted");
                if let Err(log_err) = self.logs.set_critical_error(&order_id, &message).await {
                    tracing::error!(error = %log_err, "failed to record critical error");
                }
                if let Err(log_err) = self
                    .logs
                    .set_status(&order_id, OrderStatus::Failed, None)
                    .await
                {
                    tracing::error!(error = %log_err, "failed to mark order log failed");
                }
                if let Err(queue_err) = self.queue.fail(&order_id, &message).await {
                    tracing::error!(error = %queue_err, "failed to release processing job");
                }
                Err(err)
            }
        }
    }

    /// Walks the order's line items sequentially, skipping entries a
    /// previous run already completed.
    async fn run_items(&self, order_id: &OrderId, payload: &OrderPayload) -> Result<(u32, u32)> {
        let existing = self
            .logs
            .get(order_id)
            .await?
            .map(|log| log.items)
            .unwrap_or_default();

        let mut processed = 0u32;
        let mut errors = 0u32;
        for line in &payload.line_items {
            let variant_id = line.graphic_variant_id();
            if existing
                .get(&variant_id)
                .is_some_and(|item| item.status == ItemStatus::Completed)
            {
                tracing::debug!(%variant_id, "line item already completed in a previous run");
                processed += 1;
                continue;
            }

            match self.process_line_item(order_id, line).await? {
                ItemOutcome::Completed { sibling_failures } => {
                    processed += 1;
                    errors += sibling_failures;
                }
                ItemOutcome::Skipped => {}
                ItemOutcome::Failed => errors += 1,
            }
        }
        Ok((processed, errors))
    }

    /// Handles one line item: resolve, decrement, fan out. Expected
    /// failures (unmapped variant, missing stock record) are recorded in
    /// the log and contained; only infrastructure errors escape.
    async fn process_line_item(&self, order_id: &OrderId, line: &LineItem) -> Result<ItemOutcome> {
        let variant_id = line.graphic_variant_id();

        // A zero or negative quantity would feed the clamped decrement a
        // stock increase; reject it instead of touching the ledger.
        if line.quantity <= 0 {
            let reason = format!("non-positive quantity {}", line.quantity);
            tracing::warn!(%variant_id, quantity = line.quantity, %reason, "line item failed");
            self.logs
                .upsert_item(
                    order_id,
                    &variant_id,
                    ItemLog::failed(line.quantity, None, reason),
                )
                .await?;
            return Ok(ItemOutcome::Failed);
        }

        let Some(assoc) = self.resolver.resolve(&variant_id).await? else {
            tracing::info!(%variant_id, "no blank association, skipping line item");
            metrics::counter!("line_items_skipped_total").increment(1);
            self.logs
                .upsert_item(
                    order_id,
                    &variant_id,
                    ItemLog::skipped(line.quantity, "no blank association for variant"),
                )
                .await?;
            return Ok(ItemOutcome::Skipped);
        };

        let key = assoc.blank_variant();
        let change = match self
            .ledger
            .decrement(&key, line.quantity, Some(order_id.as_str()))
            .await
        {
            Ok(change) => change,
            Err(StoreError::StockRecordNotFound(key)) => {
                let reason = format!("no stock record for blank variant {key}");
                tracing::warn!(%variant_id, %reason, "line item failed");
                self.logs
                    .upsert_item(
                        order_id,
                        &variant_id,
                        ItemLog::failed(line.quantity, Some(assoc.blank_key.clone()), reason),
                    )
                    .await?;
                return Ok(ItemOutcome::Failed);
            }
            Err(err) => return Err(err.into()),
        };

        let siblings = self.resolver.siblings(&key).await?;
        self.logs
            .upsert_item(
                order_id,
                &variant_id,
                ItemLog::processing(
                    line.quantity,
                    assoc.blank_key.clone(),
                    change,
                    siblings.len() as u32,
                ),
            )
            .await?;

        let sink = LogProgressSink {
            logs: self.logs.clone(),
            order_id: order_id.clone(),
            variant_id: variant_id.clone(),
        };
        let summary = self.propagator.fan_out(change.new, &siblings, &sink).await?;

        self.logs
            .set_item_status(order_id, &variant_id, ItemStatus::Completed)
            .await?;
        Ok(ItemOutcome::Completed {
            sibling_failures: summary.failed.len() as u32,
        })
    }

    /// Applies a manual stock correction and fans the result out to all
    /// siblings.
    #[tracing::instrument(skip(self), fields(variant_id = %request.variant_id))]
    pub async fn apply_override(&self, request: &OverrideRequest) -> Result<OverrideOutcome> {
        let assoc = self
            .resolver
            .resolve(&request.variant_id)
            .await?
            .ok_or_else(|| EngineError::MappingNotFound(request.variant_id.clone()))?;

        if let Some(requested) = &request.blank_key
            && *requested != assoc.blank_key
        {
            return Err(EngineError::BlankKeyMismatch {
                variant_id: request.variant_id.clone(),
                requested: requested.clone(),
                actual: assoc.blank_key,
            });
        }

        let key = assoc.blank_variant();
        let change = self.ledger.adjust(&key, request.value, request.mode).await?;
        let siblings = self.resolver.siblings(&key).await?;
        let summary = self.propagator.fan_out(change.new, &siblings, &NullSink).await?;

        Ok(OverrideOutcome {
            previous_stock: change.previous,
            new_stock: change.new,
            updated: summary.updated,
            failed: summary.failed,
        })
    }
}

fn outcome_from_log(disposition: ProcessDisposition, log: &OrderStockLog) -> ProcessOutcome {
    let processed = log
        .items
        .values()
        .filter(|item| item.status == ItemStatus::Completed)
        .count() as u32;
    let errors = log
        .items
        .values()
        .map(|item| match item.status {
            ItemStatus::Failed => 1 + item.failed.len() as u32,
            _ => item.failed.len() as u32,
        })
        .sum();
    ProcessOutcome {
        disposition,
        order_number: log.order_number.clone(),
        processed,
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use commerce::InMemoryCommerceClient;
    use queue::{InMemoryJobQueue, JobStatus};
    use store::{
        BlankVariantRecord, GraphicAssociation, InMemoryAssociationStore, InMemoryOrderLogStore,
        InMemoryStockStore,
    };

    /// Log store that fails `set_item_status` for one designated variant,
    /// simulating a storage outage after the per-item work has run.
    struct FlakyLogStore {
        inner: Arc<InMemoryOrderLogStore>,
        fail_item_status_for: std::sync::Mutex<Option<GraphicVariantId>>,
    }

    impl FlakyLogStore {
        fn storage_error() -> StoreError {
            StoreError::Serialization(serde_json::from_str::<i32>("boom").unwrap_err())
        }
    }

    #[async_trait]
    impl OrderLogStore for FlakyLogStore {
        async fn get(
            &self,
            order_id: &OrderId,
        ) -> std::result::Result<Option<OrderStockLog>, StoreError> {
            self.inner.get(order_id).await
        }

        async fn create(&self, log: OrderStockLog) -> std::result::Result<(), StoreError> {
            self.inner.create(log).await
        }

        async fn set_status(
            &self,
            order_id: &OrderId,
            status: OrderStatus,
            locked_at: Option<chrono::DateTime<Utc>>,
        ) -> std::result::Result<(), StoreError> {
            self.inner.set_status(order_id, status, locked_at).await
        }

        async fn set_critical_error(
            &self,
            order_id: &OrderId,
            error: &str,
        ) -> std::result::Result<(), StoreError> {
            self.inner.set_critical_error(order_id, error).await
        }

        async fn upsert_item(
            &self,
            order_id: &OrderId,
            variant_id: &GraphicVariantId,
            item: ItemLog,
        ) -> std::result::Result<(), StoreError> {
            self.inner.upsert_item(order_id, variant_id, item).await
        }

        async fn set_item_status(
            &self,
            order_id: &OrderId,
            variant_id: &GraphicVariantId,
            status: ItemStatus,
        ) -> std::result::Result<(), StoreError> {
            if self.fail_item_status_for.lock().unwrap().as_ref() == Some(variant_id) {
                return Err(Self::storage_error());
            }
            self.inner.set_item_status(order_id, variant_id, status).await
        }

        async fn record_sibling(
            &self,
            order_id: &OrderId,
            variant_id: &GraphicVariantId,
            record: SiblingRecord,
        ) -> std::result::Result<(), StoreError> {
            self.inner.record_sibling(order_id, variant_id, record).await
        }
    }

    struct Harness {
        stock: Arc<InMemoryStockStore>,
        associations: Arc<InMemoryAssociationStore>,
        logs: Arc<InMemoryOrderLogStore>,
        queue: Arc<InMemoryJobQueue>,
        client: Arc<InMemoryCommerceClient>,
        processor: OrderProcessor<InMemoryCommerceClient>,
    }

    fn settings() -> EngineSettings {
        EngineSettings {
            lock_timeout: chrono::Duration::minutes(5),
            fanout_concurrency: 2,
            fanout_min_delay: Duration::ZERO,
            retry_backoff: Duration::from_millis(10),
        }
    }

    fn harness() -> Harness {
        let stock = Arc::new(InMemoryStockStore::new());
        let associations = Arc::new(InMemoryAssociationStore::new());
        let logs = Arc::new(InMemoryOrderLogStore::new());
        let queue = Arc::new(InMemoryJobQueue::new(chrono::Duration::minutes(5)));
        let client = Arc::new(InMemoryCommerceClient::new());
        let processor = OrderProcessor::new(
            stock.clone(),
            associations.clone(),
            logs.clone(),
            queue.clone(),
            client.clone(),
            settings(),
        );
        Harness {
            stock,
            associations,
            logs,
            queue,
            client,
            processor,
        }
    }

    fn key() -> common::BlankVariantKey {
        common::BlankVariantKey::new(BlankKey::new("BELLA-3001"), "M", "Black")
    }

    async fn seed_blank(h: &Harness, stock: i64, sibling_ids: &[&str]) {
        h.stock
            .put(BlankVariantRecord::new(key(), stock))
            .await
            .unwrap();
        for (i, id) in sibling_ids.iter().enumerate() {
            let handle = format!("inv-{}", i + 1);
            h.associations
                .put(GraphicAssociation {
                    graphic_variant_id: GraphicVariantId::new(*id),
                    blank_key: BlankKey::new("BELLA-3001"),
                    size: "M".to_string(),
                    color: "Black".to_string(),
                    inventory_handle: Some(handle.clone()),
                })
                .await
                .unwrap();
        }
    }

    fn order(id: &str, items: &[(&str, i64)]) -> OrderPayload {
        let line_items = items
            .iter()
            .map(|(variant_id, quantity)| {
                serde_json::json!({"variant_id": variant_id, "quantity": quantity})
            })
            .collect::<Vec<_>>();
        serde_json::from_value(serde_json::json!({
            "id": id,
            "order_number": format!("#{id}"),
            "line_items": line_items,
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn paid_order_decrements_and_converges_siblings() {
        let h = harness();
        seed_blank(&h, 10, &["gv-1", "gv-2", "gv-3"]).await;

        let outcome = h
            .processor
            .process_order(&order("1001", &[("gv-1", 2)]))
            .await
            .unwrap();

        assert_eq!(outcome.disposition, ProcessDisposition::Processed);
        assert_eq!(outcome.processed, 1);
        assert_eq!(outcome.errors, 0);

        let record = h.stock.get(&key()).await.unwrap().unwrap();
        assert_eq!(record.stock, 8);
        assert_eq!(record.last_order.as_deref(), Some("1001"));
        for handle in ["inv-1", "inv-2", "inv-3"] {
            assert_eq!(h.client.level(handle), Some(8));
        }

        let log = h.logs.get(&OrderId::new("1001")).await.unwrap().unwrap();
        assert_eq!(log.status, OrderStatus::Completed);
        let item = &log.items[&GraphicVariantId::new("gv-1")];
        assert_eq!(item.status, ItemStatus::Completed);
        assert_eq!(item.previous_stock, Some(10));
        assert_eq!(item.new_stock, Some(8));
        assert_eq!(item.graphics_processed, 3);
        assert_eq!(item.updated.len(), 3);
    }

    #[tokio::test]
    async fn duplicate_delivery_is_a_no_op() {
        let h = harness();
        seed_blank(&h, 10, &["gv-1", "gv-2"]).await;
        let payload = order("1001", &[("gv-1", 2)]);

        h.processor.process_order(&payload).await.unwrap();
        let calls_after_first = h.client.total_set_calls();

        let outcome = h.processor.process_order(&payload).await.unwrap();
        assert_eq!(outcome.disposition, ProcessDisposition::AlreadyCompleted);
        assert_eq!(outcome.processed, 1);

        assert_eq!(h.stock.get(&key()).await.unwrap().unwrap().stock, 8);
        assert_eq!(h.client.total_set_calls(), calls_after_first);
    }

    #[tokio::test]
    async fn unmapped_line_item_is_skipped_explicitly() {
        let h = harness();
        seed_blank(&h, 10, &["gv-1"]).await;

        let outcome = h
            .processor
            .process_order(&order("1001", &[("gv-1", 1), ("gv-unmapped", 4)]))
            .await
            .unwrap();

        assert_eq!(outcome.disposition, ProcessDisposition::Processed);
        assert_eq!(outcome.processed, 1);
        assert_eq!(outcome.errors, 0);
        assert_eq!(h.stock.get(&key()).await.unwrap().unwrap().stock, 9);

        let log = h.logs.get(&OrderId::new("1001")).await.unwrap().unwrap();
        assert_eq!(log.status, OrderStatus::Completed);
        let skipped = &log.items[&GraphicVariantId::new("gv-unmapped")];
        assert_eq!(skipped.status, ItemStatus::Skipped);
        assert!(skipped.reason.as_deref().unwrap().contains("association"));
    }

    #[tokio::test]
    async fn oversell_clamps_to_zero_and_propagates_zero() {
        let h = harness();
        seed_blank(&h, 3, &["gv-1", "gv-2"]).await;

        let outcome = h
            .processor
            .process_order(&order("1001", &[("gv-1", 5)]))
            .await
            .unwrap();

        assert_eq!(outcome.disposition, ProcessDisposition::Processed);
        assert_eq!(h.stock.get(&key()).await.unwrap().unwrap().stock, 0);
        assert_eq!(h.client.level("inv-1"), Some(0));
        assert_eq!(h.client.level("inv-2"), Some(0));
    }

    #[tokio::test]
    async fn failed_sibling_is_isolated_and_logged() {
        let h = harness();
        seed_blank(&h, 10, &["gv-1", "gv-2", "gv-3"]).await;
        h.client.break_handle("inv-2", "connection reset");

        let outcome = h
            .processor
            .process_order(&order("1001", &[("gv-1", 1)]))
            .await
            .unwrap();

        assert_eq!(outcome.disposition, ProcessDisposition::Processed);
        assert_eq!(outcome.processed, 1);
        assert_eq!(outcome.errors, 1);
        assert_eq!(h.client.level("inv-1"), Some(9));
        assert_eq!(h.client.level("inv-3"), Some(9));

        let log = h.logs.get(&OrderId::new("1001")).await.unwrap().unwrap();
        assert_eq!(log.status, OrderStatus::Completed);
        let item = &log.items[&GraphicVariantId::new("gv-1")];
        assert_eq!(item.status, ItemStatus::Completed);
        assert_eq!(item.updated.len(), 2);
        assert_eq!(item.failed.len(), 1);
        assert_eq!(item.failed[0].variant_id, GraphicVariantId::new("gv-2"));
    }

    #[tokio::test]
    async fn missing_stock_record_fails_the_item_not_the_order() {
        let h = harness();
        // Association exists but the stock record was never seeded.
        h.associations
            .put(GraphicAssociation {
                graphic_variant_id: GraphicVariantId::new("gv-1"),
                blank_key: BlankKey::new("BELLA-3001"),
                size: "M".to_string(),
                color: "Black".to_string(),
                inventory_handle: Some("inv-1".to_string()),
            })
            .await
            .unwrap();

        let outcome = h
            .processor
            .process_order(&order("1001", &[("gv-1", 1)]))
            .await
            .unwrap();

        assert_eq!(outcome.disposition, ProcessDisposition::Processed);
        assert_eq!(outcome.processed, 0);
        assert_eq!(outcome.errors, 1);

        let log = h.logs.get(&OrderId::new("1001")).await.unwrap().unwrap();
        assert_eq!(log.status, OrderStatus::Completed);
        let item = &log.items[&GraphicVariantId::new("gv-1")];
        assert_eq!(item.status, ItemStatus::Failed);
    }

    #[tokio::test]
    async fn non_positive_quantity_fails_the_item_without_touching_stock() {
        let h = harness();
        seed_blank(&h, 10, &["gv-1", "gv-2"]).await;

        let outcome = h
            .processor
            .process_order(&order("1001", &[("gv-1", 0), ("gv-2", 1)]))
            .await
            .unwrap();

        assert_eq!(outcome.disposition, ProcessDisposition::Processed);
        assert_eq!(outcome.processed, 1);
        assert_eq!(outcome.errors, 1);
        // Only gv-2's quantity was applied; the zero never reached the
        // ledger where it would have read as a stock increase.
        assert_eq!(h.stock.get(&key()).await.unwrap().unwrap().stock, 9);

        let log = h.logs.get(&OrderId::new("1001")).await.unwrap().unwrap();
        let item = &log.items[&GraphicVariantId::new("gv-1")];
        assert_eq!(item.status, ItemStatus::Failed);
        assert!(item.reason.as_deref().unwrap().contains("non-positive"));
    }

    #[tokio::test]
    async fn negative_quantity_is_rejected_like_zero() {
        let h = harness();
        seed_blank(&h, 10, &["gv-1"]).await;

        let outcome = h
            .processor
            .process_order(&order("1001", &[("gv-1", -3)]))
            .await
            .unwrap();

        assert_eq!(outcome.processed, 0);
        assert_eq!(outcome.errors, 1);
        assert_eq!(h.stock.get(&key()).await.unwrap().unwrap().stock, 10);
        assert_eq!(h.client.total_set_calls(), 0);
    }

    #[tokio::test]
    async fn log_store_outage_fails_the_order_then_redelivery_recovers() {
        let stock = Arc::new(InMemoryStockStore::new());
        let associations = Arc::new(InMemoryAssociationStore::new());
        let inner_logs = Arc::new(InMemoryOrderLogStore::new());
        let logs = Arc::new(FlakyLogStore {
            inner: inner_logs.clone(),
            fail_item_status_for: std::sync::Mutex::new(Some(GraphicVariantId::new("gv-2"))),
        });
        let queue = Arc::new(InMemoryJobQueue::new(chrono::Duration::minutes(5)));
        let client = Arc::new(InMemoryCommerceClient::new());
        let processor = OrderProcessor::new(
            stock.clone(),
            associations.clone(),
            logs.clone(),
            queue.clone(),
            client.clone(),
            settings(),
        );

        stock
            .put(BlankVariantRecord::new(key(), 10))
            .await
            .unwrap();
        for (i, id) in ["gv-1", "gv-2"].iter().enumerate() {
            associations
                .put(GraphicAssociation {
                    graphic_variant_id: GraphicVariantId::new(*id),
                    blank_key: BlankKey::new("BELLA-3001"),
                    size: "M".to_string(),
                    color: "Black".to_string(),
                    inventory_handle: Some(format!("inv-{}", i + 1)),
                })
                .await
                .unwrap();
        }
        let order_id = OrderId::new("1001");
        let payload = order("1001", &[("gv-1", 2), ("gv-2", 1)]);

        // The first delivery completes gv-1, then dies persisting gv-2's
        // completion marker.
        let result = processor.process_order(&payload).await;
        assert!(result.is_err());

        let log = inner_logs.get(&order_id).await.unwrap().unwrap();
        assert_eq!(log.status, OrderStatus::Failed);
        assert!(log.critical_error.is_some());
        // gv-1's completion marker survived the abort.
        assert_eq!(
            log.items[&GraphicVariantId::new("gv-1")].status,
            ItemStatus::Completed
        );
        let job = queue.get(&order_id).await.unwrap().unwrap();
        assert!(matches!(job.status, JobStatus::Failed { .. }));

        // Outage over; the redelivery must pick the failed job back up.
        *logs.fail_item_status_for.lock().unwrap() = None;
        let outcome = processor.process_order(&payload).await.unwrap();

        assert_eq!(outcome.disposition, ProcessDisposition::Processed);
        assert_eq!(outcome.processed, 2);
        assert_eq!(outcome.errors, 0);
        // gv-1 was not re-decremented; gv-2 was applied once per run, the
        // at-least-once cost of losing its completion marker: 10 - 2 - 1 - 1.
        assert_eq!(stock.get(&key()).await.unwrap().unwrap().stock, 6);
        assert_eq!(client.level("inv-1"), Some(6));
        assert_eq!(client.level("inv-2"), Some(6));

        let log = inner_logs.get(&order_id).await.unwrap().unwrap();
        assert_eq!(log.status, OrderStatus::Completed);
        let job = queue.get(&order_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn fresh_lock_blocks_concurrent_delivery() {
        let h = harness();
        seed_blank(&h, 10, &["gv-1"]).await;
        let order_id = OrderId::new("1001");

        // Another worker is mid-run: log locked, job claimed.
        h.logs
            .create(OrderStockLog::received(order_id.clone(), None))
            .await
            .unwrap();
        h.logs
            .set_status(&order_id, OrderStatus::Processing, Some(Utc::now()))
            .await
            .unwrap();
        h.queue.enqueue(order_id.clone()).await.unwrap();
        h.queue
            .claim(&order_id, &WorkerId::new("other"))
            .await
            .unwrap();

        let outcome = h
            .processor
            .process_order(&order("1001", &[("gv-1", 2)]))
            .await
            .unwrap();

        assert_eq!(outcome.disposition, ProcessDisposition::AlreadyProcessing);
        assert_eq!(h.stock.get(&key()).await.unwrap().unwrap().stock, 10);
        assert_eq!(h.client.total_set_calls(), 0);
    }

    #[tokio::test]
    async fn stale_run_resumes_without_double_decrement() {
        let h = harness();
        seed_blank(&h, 10, &["gv-1", "gv-2"]).await;
        let order_id = OrderId::new("1001");
        let stale = Utc::now() - chrono::Duration::minutes(10);

        // A crashed worker finished gv-1 (stock already at 8) but never
        // reached gv-2.
        h.stock
            .put(BlankVariantRecord::new(key(), 8))
            .await
            .unwrap();
        h.logs
            .create(OrderStockLog::received(order_id.clone(), None))
            .await
            .unwrap();
        h.logs
            .set_status(&order_id, OrderStatus::Processing, Some(stale))
            .await
            .unwrap();
        let mut done = ItemLog::processing(
            2,
            BlankKey::new("BELLA-3001"),
            store::StockChange { previous: 10, new: 8 },
            2,
        );
        done.status = ItemStatus::Completed;
        h.logs
            .upsert_item(&order_id, &GraphicVariantId::new("gv-1"), done)
            .await
            .unwrap();
        h.queue.enqueue(order_id.clone()).await.unwrap();
        h.queue
            .claim(&order_id, &WorkerId::new("crashed"))
            .await
            .unwrap();
        h.queue.backdate_lock(&order_id, stale).await;
        h.logs.backdate_lock(&order_id, stale).await;

        let outcome = h
            .processor
            .process_order(&order("1001", &[("gv-1", 2), ("gv-2", 1)]))
            .await
            .unwrap();

        assert_eq!(outcome.disposition, ProcessDisposition::Processed);
        assert_eq!(outcome.processed, 2);
        // gv-1 was not decremented again: 8 - 1 for gv-2 only.
        assert_eq!(h.stock.get(&key()).await.unwrap().unwrap().stock, 7);

        let log = h.logs.get(&order_id).await.unwrap().unwrap();
        assert_eq!(log.status, OrderStatus::Completed);
        assert_eq!(
            log.items[&GraphicVariantId::new("gv-2")].status,
            ItemStatus::Completed
        );
    }

    #[tokio::test]
    async fn override_adjusts_and_fans_out() {
        let h = harness();
        seed_blank(&h, 4, &["gv-1", "gv-2"]).await;

        let outcome = h
            .processor
            .apply_override(&OverrideRequest {
                variant_id: GraphicVariantId::new("gv-1"),
                blank_key: Some(BlankKey::new("BELLA-3001")),
                value: 50,
                mode: AdjustMode::Set,
            })
            .await
            .unwrap();

        assert_eq!(outcome.previous_stock, 4);
        assert_eq!(outcome.new_stock, 50);
        assert_eq!(outcome.updated.len(), 2);
        assert!(outcome.failed.is_empty());
        assert_eq!(h.client.level("inv-1"), Some(50));
        assert_eq!(h.client.level("inv-2"), Some(50));
    }

    #[tokio::test]
    async fn override_add_applies_delta_and_fans_out() {
        let h = harness();
        seed_blank(&h, 7, &["gv-1", "gv-2"]).await;

        let outcome = h
            .processor
            .apply_override(&OverrideRequest {
                variant_id: GraphicVariantId::new("gv-1"),
                blank_key: None,
                value: 5,
                mode: AdjustMode::Add,
            })
            .await
            .unwrap();

        assert_eq!(outcome.previous_stock, 7);
        assert_eq!(outcome.new_stock, 12);
        assert_eq!(h.client.level("inv-1"), Some(12));
        assert_eq!(h.client.level("inv-2"), Some(12));
    }

    #[tokio::test]
    async fn override_rejects_blank_key_mismatch() {
        let h = harness();
        seed_blank(&h, 4, &["gv-1"]).await;

        let result = h
            .processor
            .apply_override(&OverrideRequest {
                variant_id: GraphicVariantId::new("gv-1"),
                blank_key: Some(BlankKey::new("GILDAN-5000")),
                value: 50,
                mode: AdjustMode::Set,
            })
            .await;

        assert!(matches!(result, Err(EngineError::BlankKeyMismatch { .. })));
        assert_eq!(h.stock.get(&key()).await.unwrap().unwrap().stock, 4);
    }

    #[tokio::test]
    async fn override_on_unmapped_variant_is_an_error() {
        let h = harness();
        let result = h
            .processor
            .apply_override(&OverrideRequest {
                variant_id: GraphicVariantId::new("gv-x"),
                blank_key: None,
                value: 10,
                mode: AdjustMode::Set,
            })
            .await;
        assert!(matches!(result, Err(EngineError::MappingNotFound(_))));
    }
}
