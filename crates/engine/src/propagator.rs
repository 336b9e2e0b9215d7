//! Rate-limited fan-out of a new stock count to sibling graphic variants.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::GraphicVariantId;
use futures_util::{FutureExt, StreamExt};
use store::{GraphicAssociation, SiblingFailure, SiblingRecord, StoreError};
use tokio::sync::Mutex;
use tokio::time::Instant;

use commerce::{CommerceClient, CommerceError};

/// Receiver of incremental per-sibling results during a fan-out.
///
/// The propagator calls this after every sibling finishes, so an observer
/// (the order log) always reflects partial progress even if the process
/// dies mid-run.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn sibling_done(&self, record: &SiblingRecord) -> Result<(), StoreError>;
}

/// Sink that discards progress. Used by the manual override path, which
/// has no order log to feed.
pub struct NullSink;

#[async_trait]
impl ProgressSink for NullSink {
    async fn sibling_done(&self, _record: &SiblingRecord) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Aggregate result of one fan-out run.
#[derive(Debug, Default)]
pub struct PropagationSummary {
    pub updated: Vec<GraphicVariantId>,
    pub failed: Vec<SiblingFailure>,
}

/// Pushes a blank variant's new stock count to every sibling graphic
/// variant on the commerce platform.
///
/// Outbound calls run with bounded concurrency and a shared minimum
/// inter-call delay. A sibling that answers 429 gets exactly one retry
/// after a bounded pause; any further failure is recorded against that
/// sibling alone and never aborts the rest of the fan-out.
pub struct Propagator<C: CommerceClient> {
    client: Arc<C>,
    concurrency: usize,
    min_delay: Duration,
    retry_backoff: Duration,
    /// Earliest instant the next outbound call may start. Slots are
    /// reserved under the lock, then slept on outside it, so concurrent
    /// workers space their calls instead of stampeding.
    pacer: Arc<Mutex<Option<Instant>>>,
}

impl<C: CommerceClient> Propagator<C> {
    pub fn new(
        client: Arc<C>,
        concurrency: usize,
        min_delay: Duration,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            client,
            concurrency: concurrency.max(1),
            min_delay,
            retry_backoff,
            pacer: Arc::new(Mutex::new(None)),
        }
    }

    /// Sets every sibling's platform inventory to `new_stock`, reporting
    /// each result to `sink` as it lands.
    ///
    /// Only sink (store) errors escape; platform failures are folded into
    /// the summary.
    #[tracing::instrument(skip_all, fields(new_stock = new_stock, siblings = siblings.len()))]
    pub async fn fan_out(
        &self,
        new_stock: i64,
        siblings: &[GraphicAssociation],
        sink: &dyn ProgressSink,
    ) -> Result<PropagationSummary, StoreError> {
        let mut summary = PropagationSummary::default();

        // The futures are built eagerly (they stay inert until polled) and
        // boxed so the stream item is one concrete type; mapping the slice
        // through a stream closure instead trips rustc's higher-ranked
        // `Send`/`FnOnce` inference ("implementation of `Send` is not
        // general enough") once the caller is generic.
        let updates = siblings
            .iter()
            .map(|assoc| self.update_sibling(assoc, new_stock).boxed())
            .collect::<Vec<_>>();
        let mut results =
            futures_util::stream::iter(updates).buffer_unordered(self.concurrency);

        while let Some(record) = results.next().await {
            let result_label = match &record {
                SiblingRecord::Updated(_) => "updated",
                SiblingRecord::Failed(_) => "failed",
            };
            metrics::counter!("sibling_updates_total", "result" => result_label).increment(1);

            sink.sibling_done(&record).await?;
            match record {
                SiblingRecord::Updated(id) => summary.updated.push(id),
                SiblingRecord::Failed(failure) => summary.failed.push(failure),
            }
        }

        tracing::info!(
            updated = summary.updated.len(),
            failed = summary.failed.len(),
            "fan-out finished"
        );
        Ok(summary)
    }

    async fn update_sibling(&self, assoc: &GraphicAssociation, new_stock: i64) -> SiblingRecord {
        match self.try_update(assoc, new_stock).await {
            Ok(()) => SiblingRecord::Updated(assoc.graphic_variant_id.clone()),
            Err(err) => {
                tracing::warn!(
                    variant_id = %assoc.graphic_variant_id,
                    error = %err,
                    "sibling inventory update failed"
                );
                SiblingRecord::Failed(SiblingFailure {
                    variant_id: assoc.graphic_variant_id.clone(),
                    error: err.to_string(),
                })
            }
        }
    }

    async fn try_update(
        &self,
        assoc: &GraphicAssociation,
        new_stock: i64,
    ) -> Result<(), CommerceError> {
        let handle = match &assoc.inventory_handle {
            Some(handle) => handle.clone(),
            None => {
                self.paced_call(|| self.client.inventory_handle(&assoc.graphic_variant_id))
                    .await?
            }
        };

        self.paced_call(|| self.client.set_inventory_level(&handle, new_stock))
            .await
    }

    /// Issues one paced platform call with exactly one retry on a 429,
    /// pausing for the platform's `Retry-After` hint when it gives one.
    async fn paced_call<T, F, Fut>(&self, call: F) -> Result<T, CommerceError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, CommerceError>>,
    {
        self.pace().await;
        match call().await {
            Err(CommerceError::RateLimited { retry_after }) => {
                let pause = retry_after.unwrap_or(self.retry_backoff);
                tracing::debug!(
                    pause_ms = pause.as_millis() as u64,
                    "rate limited, retrying once"
                );
                tokio::time::sleep(pause).await;
                self.pace().await;
                call().await
            }
            result => result,
        }
    }

    /// Reserves the next outbound call slot and waits for it.
    async fn pace(&self) {
        if self.min_delay.is_zero() {
            return;
        }
        let now = Instant::now();
        let mut next = self.pacer.lock().await;
        let at = match *next {
            Some(at) if at > now => at,
            _ => now,
        };
        *next = Some(at + self.min_delay);
        drop(next);
        tokio::time::sleep_until(at).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use commerce::InMemoryCommerceClient;
    use common::BlankKey;

    fn assoc(id: &str, handle: Option<&str>) -> GraphicAssociation {
        GraphicAssociation {
            graphic_variant_id: GraphicVariantId::new(id),
            blank_key: BlankKey::new("BELLA-3001"),
            size: "M".to_string(),
            color: "Black".to_string(),
            inventory_handle: handle.map(String::from),
        }
    }

    fn propagator(client: Arc<InMemoryCommerceClient>) -> Propagator<InMemoryCommerceClient> {
        Propagator::new(client, 2, Duration::ZERO, Duration::from_millis(10))
    }

    #[tokio::test]
    async fn all_siblings_converge_to_new_stock() {
        let client = Arc::new(InMemoryCommerceClient::new());
        let siblings = vec![
            assoc("gv-1", Some("inv-1")),
            assoc("gv-2", Some("inv-2")),
            assoc("gv-3", Some("inv-3")),
        ];

        let summary = propagator(client.clone())
            .fan_out(7, &siblings, &NullSink)
            .await
            .unwrap();

        assert_eq!(summary.updated.len(), 3);
        assert!(summary.failed.is_empty());
        for handle in ["inv-1", "inv-2", "inv-3"] {
            assert_eq!(client.level(handle), Some(7));
        }
    }

    #[tokio::test]
    async fn missing_handle_is_looked_up() {
        let client = Arc::new(InMemoryCommerceClient::new());
        client.register_handle(GraphicVariantId::new("gv-1"), "inv-1");

        let summary = propagator(client.clone())
            .fan_out(5, &[assoc("gv-1", None)], &NullSink)
            .await
            .unwrap();

        assert_eq!(summary.updated.len(), 1);
        assert_eq!(client.level("inv-1"), Some(5));
    }

    #[tokio::test]
    async fn single_rate_limit_is_retried_once() {
        let client = Arc::new(InMemoryCommerceClient::new());
        client.rate_limit_next("inv-1", 1);

        let summary = propagator(client.clone())
            .fan_out(4, &[assoc("gv-1", Some("inv-1"))], &NullSink)
            .await
            .unwrap();

        assert_eq!(summary.updated.len(), 1);
        assert_eq!(client.level("inv-1"), Some(4));
        assert_eq!(client.set_call_count("inv-1"), 2);
    }

    #[tokio::test]
    async fn rate_limited_handle_lookup_is_retried_once() {
        let client = Arc::new(InMemoryCommerceClient::new());
        client.register_handle(GraphicVariantId::new("gv-1"), "inv-1");
        client.rate_limit_next_lookup(GraphicVariantId::new("gv-1"), 1);

        let summary = propagator(client.clone())
            .fan_out(6, &[assoc("gv-1", None)], &NullSink)
            .await
            .unwrap();

        assert_eq!(summary.updated.len(), 1);
        assert_eq!(client.level("inv-1"), Some(6));
        assert_eq!(client.lookup_call_count(&GraphicVariantId::new("gv-1")), 2);
    }

    #[tokio::test]
    async fn twice_rate_limited_lookup_fails_the_sibling() {
        let client = Arc::new(InMemoryCommerceClient::new());
        client.register_handle(GraphicVariantId::new("gv-1"), "inv-1");
        client.rate_limit_next_lookup(GraphicVariantId::new("gv-1"), 2);

        let summary = propagator(client.clone())
            .fan_out(6, &[assoc("gv-1", None)], &NullSink)
            .await
            .unwrap();

        assert!(summary.updated.is_empty());
        assert_eq!(summary.failed.len(), 1);
        // One lookup and one retry; the level is never touched.
        assert_eq!(client.lookup_call_count(&GraphicVariantId::new("gv-1")), 2);
        assert_eq!(client.set_call_count("inv-1"), 0);
    }

    #[tokio::test]
    async fn second_rate_limit_fails_the_sibling() {
        let client = Arc::new(InMemoryCommerceClient::new());
        client.rate_limit_next("inv-1", 2);

        let summary = propagator(client.clone())
            .fan_out(4, &[assoc("gv-1", Some("inv-1"))], &NullSink)
            .await
            .unwrap();

        assert!(summary.updated.is_empty());
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].variant_id, GraphicVariantId::new("gv-1"));
        // One attempt and one retry, never a third.
        assert_eq!(client.set_call_count("inv-1"), 2);
    }

    #[tokio::test]
    async fn failed_sibling_does_not_block_the_rest() {
        let client = Arc::new(InMemoryCommerceClient::new());
        client.break_handle("inv-2", "connection reset");
        let siblings = vec![
            assoc("gv-1", Some("inv-1")),
            assoc("gv-2", Some("inv-2")),
            assoc("gv-3", Some("inv-3")),
        ];

        let summary = propagator(client.clone())
            .fan_out(9, &siblings, &NullSink)
            .await
            .unwrap();

        assert_eq!(summary.updated.len(), 2);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].variant_id, GraphicVariantId::new("gv-2"));
        assert_eq!(client.level("inv-1"), Some(9));
        assert_eq!(client.level("inv-3"), Some(9));
        assert_eq!(client.level("inv-2"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn pacing_spaces_outbound_calls() {
        let client = Arc::new(InMemoryCommerceClient::new());
        let propagator = Propagator::new(
            client.clone(),
            4,
            Duration::from_millis(100),
            Duration::from_millis(10),
        );
        let siblings = vec![
            assoc("gv-1", Some("inv-1")),
            assoc("gv-2", Some("inv-2")),
            assoc("gv-3", Some("inv-3")),
        ];

        let start = Instant::now();
        let summary = propagator.fan_out(3, &siblings, &NullSink).await.unwrap();
        let elapsed = start.elapsed();

        assert_eq!(summary.updated.len(), 3);
        // Third call cannot start before two full pacing intervals.
        assert!(elapsed >= Duration::from_millis(200), "elapsed {elapsed:?}");
    }
}
