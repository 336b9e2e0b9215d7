use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{BlankKey, BlankVariantKey, GraphicVariantId, OrderId};
use tokio::sync::RwLock;

use crate::{
    Result, StoreError,
    records::{
        AdjustMode, BlankVariantRecord, GraphicAssociation, ItemLog, ItemStatus, OrderStatus,
        OrderStockLog, SiblingRecord, StockChange,
    },
    stores::{AssociationStore, OrderLogStore, StockStore},
};

/// In-memory stock store for testing and local development.
///
/// Mutations take the single write lock, which gives the same
/// read-modify-write atomicity the PostgreSQL implementation gets from a
/// transactional UPDATE.
#[derive(Clone, Default)]
pub struct InMemoryStockStore {
    records: Arc<RwLock<HashMap<BlankVariantKey, BlankVariantRecord>>>,
}

impl InMemoryStockStore {
    /// Creates a new empty stock store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored records.
    pub async fn record_count(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl StockStore for InMemoryStockStore {
    async fn get(&self, key: &BlankVariantKey) -> Result<Option<BlankVariantRecord>> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn put(&self, record: BlankVariantRecord) -> Result<()> {
        self.records
            .write()
            .await
            .insert(record.key.clone(), record);
        Ok(())
    }

    async fn list(&self, blank_key: &BlankKey) -> Result<Vec<BlankVariantRecord>> {
        let records = self.records.read().await;
        let mut matching: Vec<_> = records
            .values()
            .filter(|r| &r.key.blank_key == blank_key)
            .cloned()
            .collect();
        matching.sort_by(|a, b| (&a.key.size, &a.key.color).cmp(&(&b.key.size, &b.key.color)));
        Ok(matching)
    }

    async fn decrement(
        &self,
        key: &BlankVariantKey,
        quantity: i64,
        order_ref: Option<&str>,
    ) -> Result<StockChange> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(key)
            .ok_or_else(|| StoreError::StockRecordNotFound(key.clone()))?;

        let previous = record.stock;
        record.stock = (previous - quantity).max(0);
        if let Some(order_ref) = order_ref {
            record.last_order = Some(order_ref.to_string());
        }
        record.updated_at = Utc::now();

        Ok(StockChange {
            previous,
            new: record.stock,
        })
    }

    async fn adjust(
        &self,
        key: &BlankVariantKey,
        value: i64,
        mode: AdjustMode,
    ) -> Result<StockChange> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(key)
            .ok_or_else(|| StoreError::StockRecordNotFound(key.clone()))?;

        let previous = record.stock;
        record.stock = match mode {
            AdjustMode::Set => value.max(0),
            AdjustMode::Add => (previous + value).max(0),
        };
        record.updated_at = Utc::now();

        Ok(StockChange {
            previous,
            new: record.stock,
        })
    }
}

/// In-memory association store for testing and local development.
#[derive(Clone, Default)]
pub struct InMemoryAssociationStore {
    associations: Arc<RwLock<HashMap<GraphicVariantId, GraphicAssociation>>>,
}

impl InMemoryAssociationStore {
    /// Creates a new empty association store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AssociationStore for InMemoryAssociationStore {
    async fn get(&self, id: &GraphicVariantId) -> Result<Option<GraphicAssociation>> {
        Ok(self.associations.read().await.get(id).cloned())
    }

    async fn siblings(&self, key: &BlankVariantKey) -> Result<Vec<GraphicAssociation>> {
        let associations = self.associations.read().await;
        let mut matching: Vec<_> = associations
            .values()
            .filter(|a| {
                a.blank_key == key.blank_key && a.size == key.size && a.color == key.color
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.graphic_variant_id.cmp(&b.graphic_variant_id));
        Ok(matching)
    }

    async fn put(&self, association: GraphicAssociation) -> Result<()> {
        self.associations
            .write()
            .await
            .insert(association.graphic_variant_id.clone(), association);
        Ok(())
    }
}

/// In-memory order log store for testing and local development.
#[derive(Clone, Default)]
pub struct InMemoryOrderLogStore {
    logs: Arc<RwLock<HashMap<OrderId, OrderStockLog>>>,
}

impl InMemoryOrderLogStore {
    /// Creates a new empty order log store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites a log's lock timestamp. Test helper for simulating a
    /// crashed run whose lock has gone stale.
    pub async fn backdate_lock(&self, order_id: &OrderId, locked_at: DateTime<Utc>) {
        if let Some(log) = self.logs.write().await.get_mut(order_id) {
            log.locked_at = Some(locked_at);
        }
    }
}

impl InMemoryOrderLogStore {
    async fn with_log<F, T>(&self, order_id: &OrderId, f: F) -> Result<T>
    where
        F: FnOnce(&mut OrderStockLog) -> Result<T>,
    {
        let mut logs = self.logs.write().await;
        let log = logs
            .get_mut(order_id)
            .ok_or_else(|| StoreError::OrderLogNotFound(order_id.clone()))?;
        let result = f(log)?;
        log.updated_at = Utc::now();
        Ok(result)
    }
}

#[async_trait]
impl OrderLogStore for InMemoryOrderLogStore {
    async fn get(&self, order_id: &OrderId) -> Result<Option<OrderStockLog>> {
        Ok(self.logs.read().await.get(order_id).cloned())
    }

    async fn create(&self, log: OrderStockLog) -> Result<()> {
        let mut logs = self.logs.write().await;
        if logs.contains_key(&log.order_id) {
            return Err(StoreError::OrderLogExists(log.order_id.clone()));
        }
        logs.insert(log.order_id.clone(), log);
        Ok(())
    }

    async fn set_status(
        &self,
        order_id: &OrderId,
        status: OrderStatus,
        locked_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.with_log(order_id, |log| {
            log.status = status;
            log.locked_at = locked_at;
            Ok(())
        })
        .await
    }

    async fn set_critical_error(&self, order_id: &OrderId, error: &str) -> Result<()> {
        self.with_log(order_id, |log| {
            log.critical_error = Some(error.to_string());
            Ok(())
        })
        .await
    }

    async fn upsert_item(
        &self,
        order_id: &OrderId,
        variant_id: &GraphicVariantId,
        item: ItemLog,
    ) -> Result<()> {
        self.with_log(order_id, |log| {
            log.items.insert(variant_id.clone(), item);
            Ok(())
        })
        .await
    }

    async fn set_item_status(
        &self,
        order_id: &OrderId,
        variant_id: &GraphicVariantId,
        status: ItemStatus,
    ) -> Result<()> {
        self.with_log(order_id, |log| {
            let item = log
                .items
                .get_mut(variant_id)
                .ok_or_else(|| StoreError::ItemNotFound {
                    order_id: order_id.clone(),
                    variant_id: variant_id.clone(),
                })?;
            item.status = status;
            Ok(())
        })
        .await
    }

    async fn record_sibling(
        &self,
        order_id: &OrderId,
        variant_id: &GraphicVariantId,
        record: SiblingRecord,
    ) -> Result<()> {
        self.with_log(order_id, |log| {
            let item = log
                .items
                .get_mut(variant_id)
                .ok_or_else(|| StoreError::ItemNotFound {
                    order_id: order_id.clone(),
                    variant_id: variant_id.clone(),
                })?;
            item.apply(record);
            Ok(())
        })
        .await
    }
}
