use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{BlankKey, BlankVariantKey, GraphicVariantId, OrderId};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};

use crate::{
    Result, StoreError,
    records::{
        AdjustMode, BlankVariantRecord, GraphicAssociation, ItemLog, ItemStatus, OrderStatus,
        OrderStockLog, SiblingRecord, StockChange,
    },
    stores::{AssociationStore, OrderLogStore, StockStore},
};

/// Creates the three tables if they do not exist.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS blank_variants (
            blank_key TEXT NOT NULL,
            size TEXT NOT NULL,
            color TEXT NOT NULL,
            stock BIGINT NOT NULL DEFAULT 0 CHECK (stock >= 0),
            inventory_handle TEXT,
            last_order TEXT,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            PRIMARY KEY (blank_key, size, color)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS graphic_associations (
            graphic_variant_id TEXT PRIMARY KEY,
            blank_key TEXT NOT NULL,
            size TEXT NOT NULL,
            color TEXT NOT NULL,
            inventory_handle TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS graphic_associations_blank_variant
        ON graphic_associations (blank_key, size, color)
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS order_stock_logs (
            order_id TEXT PRIMARY KEY,
            order_number TEXT,
            status TEXT NOT NULL,
            items JSONB NOT NULL DEFAULT '{}'::jsonb,
            locked_at TIMESTAMPTZ,
            critical_error TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// PostgreSQL-backed stock store.
///
/// Decrements and adjustments run as a single UPDATE over a row-locking
/// CTE, so the read-modify-write is linearized by the database.
#[derive(Clone)]
pub struct PgStockStore {
    pool: PgPool,
}

impl PgStockStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: PgRow) -> Result<BlankVariantRecord> {
        Ok(BlankVariantRecord {
            key: BlankVariantKey::new(
                BlankKey::new(row.try_get::<String, _>("blank_key")?),
                row.try_get::<String, _>("size")?,
                row.try_get::<String, _>("color")?,
            ),
            stock: row.try_get("stock")?,
            inventory_handle: row.try_get("inventory_handle")?,
            last_order: row.try_get("last_order")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    async fn mutate(&self, sql: &str, key: &BlankVariantKey, arg: i64) -> Result<StockChange> {
        let row = sqlx::query(sql)
            .bind(key.blank_key.as_str())
            .bind(&key.size)
            .bind(&key.color)
            .bind(arg)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::StockRecordNotFound(key.clone()))?;

        Ok(StockChange {
            previous: row.try_get("previous_stock")?,
            new: row.try_get("new_stock")?,
        })
    }
}

#[async_trait]
impl StockStore for PgStockStore {
    async fn get(&self, key: &BlankVariantKey) -> Result<Option<BlankVariantRecord>> {
        let row = sqlx::query(
            r#"
            SELECT blank_key, size, color, stock, inventory_handle, last_order, updated_at
            FROM blank_variants
            WHERE blank_key = $1 AND size = $2 AND color = $3
            "#,
        )
        .bind(key.blank_key.as_str())
        .bind(&key.size)
        .bind(&key.color)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_record).transpose()
    }

    async fn put(&self, record: BlankVariantRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO blank_variants (blank_key, size, color, stock, inventory_handle, last_order, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (blank_key, size, color) DO UPDATE SET
                stock = EXCLUDED.stock,
                inventory_handle = EXCLUDED.inventory_handle,
                last_order = EXCLUDED.last_order,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(record.key.blank_key.as_str())
        .bind(&record.key.size)
        .bind(&record.key.color)
        .bind(record.stock)
        .bind(&record.inventory_handle)
        .bind(&record.last_order)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(&self, blank_key: &BlankKey) -> Result<Vec<BlankVariantRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT blank_key, size, color, stock, inventory_handle, last_order, updated_at
            FROM blank_variants
            WHERE blank_key = $1
            ORDER BY size ASC, color ASC
            "#,
        )
        .bind(blank_key.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_record).collect()
    }

    async fn decrement(
        &self,
        key: &BlankVariantKey,
        quantity: i64,
        order_ref: Option<&str>,
    ) -> Result<StockChange> {
        let row = sqlx::query(
            r#"
            WITH prev AS (
                SELECT stock FROM blank_variants
                WHERE blank_key = $1 AND size = $2 AND color = $3
                FOR UPDATE
            )
            UPDATE blank_variants b
            SET stock = GREATEST(prev.stock - $4, 0),
                last_order = COALESCE($5, b.last_order),
                updated_at = NOW()
            FROM prev
            WHERE b.blank_key = $1 AND b.size = $2 AND b.color = $3
            RETURNING prev.stock AS previous_stock, b.stock AS new_stock
            "#,
        )
        .bind(key.blank_key.as_str())
        .bind(&key.size)
        .bind(&key.color)
        .bind(quantity)
        .bind(order_ref)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::StockRecordNotFound(key.clone()))?;

        Ok(StockChange {
            previous: row.try_get("previous_stock")?,
            new: row.try_get("new_stock")?,
        })
    }

    async fn adjust(
        &self,
        key: &BlankVariantKey,
        value: i64,
        mode: AdjustMode,
    ) -> Result<StockChange> {
        let sql = match mode {
            AdjustMode::Set => {
                r#"
                WITH prev AS (
                    SELECT stock FROM blank_variants
                    WHERE blank_key = $1 AND size = $2 AND color = $3
                    FOR UPDATE
                )
                UPDATE blank_variants b
                SET stock = GREATEST($4, 0), updated_at = NOW()
                FROM prev
                WHERE b.blank_key = $1 AND b.size = $2 AND b.color = $3
                RETURNING prev.stock AS previous_stock, b.stock AS new_stock
                "#
            }
            AdjustMode::Add => {
                r#"
                WITH prev AS (
                    SELECT stock FROM blank_variants
                    WHERE blank_key = $1 AND size = $2 AND color = $3
                    FOR UPDATE
                )
                UPDATE blank_variants b
                SET stock = GREATEST(prev.stock + $4, 0), updated_at = NOW()
                FROM prev
                WHERE b.blank_key = $1 AND b.size = $2 AND b.color = $3
                RETURNING prev.stock AS previous_stock, b.stock AS new_stock
                "#
            }
        };

        self.mutate(sql, key, value).await
    }
}

/// PostgreSQL-backed association store.
#[derive(Clone)]
pub struct PgAssociationStore {
    pool: PgPool,
}

impl PgAssociationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_association(row: PgRow) -> Result<GraphicAssociation> {
        Ok(GraphicAssociation {
            graphic_variant_id: GraphicVariantId::new(
                row.try_get::<String, _>("graphic_variant_id")?,
            ),
            blank_key: BlankKey::new(row.try_get::<String, _>("blank_key")?),
            size: row.try_get("size")?,
            color: row.try_get("color")?,
            inventory_handle: row.try_get("inventory_handle")?,
        })
    }
}

#[async_trait]
impl AssociationStore for PgAssociationStore {
    async fn get(&self, id: &GraphicVariantId) -> Result<Option<GraphicAssociation>> {
        let row = sqlx::query(
            r#"
            SELECT graphic_variant_id, blank_key, size, color, inventory_handle
            FROM graphic_associations
            WHERE graphic_variant_id = $1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_association).transpose()
    }

    async fn siblings(&self, key: &BlankVariantKey) -> Result<Vec<GraphicAssociation>> {
        let rows = sqlx::query(
            r#"
            SELECT graphic_variant_id, blank_key, size, color, inventory_handle
            FROM graphic_associations
            WHERE blank_key = $1 AND size = $2 AND color = $3
            ORDER BY graphic_variant_id ASC
            "#,
        )
        .bind(key.blank_key.as_str())
        .bind(&key.size)
        .bind(&key.color)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_association).collect()
    }

    async fn put(&self, association: GraphicAssociation) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO graphic_associations (graphic_variant_id, blank_key, size, color, inventory_handle)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (graphic_variant_id) DO UPDATE SET
                blank_key = EXCLUDED.blank_key,
                size = EXCLUDED.size,
                color = EXCLUDED.color,
                inventory_handle = EXCLUDED.inventory_handle
            "#,
        )
        .bind(association.graphic_variant_id.as_str())
        .bind(association.blank_key.as_str())
        .bind(&association.size)
        .bind(&association.color)
        .bind(&association.inventory_handle)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// PostgreSQL-backed order log store.
///
/// Partial updates load the row under `FOR UPDATE`, mutate the log in Rust,
/// and write it back inside the same transaction. Per-order contention is a
/// duplicate-delivery edge case, so row-level locking is plenty.
#[derive(Clone)]
pub struct PgOrderLogStore {
    pool: PgPool,
}

impl PgOrderLogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_log(row: PgRow) -> Result<OrderStockLog> {
        let status: String = row.try_get("status")?;
        let items: serde_json::Value = row.try_get("items")?;

        Ok(OrderStockLog {
            order_id: OrderId::new(row.try_get::<String, _>("order_id")?),
            order_number: row.try_get("order_number")?,
            status: serde_json::from_value(serde_json::Value::String(status))?,
            items: serde_json::from_value(items)?,
            locked_at: row.try_get("locked_at")?,
            critical_error: row.try_get("critical_error")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn status_str(status: OrderStatus) -> &'static str {
        match status {
            OrderStatus::Received => "received",
            OrderStatus::Processing => "processing",
            OrderStatus::Completed => "completed",
            OrderStatus::Failed => "failed",
        }
    }

    async fn load_for_update(
        tx: &mut Transaction<'_, Postgres>,
        order_id: &OrderId,
    ) -> Result<OrderStockLog> {
        let row = sqlx::query(
            r#"
            SELECT order_id, order_number, status, items, locked_at, critical_error,
                   created_at, updated_at
            FROM order_stock_logs
            WHERE order_id = $1
            FOR UPDATE
            "#,
        )
        .bind(order_id.as_str())
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| StoreError::OrderLogNotFound(order_id.clone()))?;

        Self::row_to_log(row)
    }

    async fn save(tx: &mut Transaction<'_, Postgres>, log: &OrderStockLog) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE order_stock_logs
            SET order_number = $2, status = $3, items = $4, locked_at = $5,
                critical_error = $6, updated_at = NOW()
            WHERE order_id = $1
            "#,
        )
        .bind(log.order_id.as_str())
        .bind(&log.order_number)
        .bind(Self::status_str(log.status))
        .bind(serde_json::to_value(&log.items)?)
        .bind(log.locked_at)
        .bind(&log.critical_error)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    async fn with_log<F>(&self, order_id: &OrderId, f: F) -> Result<()>
    where
        F: FnOnce(&mut OrderStockLog) -> Result<()> + Send,
    {
        let mut tx = self.pool.begin().await?;
        let mut log = Self::load_for_update(&mut tx, order_id).await?;
        f(&mut log)?;
        Self::save(&mut tx, &log).await?;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl OrderLogStore for PgOrderLogStore {
    async fn get(&self, order_id: &OrderId) -> Result<Option<OrderStockLog>> {
        let row = sqlx::query(
            r#"
            SELECT order_id, order_number, status, items, locked_at, critical_error,
                   created_at, updated_at
            FROM order_stock_logs
            WHERE order_id = $1
            "#,
        )
        .bind(order_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_log).transpose()
    }

    async fn create(&self, log: OrderStockLog) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO order_stock_logs
                (order_id, order_number, status, items, locked_at, critical_error, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (order_id) DO NOTHING
            "#,
        )
        .bind(log.order_id.as_str())
        .bind(&log.order_number)
        .bind(Self::status_str(log.status))
        .bind(serde_json::to_value(&log.items)?)
        .bind(log.locked_at)
        .bind(&log.critical_error)
        .bind(log.created_at)
        .bind(log.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::OrderLogExists(log.order_id));
        }
        Ok(())
    }

    async fn set_status(
        &self,
        order_id: &OrderId,
        status: OrderStatus,
        locked_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE order_stock_logs
            SET status = $2, locked_at = $3, updated_at = NOW()
            WHERE order_id = $1
            "#,
        )
        .bind(order_id.as_str())
        .bind(Self::status_str(status))
        .bind(locked_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_critical_error(&self, order_id: &OrderId, error: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE order_stock_logs
            SET critical_error = $2, updated_at = NOW()
            WHERE order_id = $1
            "#,
        )
        .bind(order_id.as_str())
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
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
