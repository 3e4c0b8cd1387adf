use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use time::OffsetDateTime;
use tracing::{debug, instrument};

use crate::error::{AppError, AppResult};
use crate::items::repo_types::{Item, NewItem};

#[async_trait]
pub trait ItemRepository: Send + Sync {
    async fn create(&self, item: NewItem) -> AppResult<Item>;
    /// Inserts every item or none of them. Rows come back in input order.
    async fn create_batch(&self, items: Vec<NewItem>) -> AppResult<Vec<Item>>;
    /// Items of one receipt in creation order; empty when there are none.
    async fn find_by_receipt_id(&self, receipt_id: i64) -> AppResult<Vec<Item>>;
    async fn find_by_id(&self, id: i64) -> AppResult<Item>;
    /// Persists name and amounts of `item` by id.
    async fn update(&self, item: &Item) -> AppResult<()>;
    async fn delete(&self, id: i64) -> AppResult<()>;
}

const ITEM_COLUMNS: &str =
    "id, uuid, receipt_id, name, unit_price, quantity, price, total, created_at, created_at_unix";

#[derive(Clone)]
pub struct PgItemRepository {
    db: PgPool,
}

impl PgItemRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn insert_sql() -> String {
    format!(
        r#"
        INSERT INTO items (receipt_id, name, unit_price, quantity, price, total, created_at_unix)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {ITEM_COLUMNS}
        "#
    )
}

/// Insert one item within a transaction.
async fn insert_item_tx(
    tx: &mut Transaction<'_, Postgres>,
    sql: &str,
    item: &NewItem,
    now: i64,
) -> AppResult<Item> {
    sqlx::query_as::<_, Item>(sql)
        .bind(item.receipt_id)
        .bind(&item.name)
        .bind(item.unit_price)
        .bind(item.quantity)
        .bind(item.price)
        .bind(item.total)
        .bind(now)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| AppError::store("insert item", e))
}

#[async_trait]
impl ItemRepository for PgItemRepository {
    #[instrument(skip(self, item), fields(receipt_id = item.receipt_id))]
    async fn create(&self, item: NewItem) -> AppResult<Item> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        sqlx::query_as::<_, Item>(&insert_sql())
            .bind(item.receipt_id)
            .bind(&item.name)
            .bind(item.unit_price)
            .bind(item.quantity)
            .bind(item.price)
            .bind(item.total)
            .bind(now)
            .fetch_one(&self.db)
            .await
            .map_err(|e| AppError::store("create item", e))
    }

    #[instrument(skip(self, items), fields(count = items.len()))]
    async fn create_batch(&self, items: Vec<NewItem>) -> AppResult<Vec<Item>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let sql = insert_sql();
        let now = OffsetDateTime::now_utc().unix_timestamp();

        // Dropping `tx` on an early return rolls the whole batch back.
        let mut tx = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::store("begin transaction", e))?;
        let mut out = Vec::with_capacity(items.len());
        for item in &items {
            out.push(insert_item_tx(&mut tx, &sql, item, now).await?);
        }
        tx.commit()
            .await
            .map_err(|e| AppError::store("commit transaction", e))?;

        debug!(count = out.len(), "items inserted");
        Ok(out)
    }

    #[instrument(skip(self))]
    async fn find_by_receipt_id(&self, receipt_id: i64) -> AppResult<Vec<Item>> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE receipt_id = $1 ORDER BY id ASC");
        sqlx::query_as::<_, Item>(&sql)
            .bind(receipt_id)
            .fetch_all(&self.db)
            .await
            .map_err(|e| AppError::store("query items", e))
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, id: i64) -> AppResult<Item> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = $1");
        sqlx::query_as::<_, Item>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .map_err(|e| AppError::store("find item", e))?
            .ok_or(AppError::NotFound("item"))
    }

    #[instrument(skip(self, item), fields(item_id = item.id))]
    async fn update(&self, item: &Item) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE items
               SET name = $1, unit_price = $2, quantity = $3, price = $4, total = $5
             WHERE id = $6
            "#,
        )
        .bind(&item.name)
        .bind(item.unit_price)
        .bind(item.quantity)
        .bind(item.price)
        .bind(item.total)
        .bind(item.id)
        .execute(&self.db)
        .await
        .map_err(|e| AppError::store("update item", e))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("item"));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: i64) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM items WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .map_err(|e| AppError::store("delete item", e))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("item"));
        }
        Ok(())
    }
}
