use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use tracing::instrument;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::receipts::dto::page_offset;
use crate::receipts::repo_types::{NewReceipt, Receipt, ReceiptStats};

#[async_trait]
pub trait ReceiptRepository: Send + Sync {
    async fn create(&self, receipt: NewReceipt) -> AppResult<Receipt>;
    async fn find_by_id(&self, id: i64) -> AppResult<Receipt>;
    async fn find_by_uuid(&self, uuid: &str) -> AppResult<Receipt>;
    /// One page, newest upload first, plus the user's total receipt count.
    /// `page` and `limit` must already be validated as positive.
    async fn find_by_user_id(&self, user_id: i64, page: i64, limit: i64) -> AppResult<(Vec<Receipt>, i64)>;
    /// Persists store fields, date, status and totals of `receipt` by id.
    async fn update(&self, receipt: &Receipt) -> AppResult<Receipt>;
    async fn delete(&self, id: i64) -> AppResult<()>;
    async fn soft_delete(&self, id: i64) -> AppResult<()>;
    /// Aggregates over completed receipts; all zero when there are none.
    async fn stats_by_user_id(&self, user_id: i64) -> AppResult<ReceiptStats>;
}

const RECEIPT_COLUMNS: &str = "id, uuid, user_id, store_name, address, phone, date, image_url, \
                               original_filename, file_size, upload_date, status, total_items, \
                               total_spending, total_discount, created_at, updated_at, \
                               created_at_unix, updated_at_unix";

#[derive(Clone)]
pub struct PgReceiptRepository {
    db: PgPool,
}

impl PgReceiptRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ReceiptRepository for PgReceiptRepository {
    #[instrument(skip(self, receipt), fields(user_id = receipt.user_id))]
    async fn create(&self, receipt: NewReceipt) -> AppResult<Receipt> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let sql = format!(
            r#"
            INSERT INTO receipts (
                user_id, store_name, address, phone, date, image_url, original_filename,
                file_size, status, total_items, total_spending, total_discount,
                created_at_unix, updated_at_unix
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $13)
            RETURNING {RECEIPT_COLUMNS}
            "#
        );
        sqlx::query_as::<_, Receipt>(&sql)
            .bind(receipt.user_id)
            .bind(&receipt.store_name)
            .bind(&receipt.address)
            .bind(receipt.phone)
            .bind(receipt.date)
            .bind(&receipt.image_url)
            .bind(&receipt.original_filename)
            .bind(receipt.file_size)
            .bind(receipt.status)
            .bind(receipt.total_items)
            .bind(receipt.total_spending)
            .bind(receipt.total_discount)
            .bind(now)
            .fetch_one(&self.db)
            .await
            .map_err(|e| AppError::store("create receipt", e))
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, id: i64) -> AppResult<Receipt> {
        let sql = format!("SELECT {RECEIPT_COLUMNS} FROM receipts WHERE id = $1");
        sqlx::query_as::<_, Receipt>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .map_err(|e| AppError::store("find receipt", e))?
            .ok_or(AppError::NotFound("receipt"))
    }

    #[instrument(skip(self))]
    async fn find_by_uuid(&self, uuid: &str) -> AppResult<Receipt> {
        let uuid = Uuid::parse_str(uuid)
            .map_err(|e| AppError::validation(format!("invalid uuid: {}", e)))?;
        let sql = format!("SELECT {RECEIPT_COLUMNS} FROM receipts WHERE uuid = $1");
        sqlx::query_as::<_, Receipt>(&sql)
            .bind(uuid)
            .fetch_optional(&self.db)
            .await
            .map_err(|e| AppError::store("find receipt", e))?
            .ok_or(AppError::NotFound("receipt"))
    }

    #[instrument(skip(self))]
    async fn find_by_user_id(&self, user_id: i64, page: i64, limit: i64) -> AppResult<(Vec<Receipt>, i64)> {
        let offset = page_offset(page, limit)?;
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM receipts WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.db)
            .await
            .map_err(|e| AppError::store("count receipts", e))?;

        let sql = format!(
            r#"
            SELECT {RECEIPT_COLUMNS}
              FROM receipts
             WHERE user_id = $1
             ORDER BY upload_date DESC, id DESC
             LIMIT $2 OFFSET $3
            "#
        );
        let rows = sqlx::query_as::<_, Receipt>(&sql)
            .bind(user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.db)
            .await
            .map_err(|e| AppError::store("query receipts", e))?;

        Ok((rows, total))
    }

    #[instrument(skip(self, receipt), fields(receipt_id = receipt.id))]
    async fn update(&self, receipt: &Receipt) -> AppResult<Receipt> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let sql = format!(
            r#"
            UPDATE receipts
               SET store_name = $1, address = $2, phone = $3, date = $4, status = $5,
                   total_items = $6, total_spending = $7, total_discount = $8,
                   updated_at = NOW(), updated_at_unix = $9
             WHERE id = $10
            RETURNING {RECEIPT_COLUMNS}
            "#
        );
        sqlx::query_as::<_, Receipt>(&sql)
            .bind(&receipt.store_name)
            .bind(&receipt.address)
            .bind(receipt.phone)
            .bind(receipt.date)
            .bind(receipt.status)
            .bind(receipt.total_items)
            .bind(receipt.total_spending)
            .bind(receipt.total_discount)
            .bind(now)
            .bind(receipt.id)
            .fetch_optional(&self.db)
            .await
            .map_err(|e| AppError::store("update receipt", e))?
            .ok_or(AppError::NotFound("receipt"))
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: i64) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM receipts WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .map_err(|e| AppError::store("delete receipt", e))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("receipt"));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn soft_delete(&self, id: i64) -> AppResult<()> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let result = sqlx::query(
            r#"
            UPDATE receipts
               SET status = 'deleted', updated_at = NOW(), updated_at_unix = $1
             WHERE id = $2
            "#,
        )
        .bind(now)
        .bind(id)
        .execute(&self.db)
        .await
        .map_err(|e| AppError::store("soft delete receipt", e))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("receipt"));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn stats_by_user_id(&self, user_id: i64) -> AppResult<ReceiptStats> {
        let (count, spending, discount, average): (i64, f64, f64, f64) = sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COALESCE(SUM(total_spending), 0)::float8,
                   COALESCE(SUM(total_discount), 0)::float8,
                   COALESCE(AVG(total_spending), 0)::float8
              FROM receipts
             WHERE user_id = $1 AND status = 'completed'
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.db)
        .await
        .map_err(|e| AppError::store("get stats", e))?;

        Ok(ReceiptStats::new(count, spending, discount, average))
    }
}
