use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::items::repo_types::Item;

/// Mirrors the `receipt_status` Postgres enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[sqlx(type_name = "receipt_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReceiptStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    /// Set by `ReceiptRepository::soft_delete`.
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Receipt {
    pub id: i64,
    pub uuid: Uuid,
    pub user_id: i64,
    pub store_name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<i64>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub date: Option<OffsetDateTime>,
    /// Object-storage key of the uploaded image.
    pub image_url: String,
    pub original_filename: String,
    pub file_size: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub upload_date: OffsetDateTime,
    pub status: ReceiptStatus,
    pub total_items: i64,
    pub total_spending: f64,
    pub total_discount: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub created_at_unix: i64,
    pub updated_at_unix: i64,
}

/// Caller-supplied columns for a new receipt.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReceipt {
    pub user_id: i64,
    pub store_name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<i64>,
    pub date: Option<OffsetDateTime>,
    pub image_url: String,
    pub original_filename: String,
    pub file_size: i64,
    pub status: ReceiptStatus,
    pub total_items: i64,
    pub total_spending: f64,
    pub total_discount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReceiptWithItems {
    #[serde(flatten)]
    pub receipt: Receipt,
    pub items: Vec<Item>,
}

/// Spending aggregates over a user's completed receipts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReceiptStats {
    pub total_receipts: i64,
    pub total_spending: f64,
    pub total_discount: f64,
    pub average_spending: f64,
    pub net_spending: f64,
}

impl ReceiptStats {
    pub fn new(total_receipts: i64, total_spending: f64, total_discount: f64, average_spending: f64) -> Self {
        Self {
            total_receipts,
            total_spending,
            total_discount,
            average_spending,
            net_spending: total_spending - total_discount,
        }
    }
}
