use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Receipt line item. Amounts are integers in the currency's minor unit.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Item {
    pub id: i64,
    pub uuid: Uuid,
    pub receipt_id: i64,
    pub name: String,
    pub unit_price: i64,
    pub quantity: i64,
    pub price: i64,
    pub total: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub created_at_unix: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewItem {
    pub receipt_id: i64,
    pub name: String,
    pub unit_price: i64,
    pub quantity: i64,
    pub price: i64,
    pub total: i64,
}
