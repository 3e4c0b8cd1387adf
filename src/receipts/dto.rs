use serde::Deserialize;
use time::{format_description::well_known::Rfc3339, macros::format_description, Date, OffsetDateTime};

use crate::error::{AppError, AppResult};

pub const DEFAULT_PAGE_LIMIT: i64 = 10;
pub const MAX_PAGE_LIMIT: i64 = 100;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateItemRequest {
    pub name: String,
    pub unit_price: i64,
    pub quantity: i64,
    pub price: i64,
    pub total: i64,
}

impl CreateItemRequest {
    fn validate(&self, index: usize) -> AppResult<()> {
        let field_err = |field: &str, msg: &str| {
            AppError::validation(format!("items[{}].{}: {}", index, field, msg))
        };
        if self.name.trim().is_empty() {
            return Err(field_err("name", "this field is required"));
        }
        if self.unit_price < 0 {
            return Err(field_err("unit_price", "must not be negative"));
        }
        if self.quantity < 1 {
            return Err(field_err("quantity", "minimum is 1"));
        }
        if self.price < 0 {
            return Err(field_err("price", "must not be negative"));
        }
        if self.total < 0 {
            return Err(field_err("total", "must not be negative"));
        }
        Ok(())
    }
}

/// Body for creating a receipt (the `data` part of the upload) and for
/// updating one. Updates ignore `items`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CreateReceiptRequest {
    pub store_name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<i64>,
    /// `YYYY-MM-DD` or RFC 3339.
    pub date: Option<String>,
    pub total_items: i64,
    pub total_spending: f64,
    pub total_discount: f64,
    pub items: Vec<CreateItemRequest>,
}

impl CreateReceiptRequest {
    /// Full check for creation: receipt fields and every item.
    pub fn validate(&self) -> AppResult<()> {
        self.validate_fields()?;
        for (i, item) in self.items.iter().enumerate() {
            item.validate(i)?;
        }
        Ok(())
    }

    /// Receipt-level fields only; items are not looked at.
    pub fn validate_fields(&self) -> AppResult<()> {
        if self.total_items < 0 {
            return Err(AppError::validation("total_items: must not be negative"));
        }
        for (field, value) in [
            ("total_spending", self.total_spending),
            ("total_discount", self.total_discount),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(AppError::validation(format!(
                    "{}: must be a non-negative number",
                    field
                )));
            }
        }
        Ok(())
    }
}

/// Empty or blank strings are stored as NULL.
pub(crate) fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub(crate) fn parse_receipt_date(value: Option<&str>) -> AppResult<Option<OffsetDateTime>> {
    let Some(raw) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    if let Ok(ts) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Ok(Some(ts));
    }
    let date = Date::parse(raw, format_description!("[year]-[month]-[day]")).map_err(|_| {
        AppError::validation(format!(
            "date: expected YYYY-MM-DD or RFC 3339, got {:?}",
            raw
        ))
    })?;
    Ok(Some(date.midnight().assume_utc()))
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    DEFAULT_PAGE_LIMIT
}

/// Rows to skip before `page`. A page whose offset does not fit in `i64`
/// is a validation error.
pub(crate) fn page_offset(page: i64, limit: i64) -> AppResult<i64> {
    page.checked_sub(1)
        .and_then(|p| p.checked_mul(limit))
        .filter(|offset| *offset >= 0)
        .ok_or_else(|| AppError::validation("page: out of range"))
}

impl ListQuery {
    pub fn validate(&self) -> AppResult<()> {
        if self.page < 1 {
            return Err(AppError::validation("page: minimum is 1"));
        }
        if !(1..=MAX_PAGE_LIMIT).contains(&self.limit) {
            return Err(AppError::validation(format!(
                "limit: must be between 1 and {}",
                MAX_PAGE_LIMIT
            )));
        }
        page_offset(self.page, self.limit)?;
        Ok(())
    }
}
