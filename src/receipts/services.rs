use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::error::{AppError, AppResult};
use crate::items::{repo::ItemRepository, repo_types::NewItem};
use crate::receipts::{
    dto::{non_empty, parse_receipt_date, CreateReceiptRequest},
    repo::ReceiptRepository,
    repo_types::{NewReceipt, Receipt, ReceiptStats, ReceiptStatus, ReceiptWithItems},
};

/// Uploaded image already stored in object storage.
#[derive(Debug, Clone)]
pub struct StoredImage {
    pub image_ref: String,
    pub filename: String,
    pub file_size: i64,
}

pub struct ReceiptService {
    receipts: Arc<dyn ReceiptRepository>,
    items: Arc<dyn ItemRepository>,
}

/// Rejects access to a receipt owned by someone else.
fn ensure_owner(receipt: &Receipt, user_id: i64) -> AppResult<()> {
    if receipt.user_id != user_id {
        warn!(receipt_id = receipt.id, owner_id = receipt.user_id, user_id, "receipt ownership mismatch");
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

impl ReceiptService {
    pub fn new(receipts: Arc<dyn ReceiptRepository>, items: Arc<dyn ItemRepository>) -> Self {
        Self { receipts, items }
    }

    async fn owned(&self, id: i64, user_id: i64) -> AppResult<Receipt> {
        let receipt = self.receipts.find_by_id(id).await?;
        ensure_owner(&receipt, user_id)?;
        Ok(receipt)
    }

    async fn with_items(&self, receipt: Receipt) -> AppResult<ReceiptWithItems> {
        let items = self.items.find_by_receipt_id(receipt.id).await?;
        Ok(ReceiptWithItems { receipt, items })
    }

    #[instrument(skip(self, req, image), fields(items = req.items.len()))]
    pub async fn create_receipt(
        &self,
        user_id: i64,
        req: CreateReceiptRequest,
        image: StoredImage,
    ) -> AppResult<ReceiptWithItems> {
        req.validate()?;
        let date = parse_receipt_date(req.date.as_deref())?;

        let receipt = self
            .receipts
            .create(NewReceipt {
                user_id,
                store_name: non_empty(req.store_name.as_deref()),
                address: non_empty(req.address.as_deref()),
                phone: req.phone,
                date,
                image_url: image.image_ref,
                original_filename: image.filename,
                file_size: image.file_size,
                status: ReceiptStatus::Completed,
                total_items: req.total_items,
                total_spending: req.total_spending,
                total_discount: req.total_discount,
            })
            .await?;

        let items = if req.items.is_empty() {
            Vec::new()
        } else {
            let batch = req
                .items
                .into_iter()
                .map(|it| NewItem {
                    receipt_id: receipt.id,
                    name: it.name.trim().to_string(),
                    unit_price: it.unit_price,
                    quantity: it.quantity,
                    price: it.price,
                    total: it.total,
                })
                .collect();
            match self.items.create_batch(batch).await {
                Ok(items) => items,
                Err(e) => {
                    // the batch rolled back; drop the receipt row so no
                    // receipt is left without its items
                    if let Err(cleanup) = self.receipts.delete(receipt.id).await {
                        warn!(error = %cleanup, receipt_id = receipt.id, "receipt cleanup failed");
                    }
                    return Err(e);
                }
            }
        };

        info!(receipt_id = receipt.id, user_id, items = items.len(), "receipt created");
        Ok(ReceiptWithItems { receipt, items })
    }

    #[instrument(skip(self))]
    pub async fn get_receipt_by_id(&self, id: i64, user_id: i64) -> AppResult<ReceiptWithItems> {
        let receipt = self.owned(id, user_id).await?;
        self.with_items(receipt).await
    }

    #[instrument(skip(self))]
    pub async fn get_receipt_by_uuid(&self, uuid: &str, user_id: i64) -> AppResult<ReceiptWithItems> {
        let receipt = self.receipts.find_by_uuid(uuid).await?;
        ensure_owner(&receipt, user_id)?;
        self.with_items(receipt).await
    }

    #[instrument(skip(self))]
    pub async fn get_receipts_by_user_id(
        &self,
        user_id: i64,
        page: i64,
        limit: i64,
    ) -> AppResult<(Vec<Receipt>, i64)> {
        self.receipts.find_by_user_id(user_id, page, limit).await
    }

    /// Overwrites store fields, date and totals. Items, image and status stay.
    #[instrument(skip(self, req))]
    pub async fn update_receipt(
        &self,
        id: i64,
        user_id: i64,
        req: CreateReceiptRequest,
    ) -> AppResult<ReceiptWithItems> {
        let mut receipt = self.owned(id, user_id).await?;
        req.validate_fields()?;

        receipt.store_name = non_empty(req.store_name.as_deref());
        receipt.address = non_empty(req.address.as_deref());
        receipt.phone = req.phone;
        receipt.date = parse_receipt_date(req.date.as_deref())?;
        receipt.total_items = req.total_items;
        receipt.total_spending = req.total_spending;
        receipt.total_discount = req.total_discount;

        let receipt = self.receipts.update(&receipt).await?;
        info!(receipt_id = receipt.id, user_id, "receipt updated");
        self.with_items(receipt).await
    }

    /// Hard delete; items go with it through the foreign key cascade.
    /// Returns the removed row so the caller can drop the stored image.
    #[instrument(skip(self))]
    pub async fn delete_receipt(&self, id: i64, user_id: i64) -> AppResult<Receipt> {
        let receipt = self.owned(id, user_id).await?;
        self.receipts.delete(id).await?;
        info!(receipt_id = id, user_id, "receipt deleted");
        Ok(receipt)
    }

    #[instrument(skip(self))]
    pub async fn get_stats_by_user_id(&self, user_id: i64) -> AppResult<ReceiptStats> {
        self.receipts.stats_by_user_id(user_id).await
    }
}
