//! In-memory repositories backing the unit tests.
//!
//! They follow the Postgres schema's rules: unique emails, item rows must
//! reference an existing receipt, deleting a receipt cascades to its items,
//! and a failed batch leaves no rows behind.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::{
    repo::UserRepository,
    repo_types::{NewUser, User},
};
use crate::error::{AppError, AppResult};
use crate::items::{
    repo::ItemRepository,
    repo_types::{Item, NewItem},
};
use crate::receipts::{
    dto::page_offset,
    repo::ReceiptRepository,
    repo_types::{NewReceipt, Receipt, ReceiptStats, ReceiptStatus},
};

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    receipts: Vec<Receipt>,
    items: Vec<Item>,
    next_id: i64,
    batch_calls: usize,
    fail_item_named: Option<String>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Shared tables; clone it to hand the same data to several repositories.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap()
    }

    pub fn receipt_count(&self) -> usize {
        self.lock().receipts.len()
    }

    pub fn item_count(&self) -> usize {
        self.lock().items.len()
    }

    pub fn batch_calls(&self) -> usize {
        self.lock().batch_calls
    }

    /// Makes any insert of an item with this name fail like a store error.
    pub fn fail_items_named(&self, name: &str) {
        self.lock().fail_item_named = Some(name.to_string());
    }
}

fn not_unique(tables: &Tables, email: &str, except_id: Option<i64>) -> AppResult<()> {
    if tables
        .users
        .iter()
        .any(|u| u.email == email && Some(u.id) != except_id)
    {
        return Err(AppError::AlreadyExists("email already registered".into()));
    }
    Ok(())
}

fn parse_uuid(uuid: &str) -> AppResult<Uuid> {
    Uuid::parse_str(uuid).map_err(|e| AppError::validation(format!("invalid uuid: {}", e)))
}

#[derive(Clone, Default)]
pub struct MemoryUserRepository {
    store: MemoryStore,
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn create(&self, user: NewUser) -> AppResult<User> {
        let mut t = self.store.lock();
        not_unique(&t, &user.email, None)?;
        let now = OffsetDateTime::now_utc();
        let row = User {
            id: t.next_id(),
            uuid: Uuid::new_v4(),
            email: user.email,
            password_hash: user.password_hash,
            full_name: user.full_name,
            created_at: now,
            updated_at: now,
            created_at_unix: now.unix_timestamp(),
            updated_at_unix: now.unix_timestamp(),
        };
        t.users.push(row.clone());
        Ok(row)
    }

    async fn find_by_email(&self, email: &str) -> AppResult<User> {
        let t = self.store.lock();
        t.users
            .iter()
            .find(|u| u.email == email)
            .cloned()
            .ok_or(AppError::NotFound("user"))
    }

    async fn find_by_id(&self, id: i64) -> AppResult<User> {
        let t = self.store.lock();
        t.users
            .iter()
            .find(|u| u.id == id)
            .cloned()
            .ok_or(AppError::NotFound("user"))
    }

    async fn find_by_uuid(&self, uuid: &str) -> AppResult<User> {
        let uuid = parse_uuid(uuid)?;
        let t = self.store.lock();
        t.users
            .iter()
            .find(|u| u.uuid == uuid)
            .cloned()
            .ok_or(AppError::NotFound("user"))
    }

    async fn update(&self, user: &User) -> AppResult<User> {
        let mut t = self.store.lock();
        not_unique(&t, &user.email, Some(user.id))?;
        let row = t
            .users
            .iter_mut()
            .find(|u| u.id == user.id)
            .ok_or(AppError::NotFound("user"))?;
        let now = OffsetDateTime::now_utc();
        row.email = user.email.clone();
        row.full_name = user.full_name.clone();
        row.updated_at = now;
        row.updated_at_unix = now.unix_timestamp();
        Ok(row.clone())
    }
}

#[derive(Clone)]
pub struct MemoryReceiptRepository {
    store: MemoryStore,
}

impl MemoryReceiptRepository {
    pub fn new(store: MemoryStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ReceiptRepository for MemoryReceiptRepository {
    async fn create(&self, r: NewReceipt) -> AppResult<Receipt> {
        let mut t = self.store.lock();
        let now = OffsetDateTime::now_utc();
        let row = Receipt {
            id: t.next_id(),
            uuid: Uuid::new_v4(),
            user_id: r.user_id,
            store_name: r.store_name,
            address: r.address,
            phone: r.phone,
            date: r.date,
            image_url: r.image_url,
            original_filename: r.original_filename,
            file_size: r.file_size,
            upload_date: now,
            status: r.status,
            total_items: r.total_items,
            total_spending: r.total_spending,
            total_discount: r.total_discount,
            created_at: now,
            updated_at: now,
            created_at_unix: now.unix_timestamp(),
            updated_at_unix: now.unix_timestamp(),
        };
        t.receipts.push(row.clone());
        Ok(row)
    }

    async fn find_by_id(&self, id: i64) -> AppResult<Receipt> {
        let t = self.store.lock();
        t.receipts
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or(AppError::NotFound("receipt"))
    }

    async fn find_by_uuid(&self, uuid: &str) -> AppResult<Receipt> {
        let uuid = parse_uuid(uuid)?;
        let t = self.store.lock();
        t.receipts
            .iter()
            .find(|r| r.uuid == uuid)
            .cloned()
            .ok_or(AppError::NotFound("receipt"))
    }

    async fn find_by_user_id(&self, user_id: i64, page: i64, limit: i64) -> AppResult<(Vec<Receipt>, i64)> {
        let offset = page_offset(page, limit)?;
        let t = self.store.lock();
        let mut rows: Vec<Receipt> = t
            .receipts
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        let total = rows.len() as i64;
        rows.sort_by(|a, b| b.upload_date.cmp(&a.upload_date).then(b.id.cmp(&a.id)));
        let page = rows
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn update(&self, receipt: &Receipt) -> AppResult<Receipt> {
        let mut t = self.store.lock();
        let row = t
            .receipts
            .iter_mut()
            .find(|r| r.id == receipt.id)
            .ok_or(AppError::NotFound("receipt"))?;
        let now = OffsetDateTime::now_utc();
        row.store_name = receipt.store_name.clone();
        row.address = receipt.address.clone();
        row.phone = receipt.phone;
        row.date = receipt.date;
        row.status = receipt.status;
        row.total_items = receipt.total_items;
        row.total_spending = receipt.total_spending;
        row.total_discount = receipt.total_discount;
        row.updated_at = now;
        row.updated_at_unix = now.unix_timestamp();
        Ok(row.clone())
    }

    async fn delete(&self, id: i64) -> AppResult<()> {
        let mut t = self.store.lock();
        let before = t.receipts.len();
        t.receipts.retain(|r| r.id != id);
        if t.receipts.len() == before {
            return Err(AppError::NotFound("receipt"));
        }
        t.items.retain(|i| i.receipt_id != id);
        Ok(())
    }

    async fn soft_delete(&self, id: i64) -> AppResult<()> {
        let mut t = self.store.lock();
        let row = t
            .receipts
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(AppError::NotFound("receipt"))?;
        let now = OffsetDateTime::now_utc();
        row.status = ReceiptStatus::Deleted;
        row.updated_at = now;
        row.updated_at_unix = now.unix_timestamp();
        Ok(())
    }

    async fn stats_by_user_id(&self, user_id: i64) -> AppResult<ReceiptStats> {
        let t = self.store.lock();
        let completed: Vec<&Receipt> = t
            .receipts
            .iter()
            .filter(|r| r.user_id == user_id && r.status == ReceiptStatus::Completed)
            .collect();
        let count = completed.len() as i64;
        let spending: f64 = completed.iter().map(|r| r.total_spending).sum();
        let discount: f64 = completed.iter().map(|r| r.total_discount).sum();
        let average = if count > 0 { spending / count as f64 } else { 0.0 };
        Ok(ReceiptStats::new(count, spending, discount, average))
    }
}

#[derive(Clone)]
pub struct MemoryItemRepository {
    store: MemoryStore,
}

impl MemoryItemRepository {
    pub fn new(store: MemoryStore) -> Self {
        Self { store }
    }
}

fn insert_item(t: &mut Tables, item: NewItem, now: OffsetDateTime) -> AppResult<Item> {
    if t.fail_item_named.as_deref() == Some(item.name.as_str()) {
        return Err(AppError::store("insert item", sqlx::Error::Protocol("injected item failure".into())));
    }
    if !t.receipts.iter().any(|r| r.id == item.receipt_id) {
        return Err(AppError::store(
            "insert item",
            sqlx::Error::Protocol("items_receipt_id_fkey violated".into()),
        ));
    }
    Ok(Item {
        id: t.next_id(),
        uuid: Uuid::new_v4(),
        receipt_id: item.receipt_id,
        name: item.name,
        unit_price: item.unit_price,
        quantity: item.quantity,
        price: item.price,
        total: item.total,
        created_at: now,
        created_at_unix: now.unix_timestamp(),
    })
}

#[async_trait]
impl ItemRepository for MemoryItemRepository {
    async fn create(&self, item: NewItem) -> AppResult<Item> {
        let mut t = self.store.lock();
        let row = insert_item(&mut t, item, OffsetDateTime::now_utc())?;
        t.items.push(row.clone());
        Ok(row)
    }

    async fn create_batch(&self, items: Vec<NewItem>) -> AppResult<Vec<Item>> {
        let mut t = self.store.lock();
        t.batch_calls += 1;
        let now = OffsetDateTime::now_utc();
        let mut staged = Vec::with_capacity(items.len());
        for item in items {
            staged.push(insert_item(&mut t, item, now)?);
        }
        t.items.extend(staged.iter().cloned());
        Ok(staged)
    }

    async fn find_by_receipt_id(&self, receipt_id: i64) -> AppResult<Vec<Item>> {
        let t = self.store.lock();
        let mut rows: Vec<Item> = t
            .items
            .iter()
            .filter(|i| i.receipt_id == receipt_id)
            .cloned()
            .collect();
        rows.sort_by_key(|i| i.id);
        Ok(rows)
    }

    async fn find_by_id(&self, id: i64) -> AppResult<Item> {
        let t = self.store.lock();
        t.items
            .iter()
            .find(|i| i.id == id)
            .cloned()
            .ok_or(AppError::NotFound("item"))
    }

    async fn update(&self, item: &Item) -> AppResult<()> {
        let mut t = self.store.lock();
        let row = t
            .items
            .iter_mut()
            .find(|i| i.id == item.id)
            .ok_or(AppError::NotFound("item"))?;
        row.name = item.name.clone();
        row.unit_price = item.unit_price;
        row.quantity = item.quantity;
        row.price = item.price;
        row.total = item.total;
        Ok(())
    }

    async fn delete(&self, id: i64) -> AppResult<()> {
        let mut t = self.store.lock();
        let before = t.items.len();
        t.items.retain(|i| i.id != id);
        if t.items.len() == before {
            return Err(AppError::NotFound("item"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn receipt(store: &MemoryStore, user_id: i64) -> Receipt {
        MemoryReceiptRepository::new(store.clone())
            .create(NewReceipt {
                user_id,
                store_name: None,
                address: None,
                phone: None,
                date: None,
                image_url: "receipts/x.jpg".into(),
                original_filename: "x.jpg".into(),
                file_size: 1,
                status: ReceiptStatus::Completed,
                total_items: 0,
                total_spending: 0.0,
                total_discount: 0.0,
            })
            .await
            .unwrap()
    }

    fn new_item(receipt_id: i64, name: &str) -> NewItem {
        NewItem {
            receipt_id,
            name: name.into(),
            unit_price: 100,
            quantity: 1,
            price: 100,
            total: 100,
        }
    }

    #[tokio::test]
    async fn batch_is_all_or_nothing() {
        let store = MemoryStore::default();
        let items = MemoryItemRepository::new(store.clone());
        let r = receipt(&store, 1).await;

        let err = items
            .create_batch(vec![new_item(r.id, "a"), new_item(r.id, "b"), new_item(r.id + 100, "c")])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Store { .. }));
        assert!(items.find_by_receipt_id(r.id).await.unwrap().is_empty());

        let ok = items
            .create_batch(vec![new_item(r.id, "a"), new_item(r.id, "b")])
            .await
            .unwrap();
        let listed = items.find_by_receipt_id(r.id).await.unwrap();
        assert_eq!(listed, ok);
    }

    #[tokio::test]
    async fn item_update_and_delete_report_missing_rows() {
        let store = MemoryStore::default();
        let items = MemoryItemRepository::new(store.clone());
        let r = receipt(&store, 1).await;
        let mut it = items.create(new_item(r.id, "a")).await.unwrap();

        it.quantity = 3;
        items.update(&it).await.unwrap();
        assert_eq!(items.find_by_id(it.id).await.unwrap().quantity, 3);

        items.delete(it.id).await.unwrap();
        assert!(matches!(items.delete(it.id).await, Err(AppError::NotFound("item"))));
        assert!(matches!(items.update(&it).await, Err(AppError::NotFound("item"))));
        assert!(matches!(items.find_by_id(it.id).await, Err(AppError::NotFound("item"))));
    }

    #[tokio::test]
    async fn user_lookup_by_uuid_validates_input() {
        let users = MemoryUserRepository::default();
        let u = users
            .create(NewUser {
                email: "a@x.com".into(),
                password_hash: "h".into(),
                full_name: "A".into(),
            })
            .await
            .unwrap();
        assert_eq!(users.find_by_uuid(&u.uuid.to_string()).await.unwrap().id, u.id);
        assert!(matches!(users.find_by_uuid("nope").await, Err(AppError::Validation(_))));
        assert!(matches!(
            users.find_by_uuid(&Uuid::new_v4().to_string()).await,
            Err(AppError::NotFound("user"))
        ));
    }
}
