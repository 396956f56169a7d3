use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{OrderStore, SaveOutcome};
use crate::errors::StoreError;
use crate::models::{Item, Order};

// ============================================================================
// In-memory Order Store (tests only)
// ============================================================================
//
// Same contract as PgOrderStore, modelled as four tables so the tests can
// count rows the way they would in PostgreSQL. A save stages every row and
// applies them in one step at the end, so a failure part way through leaves
// nothing behind.
//
// Failure injection:
// - fail_item_insert(n): the n-th item insert (0-based) of the next saves fails
// - fail_all(true):      every call returns a transient error
// - reject_saves(true):  every save fails as data the database refuses
//
// ============================================================================

#[derive(Default)]
struct Tables {
    orders: HashMap<String, Order>,
    items: Vec<(String, Item)>,
    delivery_rows: usize,
    payment_rows: usize,
}

#[derive(Default)]
pub(crate) struct MemoryOrderStore {
    tables: Mutex<Tables>,
    fail_item_at: Mutex<Option<usize>>,
    fail_all: Mutex<bool>,
    reject: Mutex<bool>,
    pub save_calls: AtomicUsize,
    pub load_calls: AtomicUsize,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_item_insert(&self, index: Option<usize>) {
        *self.fail_item_at.lock().unwrap() = index;
    }

    pub fn fail_all(&self, fail: bool) {
        *self.fail_all.lock().unwrap() = fail;
    }

    pub fn reject_saves(&self, reject: bool) {
        *self.reject.lock().unwrap() = reject;
    }

    pub fn order_rows(&self) -> usize {
        self.tables.lock().unwrap().orders.len()
    }

    pub fn delivery_rows(&self) -> usize {
        self.tables.lock().unwrap().delivery_rows
    }

    pub fn payment_rows(&self) -> usize {
        self.tables.lock().unwrap().payment_rows
    }

    pub fn item_rows(&self, order_uid: &str) -> usize {
        self.tables
            .lock()
            .unwrap()
            .items
            .iter()
            .filter(|(uid, _)| uid == order_uid)
            .count()
    }

    pub fn saves(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }

    pub fn loads(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if *self.fail_all.lock().unwrap() {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    fn assemble(tables: &Tables, order_uid: &str) -> Option<Order> {
        let mut order = tables.orders.get(order_uid)?.clone();
        order.items = tables
            .items
            .iter()
            .filter(|(uid, _)| uid == order_uid)
            .map(|(_, item)| item.clone())
            .collect();
        Some(order)
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn save(&self, order: &Order) -> Result<SaveOutcome, StoreError> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        if *self.reject.lock().unwrap() {
            return Err(StoreError::Rejected {
                order_uid: order.order_uid.clone(),
                sqlstate: "22021".to_string(),
                message: "invalid byte sequence for encoding \"UTF8\": 0x00".to_string(),
            });
        }

        let mut tables = self.tables.lock().unwrap();

        if tables.orders.contains_key(&order.order_uid) {
            return Ok(SaveOutcome::AlreadyExists);
        }

        let fail_at = *self.fail_item_at.lock().unwrap();
        let mut staged_items = Vec::with_capacity(order.items.len());
        for (position, item) in order.items.iter().enumerate() {
            if fail_at == Some(position) {
                return Err(StoreError::Database(sqlx::Error::Protocol(format!(
                    "injected failure inserting item {}",
                    position
                ))));
            }
            staged_items.push((order.order_uid.clone(), item.clone()));
        }

        let mut header = order.clone();
        header.items.clear();
        tables.orders.insert(order.order_uid.clone(), header);
        tables.delivery_rows += 1;
        tables.payment_rows += 1;
        tables.items.extend(staged_items);

        Ok(SaveOutcome::Inserted)
    }

    async fn load(&self, order_uid: &str) -> Result<Option<Order>, StoreError> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        let tables = self.tables.lock().unwrap();
        Ok(Self::assemble(&tables, order_uid))
    }

    async fn load_all(&self) -> Result<Vec<Order>, StoreError> {
        self.check_available()?;

        let tables = self.tables.lock().unwrap();
        Ok(tables
            .orders
            .keys()
            .filter_map(|uid| Self::assemble(&tables, uid))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures;

    #[tokio::test]
    async fn test_duplicate_save_is_a_noop() {
        let store = MemoryOrderStore::new();
        let order = fixtures::order("A1", &[1, 2]);

        assert_eq!(store.save(&order).await.unwrap(), SaveOutcome::Inserted);
        assert_eq!(
            store.save(&fixtures::order("A1", &[5, 6, 7])).await.unwrap(),
            SaveOutcome::AlreadyExists
        );

        assert_eq!(store.order_rows(), 1);
        assert_eq!(store.delivery_rows(), 1);
        assert_eq!(store.payment_rows(), 1);
        assert_eq!(store.item_rows("A1"), 2);
        assert_eq!(store.load("A1").await.unwrap().unwrap(), order);
    }

    #[tokio::test]
    async fn test_failing_third_item_leaves_nothing() {
        let store = MemoryOrderStore::new();
        store.fail_item_insert(Some(2));

        let result = store.save(&fixtures::order("P1", &[1, 2, 3, 4, 5])).await;

        assert!(result.is_err());
        assert_eq!(store.order_rows(), 0);
        assert_eq!(store.delivery_rows(), 0);
        assert_eq!(store.payment_rows(), 0);
        assert_eq!(store.item_rows("P1"), 0);
        assert!(store.load("P1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unavailable_store_reports_transient_error() {
        use crate::utils::IsTransient;

        let store = MemoryOrderStore::new();
        store.fail_all(true);

        let err = store.load("A1").await.unwrap_err();
        assert!(err.is_transient());
    }
}
