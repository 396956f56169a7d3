// ============================================================================
// Order Store
// ============================================================================
//
// Transactional persistence of the order aggregate. The store is the source
// of truth; the cache only ever mirrors what `save` committed.
//
// - postgres/ - sqlx implementation over the four normalized tables
// - memory/   - in-process implementation for tests, with failure injection
//
// ============================================================================

mod postgres;
#[cfg(test)]
pub(crate) mod memory;

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

use crate::errors::StoreError;
use crate::models::Order;

pub use postgres::PgOrderStore;

/// What `save` did with the aggregate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Header, delivery, payment and items were committed
    Inserted,
    /// The order_uid was already present; nothing was written
    AlreadyExists,
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persist the whole aggregate atomically.
    ///
    /// A duplicate `order_uid` is not an error: the header insert is skipped,
    /// every other insert is skipped with it, and `AlreadyExists` is returned.
    async fn save(&self, order: &Order) -> Result<SaveOutcome, StoreError>;

    /// Read one aggregate. `Ok(None)` means the id has never been stored.
    async fn load(&self, order_uid: &str) -> Result<Option<Order>, StoreError>;

    /// Read every stored aggregate, for cache warm-up.
    async fn load_all(&self) -> Result<Vec<Order>, StoreError>;
}

/// Bound a store call by `deadline`.
///
/// Dropping the inner future on expiry cancels the statement in flight; an
/// open transaction is rolled back when its connection returns to the pool.
pub async fn with_deadline<T, F>(deadline: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(deadline)),
    }
}
