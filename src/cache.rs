use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::errors::StoreError;
use crate::models::Order;
use crate::store::OrderStore;

// ============================================================================
// Order Cache
// ============================================================================
//
// Process-local projection of committed orders, keyed by order_uid.
//
// - get: shared lock, any number of concurrent readers
// - set: exclusive lock, whole-entry replace, last writer wins
// - warm_up: bulk load from the store before any traffic is accepted
//
// Entries are `Arc<Order>` so a reader holds a complete immutable snapshot
// and never sees a half-written value.
//
// Retention is unbounded unless a TTL is configured. Expired entries are
// reported absent by `get` and replaced on the next `set`; nothing evicts
// them in the background.
//
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct CacheConfig {
    pub ttl: Option<Duration>,
}

struct Entry {
    order: Arc<Order>,
    stored_at: Instant,
}

pub struct OrderCache {
    entries: RwLock<HashMap<String, Entry>>,
    config: CacheConfig,
}

impl OrderCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub async fn get(&self, order_uid: &str) -> Option<Arc<Order>> {
        let entries = self.entries.read().await;
        let entry = entries.get(order_uid)?;

        if let Some(ttl) = self.config.ttl {
            if entry.stored_at.elapsed() >= ttl {
                return None;
            }
        }

        Some(entry.order.clone())
    }

    pub async fn set(&self, order_uid: String, order: Arc<Order>) {
        let entry = Entry {
            order,
            stored_at: Instant::now(),
        };
        self.entries.write().await.insert(order_uid, entry);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Populate the cache with every persisted order.
    ///
    /// Orders are loaded before the write lock is taken, so concurrent
    /// readers are only blocked for the in-memory insert.
    pub async fn warm_up(&self, store: &dyn OrderStore) -> Result<usize, StoreError> {
        let started = Instant::now();
        let orders = store.load_all().await?;
        let count = orders.len();

        let now = Instant::now();
        let mut entries = self.entries.write().await;
        for order in orders {
            let order_uid = order.order_uid.clone();
            entries.insert(
                order_uid,
                Entry {
                    order: Arc::new(order),
                    stored_at: now,
                },
            );
        }
        drop(entries);

        tracing::info!(
            order_count = count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "🔥 Cache warmed from store"
        );

        Ok(count)
    }
}

impl Default for OrderCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}
