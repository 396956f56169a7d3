use std::sync::Arc;
use std::time::Duration;

use crate::cache::OrderCache;
use crate::errors::{ServiceError, StoreError};
use crate::ingest::cache_committed;
use crate::metrics::Metrics;
use crate::models::Order;
use crate::store::{with_deadline, OrderStore, SaveOutcome};

// ============================================================================
// Order Service - read/write facade used by the HTTP handlers
// ============================================================================
//
// Read:  cache -> (miss) store.load -> cache.set -> caller
// Write: store.save -> (committed) cache.set -> caller
//
// A store error is never turned into not-found, and never touches the cache.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
}

pub struct OrderService {
    store: Arc<dyn OrderStore>,
    cache: Arc<OrderCache>,
    metrics: Arc<Metrics>,
    store_timeout: Duration,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn OrderStore>,
        cache: Arc<OrderCache>,
        metrics: Arc<Metrics>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            cache,
            metrics,
            store_timeout,
        }
    }

    pub async fn get_order(&self, order_uid: &str) -> Result<Arc<Order>, ServiceError> {
        if let Some(order) = self.cache.get(order_uid).await {
            self.metrics.record_cache_lookup(true);
            return Ok(order);
        }
        self.metrics.record_cache_lookup(false);

        let loaded = with_deadline(self.store_timeout, self.store.load(order_uid)).await;
        let order = match loaded {
            Ok(Some(order)) => {
                self.metrics.record_store_operation("load", "found");
                Arc::new(order)
            }
            Ok(None) => {
                self.metrics.record_store_operation("load", "not_found");
                return Err(ServiceError::NotFound(order_uid.to_string()));
            }
            Err(e) => {
                self.metrics.record_store_operation("load", "error");
                tracing::error!(order_uid = %order_uid, error = %e, "Failed to load order");
                return Err(e.into());
            }
        };

        self.cache.set(order_uid.to_string(), order.clone()).await;
        self.metrics.set_cache_entries(self.cache.len().await);

        tracing::debug!(order_uid = %order_uid, "Cache filled from store");
        Ok(order)
    }

    pub async fn create_order(&self, order: Order) -> Result<CreateOutcome, ServiceError> {
        let saved = with_deadline(self.store_timeout, self.store.save(&order)).await;

        match saved {
            Ok(SaveOutcome::Inserted) => {
                self.metrics.record_store_operation("save", "inserted");
                let order_uid = order.order_uid.clone();
                self.cache.set(order_uid.clone(), Arc::new(order)).await;
                self.metrics.set_cache_entries(self.cache.len().await);

                tracing::info!(order_uid = %order_uid, "Order created via API");
                Ok(CreateOutcome::Created)
            }
            Ok(SaveOutcome::AlreadyExists) => {
                self.metrics.record_store_operation("save", "duplicate");
                self.refresh_duplicate(&order.order_uid).await;
                Ok(CreateOutcome::AlreadyExists)
            }
            Err(e) => {
                self.metrics.record_store_operation("save", "error");
                tracing::error!(order_uid = %order.order_uid, error = %e, "Failed to create order");
                Err(e.into())
            }
        }
    }

    pub async fn cached_orders(&self) -> usize {
        self.cache.len().await
    }

    async fn refresh_duplicate(&self, order_uid: &str) {
        let refreshed: Result<(), StoreError> =
            cache_committed(self.store.as_ref(), &self.cache, order_uid, self.store_timeout).await;
        if let Err(e) = refreshed {
            // The order is durable; the next read fills the cache instead.
            tracing::warn!(
                order_uid = %order_uid,
                error = %e,
                "Could not refresh cache for duplicate order"
            );
        }
        self.metrics.set_cache_entries(self.cache.len().await);
    }
}
