use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cache::OrderCache;
use crate::errors::StoreError;
use crate::metrics::Metrics;
use crate::models::Order;
use crate::store::{with_deadline, OrderStore, SaveOutcome};
use crate::utils::{retry_on_transient, RetryConfig};

// ============================================================================
// Ingestion Consumer
// ============================================================================
//
// One inbound message at a time:
//
//   Received -> Decoded -> Persisted -> CacheUpdated      ack
//   Received -> Decoded -> AlreadyStored                  ack
//   Received -> DecodeFailed -> Dropped                   ack (unusable)
//   Received -> Decoded -> Rejected -> Dropped            dead-letter
//   Received -> Decoded -> PersistFailed -> Dropped       redeliver
//
// Rejected means the database refused the data itself (SQLSTATE class 22 or
// 23); replaying the same bytes would fail the same way.
//
// The cache is written only after the store reported a commit, and before
// `handle` returns. A persist failure never reaches the cache.
//
// Transport-agnostic: the subscriber loop in `messaging` maps the returned
// Disposition onto offset commits.
//
// ============================================================================

/// What the transport should do with the message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Done with it, successfully or because it can never succeed
    Ack,
    /// Not persisted; deliver it again
    Redeliver,
    /// Never persistable; park it on the dead-letter topic and move on
    DeadLetter { reason: &'static str },
}

/// Terminal state reached for one message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    CacheUpdated,
    AlreadyStored,
    DecodeFailed,
    Rejected,
    PersistFailed,
}

impl IngestOutcome {
    pub fn disposition(self) -> Disposition {
        match self {
            IngestOutcome::CacheUpdated
            | IngestOutcome::AlreadyStored
            | IngestOutcome::DecodeFailed => Disposition::Ack,
            IngestOutcome::Rejected => Disposition::DeadLetter { reason: "rejected" },
            IngestOutcome::PersistFailed => Disposition::Redeliver,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            IngestOutcome::CacheUpdated => "cached",
            IngestOutcome::AlreadyStored => "duplicate",
            IngestOutcome::DecodeFailed => "decode_failed",
            IngestOutcome::Rejected => "rejected",
            IngestOutcome::PersistFailed => "persist_failed",
        }
    }
}

pub struct OrderIngestor {
    store: Arc<dyn OrderStore>,
    cache: Arc<OrderCache>,
    metrics: Arc<Metrics>,
    retry: RetryConfig,
    store_timeout: Duration,
}

impl OrderIngestor {
    pub fn new(
        store: Arc<dyn OrderStore>,
        cache: Arc<OrderCache>,
        metrics: Arc<Metrics>,
        retry: RetryConfig,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            cache,
            metrics,
            retry,
            store_timeout,
        }
    }

    /// Process one payload and tell the transport what to do with it
    pub async fn handle(&self, payload: &[u8]) -> Disposition {
        let started = Instant::now();
        let outcome = self.process(payload).await;
        self.metrics.record_ingest(outcome.label(), started.elapsed().as_secs_f64());
        outcome.disposition()
    }

    pub async fn process(&self, payload: &[u8]) -> IngestOutcome {
        let order = match Order::decode(payload) {
            Ok(order) => order,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    payload_bytes = payload.len(),
                    "Dropping undecodable order message"
                );
                return IngestOutcome::DecodeFailed;
            }
        };

        tracing::debug!(
            order_uid = %order.order_uid,
            item_count = order.items.len(),
            "Decoded order message"
        );

        match self.persist(&order).await {
            Ok(SaveOutcome::Inserted) => {
                self.metrics.record_store_operation("save", "inserted");
                let order_uid = order.order_uid.clone();
                self.cache.set(order_uid.clone(), Arc::new(order)).await;
                self.metrics.set_cache_entries(self.cache.len().await);

                tracing::info!(order_uid = %order_uid, "📥 Order ingested and cached");
                IngestOutcome::CacheUpdated
            }
            Ok(SaveOutcome::AlreadyExists) => {
                self.metrics.record_store_operation("save", "duplicate");
                // The replayed payload was never committed; only the stored
                // version may enter the cache.
                if let Err(e) = cache_committed(
                    self.store.as_ref(),
                    &self.cache,
                    &order.order_uid,
                    self.store_timeout,
                )
                .await
                {
                    tracing::warn!(
                        order_uid = %order.order_uid,
                        error = %e,
                        "Could not refresh cache for duplicate order"
                    );
                }
                self.metrics.set_cache_entries(self.cache.len().await);
                IngestOutcome::AlreadyStored
            }
            Err(e) if e.is_rejection() => {
                self.metrics.record_store_operation("save", "rejected");
                tracing::error!(
                    order_uid = %order.order_uid,
                    error = %e,
                    "❌ Database refused order data, dead-lettering"
                );
                IngestOutcome::Rejected
            }
            Err(e) => {
                self.metrics.record_store_operation("save", "error");
                tracing::error!(
                    order_uid = %order.order_uid,
                    error = %e,
                    "❌ Failed to persist order, leaving it for redelivery"
                );
                IngestOutcome::PersistFailed
            }
        }
    }

    async fn persist(&self, order: &Order) -> Result<SaveOutcome, StoreError> {
        let store = &self.store;
        let metrics = &self.metrics;
        let deadline = self.store_timeout;

        retry_on_transient(&self.retry, move |attempt| {
            if attempt > 1 {
                metrics.record_retry("save");
            }
            with_deadline(deadline, store.save(order))
        })
        .await
        .into_result()
    }
}

/// Make sure the cache holds the committed version of `order_uid`.
///
/// Used when a write turned out to be a duplicate: the existing cache entry,
/// if any, already came from the store and is left as is; otherwise the
/// stored aggregate is loaded and cached.
pub(crate) async fn cache_committed(
    store: &dyn OrderStore,
    cache: &OrderCache,
    order_uid: &str,
    deadline: Duration,
) -> Result<(), StoreError> {
    if cache.get(order_uid).await.is_some() {
        return Ok(());
    }

    if let Some(stored) = with_deadline(deadline, store.load(order_uid)).await? {
        cache.set(order_uid.to_string(), Arc::new(stored)).await;
    }
    Ok(())
}
