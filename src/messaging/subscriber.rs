use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::BorrowedMessage;
use rdkafka::{Message, Offset};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use super::OrderPublisher;
use crate::config::{IngestConfig, KafkaConfig};
use crate::ingest::{Disposition, OrderIngestor};
use crate::metrics::Metrics;

// ============================================================================
// Order Subscriber - Kafka/Redpanda consumer loop
// ============================================================================
//
// Auto-commit is off; the offset of a message is committed only once the
// ingestor acked it. A message the ingestor wants redelivered is not
// committed: the partition is rewound to it after `redelivery_delay`, so it
// is fetched again (at-least-once). A crash before the commit has the same
// effect through the consumer group.
//
// Dead letters:
// - the ingestor reports data the database refuses
// - one offset was redelivered `max_redeliveries` times
// Either way the payload is copied to the DLQ topic and then committed, so
// the partition moves on. If the DLQ send itself fails the message is
// rewound like any other failure.
//
// Messages are handled strictly one at a time; a slow store slows the loop.
//
// ============================================================================

const SEEK_TIMEOUT: Duration = Duration::from_secs(5);
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_millis(500);
const REDELIVERY_LIMIT_REASON: &str = "redelivery_limit";

pub struct OrderSubscriber {
    consumer: StreamConsumer,
    topic: String,
    dead_letters: Option<OrderPublisher>,
    metrics: Arc<Metrics>,
    redelivery_delay: Duration,
    max_redeliveries: u32,
}

impl OrderSubscriber {
    pub fn new(
        config: &KafkaConfig,
        ingest: &IngestConfig,
        metrics: Arc<Metrics>,
    ) -> anyhow::Result<Self> {
        let consumer: StreamConsumer = client_config(config)
            .create()
            .map_err(|e| anyhow::anyhow!("Failed to create Kafka consumer: {}", e))?;

        consumer
            .subscribe(&[config.topic.as_str()])
            .map_err(|e| anyhow::anyhow!("Failed to subscribe to {}: {}", config.topic, e))?;

        let dead_letters = match config.dlq_topic.as_deref() {
            Some(dlq_topic) => Some(OrderPublisher::new(&config.brokers, dlq_topic)?),
            None => {
                tracing::warn!("No dead-letter topic configured, failed messages will be skipped");
                None
            }
        };

        tracing::info!(
            topic = %config.topic,
            group_id = %config.group_id,
            brokers = %config.brokers,
            dlq_topic = ?config.dlq_topic,
            "Subscribed to order topic"
        );

        Ok(Self {
            consumer,
            topic: config.topic.clone(),
            dead_letters,
            metrics,
            redelivery_delay: ingest.redelivery_delay(),
            max_redeliveries: ingest.max_redeliveries,
        })
    }

    /// Consume until `shutdown` flips to true or its sender is dropped
    pub async fn run(self, ingestor: Arc<OrderIngestor>, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(topic = %self.topic, "🔄 Order subscriber running");
        let mut redeliveries = RedeliveryTracker::new(self.max_redeliveries);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                received = self.consumer.recv() => match received {
                    Ok(message) => self.dispatch(&ingestor, &mut redeliveries, &message).await,
                    Err(e) => {
                        tracing::warn!(error = %e, topic = %self.topic, "Kafka receive error");
                        tokio::time::sleep(RECEIVE_ERROR_BACKOFF).await;
                    }
                },
            }
        }

        tracing::info!(topic = %self.topic, "🛑 Order subscriber stopped");
    }

    async fn dispatch(
        &self,
        ingestor: &OrderIngestor,
        redeliveries: &mut RedeliveryTracker,
        message: &BorrowedMessage<'_>,
    ) {
        let payload = message.payload().unwrap_or_default();
        let (partition, offset) = (message.partition(), message.offset());

        tracing::debug!(
            partition = partition,
            offset = offset,
            payload_bytes = payload.len(),
            "Received order message"
        );

        let disposition = match ingestor.handle(payload).await {
            Disposition::Redeliver if !redeliveries.allow(partition, offset) => {
                tracing::error!(
                    partition = partition,
                    offset = offset,
                    limit = self.max_redeliveries,
                    "❌ Redelivery limit reached"
                );
                Disposition::DeadLetter {
                    reason: REDELIVERY_LIMIT_REASON,
                }
            }
            other => other,
        };

        match disposition {
            Disposition::Ack => self.commit(redeliveries, message),
            Disposition::DeadLetter { reason } => {
                if self.dead_letter(message, payload, reason).await {
                    self.metrics.record_dead_letter(reason);
                    self.commit(redeliveries, message);
                } else {
                    self.rewind(message).await;
                }
            }
            Disposition::Redeliver => self.rewind(message).await,
        }
    }

    /// True once the message is safe to commit
    async fn dead_letter(
        &self,
        message: &BorrowedMessage<'_>,
        payload: &[u8],
        reason: &str,
    ) -> bool {
        let Some(publisher) = &self.dead_letters else {
            tracing::error!(
                partition = message.partition(),
                offset = message.offset(),
                reason = %reason,
                "Skipping message without a dead-letter topic"
            );
            return true;
        };

        let key = message
            .key()
            .and_then(|k| std::str::from_utf8(k).ok())
            .unwrap_or("unknown");
        let source = format!(
            "{}/{}/{}",
            message.topic(),
            message.partition(),
            message.offset()
        );

        match publisher.publish_dead_letter(key, payload, reason, &source).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    dlq_topic = %publisher.topic(),
                    source = %source,
                    "Failed to dead-letter message, it will be redelivered"
                );
                false
            }
        }
    }

    fn commit(&self, redeliveries: &mut RedeliveryTracker, message: &BorrowedMessage<'_>) {
        redeliveries.settle(message.partition(), message.offset());

        if let Err(e) = self.consumer.commit_message(message, CommitMode::Async) {
            tracing::warn!(
                error = %e,
                partition = message.partition(),
                offset = message.offset(),
                "Failed to commit offset, message may be redelivered"
            );
        }
    }

    async fn rewind(&self, message: &BorrowedMessage<'_>) {
        tokio::time::sleep(self.redelivery_delay).await;
        if let Err(e) = self.consumer.seek(
            message.topic(),
            message.partition(),
            Offset::Offset(message.offset()),
            SEEK_TIMEOUT,
        ) {
            tracing::error!(
                error = %e,
                partition = message.partition(),
                offset = message.offset(),
                "Failed to rewind partition for redelivery"
            );
        }
    }
}

/// Counts redeliveries per (partition, offset) until the offset is committed
struct RedeliveryTracker {
    limit: u32,
    attempts: HashMap<(i32, i64), u32>,
}

impl RedeliveryTracker {
    fn new(limit: u32) -> Self {
        Self {
            limit,
            attempts: HashMap::new(),
        }
    }

    /// Record one more failed delivery; false once the limit is used up
    fn allow(&mut self, partition: i32, offset: i64) -> bool {
        let attempts = self.attempts.entry((partition, offset)).or_insert(0);
        *attempts += 1;
        *attempts <= self.limit
    }

    fn settle(&mut self, partition: i32, offset: i64) {
        self.attempts.remove(&(partition, offset));
    }

    #[cfg(test)]
    fn pending(&self) -> usize {
        self.attempts.len()
    }
}

fn client_config(config: &KafkaConfig) -> ClientConfig {
    let mut client = ClientConfig::new();
    client
        .set("bootstrap.servers", &config.brokers)
        .set("group.id", &config.group_id)
        .set("enable.auto.commit", "false")
        .set("auto.offset.reset", "earliest")
        .set("session.timeout.ms", config.session_timeout_ms.to_string());
    client
}
