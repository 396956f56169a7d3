use anyhow::Result;
use rdkafka::{
    config::ClientConfig,
    message::{Header, OwnedHeaders},
    producer::{FutureProducer, FutureRecord},
    util::Timeout,
};
use std::time::Duration;

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Publishes raw payloads to one topic. Keys are order ids so every delivery
/// of one order lands on the same partition.
pub struct OrderPublisher {
    producer: FutureProducer,
    topic: String,
}

impl OrderPublisher {
    pub fn new(brokers: &str, topic: &str) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()
            .map_err(|e| anyhow::anyhow!("Failed to create Kafka producer: {}", e))?;

        Ok(Self {
            producer,
            topic: topic.to_string(),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Send bytes as-is; used to replay fixtures, including malformed ones
    pub async fn publish_raw(&self, key: &str, payload: &[u8]) -> Result<()> {
        let record = FutureRecord::to(&self.topic).key(key).payload(payload);

        self.producer
            .send(record, Timeout::After(SEND_TIMEOUT))
            .await
            .map_err(|(e, _)| anyhow::anyhow!("Kafka send error: {}", e))?;

        tracing::info!(
            topic = %self.topic,
            key = %key,
            payload_bytes = payload.len(),
            "Published order message"
        );
        Ok(())
    }

    /// Park a message that could not be ingested, tagged with why and where
    /// it came from
    pub async fn publish_dead_letter(
        &self,
        key: &str,
        payload: &[u8],
        reason: &str,
        source: &str,
    ) -> Result<()> {
        let headers = OwnedHeaders::new()
            .insert(Header {
                key: "dlq-reason",
                value: Some(reason),
            })
            .insert(Header {
                key: "dlq-source",
                value: Some(source),
            });
        let record = FutureRecord::to(&self.topic)
            .key(key)
            .payload(payload)
            .headers(headers);

        self.producer
            .send(record, Timeout::After(SEND_TIMEOUT))
            .await
            .map_err(|(e, _)| anyhow::anyhow!("Dead-letter send error: {}", e))?;

        tracing::warn!(
            topic = %self.topic,
            key = %key,
            reason = %reason,
            source = %source,
            "📮 Message dead-lettered"
        );
        Ok(())
    }
}
