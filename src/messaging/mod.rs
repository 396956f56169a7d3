// Kafka-compatible transport (Redpanda in development)
mod publisher;
mod subscriber;

pub use publisher::OrderPublisher;
pub use subscriber::OrderSubscriber;
