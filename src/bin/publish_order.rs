//! Push sample orders onto the orders topic.
//!
//! Each file holds one order object or an array of them. Payloads are sent
//! byte-for-byte, so malformed fixtures can be used to exercise the
//! decode-failure path of the consumer.

use anyhow::Context;
use clap::Parser;
use serde_json::Value;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use order_ingest::config::Config;
use order_ingest::messaging::OrderPublisher;

/// Publish order JSON files to the orders topic
#[derive(Parser, Debug)]
#[command(name = "publish-order")]
#[command(about = "Publish order JSON files to the orders topic")]
struct Args {
    /// JSON files, each holding one order or an array of orders
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Broker list; defaults to the service config
    #[arg(short, long)]
    brokers: Option<String>,

    /// Target topic; defaults to the service config
    #[arg(short, long)]
    topic: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load()?;
    let brokers = args.brokers.unwrap_or(config.kafka.brokers);
    let topic = args.topic.unwrap_or(config.kafka.topic);
    let publisher = OrderPublisher::new(&brokers, &topic)?;

    let mut published = 0usize;
    for path in &args.files {
        let raw = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;

        for payload in split_payloads(&raw) {
            let key = order_key(&payload);
            publisher.publish_raw(&key, &payload).await?;
            published += 1;
        }
    }

    tracing::info!(count = published, topic = %topic, "✅ Done publishing orders");
    Ok(())
}

/// A top-level array is sent element by element; anything else as one message
fn split_payloads(raw: &[u8]) -> Vec<Vec<u8>> {
    match serde_json::from_slice::<Value>(raw) {
        Ok(Value::Array(values)) => values
            .iter()
            .filter_map(|v| serde_json::to_vec(v).ok())
            .collect(),
        _ => vec![raw.to_vec()],
    }
}

fn order_key(payload: &[u8]) -> String {
    serde_json::from_slice::<Value>(payload)
        .ok()
        .and_then(|v| v.get("order_uid").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string())
}
