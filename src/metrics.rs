use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// - Ingestion: messages by outcome, end-to-end handling latency
// - Cache: lookups by result (hit/miss), current entry count
// - Store: calls by operation and outcome
// - Retry: attempts beyond the first, per operation
// - Dead letters: messages parked instead of ingested, by reason
//
// Scraped via GET /metrics on the HTTP server.
// ============================================================================

pub struct Metrics {
    registry: Registry,

    pub ingest_messages: IntCounterVec,
    pub ingest_duration: HistogramVec,

    pub cache_lookups: IntCounterVec,
    pub cache_entries: IntGauge,

    pub store_operations: IntCounterVec,

    pub retry_attempts: IntCounterVec,

    pub dead_letters: IntCounterVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let ingest_messages = IntCounterVec::new(
            Opts::new("ingest_messages_total", "Inbound order messages by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(ingest_messages.clone()))?;

        let ingest_duration = HistogramVec::new(
            HistogramOpts::new(
                "ingest_duration_seconds",
                "Time to decode, persist and cache one message",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["outcome"],
        )?;
        registry.register(Box::new(ingest_duration.clone()))?;

        let cache_lookups = IntCounterVec::new(
            Opts::new("cache_lookups_total", "Order cache lookups by result"),
            &["result"],
        )?;
        registry.register(Box::new(cache_lookups.clone()))?;

        let cache_entries = IntGauge::new("cache_entries", "Orders currently held in the cache")?;
        registry.register(Box::new(cache_entries.clone()))?;

        let store_operations = IntCounterVec::new(
            Opts::new("store_operations_total", "Order store calls by operation and outcome"),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(store_operations.clone()))?;

        let retry_attempts = IntCounterVec::new(
            Opts::new("retry_attempts_total", "Retries after a failed first attempt"),
            &["operation"],
        )?;
        registry.register(Box::new(retry_attempts.clone()))?;

        let dead_letters = IntCounterVec::new(
            Opts::new("dead_letters_total", "Messages dead-lettered instead of ingested"),
            &["reason"],
        )?;
        registry.register(Box::new(dead_letters.clone()))?;

        Ok(Self {
            registry,
            ingest_messages,
            ingest_duration,
            cache_lookups,
            cache_entries,
            store_operations,
            retry_attempts,
            dead_letters,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_ingest(&self, outcome: &str, duration_secs: f64) {
        self.ingest_messages.with_label_values(&[outcome]).inc();
        self.ingest_duration.with_label_values(&[outcome]).observe(duration_secs);
    }

    pub fn record_cache_lookup(&self, hit: bool) {
        let result = if hit { "hit" } else { "miss" };
        self.cache_lookups.with_label_values(&[result]).inc();
    }

    pub fn set_cache_entries(&self, count: usize) {
        self.cache_entries.set(count as i64);
    }

    pub fn record_store_operation(&self, operation: &str, outcome: &str) {
        self.store_operations.with_label_values(&[operation, outcome]).inc();
    }

    pub fn record_retry(&self, operation: &str) {
        self.retry_attempts.with_label_values(&[operation]).inc();
    }

    pub fn record_dead_letter(&self, reason: &str) {
        self.dead_letters.with_label_values(&[reason]).inc();
    }

    /// Prometheus text exposition of everything registered
    pub fn encode(&self) -> anyhow::Result<Vec<u8>> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(buffer)
    }
}
