pub mod cache;
pub mod config;
pub mod errors;
pub mod http;
pub mod ingest;
pub mod messaging;
pub mod metrics;
pub mod models;
pub mod service;
pub mod store;
pub mod utils;
