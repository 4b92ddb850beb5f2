//! Prometheus metrics registry and instruments.
//!
//! Instruments are updated unconditionally; they only become visible
//! through [`gather`] once [`init_metrics`] has registered them.

use std::sync::Once;
use std::time::Instant;

use anyhow::Context;
use lazy_static::lazy_static;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};

use crate::error::Result;

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Write path
    pub static ref RECORDS_WRITTEN_TOTAL: IntCounter = IntCounter::new(
        "statuscache_records_written_total",
        "Total number of status records committed"
    ).expect("metric can be created");
    pub static ref RECORDS_SKIPPED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("statuscache_records_skipped_total", "Total number of records skipped on write"),
        &["reason"]
    ).expect("metric can be created");
    pub static ref BATCHES_ROLLED_BACK_TOTAL: IntCounter = IntCounter::new(
        "statuscache_batches_rolled_back_total",
        "Total number of upsert batches rolled back"
    ).expect("metric can be created");

    // Read path
    pub static ref PAGES_SERVED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("statuscache_pages_served_total", "Total number of pages served"),
        &["direction"]
    ).expect("metric can be created");
    pub static ref ROWS_DROPPED_TOTAL: IntCounter = IntCounter::new(
        "statuscache_rows_dropped_total",
        "Total number of rows omitted from pages because the payload did not decode"
    ).expect("metric can be created");

    // Retention
    pub static ref ROWS_SWEPT_TOTAL: IntCounter = IntCounter::new(
        "statuscache_rows_swept_total",
        "Total number of rows deleted by retention sweeps"
    ).expect("metric can be created");

    // Store
    pub static ref STORE_OPERATION_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "statuscache_store_operation_duration_seconds",
            "Store operation duration in seconds"
        ).buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        &["operation"]
    ).expect("metric can be created");
}

static INIT: Once = Once::new();

/// Initialize metrics registry.
pub fn init_metrics() {
    INIT.call_once(|| {
        REGISTRY
            .register(Box::new(RECORDS_WRITTEN_TOTAL.clone()))
            .expect("RECORDS_WRITTEN_TOTAL can be registered");
        REGISTRY
            .register(Box::new(RECORDS_SKIPPED_TOTAL.clone()))
            .expect("RECORDS_SKIPPED_TOTAL can be registered");
        REGISTRY
            .register(Box::new(BATCHES_ROLLED_BACK_TOTAL.clone()))
            .expect("BATCHES_ROLLED_BACK_TOTAL can be registered");
        REGISTRY
            .register(Box::new(PAGES_SERVED_TOTAL.clone()))
            .expect("PAGES_SERVED_TOTAL can be registered");
        REGISTRY
            .register(Box::new(ROWS_DROPPED_TOTAL.clone()))
            .expect("ROWS_DROPPED_TOTAL can be registered");
        REGISTRY
            .register(Box::new(ROWS_SWEPT_TOTAL.clone()))
            .expect("ROWS_SWEPT_TOTAL can be registered");
        REGISTRY
            .register(Box::new(STORE_OPERATION_DURATION_SECONDS.clone()))
            .expect("STORE_OPERATION_DURATION_SECONDS can be registered");

        tracing::info!("Metrics registry initialized");
    });
}

/// Render every registered metric in the Prometheus text format.
///
/// # Errors
/// Returns `CacheError::Internal` if the registry cannot be encoded
pub fn gather() -> Result<String> {
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&REGISTRY.gather(), &mut buffer)
        .map_err(|e| anyhow::anyhow!("encoding metrics registry: {e}"))?;
    let text = String::from_utf8(buffer).context("metrics text is not UTF-8")?;
    Ok(text)
}

/// Record how long a store operation took.
pub fn observe_store_operation(operation: &str, started: Instant) {
    STORE_OPERATION_DURATION_SECONDS
        .with_label_values(&[operation])
        .observe(started.elapsed().as_secs_f64());
}
