//! statuscache - A durable, owner-partitioned cache for paginated status feeds
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       StatusCache                            │
//! │  - upsert_batch / load_page / sweep / on_background         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Service Layer                            │
//! │  - UpsertWriter (all-or-nothing batches)                    │
//! │  - CursorReader (since_id / max_id pages)                   │
//! │  - RetentionSweeper (age-based eviction)                    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Data Layer                              │
//! │  - SQLite store over one serialized connection (sqlx)       │
//! │  - JSON payload codec                                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `data`: Record store, payload codec, row models
//! - `service`: Writer, reader and sweeper
//! - `config`: Configuration management
//! - `metrics`: Prometheus instruments
//! - `error`: Error types

pub mod config;
pub mod data;
pub mod error;
pub mod metrics;
pub mod service;

use std::sync::Arc;

pub use data::Record;
pub use error::{CacheError, Result};
pub use service::{BackgroundHook, Page, PageCursor, UpsertSummary};

/// Composition root owning the store and every component that uses it
///
/// Cheap to clone; clones share the same store.
#[derive(Clone)]
pub struct StatusCache {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Record store (single serialized connection)
    pub store: Arc<data::Store>,

    /// Batch upsert path
    pub writer: Arc<service::UpsertWriter>,

    /// Page read path
    pub reader: Arc<service::CursorReader>,

    /// Age-based eviction
    pub sweeper: Arc<service::RetentionSweeper>,
}

impl StatusCache {
    /// Open the store described by `config` and wire up the services
    ///
    /// # Errors
    /// Returns error if the configuration is invalid or the store cannot be opened
    pub async fn open(config: config::AppConfig) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(data::Store::open(&config.database).await?);
        let codec = data::JsonCodec::new(config.cache.max_payload_bytes);

        let writer = service::UpsertWriter::new(
            store.clone(),
            codec.clone(),
            config.cache.id_key.clone(),
        );
        let reader = service::CursorReader::new(store.clone(), codec, config.cache.page_size);
        let sweeper = service::RetentionSweeper::new(store.clone(), config.retention.max_age());

        Ok(Self {
            config: Arc::new(config),
            store,
            writer: Arc::new(writer),
            reader: Arc::new(reader),
            sweeper: Arc::new(sweeper),
        })
    }

    /// Persist `records` for `owner_id`, all or nothing
    pub async fn upsert_batch(&self, owner_id: &str, records: &[Record]) -> Result<UpsertSummary> {
        self.writer.upsert_batch(owner_id, records).await
    }

    /// Load a page for `owner_id`; pass 0 for an unused bound
    pub async fn load_page(&self, owner_id: &str, since_id: i64, max_id: i64) -> Result<Page> {
        self.reader.load_page(owner_id, since_id, max_id).await
    }

    /// Remove rows older than the configured retention age
    pub async fn sweep(&self) -> Result<u64> {
        self.sweeper.sweep().await
    }

    /// Entry point for the host's "entered background" signal
    pub async fn on_background(&self) -> Result<u64> {
        self.sweeper.on_background().await
    }

    /// Close the store once queued work has drained
    pub async fn close(&self) {
        self.store.close().await;
    }
}
