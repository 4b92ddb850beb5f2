//! Retention sweeper
//!
//! Deletes cached rows older than the configured age. Deleting rows does
//! not shrink the database file; SQLite reuses the freed pages.

use chrono::{DateTime, TimeDelta, Utc};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;

use crate::data::{Store, format_timestamp};
use crate::error::Result;
use crate::metrics::ROWS_SWEPT_TOTAL;

const DELETE_EXPIRED_SQL: &str = "DELETE FROM T_Status WHERE created_at < ?";

/// Hook fired when the host application moves to the background
///
/// Wiring this to a platform lifecycle event is up to the host.
pub trait BackgroundHook: Send + Sync {
    /// Returns the number of rows removed
    fn on_background(&self) -> BoxFuture<'_, Result<u64>>;
}

/// Retention sweeper
pub struct RetentionSweeper {
    store: Arc<Store>,
    max_age: Duration,
}

impl RetentionSweeper {
    /// Create new sweeper removing rows older than `max_age`
    pub fn new(store: Arc<Store>, max_age: Duration) -> Self {
        Self { store, max_age }
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Oldest `created_at` that survives a sweep run at `now`
    pub fn threshold(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        TimeDelta::from_std(self.max_age)
            .ok()
            .and_then(|age| now.checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Delete every row, across all owners, older than the configured age
    pub async fn sweep(&self) -> Result<u64> {
        self.sweep_older_than(self.threshold(Utc::now())).await
    }

    /// Delete every row created before `threshold`
    pub async fn sweep_older_than(&self, threshold: DateTime<Utc>) -> Result<u64> {
        let threshold = format_timestamp(threshold);
        let deleted = self
            .store
            .execute(DELETE_EXPIRED_SQL, &[threshold.as_str().into()])
            .await?;

        ROWS_SWEPT_TOTAL.inc_by(deleted);
        tracing::info!(deleted, threshold = %threshold, "Status cache swept");

        Ok(deleted)
    }
}

impl BackgroundHook for RetentionSweeper {
    fn on_background(&self) -> BoxFuture<'_, Result<u64>> {
        Box::pin(self.sweep())
    }
}
