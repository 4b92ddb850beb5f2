//! Upsert writer
//!
//! Persists a batch of fetched records for one owner, all or nothing.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;

use crate::data::{JsonCodec, Record, SqlValue, Store, format_timestamp};
use crate::error::Result;
use crate::metrics::{BATCHES_ROLLED_BACK_TOTAL, RECORDS_SKIPPED_TOTAL, RECORDS_WRITTEN_TOTAL};

const UPSERT_STATUS_SQL: &str = "INSERT OR REPLACE INTO T_Status (status_id, owner_id, payload, created_at) VALUES (?, ?, ?, ?)";

/// Outcome of a committed batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    /// Distinct rows inserted or replaced
    pub written: usize,
    /// Records replaced by a later record with the same identifier in the batch
    pub superseded: usize,
    /// Records without a usable identifier
    pub skipped_missing_id: usize,
    /// Records the codec refused
    pub skipped_unencodable: usize,
}

impl UpsertSummary {
    pub fn skipped(&self) -> usize {
        self.skipped_missing_id + self.skipped_unencodable
    }
}

struct PreparedRow {
    status_id: String,
    payload: Vec<u8>,
}

/// Upsert writer
pub struct UpsertWriter {
    store: Arc<Store>,
    codec: JsonCodec,
    id_key: String,
}

impl UpsertWriter {
    /// Create new upsert writer
    ///
    /// # Arguments
    /// * `id_key` - Record field holding the decimal status identifier
    pub fn new(store: Arc<Store>, codec: JsonCodec, id_key: impl Into<String>) -> Self {
        Self {
            store,
            codec,
            id_key: id_key.into(),
        }
    }

    /// Insert or replace every usable record in `records` under `owner_id`
    ///
    /// Records without an identifier or that fail to encode are skipped
    /// and counted. Everything else is written in one transaction; if any
    /// write fails, none of the batch is kept.
    ///
    /// # Errors
    /// Returns `CacheError::Storage` if the batch was rolled back
    pub async fn upsert_batch(&self, owner_id: &str, records: &[Record]) -> Result<UpsertSummary> {
        self.upsert_batch_at(owner_id, records, Utc::now()).await
    }

    /// Same as [`upsert_batch`](Self::upsert_batch), stamping rows with `written_at`
    pub async fn upsert_batch_at(
        &self,
        owner_id: &str,
        records: &[Record],
        written_at: DateTime<Utc>,
    ) -> Result<UpsertSummary> {
        let mut summary = UpsertSummary::default();
        let mut prepared = Vec::with_capacity(records.len());

        for record in records {
            let Some(status_id) = extract_status_id(record, &self.id_key) else {
                summary.skipped_missing_id += 1;
                RECORDS_SKIPPED_TOTAL.with_label_values(&["missing_id"]).inc();
                tracing::debug!(owner_id, id_key = %self.id_key, "Skipping record without identifier");
                continue;
            };

            match self.codec.encode(record) {
                Ok(payload) => prepared.push(PreparedRow {
                    status_id: status_id.to_string(),
                    payload,
                }),
                Err(error) => {
                    summary.skipped_unencodable += 1;
                    RECORDS_SKIPPED_TOTAL.with_label_values(&["encode"]).inc();
                    tracing::warn!(owner_id, status_id, %error, "Skipping unencodable record");
                }
            }
        }

        // Last occurrence of an identifier wins, as it would on disk
        let mut seen = HashSet::with_capacity(prepared.len());
        let before = prepared.len();
        prepared.reverse();
        prepared.retain(|row| seen.insert(row.status_id.clone()));
        prepared.reverse();
        summary.superseded = before - prepared.len();

        if prepared.is_empty() {
            return Ok(summary);
        }

        let owner = owner_id.to_string();
        let created_at = format_timestamp(written_at);
        let result = self
            .store
            .run_atomic(move |scope| {
                Box::pin(async move {
                    let mut written = 0;
                    for row in prepared {
                        let args = [
                            SqlValue::Text(row.status_id),
                            SqlValue::Text(owner.clone()),
                            SqlValue::Blob(row.payload),
                            SqlValue::Text(created_at.clone()),
                        ];
                        scope.execute(UPSERT_STATUS_SQL, &args).await?;
                        written += 1;
                    }
                    Ok(written)
                })
            })
            .await;

        match result {
            Ok(written) => {
                summary.written = written;
                RECORDS_WRITTEN_TOTAL.inc_by(written as u64);
                tracing::debug!(
                    owner_id,
                    written,
                    superseded = summary.superseded,
                    skipped = summary.skipped(),
                    "Status batch committed"
                );
                Ok(summary)
            }
            Err(error) => {
                BATCHES_ROLLED_BACK_TOTAL.inc();
                tracing::warn!(owner_id, %error, "Status batch rolled back");
                Err(error)
            }
        }
    }
}

/// Numeric status identifier of a record, if it carries a usable one
///
/// The field must be a string of ASCII digits naming a positive `i64`.
pub fn extract_status_id(record: &Record, id_key: &str) -> Option<i64> {
    let raw = record.get(id_key)?.as_str()?;
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse::<i64>().ok().filter(|id| *id > 0)
}
