//! Cursor reader
//!
//! Serves owner-scoped pages of cached records, newest first, bounded
//! by `since_id` / `max_id` cursors.

use std::sync::Arc;

use crate::data::{JsonCodec, Record, SqlValue, Store};
use crate::error::Result;
use crate::metrics::{PAGES_SERVED_TOTAL, ROWS_DROPPED_TOTAL};

/// Default page size
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Which slice of an owner's records to read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageCursor {
    /// Most recent records
    Latest,
    /// Records with an identifier greater than this one (pull to refresh)
    Newer(i64),
    /// Records with an identifier less than this one (load more)
    Older(i64),
}

impl PageCursor {
    /// Build a cursor from raw `since_id` / `max_id` bounds
    ///
    /// Non-positive bounds are ignored; `since_id` wins when both are set.
    pub fn from_bounds(since_id: i64, max_id: i64) -> Self {
        if since_id > 0 {
            PageCursor::Newer(since_id)
        } else if max_id > 0 {
            PageCursor::Older(max_id)
        } else {
            PageCursor::Latest
        }
    }

    fn direction(&self) -> &'static str {
        match self {
            PageCursor::Latest => "latest",
            PageCursor::Newer(_) => "newer",
            PageCursor::Older(_) => "older",
        }
    }
}

/// One page of decoded records
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    /// Records ordered by identifier, descending
    pub records: Vec<Record>,
    /// Matched rows left out because their payload did not decode
    pub dropped: usize,
}

impl Page {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Cursor reader
pub struct CursorReader {
    store: Arc<Store>,
    codec: JsonCodec,
    page_size: usize,
}

impl CursorReader {
    /// Create new cursor reader
    pub fn new(store: Arc<Store>, codec: JsonCodec, page_size: usize) -> Self {
        Self {
            store,
            codec,
            page_size,
        }
    }

    /// Load a page for `owner_id`
    ///
    /// # Arguments
    /// * `since_id` - Return records newer than this ID (ignored if <= 0)
    /// * `max_id` - Return records older than this ID (ignored if <= 0 or
    ///   when `since_id` is set)
    pub async fn load_page(&self, owner_id: &str, since_id: i64, max_id: i64) -> Result<Page> {
        self.load(owner_id, PageCursor::from_bounds(since_id, max_id))
            .await
    }

    /// Load the page selected by `cursor`
    pub async fn load(&self, owner_id: &str, cursor: PageCursor) -> Result<Page> {
        let (sql, args) = page_query(owner_id, cursor, self.page_size);
        let rows = self.store.query(&sql, &args).await?;

        let mut page = Page::default();
        for row in rows {
            let decoded = row
                .get_bytes("payload")
                .map(|bytes| self.codec.decode(bytes));

            match decoded {
                Some(Ok(record)) => page.records.push(record),
                Some(Err(error)) => {
                    page.dropped += 1;
                    tracing::warn!(
                        owner_id,
                        status_id = row.get_str("status_id").unwrap_or_default(),
                        %error,
                        "Dropping undecodable row"
                    );
                }
                None => {
                    page.dropped += 1;
                    tracing::warn!(
                        owner_id,
                        status_id = row.get_str("status_id").unwrap_or_default(),
                        "Dropping row without payload"
                    );
                }
            }
        }

        PAGES_SERVED_TOTAL
            .with_label_values(&[cursor.direction()])
            .inc();
        if page.dropped > 0 {
            ROWS_DROPPED_TOTAL.inc_by(page.dropped as u64);
        }

        Ok(page)
    }
}

/// SQL and bind arguments for one page
///
/// Identifiers are stored as text but compared and ordered as integers.
fn page_query(owner_id: &str, cursor: PageCursor, limit: usize) -> (String, Vec<SqlValue>) {
    let mut sql = String::from("SELECT status_id, owner_id, payload FROM T_Status WHERE owner_id = ?");
    let mut args = vec![SqlValue::from(owner_id)];

    match cursor {
        PageCursor::Latest => {}
        PageCursor::Newer(since_id) => {
            sql.push_str(" AND CAST(status_id AS INTEGER) > ?");
            args.push(SqlValue::Integer(since_id));
        }
        PageCursor::Older(max_id) => {
            sql.push_str(" AND CAST(status_id AS INTEGER) < ?");
            args.push(SqlValue::Integer(max_id));
        }
    }

    sql.push_str(" ORDER BY CAST(status_id AS INTEGER) DESC LIMIT ?");
    args.push(SqlValue::Integer(limit as i64));

    (sql, args)
}
