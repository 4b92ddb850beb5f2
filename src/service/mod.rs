//! Service layer
//!
//! The write, read and eviction paths over the record store.

mod reader;
mod retention;
mod writer;

pub use reader::{CursorReader, DEFAULT_PAGE_SIZE, Page, PageCursor};
pub use retention::{BackgroundHook, RetentionSweeper};
pub use writer::{UpsertSummary, UpsertWriter, extract_status_id};
