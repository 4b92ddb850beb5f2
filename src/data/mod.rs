//! Data layer module
//!
//! Handles persistence of cached status records:
//! - SQLite record store (single serialized connection)
//! - Payload codec (record <-> JSON blob)

mod codec;
mod models;
mod store;

pub use codec::JsonCodec;
pub use models::*;
pub use store::{AtomicScope, BUNDLED_SCHEMA, Store};
