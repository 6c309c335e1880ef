//! The ordered judgment set the pipeline reads from.
//!
//! Rows are always ordered by `(query_id, doc_id)`; offsets and windows refer
//! to positions in that order.

use crate::model::QrelRow;

pub mod memory;
pub mod sqlite;

pub use memory::MemoryQrels;
pub use sqlite::SqliteQrels;

pub trait QrelSource: Send + Sync {
    /// Number of judged pairs with both a query and a document text.
    fn count(&self) -> anyhow::Result<u64>;
    /// Up to `limit` rows starting at zero-based `offset`.
    fn fetch(&self, offset: u64, limit: u64) -> anyhow::Result<Vec<QrelRow>>;
    /// Human-readable source description recorded on the run.
    fn describe(&self) -> String;
}
