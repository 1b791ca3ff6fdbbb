//! TaskStore - generic persistent record storage with JSONL logs and
//! rebuildable in-memory indexes.
//!
//! A collection is an append-only JSONL file (the system of record) plus an
//! in-memory index rebuilt from it on demand. Writers append one line per
//! save; readers resolve the latest line per id to reconstruct current
//! state.
//!
//! # Layout
//!
//! ```text
//! <base>/
//! └── <collection>.jsonl
//! ```

mod record;
mod store;

pub use record::{Filter, FilterOp, IndexValue, Record};
pub use store::Store;

/// Current Unix timestamp in milliseconds.
pub fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as i64
}
