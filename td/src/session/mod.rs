//! Event sourcing and conversation projection.
//!
//! Every run-facing component emits `Event`s onto an `EventBus`. A
//! `SessionStore` (itself an `EventSink`) durably appends them to
//! `events.ndjson` and folds them through a `TurnAssembler` into a
//! `turns.json` snapshot — the conversational view a caller actually wants
//! to read back. `summarize` tiers that view into recent/mid-term/old
//! buckets for long-running sessions.

mod assembler;
mod bus;
mod event;
mod store;
mod summarize;
mod turn;

pub use assembler::{rebuild_from_events, TurnAssembler};
pub use bus::{EventBus, EventSink, NullSink, RecordingSink, TracingSink};
pub use event::{Event, EventType};
pub use store::SessionStore;
pub use summarize::{HistoryEntry, HistorySummarizer, MID_TERM_MAX_CHARS, OLD_MAX_CHARS, RECENT_COUNT};
pub use turn::{Step, Turn, TurnStatus, TurnType, ToolUseStatus};
