//! Progress tracking.
//!
//! Two distinct concerns live here. `ProgressStrategy`/`SystemCapturedProgress`
//! render what happened in previous iterations back into the next prompt
//! (needed because each outer Ralph iteration starts with a fresh LLM
//! context window). `ProgressTracker` and `SearchSignalTracker` are an
//! unrelated internal concern: deciding, from evidence deltas and tool-call
//! repetition, whether a run is stuck.

mod evidence;
mod search_signal;
mod strategy;
mod system_captured;

pub use evidence::{ProgressInput, ProgressTracker};
pub use search_signal::{SearchSignal, SearchSignalTracker};
pub use strategy::{IterationContext, ProgressStrategy};
pub use system_captured::SystemCapturedProgress;
