//! Tool-result cache / loop detector
//!
//! Detects a run stuck repeating the same tool call by hashing a
//! canonical form of each call's `(name, input)` pair and watching for
//! `loop_window` consecutive identical signatures.

use std::collections::VecDeque;
use std::hash::{Hash, Hasher};

use serde_json::Value;
use tracing::{debug, warn};

/// A canonicalized, hashable signature for one tool call
///
/// Canonicalization: the input `Value` is recursively re-built with object
/// keys in sorted order (so `{"b":1,"a":2}` and `{"a":2,"b":1}` collide),
/// then hashed structurally rather than as a re-serialized string (so
/// insignificant whitespace never matters, since we never go back through
/// a string at all).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ToolCallSignature {
    pub tool_name: String,
    input_hash: u64,
}

impl ToolCallSignature {
    pub fn new(tool_name: impl Into<String>, input: &Value) -> Self {
        let canonical = canonicalize(input);
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        canonical.hash(&mut hasher);
        Self {
            tool_name: tool_name.into(),
            input_hash: hasher.finish(),
        }
    }
}

/// A canonical, order-independent representation of a JSON value used only
/// for hashing (never serialized back to text).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Canonical {
    Null,
    Bool(bool),
    Number(String),
    String(String),
    Array(Vec<Canonical>),
    // Sorted by key so object key order never affects the hash.
    Object(Vec<(String, Canonical)>),
}

fn canonicalize(value: &Value) -> Canonical {
    match value {
        Value::Null => Canonical::Null,
        Value::Bool(b) => Canonical::Bool(*b),
        Value::Number(n) => Canonical::Number(n.to_string()),
        Value::String(s) => Canonical::String(s.clone()),
        Value::Array(items) => Canonical::Array(items.iter().map(canonicalize).collect()),
        Value::Object(map) => {
            let mut entries: Vec<(String, Canonical)> =
                map.iter().map(|(k, v)| (k.clone(), canonicalize(v))).collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Canonical::Object(entries)
        }
    }
}

/// Default window: three identical signatures in a row trips the detector.
pub const DEFAULT_LOOP_WINDOW: usize = 3;

/// Records recent tool-call signatures for one run and detects repetition.
#[derive(Debug, Clone)]
pub struct LoopDetector {
    window: VecDeque<ToolCallSignature>,
    loop_window: usize,
}

impl LoopDetector {
    pub fn new(loop_window: usize) -> Self {
        debug!(loop_window, "LoopDetector::new");
        Self {
            window: VecDeque::with_capacity(loop_window),
            loop_window: loop_window.max(1),
        }
    }

    /// Record one iteration's tool calls and report whether the run is now
    /// stuck in a loop.
    ///
    /// A loop is only ever detected on a single repeated call per iteration;
    /// an iteration with multiple distinct tool calls resets the window
    /// (it cannot be a signature-identical repeat of the prior iteration).
    pub fn record_iteration(&mut self, calls: &[(String, Value)]) -> bool {
        let signature = match calls {
            [single] => ToolCallSignature::new(single.0.clone(), &single.1),
            _ => {
                self.window.clear();
                return false;
            }
        };

        self.window.push_back(signature);
        while self.window.len() > self.loop_window {
            self.window.pop_front();
        }

        let detected = self.window.len() == self.loop_window && self.window.iter().all(|s| *s == self.window[0]);
        if detected {
            warn!(
                loop_window = self.loop_window,
                tool = %self.window[0].tool_name,
                "LoopDetector: loop detected"
            );
        }
        detected
    }

    pub fn reset(&mut self) {
        self.window.clear();
    }
}

impl Default for LoopDetector {
    fn default() -> Self {
        Self::new(DEFAULT_LOOP_WINDOW)
    }
}
