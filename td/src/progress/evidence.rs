//! `ProgressTracker` - evidence-based stuck detection.
//!
//! Distinct from [`super::strategy::ProgressStrategy`]: this tracker never
//! renders prompt text, it only decides whether a run is making progress.
//! Modeled the same way `SystemCapturedProgress` manages a bounded window,
//! but over evidence signals rather than validation transcripts.

use std::collections::VecDeque;

use tracing::{debug, warn};

/// Default size of the recent-tool-names / output-size sliding window.
const DEFAULT_WINDOW: usize = 3;

/// Default number of consecutive non-progress iterations before a run is
/// considered stuck.
const DEFAULT_STUCK_THRESHOLD: u32 = 3;

/// Per-iteration input to [`ProgressTracker::record`].
#[derive(Debug, Clone)]
pub struct ProgressInput {
    pub tool_name: String,
    pub output_size: usize,
    pub evidence_delta: i64,
    pub failed_tools_this_iteration: u32,
    pub search_signal_hits: u32,
    /// Whether a new file appeared in any tracked file set this iteration.
    pub new_file_appeared: bool,
}

/// Sliding-window tracker of evidence delta, repeated tool signatures, and
/// iterations-since-progress; classifies a run as stuck.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    window: usize,
    stuck_threshold: u32,
    recent_tool_names: VecDeque<String>,
    recent_output_sizes: VecDeque<usize>,
    iterations_since_progress: u32,
    last_progress_iteration: u32,
    failure_counter: u32,
    evidence_score: i64,
    cumulative_search_signal_hits: u32,
    current_iteration: u32,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::with_config(DEFAULT_WINDOW, DEFAULT_STUCK_THRESHOLD)
    }

    pub fn with_config(window: usize, stuck_threshold: u32) -> Self {
        Self {
            window,
            stuck_threshold,
            recent_tool_names: VecDeque::with_capacity(window),
            recent_output_sizes: VecDeque::with_capacity(window),
            iterations_since_progress: 0,
            last_progress_iteration: 0,
            failure_counter: 0,
            evidence_score: 0,
            cumulative_search_signal_hits: 0,
            current_iteration: 0,
        }
    }

    /// Record one iteration's signals, returning whether a progress event
    /// fired.
    pub fn record(&mut self, input: &ProgressInput) -> bool {
        self.current_iteration += 1;
        self.failure_counter += input.failed_tools_this_iteration;
        self.evidence_score += input.evidence_delta;

        push_bounded(&mut self.recent_tool_names, input.tool_name.clone(), self.window);
        push_bounded(&mut self.recent_output_sizes, input.output_size, self.window);

        let search_signal_increased = input.search_signal_hits > 0;
        self.cumulative_search_signal_hits += input.search_signal_hits;

        let progressed = input.evidence_delta > 0 || search_signal_increased || input.new_file_appeared;

        if progressed {
            self.iterations_since_progress = 0;
            self.last_progress_iteration = self.current_iteration;
            debug!(iteration = self.current_iteration, "ProgressTracker: progress event");
        } else {
            self.iterations_since_progress += 1;
            debug!(
                iteration = self.current_iteration,
                iterations_since_progress = self.iterations_since_progress,
                "ProgressTracker: no progress this iteration"
            );
        }

        progressed
    }

    pub fn iterations_since_progress(&self) -> u32 {
        self.iterations_since_progress
    }

    pub fn last_progress_iteration(&self) -> u32 {
        self.last_progress_iteration
    }

    pub fn evidence_score(&self) -> i64 {
        self.evidence_score
    }

    pub fn failure_counter(&self) -> u32 {
        self.failure_counter
    }

    pub fn current_iteration(&self) -> u32 {
        self.current_iteration
    }

    /// Classify the run as stuck: the last `stuck_threshold` tool calls are
    /// identical, or progress hasn't fired in `stuck_threshold` iterations.
    pub fn is_stuck(&self) -> bool {
        let repeated = self.recent_tool_names.len() as u32 >= self.stuck_threshold
            && self
                .recent_tool_names
                .iter()
                .rev()
                .take(self.stuck_threshold as usize)
                .all(|name| name == self.recent_tool_names.back().unwrap());

        let stalled = self.iterations_since_progress >= self.stuck_threshold;

        if repeated || stalled {
            warn!(repeated, stalled, "ProgressTracker: run classified as stuck");
        }

        repeated || stalled
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn push_bounded<T>(deque: &mut VecDeque<T>, value: T, cap: usize) {
    if deque.len() >= cap {
        deque.pop_front();
    }
    deque.push_back(value);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(evidence_delta: i64) -> ProgressInput {
        ProgressInput {
            tool_name: "grep".to_string(),
            output_size: 10,
            evidence_delta,
            failed_tools_this_iteration: 0,
            search_signal_hits: 0,
            new_file_appeared: false,
        }
    }

    #[test]
    fn progress_event_resets_iterations_since_progress() {
        let mut tracker = ProgressTracker::new();
        tracker.record(&input(0));
        tracker.record(&input(0));
        assert_eq!(tracker.iterations_since_progress(), 2);

        tracker.record(&input(5));
        assert_eq!(tracker.iterations_since_progress(), 0);
        assert_eq!(tracker.last_progress_iteration(), 3);
    }

    #[test]
    fn new_file_counts_as_progress_even_without_evidence_delta() {
        let mut tracker = ProgressTracker::new();
        let mut i = input(0);
        i.new_file_appeared = true;
        assert!(tracker.record(&i));
        assert_eq!(tracker.iterations_since_progress(), 0);
    }

    #[test]
    fn search_signal_hits_count_as_progress() {
        let mut tracker = ProgressTracker::new();
        let mut i = input(0);
        i.search_signal_hits = 1;
        assert!(tracker.record(&i));
    }

    #[test]
    fn stuck_after_threshold_identical_tool_calls() {
        let mut tracker = ProgressTracker::with_config(3, 3);
        for _ in 0..3 {
            tracker.record(&ProgressInput {
                tool_name: "bash".to_string(),
                output_size: 1,
                evidence_delta: 1, // progress keeps firing, but tool repeats
                failed_tools_this_iteration: 0,
                search_signal_hits: 0,
                new_file_appeared: false,
            });
        }
        assert!(tracker.is_stuck());
    }

    #[test]
    fn stuck_after_threshold_iterations_without_progress() {
        let mut tracker = ProgressTracker::with_config(3, 3);
        tracker.record(&input(0));
        tracker.record(&input(0));
        assert!(!tracker.is_stuck());
        tracker.record(&input(0));
        assert!(tracker.is_stuck());
    }

    #[test]
    fn not_stuck_when_tool_names_vary_and_progress_continues() {
        let mut tracker = ProgressTracker::with_config(3, 3);
        tracker.record(&ProgressInput {
            tool_name: "read".to_string(),
            ..input(1)
        });
        tracker.record(&ProgressInput {
            tool_name: "grep".to_string(),
            ..input(1)
        });
        tracker.record(&ProgressInput {
            tool_name: "edit".to_string(),
            ..input(1)
        });
        assert!(!tracker.is_stuck());
    }

    #[test]
    fn failure_counter_accumulates() {
        let mut tracker = ProgressTracker::new();
        tracker.record(&ProgressInput {
            failed_tools_this_iteration: 2,
            ..input(0)
        });
        tracker.record(&ProgressInput {
            failed_tools_this_iteration: 1,
            ..input(0)
        });
        assert_eq!(tracker.failure_counter(), 3);
    }
}
