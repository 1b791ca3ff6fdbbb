//! Iteration budget: clamp, extend.

use tracing::debug;

/// Minimum iteration budget a run is ever granted, regardless of hint.
const MIN_ITERATIONS: u32 = 6;

/// Extension multiplier applied to `max_iterations` to get the hard cap a
/// budget may grow to via [`IterationBudget::try_extend`].
const EXTENSION_CAP_RATIO: f64 = 1.5;

/// Tracks the live iteration budget for one run: an initial value clamped
/// into `[6, max_iterations]`, extendable one iteration at a time up to
/// `max_iterations * 1.5`.
#[derive(Debug, Clone, Copy)]
pub struct IterationBudget {
    current: u32,
    max_iterations: u32,
}

impl IterationBudget {
    pub fn new(task_hint: Option<u32>, max_iterations: u32) -> Self {
        let initial = clamp(task_hint.unwrap_or(max_iterations), max_iterations);
        debug!(initial, max_iterations, "IterationBudget::new");
        Self {
            current: initial,
            max_iterations,
        }
    }

    pub fn current(&self) -> u32 {
        self.current
    }

    pub fn hard_cap(&self) -> u32 {
        self.max_iterations
    }

    fn extension_cap(&self) -> u32 {
        ((self.max_iterations as f64) * EXTENSION_CAP_RATIO).ceil() as u32
    }

    /// Grow the budget by one iteration, if it hasn't hit the extension
    /// cap yet. Returns whether it actually grew.
    pub fn try_extend(&mut self) -> bool {
        let cap = self.extension_cap();
        if self.current >= cap {
            return false;
        }
        self.current += 1;
        debug!(new_current = self.current, cap, "IterationBudget::try_extend");
        true
    }
}

/// Clamp a requested iteration budget into `[MIN_ITERATIONS, max_iterations]`.
pub fn clamp(requested: u32, max_iterations: u32) -> u32 {
    requested.clamp(MIN_ITERATIONS.min(max_iterations), max_iterations)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_low_hint_up_to_minimum() {
        assert_eq!(clamp(1, 25), MIN_ITERATIONS);
    }

    #[test]
    fn clamps_high_hint_down_to_max() {
        assert_eq!(clamp(100, 25), 25);
    }

    #[test]
    fn defaults_to_max_when_no_hint() {
        let budget = IterationBudget::new(None, 25);
        assert_eq!(budget.current(), 25);
    }

    #[test]
    fn extends_up_to_one_point_five_x_cap() {
        let mut budget = IterationBudget::new(Some(25), 25);
        assert_eq!(budget.extension_cap(), 38);
        for _ in 0..13 {
            assert!(budget.try_extend());
        }
        assert_eq!(budget.current(), 38);
        assert!(!budget.try_extend());
    }

    #[test]
    fn small_max_still_respects_minimum() {
        assert_eq!(clamp(10, 3), 3);
    }
}
