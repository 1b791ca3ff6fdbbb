//! Budget controller
//!
//! Arbitrates the three coupled scalars that bound a run: the iteration
//! budget, the token budget policy, and (via [`crate::tier`]) the model
//! tier. The iteration and token pieces live here; tier escalation is a
//! separate concern (see `crate::tier` and `crate::agent`).

mod iteration;
mod token;

pub use iteration::IterationBudget;
pub use token::{TokenBudgetPolicy, TokenEnforcement};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Errors raised while resolving or enforcing a budget.
#[derive(Debug, Error)]
pub enum BudgetError {
    #[error("hard token limit reached ({used}/{max} tokens) with forced synthesis disabled")]
    HardTokenLimit { used: u64, max: u64 },
}

/// Static configuration for the budget controller, as loaded from
/// [`crate::config::Config`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Hard ceiling on iterations for any run (`maxIterations`)
    pub max_iterations: u32,
    /// Optional per-task override, clamped into `[6, max_iterations]`
    pub task_iteration_hint: Option<u32>,
    /// Token budget policy; `None` disables enforcement entirely
    pub token_budget: Option<TokenBudgetPolicy>,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_iterations: 25,
            task_iteration_hint: None,
            token_budget: None,
        }
    }
}

/// The resolved, mutable budget state owned by one run.
#[derive(Debug, Clone)]
pub struct BudgetController {
    iterations: IterationBudget,
    tokens: Option<TokenBudgetPolicy>,
    tokens_used: u64,
}

impl BudgetController {
    /// Resolve a budget controller once at run start.
    pub fn new(config: &BudgetConfig) -> Self {
        debug!(?config.max_iterations, "BudgetController::new");
        Self {
            iterations: IterationBudget::new(config.task_iteration_hint, config.max_iterations),
            tokens: config.token_budget.clone(),
            tokens_used: 0,
        }
    }

    pub fn iteration_budget(&self) -> u32 {
        self.iterations.current()
    }

    pub fn max_iterations(&self) -> u32 {
        self.iterations.hard_cap()
    }

    /// Record newly consumed tokens; the counter is monotonically
    /// non-decreasing for the lifetime of the run.
    pub fn record_tokens(&mut self, delta: u64) {
        self.tokens_used = self.tokens_used.saturating_add(delta);
    }

    pub fn tokens_used(&self) -> u64 {
        self.tokens_used
    }

    /// May the iteration budget be extended after this iteration?
    ///
    /// Extension requires: the policy allows it, progress was just made
    /// (`iterations_since_progress == 0`), and the budget has not yet hit
    /// its `1.5x` cap.
    pub fn maybe_extend(&mut self, iterations_since_progress: u32, extension_allowed: bool) -> bool {
        if !extension_allowed || iterations_since_progress != 0 {
            return false;
        }
        self.iterations.try_extend()
    }

    /// Evaluate token-budget enforcement for the current usage.
    pub fn token_enforcement(&self) -> TokenEnforcement {
        match &self.tokens {
            None => TokenEnforcement::Disabled,
            Some(policy) => policy.enforcement_for(self.tokens_used),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_when_no_policy() {
        let controller = BudgetController::new(&BudgetConfig::default());
        assert!(matches!(controller.token_enforcement(), TokenEnforcement::Disabled));
    }

    #[test]
    fn disabled_when_max_tokens_zero() {
        let config = BudgetConfig {
            token_budget: Some(TokenBudgetPolicy {
                active: true,
                max_tokens: 0,
                ..TokenBudgetPolicy::default()
            }),
            ..BudgetConfig::default()
        };
        let controller = BudgetController::new(&config);
        assert!(matches!(controller.token_enforcement(), TokenEnforcement::Disabled));
    }

    #[test]
    fn tokens_used_is_monotonic() {
        let mut controller = BudgetController::new(&BudgetConfig::default());
        controller.record_tokens(100);
        controller.record_tokens(50);
        assert_eq!(controller.tokens_used(), 150);
    }
}
