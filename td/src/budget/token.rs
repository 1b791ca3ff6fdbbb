//! Token budget policy: soft/hard ratios and what happens when they trip.

use serde::{Deserialize, Serialize};

/// Fraction of `max_tokens` at which broad-exploration tools are withdrawn
/// from the next LLM call.
const DEFAULT_SOFT_LIMIT_RATIO: f64 = 0.75;

/// Fraction of `max_tokens` at which the run is forced toward synthesis.
const DEFAULT_HARD_LIMIT_RATIO: f64 = 0.95;

/// Declarative token budget for one run. `None` at the `BudgetController`
/// level disables enforcement entirely; within a policy, `active = false`
/// or `max_tokens == 0` also disable it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenBudgetPolicy {
    /// Whether this policy is enforced at all.
    pub active: bool,
    /// Hard ceiling on tokens consumed by the run.
    pub max_tokens: u64,
    /// Fraction of `max_tokens` at which the soft limit trips.
    pub soft_limit_ratio: f64,
    /// Fraction of `max_tokens` at which the hard limit trips.
    pub hard_limit_ratio: f64,
    /// Run one no-tools synthesis turn when the hard limit trips, instead
    /// of stopping outright (`hardStop`). Defaults to `true`: a run that
    /// hits its hard token ceiling still gets one last chance to answer.
    pub force_synthesis_on_hard_limit: bool,
    /// Withdraw broad-exploration tools from the next LLM call once the
    /// soft limit trips.
    pub restrict_broad_exploration_at_soft_limit: bool,
    /// Allow the iteration budget to still extend past the soft limit.
    pub allow_iteration_budget_extension: bool,
}

impl Default for TokenBudgetPolicy {
    fn default() -> Self {
        Self {
            active: true,
            max_tokens: 0,
            soft_limit_ratio: DEFAULT_SOFT_LIMIT_RATIO,
            hard_limit_ratio: DEFAULT_HARD_LIMIT_RATIO,
            force_synthesis_on_hard_limit: true,
            restrict_broad_exploration_at_soft_limit: true,
            allow_iteration_budget_extension: true,
        }
    }
}

impl TokenBudgetPolicy {
    fn is_enforced(&self) -> bool {
        self.active && self.max_tokens > 0
    }

    /// Classify the current usage against this policy's thresholds.
    pub fn enforcement_for(&self, tokens_used: u64) -> TokenEnforcement {
        if !self.is_enforced() {
            return TokenEnforcement::Disabled;
        }
        let hard_at = (self.max_tokens as f64 * self.hard_limit_ratio) as u64;
        let soft_at = (self.max_tokens as f64 * self.soft_limit_ratio) as u64;
        if tokens_used >= hard_at {
            TokenEnforcement::HardLimit
        } else if tokens_used >= soft_at {
            TokenEnforcement::SoftLimit
        } else {
            TokenEnforcement::None
        }
    }
}

/// What a [`TokenBudgetPolicy`] says to do about the current usage level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenEnforcement {
    /// No policy is active for this run.
    Disabled,
    /// Policy is active but usage is below the soft limit.
    None,
    /// Usage has crossed `soft_limit_ratio`.
    SoftLimit,
    /// Usage has crossed `hard_limit_ratio`.
    HardLimit,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_tokens: u64) -> TokenBudgetPolicy {
        TokenBudgetPolicy {
            max_tokens,
            ..TokenBudgetPolicy::default()
        }
    }

    #[test]
    fn disabled_when_inactive() {
        let p = TokenBudgetPolicy {
            active: false,
            max_tokens: 1000,
            ..TokenBudgetPolicy::default()
        };
        assert_eq!(p.enforcement_for(999), TokenEnforcement::Disabled);
    }

    #[test]
    fn disabled_when_max_tokens_zero() {
        assert_eq!(policy(0).enforcement_for(0), TokenEnforcement::Disabled);
    }

    #[test]
    fn none_below_soft_limit() {
        let p = policy(1000);
        assert_eq!(p.enforcement_for(700), TokenEnforcement::None);
    }

    #[test]
    fn soft_limit_at_threshold() {
        let p = policy(1000);
        assert_eq!(p.enforcement_for(750), TokenEnforcement::SoftLimit);
        assert_eq!(p.enforcement_for(940), TokenEnforcement::SoftLimit);
    }

    #[test]
    fn hard_limit_at_threshold() {
        let p = policy(1000);
        assert_eq!(p.enforcement_for(950), TokenEnforcement::HardLimit);
        assert_eq!(p.enforcement_for(10_000), TokenEnforcement::HardLimit);
    }
}
