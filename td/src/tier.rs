//! Model tier selection and escalation.
//!
//! `ModelTier` orders the three model sizes a run may execute at and
//! enforces forward-only escalation, exactly mirroring how
//! `domain::execution::LoopExecutionStatus` enforces monotone status
//! transitions for loop executions.

use serde::{Deserialize, Serialize};

use crate::budget::BudgetController;
use crate::progress::ProgressTracker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    #[default]
    Small,
    Medium,
    Large,
}

impl ModelTier {
    /// The next tier up, or `None` if already at `Large`.
    pub fn next(self) -> Option<ModelTier> {
        match self {
            ModelTier::Small => Some(ModelTier::Medium),
            ModelTier::Medium => Some(ModelTier::Large),
            ModelTier::Large => None,
        }
    }

    /// Escalation only ever moves forward; this is always true for `to >
    /// self` and false otherwise, kept as a named predicate so callers
    /// don't reimplement the ordering check inline.
    pub fn can_escalate_to(self, to: ModelTier) -> bool {
        to > self
    }
}

impl std::fmt::Display for ModelTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ModelTier::Small => "small",
            ModelTier::Medium => "medium",
            ModelTier::Large => "large",
        };
        write!(f, "{s}")
    }
}

/// Named decision points a tier selector is consulted at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierDecisionPoint {
    IntentInference,
    SearchAssessment,
    Validation,
    Reflection,
}

/// Whether `smartTiering` is enabled and, if so, how aggressively it
/// trades tier for budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmartTieringPolicy {
    pub enabled: bool,
    /// Below this remaining-budget ratio, prefer the smallest tier that can
    /// still plausibly finish the task.
    pub low_budget_ratio_threshold: f64,
}

impl Default for SmartTieringPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            low_budget_ratio_threshold: 0.25,
        }
    }
}

/// Result of `evaluate_escalation_need`: whether the run should request a
/// tier bump, and why (persisted to analytics, used to short-circuit the
/// loop with a typed `escalate` outcome).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationDecision {
    pub should_escalate: bool,
    pub reason: Option<String>,
}

impl EscalationDecision {
    pub fn no() -> Self {
        Self {
            should_escalate: false,
            reason: None,
        }
    }

    pub fn yes(reason: impl Into<String>) -> Self {
        Self {
            should_escalate: true,
            reason: Some(reason.into()),
        }
    }
}

/// Picks a tier per decision point and decides whether a run should
/// escalate.
#[derive(Debug, Clone)]
pub struct TierSelector {
    policy: SmartTieringPolicy,
    start_tier: ModelTier,
}

impl TierSelector {
    pub fn new(policy: SmartTieringPolicy, start_tier: ModelTier) -> Self {
        Self { policy, start_tier }
    }

    /// Pick a tier for one decision point. Discovery-flavored
    /// decision points (intent inference, search assessment) default to
    /// a smaller tier than validation/reflection, further scaled down
    /// under `smartTiering` when budget is running low.
    pub fn tier_for(&self, point: TierDecisionPoint, remaining_budget_ratio: f64) -> ModelTier {
        let base = match point {
            TierDecisionPoint::IntentInference | TierDecisionPoint::SearchAssessment => ModelTier::Small,
            TierDecisionPoint::Validation | TierDecisionPoint::Reflection => self.start_tier,
        };

        if self.policy.enabled && remaining_budget_ratio < self.policy.low_budget_ratio_threshold {
            return ModelTier::Small;
        }

        base
    }

    /// Decide whether a run stuck at its current tier should escalate.
    /// Stuck progress plus a non-trivial failure count is the signal; a
    /// run already at `Large` can never escalate further.
    pub fn evaluate_escalation_need(
        &self,
        current_tier: ModelTier,
        budget: &BudgetController,
        progress: &ProgressTracker,
    ) -> EscalationDecision {
        if current_tier.next().is_none() {
            return EscalationDecision::no();
        }

        if progress.is_stuck() {
            return EscalationDecision::yes(format!(
                "stuck after {} iterations without progress at tier {current_tier}",
                progress.iterations_since_progress()
            ));
        }

        if progress.failure_counter() >= 3 {
            return EscalationDecision::yes(format!(
                "{} consecutive tool failures at tier {current_tier}",
                progress.failure_counter()
            ));
        }

        let _ = budget;
        EscalationDecision::no()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::BudgetConfig;
    use crate::progress::ProgressInput;

    #[test]
    fn ordering_is_small_lt_medium_lt_large() {
        assert!(ModelTier::Small < ModelTier::Medium);
        assert!(ModelTier::Medium < ModelTier::Large);
    }

    #[test]
    fn escalation_only_moves_forward() {
        assert!(ModelTier::Small.can_escalate_to(ModelTier::Medium));
        assert!(!ModelTier::Medium.can_escalate_to(ModelTier::Small));
        assert!(!ModelTier::Large.can_escalate_to(ModelTier::Large));
    }

    #[test]
    fn large_has_no_next_tier() {
        assert_eq!(ModelTier::Large.next(), None);
        assert_eq!(ModelTier::Small.next(), Some(ModelTier::Medium));
    }

    #[test]
    fn low_budget_forces_small_tier_under_smart_tiering() {
        let selector = TierSelector::new(SmartTieringPolicy::default(), ModelTier::Large);
        let tier = selector.tier_for(TierDecisionPoint::Validation, 0.1);
        assert_eq!(tier, ModelTier::Small);
    }

    #[test]
    fn ample_budget_uses_start_tier_for_validation() {
        let selector = TierSelector::new(SmartTieringPolicy::default(), ModelTier::Large);
        let tier = selector.tier_for(TierDecisionPoint::Validation, 0.9);
        assert_eq!(tier, ModelTier::Large);
    }

    #[test]
    fn stuck_progress_triggers_escalation() {
        let selector = TierSelector::new(SmartTieringPolicy::default(), ModelTier::Small);
        let budget = BudgetController::new(&BudgetConfig::default());
        let mut progress = ProgressTracker::with_config(3, 3);
        for _ in 0..3 {
            progress.record(ProgressInput {
                tool_name: "grep".to_string(),
                output_size: 10,
                evidence_delta: 0,
                failed_tools_this_iteration: 0,
                search_signal_hits: 0,
                new_file_appeared: false,
            });
        }
        let decision = selector.evaluate_escalation_need(ModelTier::Small, &budget, &progress);
        assert!(decision.should_escalate);
    }

    #[test]
    fn large_tier_never_escalates() {
        let selector = TierSelector::new(SmartTieringPolicy::default(), ModelTier::Large);
        let budget = BudgetController::new(&BudgetConfig::default());
        let mut progress = ProgressTracker::with_config(3, 3);
        for _ in 0..3 {
            progress.record(ProgressInput {
                tool_name: "grep".to_string(),
                output_size: 10,
                evidence_delta: 0,
                failed_tools_this_iteration: 0,
                search_signal_hits: 0,
                new_file_appeared: false,
            });
        }
        let decision = selector.evaluate_escalation_need(ModelTier::Large, &budget, &progress);
        assert!(!decision.should_escalate);
    }
}
