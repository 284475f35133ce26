//! Trust engine: the orchestrator's permission oracle.
//!
//! Thin composition of the pure evaluator over the profile's remembered
//! rules and the configured hard-block policy.

use std::sync::Arc;

use super::{
    evaluator::{EvaluateOptions, evaluate},
    rules::RuleStore,
    types::{Decision, HardBlockConfig, PermissionDecision, PermissionRequest, TrustConfig},
};

/// Evaluates permission requests for one profile.
pub struct TrustEngine {
    hard_block: HardBlockConfig,
    rules: Arc<RuleStore>,
}

impl TrustEngine {
    pub fn new(hard_block: HardBlockConfig, rules: Arc<RuleStore>) -> Self {
        Self { hard_block, rules }
    }

    /// Fetch the current rule list and run the evaluator.
    pub fn evaluate(
        &self,
        request: &PermissionRequest,
        trust: &TrustConfig,
    ) -> PermissionDecision {
        let rules = self.rules.list();
        evaluate(
            request,
            trust,
            EvaluateOptions {
                hard_block: &self.hard_block,
                rules: &rules,
            },
        )
    }

    /// Evaluate and emit one audit line for the decision.
    pub fn can_execute(&self, request: &PermissionRequest, trust: &TrustConfig) -> bool {
        let decision = self.evaluate(request, trust);
        tracing::info!(
            tool = %request.tool,
            scope = request.scope.as_deref().unwrap_or("-"),
            risk = ?request.risk,
            decision = ?decision.decision,
            source = ?decision.source,
            reason = %decision.reason,
            "trust decision"
        );
        decision.decision == Decision::Allow
    }
}
