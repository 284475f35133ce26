//! Pure trust evaluation.
//!
//! `evaluate` is a deterministic function of its inputs and performs no I/O.
//! Precedence, first match wins:
//!
//! 1. hard block (tool, then domain, then scope prefix)
//! 2. remembered rule
//! 3. per-tool trust level
//! 4. per-domain trust level
//! 5. profile default trust level
//!
//! Stages 3–5 translate a trust level into a decision through the risk
//! table: low risk allows at level ≥ 2, medium at ≥ 3, high at ≥ 4, and
//! critical always asks.

use super::types::{
    Decision, DecisionSource, HardBlockConfig, PermissionDecision, PermissionRequest, RiskLevel,
    TrustConfig, TrustLevel, TrustRule,
};

/// Inputs beyond the request and profile settings: the hard-block policy and
/// the profile's remembered rules.
#[derive(Debug, Clone, Copy)]
pub struct EvaluateOptions<'a> {
    pub hard_block: &'a HardBlockConfig,
    pub rules: &'a [TrustRule],
}

/// Evaluate one permission request against a profile's trust settings.
pub fn evaluate(
    request: &PermissionRequest,
    trust: &TrustConfig,
    options: EvaluateOptions<'_>,
) -> PermissionDecision {
    // 1. Hard block.
    if let Some(reason) = hard_block_reason(request, options.hard_block) {
        return PermissionDecision {
            request_id: request.id.clone(),
            decision: Decision::Deny,
            trust_level: 0,
            reason,
            source: DecisionSource::HardBlock,
        };
    }

    // 2. Remembered rule.
    let scope = request.scope.as_deref();
    if let Some(rule) = options
        .rules
        .iter()
        .find(|r| r.matches(&request.tool, scope))
    {
        return PermissionDecision {
            request_id: request.id.clone(),
            decision: rule.decision,
            trust_level: trust.effective_default(),
            reason: format!("rule:{}", rule.id),
            source: DecisionSource::Rule,
        };
    }

    // 3. Tool default.
    if let Some(&level) = trust.tools.get(&request.tool) {
        return decide_with_level(request, level, DecisionSource::ToolDefault);
    }

    // 4. Domain default.
    if let Some(domain) = request.effective_domain()
        && let Some(&level) = trust.domains.get(domain)
    {
        return decide_with_level(request, level, DecisionSource::DomainDefault);
    }

    // 5. Profile default.
    decide_with_level(
        request,
        trust.effective_default(),
        DecisionSource::ProfileDefault,
    )
}

/// First matching hard-block reason, if any.
fn hard_block_reason(request: &PermissionRequest, hard_block: &HardBlockConfig) -> Option<String> {
    if hard_block.blocked_tools.iter().any(|t| t == &request.tool) {
        return Some(format!("hard-block:tool:{}", request.tool));
    }
    if let Some(domain) = request.effective_domain()
        && hard_block.blocked_domains.iter().any(|d| d == domain)
    {
        return Some(format!("hard-block:domain:{domain}"));
    }
    if let Some(scope) = request.scope.as_deref() {
        for prefix in &hard_block.blocked_scope_prefixes {
            if scope.starts_with(prefix.as_str()) {
                return Some(format!("hard-block:scope:{prefix}"));
            }
        }
    }
    None
}

fn decide_with_level(
    request: &PermissionRequest,
    level: TrustLevel,
    source: DecisionSource,
) -> PermissionDecision {
    let decision = decision_for_risk(request.risk, level);
    PermissionDecision {
        request_id: request.id.clone(),
        decision,
        trust_level: level,
        reason: format!("{:?}-risk at trust level {level}", request.risk).to_lowercase(),
        source,
    }
}

/// The risk → decision table.
fn decision_for_risk(risk: RiskLevel, level: TrustLevel) -> Decision {
    let allowed = match risk {
        RiskLevel::Low => level >= 2,
        RiskLevel::Medium => level >= 3,
        RiskLevel::High => level >= 4,
        RiskLevel::Critical => false,
    };
    if allowed { Decision::Allow } else { Decision::Ask }
}
