//! Static plan validation against the blocked-tool / blocked-scope policy.
//!
//! Runs once over the whole plan before any step executes; a single
//! violation rejects the plan.

use thiserror::Error;

use super::plan::AgentPlan;

/// A plan-level policy violation. Carries the offending step.
#[derive(Debug, Clone, Error)]
#[error("step '{step_id}': {message}")]
pub struct SafetyViolation {
    pub step_id: String,
    pub message: String,
}

/// Validates plans against exact blocked tools and blocked scope substrings.
#[derive(Debug, Clone, Default)]
pub struct SafetyGate {
    blocked_tools: Vec<String>,
    blocked_scopes: Vec<String>,
}

impl SafetyGate {
    pub fn new(blocked_tools: Vec<String>, blocked_scopes: Vec<String>) -> Self {
        Self {
            blocked_tools,
            blocked_scopes,
        }
    }

    /// Reject the plan if any step uses a blocked tool, or mentions a
    /// blocked scope in its tool id or intent.
    pub fn validate(&self, plan: &AgentPlan) -> Result<(), SafetyViolation> {
        for step in &plan.steps {
            if self.blocked_tools.iter().any(|t| t == &step.tool) {
                return Err(SafetyViolation {
                    step_id: step.id.clone(),
                    message: format!("tool '{}' is blocked", step.tool),
                });
            }
            for scope in &self.blocked_scopes {
                if step.tool.contains(scope.as_str()) {
                    return Err(SafetyViolation {
                        step_id: step.id.clone(),
                        message: format!("tool '{}' falls in blocked scope '{scope}'", step.tool),
                    });
                }
                if step.intent.contains(scope.as_str()) {
                    return Err(SafetyViolation {
                        step_id: step.id.clone(),
                        message: format!("intent mentions blocked scope '{scope}'"),
                    });
                }
            }
        }
        Ok(())
    }
}
