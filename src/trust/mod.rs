//! Trust subsystem: evaluation precedence, remembered rules, and the engine
//! the orchestrator consults before every step.

pub mod engine;
pub mod evaluator;
pub mod rules;
pub mod types;

pub use engine::TrustEngine;
pub use evaluator::{EvaluateOptions, evaluate};
pub use rules::{NewRule, RuleStore, RuleStoreError, rule_id};
pub use types::{
    DEFAULT_TRUST_LEVEL, Decision, DecisionSource, HardBlockConfig, PermissionDecision,
    PermissionRequest, Remember, RiskLevel, TrustConfig, TrustLevel, TrustRule,
};
