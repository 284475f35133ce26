//! Structured plan produced by the planner and executed step by step.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One indivisible tool invocation within a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStep {
    /// Unique within the plan.
    pub id: String,
    /// Tool id to invoke.
    pub tool: String,
    /// What this step is meant to accomplish.
    pub intent: String,
    /// Structured input object handed to the tool.
    pub input: Value,
    /// Whether the model flagged this step as needing user permission.
    pub requires_permission: bool,
}

/// A validated plan: a goal and at least one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPlan {
    pub goal: String,
    pub steps: Vec<AgentStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risks: Option<Vec<String>>,
}
