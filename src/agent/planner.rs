//! Planner: turns a user request and the tool catalogue into a validated
//! [`AgentPlan`] through one LLM call.
//!
//! The model is asked for a JSON object; the reply is mined for a fenced
//! ```json block first, then for the first balanced `{ … }` region. Every
//! parse or validation failure surfaces as `task.plan_failed`.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;

use super::plan::{AgentPlan, AgentStep};
use crate::error::CoreError;
use crate::llm::{LlmRequest, LlmRouter};
use crate::tools::ToolInfo;

/// Token budget for the planning call.
const PLAN_MAX_TOKENS: u32 = 1000;

/// Scopes the planner prohibits even before the safety gate runs.
fn default_blocked_scopes() -> Vec<String> {
    vec!["shell".to_string(), "system".to_string()]
}

/// Planner policy: tools and scopes the model must not plan with.
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    pub blocked_tools: Vec<String>,
    pub blocked_scopes: Vec<String>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            blocked_tools: Vec::new(),
            blocked_scopes: default_blocked_scopes(),
        }
    }
}

/// Produces plans via the configured LLM router.
pub struct Planner {
    router: Arc<dyn LlmRouter>,
    config: PlannerConfig,
}

impl Planner {
    pub fn new(router: Arc<dyn LlmRouter>) -> Self {
        Self {
            router,
            config: PlannerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PlannerConfig) -> Self {
        self.config = config;
        self
    }

    /// Plan `user_input` against the available tools.
    pub async fn plan(
        &self,
        user_input: &str,
        tools: &[ToolInfo],
    ) -> Result<AgentPlan, CoreError> {
        let prompt = self.build_prompt(user_input, tools);
        let response = self
            .router
            .complete(
                LlmRequest::new(prompt)
                    .with_system(
                        "You are the planning component of a local assistant. \
                         Respond with a single JSON object and nothing else.",
                    )
                    .with_max_tokens(PLAN_MAX_TOKENS),
            )
            .await?;

        let raw = extract_json(&response.text)
            .ok_or_else(|| CoreError::PlanFailed("no JSON object in model response".into()))?;
        let value: Value = serde_json::from_str(&raw)
            .map_err(|e| CoreError::PlanFailed(format!("model returned invalid JSON: {e}")))?;

        self.validate(value, tools)
    }

    fn build_prompt(&self, user_input: &str, tools: &[ToolInfo]) -> String {
        let mut catalogue = String::new();
        for tool in tools {
            catalogue.push_str("- ");
            catalogue.push_str(&tool.id);
            if let Some(description) = &tool.description {
                catalogue.push_str(": ");
                catalogue.push_str(description);
            }
            if !tool.input_fields.is_empty() {
                catalogue.push_str(&format!(" (input fields: {})", tool.input_fields.join(", ")));
            }
            catalogue.push('\n');
        }

        let mut prohibitions: Vec<String> = self
            .config
            .blocked_scopes
            .iter()
            .map(|s| format!("{s}.*"))
            .collect();
        prohibitions.extend(self.config.blocked_tools.iter().cloned());

        format!(
            "User request:\n{user_input}\n\n\
             Available tools:\n{catalogue}\n\
             You must never use these tools or tool families: {}.\n\n\
             Reply with a JSON object of the shape:\n\
             {{\"goal\": string, \"steps\": [{{\"id\": string, \"tool\": string, \
             \"intent\": string, \"input\": object, \"requiresPermission\": boolean}}], \
             \"risks\": [string]}}\n\
             Each step id must be unique and each tool must come from the list above.",
            prohibitions.join(", ")
        )
    }

    /// Structural validation of the parsed plan object.
    fn validate(&self, value: Value, tools: &[ToolInfo]) -> Result<AgentPlan, CoreError> {
        let fail = |message: String| CoreError::PlanFailed(message);

        let goal = value
            .get("goal")
            .and_then(|g| g.as_str())
            .filter(|g| !g.trim().is_empty())
            .ok_or_else(|| fail("plan is missing a goal".into()))?
            .to_string();

        let raw_steps = value
            .get("steps")
            .and_then(|s| s.as_array())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| fail("plan has no steps".into()))?;

        let known_tools: HashSet<&str> = tools.iter().map(|t| t.id.as_str()).collect();
        let mut seen_ids: HashSet<String> = HashSet::new();
        let mut steps = Vec::with_capacity(raw_steps.len());

        for (index, raw) in raw_steps.iter().enumerate() {
            let id = raw
                .get("id")
                .and_then(|v| v.as_str())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| fail(format!("step {index} is missing an id")))?
                .to_string();
            if !seen_ids.insert(id.clone()) {
                return Err(fail(format!("duplicate step id '{id}'")));
            }

            let tool = raw
                .get("tool")
                .and_then(|v| v.as_str())
                .ok_or_else(|| fail(format!("step '{id}' is missing a tool")))?
                .to_string();

            if self.config.blocked_tools.iter().any(|t| t == &tool) {
                return Err(fail(format!("step '{id}' uses blocked tool '{tool}'")));
            }
            for scope in &self.config.blocked_scopes {
                if tool.starts_with(&format!("{scope}.")) || tool.contains(scope.as_str()) {
                    return Err(fail(format!(
                        "step '{id}' uses unsafe scope '{scope}' via tool '{tool}'"
                    )));
                }
            }
            if !known_tools.contains(tool.as_str()) {
                return Err(fail(format!("step '{id}' uses unknown tool '{tool}'")));
            }

            let input = raw
                .get("input")
                .cloned()
                .unwrap_or(Value::Null);
            if !input.is_object() {
                return Err(fail(format!("step '{id}' input must be an object")));
            }

            let requires_permission = raw
                .get("requiresPermission")
                .and_then(|v| v.as_bool())
                .ok_or_else(|| {
                    fail(format!("step '{id}' requiresPermission must be a boolean"))
                })?;

            let intent = raw
                .get("intent")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();

            steps.push(AgentStep {
                id,
                tool,
                intent,
                input,
                requires_permission,
            });
        }

        let risks = value.get("risks").and_then(|r| r.as_array()).map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        });

        Ok(AgentPlan { goal, steps, risks })
    }
}

/// Pull a JSON object out of free-form model text: a fenced ```json block if
/// present, otherwise the first balanced `{ … }` region.
fn extract_json(text: &str) -> Option<String> {
    if let Some(start) = text.find("```json") {
        let after = &text[start + "```json".len()..];
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if !inner.is_empty() {
                return Some(inner.to_string());
            }
        }
    }
    first_balanced_object(text)
}

fn first_balanced_object(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[start..start + offset + ch.len_utf8()].to_string());
                }
            }
            _ => {}
        }
    }
    None
}
