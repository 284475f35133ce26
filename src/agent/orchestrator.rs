//! Execution orchestrator: drives a plan through the step state machine.
//!
//! ```text
//! plan (C5) ──► safety gate (C4) ──► for each step:
//!     emit task.step(in-progress)
//!     trust decision (oracle)
//!         deny  → task.step(failed) + task.error(permission.denied) → STOP
//!         ask   → prompt via coordinator → deny/timeout as above, allow ↓
//!         allow ↓
//!     registry lookup
//!         missing → task.step(failed) + task.error(tool.not_found) → next step
//!     tool.execute(input, ctx)
//!         ok            → task.step(completed)
//!         logical fail  → task.step(failed) + task.error(tool.failed)
//!         exception     → task.step(failed) + task.error(tool.exception)
//! ```
//!
//! The cancellation probe is sampled between steps, never mid-step.

use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{plan::{AgentPlan, AgentStep}, planner::Planner, safety::SafetyGate};
use crate::error::CoreError;
use crate::events::{AgentEvent, EventSink, StepEvent, StepStatus};
use crate::permission::PermissionCoordinator;
use crate::tools::{ToolContext, ToolRegistry, ToolResult};
use crate::trust::{
    Decision, PermissionDecision, PermissionRequest, RiskLevel, TrustConfig, TrustEngine,
};
use crate::util::now_millis;

/// Probe sampled between steps; `true` means stop before the next step.
pub type CancellationProbe = Arc<dyn Fn() -> bool + Send + Sync>;

/// Input-object keys that override the permission scope for `file.*` tools,
/// in priority order.
const FILE_SCOPE_KEYS: &[&str] = &["path", "filePath", "src", "inputPath"];

// ─── Task and outcome types ─────────────────────────────────────────────────

/// One accepted unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeTask {
    pub task_id: String,
    pub correlation_id: String,
    pub profile_id: String,
    pub input: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
}

/// Terminal record of one step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    pub step_id: String,
    pub tool: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ToolResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: i64,
    pub finished_at: i64,
}

/// Deterministic summary of a finished task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOutcome {
    pub task_id: String,
    pub success: bool,
    pub cancelled: bool,
    pub report: String,
    pub steps: Vec<StepRecord>,
    pub artifacts: Vec<String>,
}

// ─── Hook interfaces ────────────────────────────────────────────────────────

/// The orchestrator's permission oracle: an immediate evaluation plus a
/// bounded interactive wait for `ask` outcomes.
#[async_trait]
pub trait PermissionOracle: Send + Sync {
    async fn evaluate(&self, request: &PermissionRequest) -> PermissionDecision;
    async fn wait_for_decision(
        &self,
        request: &PermissionRequest,
        correlation_id: &str,
    ) -> Decision;
}

/// Default oracle: trust engine for evaluation, coordinator for prompts.
pub struct TrustOracle {
    engine: TrustEngine,
    trust: TrustConfig,
    coordinator: Arc<PermissionCoordinator>,
}

impl TrustOracle {
    pub fn new(
        engine: TrustEngine,
        trust: TrustConfig,
        coordinator: Arc<PermissionCoordinator>,
    ) -> Self {
        Self {
            engine,
            trust,
            coordinator,
        }
    }
}

#[async_trait]
impl PermissionOracle for TrustOracle {
    async fn evaluate(&self, request: &PermissionRequest) -> PermissionDecision {
        self.engine.evaluate(request, &self.trust)
    }

    async fn wait_for_decision(
        &self,
        request: &PermissionRequest,
        correlation_id: &str,
    ) -> Decision {
        self.coordinator
            .wait_for_permission(request, correlation_id)
            .await
    }
}

/// Optional replacement for the deterministic report.
#[async_trait]
pub trait ReportSummarizer: Send + Sync {
    async fn summarize(&self, outcome: &TaskOutcome) -> Result<String, String>;
}

/// Optional observation points around planning and completion.
pub trait TaskObserver: Send + Sync {
    fn on_plan(&self, _plan: &AgentPlan) {}
    fn on_result(&self, _outcome: &TaskOutcome) {}
}

// ─── Orchestrator ───────────────────────────────────────────────────────────

pub struct Orchestrator {
    registry: Arc<ToolRegistry>,
    safety: SafetyGate,
    oracle: Arc<dyn PermissionOracle>,
    events: Arc<dyn EventSink>,
    summarizer: Option<Arc<dyn ReportSummarizer>>,
    observer: Option<Arc<dyn TaskObserver>>,
    cwd: PathBuf,
    temp_dir: PathBuf,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<ToolRegistry>,
        safety: SafetyGate,
        oracle: Arc<dyn PermissionOracle>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            registry,
            safety,
            oracle,
            events,
            summarizer: None,
            observer: None,
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            temp_dir: std::env::temp_dir(),
        }
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn ReportSummarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn TaskObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_dirs(mut self, cwd: PathBuf, temp_dir: PathBuf) -> Self {
        self.cwd = cwd;
        self.temp_dir = temp_dir;
        self
    }

    /// Plan, gate, and execute one task end to end.
    ///
    /// Planning and safety failures are fatal and emit a single
    /// `task.error`; execution failures are reflected in the outcome.
    pub async fn run_task(
        &self,
        task: &RuntimeTask,
        planner: &Planner,
        cancelled: &CancellationProbe,
    ) -> Result<TaskOutcome, CoreError> {
        let plan = match planner.plan(&task.input, &self.registry.list()).await {
            Ok(plan) => plan,
            Err(error) => {
                self.emit_task_error(task, error.code(), error.to_string(), None);
                return Err(error);
            }
        };

        if let Some(observer) = &self.observer {
            observer.on_plan(&plan);
        }
        self.events.emit(AgentEvent::TaskPlan {
            task_id: task.task_id.clone(),
            correlation_id: task.correlation_id.clone(),
            profile_id: task.profile_id.clone(),
            plan: plan.clone(),
        });

        if let Err(violation) = self.safety.validate(&plan) {
            let error = CoreError::SafetyViolation(violation.to_string());
            self.emit_task_error(
                task,
                error.code(),
                error.to_string(),
                Some(violation.step_id),
            );
            return Err(error);
        }

        let outcome = self.execute(task, &plan, cancelled).await;

        self.events.emit(AgentEvent::TaskResult {
            task_id: task.task_id.clone(),
            correlation_id: task.correlation_id.clone(),
            profile_id: task.profile_id.clone(),
            success: outcome.success,
            cancelled: outcome.cancelled,
            report: outcome.report.clone(),
            artifacts: outcome.artifacts.clone(),
        });
        if let Some(observer) = &self.observer {
            observer.on_result(&outcome);
        }
        Ok(outcome)
    }

    /// Run the step loop over an already-validated plan.
    pub async fn execute(
        &self,
        task: &RuntimeTask,
        plan: &AgentPlan,
        cancelled: &CancellationProbe,
    ) -> TaskOutcome {
        let total = plan.steps.len();
        let mut records: Vec<StepRecord> = Vec::with_capacity(total);
        let mut was_cancelled = false;
        let mut stopped = false;

        for (index, step) in plan.steps.iter().enumerate() {
            if cancelled() {
                tracing::info!(task = %task.task_id, "task cancelled between steps");
                was_cancelled = true;
                break;
            }

            let started_at = now_millis();
            self.emit_step(task, step, index, StepStatus::InProgress, started_at, None, None);

            let request = build_permission_request(task, step, index, total, &plan.goal);
            let decision = self.oracle.evaluate(&request).await;
            let allowed = match decision.decision {
                Decision::Allow => true,
                Decision::Deny => false,
                Decision::Ask => {
                    self.events.emit(AgentEvent::PermissionPrompt {
                        request: request.clone(),
                        correlation_id: task.correlation_id.clone(),
                        profile_id: task.profile_id.clone(),
                    });
                    self.oracle
                        .wait_for_decision(&request, &task.correlation_id)
                        .await
                        == Decision::Allow
                }
            };

            if !allowed {
                let message = format!("permission denied: {}", decision.reason);
                records.push(StepRecord {
                    step_id: step.id.clone(),
                    tool: step.tool.clone(),
                    status: StepStatus::Failed,
                    result: None,
                    error: Some(message.clone()),
                    started_at,
                    finished_at: now_millis(),
                });
                self.emit_step(
                    task,
                    step,
                    index,
                    StepStatus::Failed,
                    started_at,
                    None,
                    Some(message.clone()),
                );
                self.emit_task_error(task, "permission.denied", message, Some(step.id.clone()));
                stopped = true;
                break;
            }

            let Some(tool) = self.registry.get(&step.tool) else {
                let message = format!("tool '{}' is not registered", step.tool);
                records.push(StepRecord {
                    step_id: step.id.clone(),
                    tool: step.tool.clone(),
                    status: StepStatus::Failed,
                    result: None,
                    error: Some(message.clone()),
                    started_at,
                    finished_at: now_millis(),
                });
                self.emit_step(
                    task,
                    step,
                    index,
                    StepStatus::Failed,
                    started_at,
                    None,
                    Some(message.clone()),
                );
                self.emit_task_error(task, "tool.not_found", message, Some(step.id.clone()));
                continue;
            };

            let context = ToolContext {
                profile_id: task.profile_id.clone(),
                cwd: self.cwd.clone(),
                temp_dir: self.temp_dir.clone(),
                permissions: Vec::new(),
            };
            match tool.execute(step.input.clone(), &context).await {
                Ok(result) if result.success => {
                    self.emit_step(
                        task,
                        step,
                        index,
                        StepStatus::Completed,
                        started_at,
                        Some(result.output.clone()),
                        None,
                    );
                    records.push(StepRecord {
                        step_id: step.id.clone(),
                        tool: step.tool.clone(),
                        status: StepStatus::Completed,
                        result: Some(result),
                        error: None,
                        started_at,
                        finished_at: now_millis(),
                    });
                }
                Ok(result) => {
                    let message = result.output.clone();
                    self.emit_step(
                        task,
                        step,
                        index,
                        StepStatus::Failed,
                        started_at,
                        None,
                        Some(message.clone()),
                    );
                    self.emit_task_error(task, "tool.failed", message, Some(step.id.clone()));
                    records.push(StepRecord {
                        step_id: step.id.clone(),
                        tool: step.tool.clone(),
                        status: StepStatus::Failed,
                        result: Some(result),
                        error: None,
                        started_at,
                        finished_at: now_millis(),
                    });
                }
                Err(error) => {
                    self.emit_step(
                        task,
                        step,
                        index,
                        StepStatus::Failed,
                        started_at,
                        None,
                        Some(error.clone()),
                    );
                    self.emit_task_error(task, "tool.exception", error.clone(), Some(step.id.clone()));
                    records.push(StepRecord {
                        step_id: step.id.clone(),
                        tool: step.tool.clone(),
                        status: StepStatus::Failed,
                        result: None,
                        error: Some(error),
                        started_at,
                        finished_at: now_millis(),
                    });
                }
            }
        }

        let success = !was_cancelled
            && !stopped
            && records.len() == total
            && records
                .iter()
                .all(|r| r.result.as_ref().is_some_and(|result| result.success));

        let artifacts: Vec<String> = records
            .iter()
            .filter_map(|r| r.result.as_ref())
            .flat_map(|result| result.artifacts.iter().cloned())
            .collect();

        let mut outcome = TaskOutcome {
            task_id: task.task_id.clone(),
            success,
            cancelled: was_cancelled,
            report: build_report(plan, &records, &artifacts),
            steps: records,
            artifacts,
        };

        // A summariser may replace the deterministic report; its failure is
        // swallowed and the deterministic report kept.
        if let Some(summarizer) = &self.summarizer {
            match summarizer.summarize(&outcome).await {
                Ok(summary) if !summary.trim().is_empty() => outcome.report = summary,
                Ok(_) => {}
                Err(error) => {
                    tracing::warn!(error = %error, "report summariser failed, keeping deterministic report");
                }
            }
        }
        if outcome.cancelled {
            outcome.report = format!("Task cancelled by user.\n{}", outcome.report);
        }
        outcome
    }

    fn emit_step(
        &self,
        task: &RuntimeTask,
        step: &AgentStep,
        index: usize,
        status: StepStatus,
        started_at: i64,
        output: Option<String>,
        error: Option<String>,
    ) {
        let finished_at =
            (status != StepStatus::InProgress).then(now_millis);
        self.events.emit(AgentEvent::TaskStep {
            task_id: task.task_id.clone(),
            correlation_id: task.correlation_id.clone(),
            profile_id: task.profile_id.clone(),
            step: StepEvent {
                step_id: step.id.clone(),
                tool: step.tool.clone(),
                index,
                status,
                started_at: Some(started_at),
                finished_at,
                output,
                error,
            },
        });
    }

    fn emit_task_error(
        &self,
        task: &RuntimeTask,
        code: &'static str,
        message: String,
        step_id: Option<String>,
    ) {
        self.events.emit(AgentEvent::TaskError {
            task_id: task.task_id.clone(),
            correlation_id: task.correlation_id.clone(),
            profile_id: task.profile_id.clone(),
            code,
            message,
            step_id,
        });
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────────

/// Build the per-step permission request. Scope defaults to the tool id;
/// `file.*` tools take it from the first path-like input field. Risk is
/// medium when the plan flags the step, low otherwise.
fn build_permission_request(
    task: &RuntimeTask,
    step: &AgentStep,
    index: usize,
    total: usize,
    goal: &str,
) -> PermissionRequest {
    let mut scope = step.tool.clone();
    if step.tool.starts_with("file.") && step.input.is_object() {
        for key in FILE_SCOPE_KEYS {
            if let Some(value) = step.input.get(*key).and_then(|v| v.as_str())
                && !value.is_empty()
            {
                scope = value.to_string();
                break;
            }
        }
    }
    let risk = if step.requires_permission {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    };
    PermissionRequest {
        id: uuid::Uuid::new_v4().to_string(),
        tool: step.tool.clone(),
        domain: None,
        action: step.intent.clone(),
        reason: format!("step {} of {total}: {goal}", index + 1),
        scope: Some(scope),
        risk,
        reversible: !step.requires_permission,
        timestamp: now_millis(),
        profile_id: task.profile_id.clone(),
    }
}

fn build_report(plan: &AgentPlan, records: &[StepRecord], artifacts: &[String]) -> String {
    let mut lines = vec![format!("Goal: {}", plan.goal)];
    for (index, record) in records.iter().enumerate() {
        let detail = match (&record.result, &record.error) {
            (Some(result), _) => result.output.clone(),
            (None, Some(error)) => error.clone(),
            (None, None) => String::new(),
        };
        let status = match record.status {
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::InProgress => "in progress",
        };
        lines.push(format!(
            "{}. [{}] {status}: {detail}",
            index + 1,
            record.tool
        ));
    }
    if records.len() < plan.steps.len() {
        lines.push(format!(
            "{} of {} steps did not run.",
            plan.steps.len() - records.len(),
            plan.steps.len()
        ));
    }
    if !artifacts.is_empty() {
        lines.push(format!("Artifacts: {}", artifacts.join(", ")));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trust::DecisionSource;
    use std::sync::Mutex;
    use serde_json::Value;

    // ── Test doubles ─────────────────────────────────────────────────────

    /// Sink that records every event in order.
    struct RecordingSink(Mutex<Vec<AgentEvent>>);

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self(Mutex::new(Vec::new())))
        }
        fn events(&self) -> Vec<AgentEvent> {
            self.0.lock().unwrap().clone()
        }
        fn step_statuses(&self) -> Vec<(usize, StepStatus)> {
            self.events()
                .iter()
                .filter_map(|e| match e {
                    AgentEvent::TaskStep { step, .. } => Some((step.index, step.status)),
                    _ => None,
                })
                .collect()
        }
        fn error_codes(&self) -> Vec<&'static str> {
            self.events()
                .iter()
                .filter_map(|e| match e {
                    AgentEvent::TaskError { code, .. } => Some(*code),
                    _ => None,
                })
                .collect()
        }
    }

    impl EventSink for RecordingSink {
        fn emit(&self, event: AgentEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    /// Oracle scripted per tool id.
    struct ScriptedOracle {
        deny_tools: Vec<&'static str>,
        ask_tools: Vec<&'static str>,
        ask_answer: Decision,
    }

    impl ScriptedOracle {
        fn allow_all() -> Arc<Self> {
            Arc::new(Self {
                deny_tools: vec![],
                ask_tools: vec![],
                ask_answer: Decision::Allow,
            })
        }
    }

    #[async_trait]
    impl PermissionOracle for ScriptedOracle {
        async fn evaluate(&self, request: &PermissionRequest) -> PermissionDecision {
            let decision = if self.deny_tools.contains(&request.tool.as_str()) {
                Decision::Deny
            } else if self.ask_tools.contains(&request.tool.as_str()) {
                Decision::Ask
            } else {
                Decision::Allow
            };
            PermissionDecision {
                request_id: request.id.clone(),
                decision,
                trust_level: 2,
                reason: "scripted".into(),
                source: DecisionSource::ProfileDefault,
            }
        }

        async fn wait_for_decision(
            &self,
            _request: &PermissionRequest,
            _correlation_id: &str,
        ) -> Decision {
            self.ask_answer
        }
    }

    /// Tool with fixed behaviour.
    enum Behaviour {
        Ok(&'static str),
        Fail(&'static str),
        Throw(&'static str),
    }

    struct FixedTool {
        id: &'static str,
        behaviour: Behaviour,
    }

    #[async_trait]
    impl crate::tools::Tool for FixedTool {
        fn id(&self) -> &str {
            self.id
        }
        fn description(&self) -> &str {
            "fixed"
        }
        async fn execute(&self, _input: Value, _ctx: &ToolContext) -> Result<ToolResult, String> {
            match &self.behaviour {
                Behaviour::Ok(output) => Ok(ToolResult::ok(*output).with_artifact("/tmp/out")),
                Behaviour::Fail(output) => Ok(ToolResult::err(*output)),
                Behaviour::Throw(message) => Err((*message).to_string()),
            }
        }
    }

    fn registry(tools: Vec<FixedTool>) -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry.register(Arc::new(tool));
        }
        Arc::new(registry)
    }

    fn task() -> RuntimeTask {
        RuntimeTask {
            task_id: "t1".into(),
            correlation_id: "c1".into(),
            profile_id: "default".into(),
            input: "do the thing".into(),
            attachments: vec![],
        }
    }

    fn step(id: &str, tool: &str) -> AgentStep {
        AgentStep {
            id: id.into(),
            tool: tool.into(),
            intent: format!("run {tool}"),
            input: serde_json::json!({}),
            requires_permission: false,
        }
    }

    fn plan(steps: Vec<AgentStep>) -> AgentPlan {
        AgentPlan {
            goal: "test goal".into(),
            steps,
            risks: None,
        }
    }

    fn never_cancelled() -> CancellationProbe {
        Arc::new(|| false)
    }

    fn orchestrator(
        registry: Arc<ToolRegistry>,
        oracle: Arc<dyn PermissionOracle>,
        sink: Arc<RecordingSink>,
    ) -> Orchestrator {
        Orchestrator::new(registry, SafetyGate::default(), oracle, sink)
    }

    // ── Tests ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn all_steps_succeed() {
        let sink = RecordingSink::new();
        let orch = orchestrator(
            registry(vec![
                FixedTool { id: "a.one", behaviour: Behaviour::Ok("first") },
                FixedTool { id: "b.two", behaviour: Behaviour::Ok("second") },
            ]),
            ScriptedOracle::allow_all(),
            sink.clone(),
        );

        let outcome = orch
            .execute(&task(), &plan(vec![step("s1", "a.one"), step("s2", "b.two")]), &never_cancelled())
            .await;

        assert!(outcome.success);
        assert!(!outcome.cancelled);
        assert_eq!(outcome.steps.len(), 2);
        assert_eq!(outcome.artifacts.len(), 2);
        assert_eq!(
            sink.step_statuses(),
            vec![
                (0, StepStatus::InProgress),
                (0, StepStatus::Completed),
                (1, StepStatus::InProgress),
                (1, StepStatus::Completed),
            ]
        );
        assert!(sink.error_codes().is_empty());
    }

    #[tokio::test]
    async fn deny_stops_the_whole_task() {
        let sink = RecordingSink::new();
        let oracle = Arc::new(ScriptedOracle {
            deny_tools: vec!["b.two"],
            ask_tools: vec![],
            ask_answer: Decision::Allow,
        });
        let orch = orchestrator(
            registry(vec![
                FixedTool { id: "a.one", behaviour: Behaviour::Ok("first") },
                FixedTool { id: "b.two", behaviour: Behaviour::Ok("second") },
                FixedTool { id: "c.three", behaviour: Behaviour::Ok("third") },
            ]),
            oracle,
            sink.clone(),
        );

        let outcome = orch
            .execute(
                &task(),
                &plan(vec![step("s1", "a.one"), step("s2", "b.two"), step("s3", "c.three")]),
                &never_cancelled(),
            )
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.steps.len(), 2); // step 3 never ran
        assert_eq!(
            sink.step_statuses(),
            vec![
                (0, StepStatus::InProgress),
                (0, StepStatus::Completed),
                (1, StepStatus::InProgress),
                (1, StepStatus::Failed),
            ]
        );
        assert_eq!(sink.error_codes(), vec!["permission.denied"]);
        // The task error names the denied step.
        let step_ids: Vec<Option<String>> = sink
            .events()
            .iter()
            .filter_map(|e| match e {
                AgentEvent::TaskError { step_id, .. } => Some(step_id.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(step_ids, vec![Some("s2".to_string())]);
    }

    #[tokio::test]
    async fn ask_then_allow_proceeds() {
        let sink = RecordingSink::new();
        let oracle = Arc::new(ScriptedOracle {
            deny_tools: vec![],
            ask_tools: vec!["a.one"],
            ask_answer: Decision::Allow,
        });
        let orch = orchestrator(
            registry(vec![FixedTool { id: "a.one", behaviour: Behaviour::Ok("done") }]),
            oracle,
            sink.clone(),
        );

        let outcome = orch
            .execute(&task(), &plan(vec![step("s1", "a.one")]), &never_cancelled())
            .await;

        assert!(outcome.success);
        let prompts = sink
            .events()
            .iter()
            .filter(|e| matches!(e, AgentEvent::PermissionPrompt { .. }))
            .count();
        assert_eq!(prompts, 1);
    }

    #[tokio::test]
    async fn ask_then_deny_fails_step_and_stops() {
        let sink = RecordingSink::new();
        let oracle = Arc::new(ScriptedOracle {
            deny_tools: vec![],
            ask_tools: vec!["a.one"],
            ask_answer: Decision::Deny,
        });
        let orch = orchestrator(
            registry(vec![FixedTool { id: "a.one", behaviour: Behaviour::Ok("done") }]),
            oracle,
            sink.clone(),
        );

        let outcome = orch
            .execute(&task(), &plan(vec![step("s1", "a.one")]), &never_cancelled())
            .await;
        assert!(!outcome.success);
        assert_eq!(sink.error_codes(), vec!["permission.denied"]);
    }

    #[tokio::test]
    async fn missing_tool_continues_with_next_step() {
        let sink = RecordingSink::new();
        let orch = orchestrator(
            registry(vec![FixedTool { id: "b.two", behaviour: Behaviour::Ok("ran") }]),
            ScriptedOracle::allow_all(),
            sink.clone(),
        );

        let outcome = orch
            .execute(
                &task(),
                &plan(vec![step("s1", "ghost.tool"), step("s2", "b.two")]),
                &never_cancelled(),
            )
            .await;

        assert!(!outcome.success); // one step had no tool result
        assert_eq!(outcome.steps.len(), 2);
        assert_eq!(sink.error_codes(), vec!["tool.not_found"]);
        assert_eq!(
            sink.step_statuses(),
            vec![
                (0, StepStatus::InProgress),
                (0, StepStatus::Failed),
                (1, StepStatus::InProgress),
                (1, StepStatus::Completed),
            ]
        );
    }

    #[tokio::test]
    async fn logical_failure_marks_task_unsuccessful_but_continues() {
        let sink = RecordingSink::new();
        let orch = orchestrator(
            registry(vec![
                FixedTool { id: "a.one", behaviour: Behaviour::Fail("disk full") },
                FixedTool { id: "b.two", behaviour: Behaviour::Ok("ran") },
            ]),
            ScriptedOracle::allow_all(),
            sink.clone(),
        );

        let outcome = orch
            .execute(
                &task(),
                &plan(vec![step("s1", "a.one"), step("s2", "b.two")]),
                &never_cancelled(),
            )
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.steps.len(), 2);
        assert_eq!(sink.error_codes(), vec!["tool.failed"]);
    }

    #[tokio::test]
    async fn thrown_exception_is_reported_and_continues() {
        let sink = RecordingSink::new();
        let orch = orchestrator(
            registry(vec![
                FixedTool { id: "a.one", behaviour: Behaviour::Throw("panicked inside") },
                FixedTool { id: "b.two", behaviour: Behaviour::Ok("ran") },
            ]),
            ScriptedOracle::allow_all(),
            sink.clone(),
        );

        let outcome = orch
            .execute(
                &task(),
                &plan(vec![step("s1", "a.one"), step("s2", "b.two")]),
                &never_cancelled(),
            )
            .await;

        assert!(!outcome.success);
        assert_eq!(sink.error_codes(), vec!["tool.exception"]);
        assert_eq!(outcome.steps[0].error.as_deref(), Some("panicked inside"));
    }

    #[tokio::test]
    async fn cancellation_between_steps_prepends_notice() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let sink = RecordingSink::new();
        let orch = orchestrator(
            registry(vec![
                FixedTool { id: "a.one", behaviour: Behaviour::Ok("first") },
                FixedTool { id: "b.two", behaviour: Behaviour::Ok("second") },
            ]),
            ScriptedOracle::allow_all(),
            sink.clone(),
        );

        // Cancel after the first between-steps check passes.
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let probe: CancellationProbe =
            Arc::new(move || calls_clone.fetch_add(1, Ordering::SeqCst) >= 1);

        let outcome = orch
            .execute(
                &task(),
                &plan(vec![step("s1", "a.one"), step("s2", "b.two")]),
                &probe,
            )
            .await;

        assert!(outcome.cancelled);
        assert!(!outcome.success);
        assert_eq!(outcome.steps.len(), 1); // second step never started
        assert!(outcome.report.starts_with("Task cancelled by user."));
    }

    #[tokio::test]
    async fn summarizer_replaces_report_and_failure_is_swallowed() {
        struct GoodSummarizer;
        #[async_trait]
        impl ReportSummarizer for GoodSummarizer {
            async fn summarize(&self, _outcome: &TaskOutcome) -> Result<String, String> {
                Ok("short summary".into())
            }
        }

        struct BadSummarizer;
        #[async_trait]
        impl ReportSummarizer for BadSummarizer {
            async fn summarize(&self, _outcome: &TaskOutcome) -> Result<String, String> {
                Err("model unavailable".into())
            }
        }

        let make = |summarizer: Arc<dyn ReportSummarizer>| {
            orchestrator(
                registry(vec![FixedTool { id: "a.one", behaviour: Behaviour::Ok("out") }]),
                ScriptedOracle::allow_all(),
                RecordingSink::new(),
            )
            .with_summarizer(summarizer)
        };

        let good = make(Arc::new(GoodSummarizer))
            .execute(&task(), &plan(vec![step("s1", "a.one")]), &never_cancelled())
            .await;
        assert_eq!(good.report, "short summary");

        let bad = make(Arc::new(BadSummarizer))
            .execute(&task(), &plan(vec![step("s1", "a.one")]), &never_cancelled())
            .await;
        assert!(bad.report.contains("Goal: test goal"));
    }

    #[tokio::test]
    async fn run_task_emits_plan_then_steps_then_result() {
        use crate::llm::{LlmResponse, LlmRequest, LlmRouter};

        struct PlanRouter;
        #[async_trait]
        impl LlmRouter for PlanRouter {
            async fn complete(&self, _request: LlmRequest) -> Result<LlmResponse, CoreError> {
                Ok(LlmResponse {
                    text: serde_json::json!({
                        "goal": "g",
                        "steps": [{"id": "s1", "tool": "a.one", "intent": "run",
                                   "input": {}, "requiresPermission": false}]
                    })
                    .to_string(),
                    model: None,
                })
            }
        }

        let sink = RecordingSink::new();
        let orch = orchestrator(
            registry(vec![FixedTool { id: "a.one", behaviour: Behaviour::Ok("out") }]),
            ScriptedOracle::allow_all(),
            sink.clone(),
        );
        let planner = Planner::new(Arc::new(PlanRouter));

        let outcome = orch
            .run_task(&task(), &planner, &never_cancelled())
            .await
            .unwrap();
        assert!(outcome.success);

        let kinds: Vec<&'static str> = sink
            .events()
            .iter()
            .map(|e| match e {
                AgentEvent::TaskPlan { .. } => "plan",
                AgentEvent::TaskStep { .. } => "step",
                AgentEvent::TaskResult { .. } => "result",
                AgentEvent::TaskError { .. } => "error",
                AgentEvent::PermissionPrompt { .. } => "prompt",
            })
            .collect();
        assert_eq!(kinds, vec!["plan", "step", "step", "result"]);
    }

    #[tokio::test]
    async fn run_task_plan_failure_emits_error() {
        use crate::llm::{LlmResponse, LlmRequest, LlmRouter};

        struct ProseRouter;
        #[async_trait]
        impl LlmRouter for ProseRouter {
            async fn complete(&self, _request: LlmRequest) -> Result<LlmResponse, CoreError> {
                Ok(LlmResponse {
                    text: "I am unable to produce a plan.".into(),
                    model: None,
                })
            }
        }

        let sink = RecordingSink::new();
        let orch = orchestrator(
            registry(vec![]),
            ScriptedOracle::allow_all(),
            sink.clone(),
        );
        let planner = Planner::new(Arc::new(ProseRouter));

        let err = orch
            .run_task(&task(), &planner, &never_cancelled())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "task.plan_failed");
        assert_eq!(sink.error_codes(), vec!["task.plan_failed"]);
    }

    #[test]
    fn file_tool_scope_comes_from_input_path() {
        let step = AgentStep {
            id: "s1".into(),
            tool: "file.read".into(),
            intent: "read".into(),
            input: serde_json::json!({"path": "/home/u/doc.txt"}),
            requires_permission: true,
        };
        let request = build_permission_request(&task(), &step, 0, 1, "goal");
        assert_eq!(request.scope.as_deref(), Some("/home/u/doc.txt"));
        assert_eq!(request.risk, RiskLevel::Medium);
        assert!(!request.reversible);
    }

    #[test]
    fn file_scope_keys_are_checked_in_order() {
        let step = AgentStep {
            id: "s1".into(),
            tool: "file.copy".into(),
            intent: "copy".into(),
            input: serde_json::json!({"src": "/a", "inputPath": "/b"}),
            requires_permission: false,
        };
        let request = build_permission_request(&task(), &step, 0, 1, "goal");
        assert_eq!(request.scope.as_deref(), Some("/a"));
        assert_eq!(request.risk, RiskLevel::Low);
    }

    #[test]
    fn non_file_tool_scope_defaults_to_tool_id() {
        let step = AgentStep {
            id: "s1".into(),
            tool: "web.fetch".into(),
            intent: "fetch".into(),
            input: serde_json::json!({"path": "/ignored"}),
            requires_permission: false,
        };
        let request = build_permission_request(&task(), &step, 0, 1, "goal");
        assert_eq!(request.scope.as_deref(), Some("web.fetch"));
    }
}
