//! Agent pipeline: plan → safety gate → step execution, plus the
//! single-flight task service.

pub mod orchestrator;
pub mod plan;
pub mod planner;
pub mod safety;
pub mod service;

pub use orchestrator::{
    CancellationProbe, Orchestrator, PermissionOracle, ReportSummarizer, RuntimeTask, StepRecord,
    TaskObserver, TaskOutcome, TrustOracle,
};
pub use plan::{AgentPlan, AgentStep};
pub use planner::{Planner, PlannerConfig};
pub use safety::{SafetyGate, SafetyViolation};
pub use service::{AgentService, RunningTaskInfo};
