//! Agent execution core of the ACTA local assistant.
//!
//! One task at a time flows through: IPC validation → single-flight task
//! service → planner → safety gate → step orchestration, with every step
//! gated by the trust engine and, when the answer is "ask", an interactive
//! permission prompt coordinated over the IPC transport. All durable state
//! (profile documents, remembered trust rules, the active-profile pointer)
//! is partitioned by profile under one store root.
//!
//! The embedding process supplies the transport, the tool implementations,
//! and the model-provider adapters; this crate defines those seams and owns
//! everything between them.

pub mod agent;
pub mod error;
pub mod events;
pub mod ipc;
pub mod llm;
pub mod permission;
pub mod profile;
pub mod tools;
pub mod trust;
mod util;

/// Convenience re-exports for the most commonly used types across the core.
///
/// ```rust
/// use acta::prelude::*;
/// ```
pub mod prelude {
    // Agent pipeline
    pub use crate::agent::{
        AgentPlan, AgentService, AgentStep, CancellationProbe, Orchestrator, PermissionOracle,
        Planner, RuntimeTask, SafetyGate, TaskOutcome, TrustOracle,
    };

    // Trust
    pub use crate::trust::{
        Decision, HardBlockConfig, PermissionDecision, PermissionRequest, RiskLevel, RuleStore,
        TrustEngine, TrustRule,
    };

    // Permission flow
    pub use crate::permission::{AuditLog, PermissionCoordinator};

    // Profiles
    pub use crate::profile::{LlmConfig, Profile, ProfileManager};

    // LLM access
    pub use crate::llm::{HttpClient, LlmRequest, LlmResponse, LlmRouter};

    // Events and IPC
    pub use crate::events::{AgentEvent, EventSink, OutboundBus};
    pub use crate::ipc::{ActaMessage, Dispatcher, MessageType};

    // Tools
    pub use crate::tools::{Tool, ToolContext, ToolRegistry, ToolResult};

    // Errors
    pub use crate::error::CoreError;
}
