//! Typed outbound events and the broadcast bus carrying them to the IPC
//! writer.
//!
//! The orchestrator never constructs envelopes itself: it emits
//! [`AgentEvent`] values through an [`EventSink`]. The default sink turns
//! each event into an [`ActaMessage`] on the [`OutboundBus`], except
//! permission prompts, which route through the permission coordinator so it
//! can track the envelope id it hands out. Publishing never blocks; slow
//! subscribers observe a lag error on their receiver instead of slowing the
//! producer, and events from one task reach the channel in emit order.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::agent::plan::AgentPlan;
use crate::ipc::envelope::{ActaMessage, MessageSource, MessageType};
use crate::trust::PermissionRequest;

const DEFAULT_CAPACITY: usize = 1024;

// ─── Event payloads ─────────────────────────────────────────────────────────

/// Lifecycle of one step on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    InProgress,
    Completed,
    Failed,
}

/// Payload of a `task.step` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepEvent {
    pub step_id: String,
    pub tool: String,
    pub index: usize,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Everything the agent side reports while running a task.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    TaskPlan {
        task_id: String,
        correlation_id: String,
        profile_id: String,
        plan: AgentPlan,
    },
    TaskStep {
        task_id: String,
        correlation_id: String,
        profile_id: String,
        step: StepEvent,
    },
    TaskResult {
        task_id: String,
        correlation_id: String,
        profile_id: String,
        success: bool,
        cancelled: bool,
        report: String,
        artifacts: Vec<String>,
    },
    TaskError {
        task_id: String,
        correlation_id: String,
        profile_id: String,
        code: &'static str,
        message: String,
        step_id: Option<String>,
    },
    /// A step needs an interactive decision; routed to the permission
    /// coordinator rather than straight to the bus.
    PermissionPrompt {
        request: PermissionRequest,
        correlation_id: String,
        profile_id: String,
    },
}

impl AgentEvent {
    pub fn message_type(&self) -> MessageType {
        match self {
            AgentEvent::TaskPlan { .. } => MessageType::TaskPlan,
            AgentEvent::TaskStep { .. } => MessageType::TaskStep,
            AgentEvent::TaskResult { .. } => MessageType::TaskResult,
            AgentEvent::TaskError { .. } => MessageType::TaskError,
            AgentEvent::PermissionPrompt { .. } => MessageType::PermissionRequest,
        }
    }

    /// Build the outbound envelope for this event.
    pub fn into_envelope(self) -> ActaMessage {
        let message_type = self.message_type();
        match self {
            AgentEvent::TaskPlan {
                task_id,
                correlation_id,
                profile_id,
                plan,
            } => ActaMessage::new(
                message_type,
                MessageSource::Agent,
                serde_json::json!({"taskId": task_id, "plan": plan}),
            )
            .with_correlation(correlation_id)
            .with_profile(profile_id),
            AgentEvent::TaskStep {
                task_id,
                correlation_id,
                profile_id,
                step,
            } => {
                let mut payload = serde_json::to_value(&step).unwrap_or_default();
                if let Some(map) = payload.as_object_mut() {
                    map.insert("taskId".into(), serde_json::json!(task_id));
                }
                ActaMessage::new(message_type, MessageSource::Agent, payload)
                    .with_correlation(correlation_id)
                    .with_profile(profile_id)
            }
            AgentEvent::TaskResult {
                task_id,
                correlation_id,
                profile_id,
                success,
                cancelled,
                report,
                artifacts,
            } => ActaMessage::new(
                message_type,
                MessageSource::Agent,
                serde_json::json!({
                    "taskId": task_id,
                    "success": success,
                    "cancelled": cancelled,
                    "report": report,
                    "artifacts": artifacts,
                }),
            )
            .with_correlation(correlation_id)
            .with_profile(profile_id),
            AgentEvent::TaskError {
                task_id,
                correlation_id,
                profile_id,
                code,
                message,
                step_id,
            } => {
                let mut payload = serde_json::json!({
                    "taskId": task_id,
                    "code": code,
                    "message": message,
                });
                if let (Some(map), Some(step_id)) = (payload.as_object_mut(), step_id) {
                    map.insert("stepId".into(), serde_json::json!(step_id));
                }
                ActaMessage::new(message_type, MessageSource::Agent, payload)
                    .with_correlation(correlation_id)
                    .with_profile(profile_id)
            }
            AgentEvent::PermissionPrompt {
                request,
                correlation_id,
                profile_id,
            } => ActaMessage::new(
                message_type,
                MessageSource::Agent,
                serde_json::to_value(&request).unwrap_or_default(),
            )
            .with_correlation(correlation_id)
            .with_profile(profile_id),
        }
    }
}

// ─── Sinks and the bus ──────────────────────────────────────────────────────

/// Receives orchestrator events. Implementations must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: AgentEvent);
}

/// Publishes permission prompts, returning the envelope id used, so waits
/// can correlate responses later.
pub trait PromptPublisher: Send + Sync {
    fn publish_prompt(
        &self,
        request: &PermissionRequest,
        correlation_id: &str,
        profile_id: &str,
    ) -> String;
}

/// Broadcast channel of outbound envelopes consumed by the IPC writer.
pub struct OutboundBus {
    sender: broadcast::Sender<ActaMessage>,
}

impl OutboundBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an envelope. Having no subscribers is not an error.
    pub fn publish(&self, message: ActaMessage) {
        let _ = self.sender.send(message);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ActaMessage> {
        self.sender.subscribe()
    }
}

impl Default for OutboundBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Default sink: envelopes onto the bus, prompts through the coordinator.
pub struct EnvelopeSink {
    bus: Arc<OutboundBus>,
    prompts: Arc<dyn PromptPublisher>,
}

impl EnvelopeSink {
    pub fn new(bus: Arc<OutboundBus>, prompts: Arc<dyn PromptPublisher>) -> Self {
        Self { bus, prompts }
    }
}

impl EventSink for EnvelopeSink {
    fn emit(&self, event: AgentEvent) {
        match event {
            AgentEvent::PermissionPrompt {
                request,
                correlation_id,
                profile_id,
            } => {
                self.prompts
                    .publish_prompt(&request, &correlation_id, &profile_id);
            }
            other => self.bus.publish(other.into_envelope()),
        }
    }
}
