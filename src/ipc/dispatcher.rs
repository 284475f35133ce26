//! Routes validated inbound envelopes to the subsystems that consume them.
//!
//! The dispatcher owns no policy: it validates, then hands `task.stop` to
//! the agent service, `permission.response` to the coordinator, and answers
//! `llm.healthCheck` probes through the injected router. Accepted tasks and
//! unconsumed types go back to the embedding process. Validation failures
//! become error reply envelopes.

use std::sync::Arc;

use serde_json::Value;

use super::envelope::{ActaMessage, MessageSource, MessageType};
use super::validator::{validate_envelope, validate_payload};
use crate::agent::AgentService;
use crate::llm::{HealthCheckConfig, LlmRouter};
use crate::permission::PermissionCoordinator;

/// What the dispatcher did with a message.
#[derive(Debug)]
pub enum Routed {
    /// An accepted `task.request`: the embedding process should start it
    /// through the agent service.
    Task {
        envelope: ActaMessage,
        input: String,
        attachments: Vec<String>,
    },
    /// `task.stop` was applied; carries whether a task was actually stopped.
    Stopped(bool),
    /// `permission.response` was consumed by the coordinator.
    PermissionHandled,
    /// The `llm.healthCheck` response envelope, already answered through
    /// the router; send it back on the transport.
    HealthCheck(ActaMessage),
    /// A valid envelope the core does not consume.
    Passthrough(ActaMessage),
}

pub struct Dispatcher {
    service: Arc<AgentService>,
    coordinator: Arc<PermissionCoordinator>,
    router: Arc<dyn LlmRouter>,
}

impl Dispatcher {
    pub fn new(
        service: Arc<AgentService>,
        coordinator: Arc<PermissionCoordinator>,
        router: Arc<dyn LlmRouter>,
    ) -> Self {
        Self {
            service,
            coordinator,
            router,
        }
    }

    /// Validate and route one raw message. On failure the returned envelope
    /// is the error reply to send back.
    pub async fn handle(&self, raw: &Value) -> Result<Routed, ActaMessage> {
        let envelope = validate_envelope(raw).map_err(|e| error_reply(raw, e.code, &e.message))?;
        validate_payload(envelope.message_type, &envelope.payload)
            .map_err(|e| reply_for(&envelope, e.code, &e.message))?;

        match envelope.message_type {
            MessageType::TaskRequest => {
                let input = envelope
                    .payload
                    .get("input")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let attachments = envelope
                    .payload
                    .pointer("/context/files")
                    .and_then(Value::as_array)
                    .map(|files| {
                        files
                            .iter()
                            .filter_map(|f| f.as_str().map(str::to_string))
                            .collect()
                    })
                    .unwrap_or_default();
                Ok(Routed::Task {
                    envelope,
                    input,
                    attachments,
                })
            }
            MessageType::TaskStop => {
                let correlation = envelope
                    .payload
                    .get("correlationId")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .or(envelope.correlation_id.clone());
                Ok(Routed::Stopped(
                    self.service.request_stop(correlation.as_deref()),
                ))
            }
            MessageType::PermissionResponse => {
                self.coordinator.handle_response(&envelope);
                Ok(Routed::PermissionHandled)
            }
            MessageType::LlmHealthCheck => {
                let mut config = envelope
                    .payload
                    .get("config")
                    .and_then(|value| {
                        serde_json::from_value::<HealthCheckConfig>(value.clone()).ok()
                    })
                    .unwrap_or_default();
                if config.profile_id.is_none() {
                    config.profile_id = envelope
                        .payload
                        .get("profileId")
                        .and_then(Value::as_str)
                        .map(str::to_string);
                }
                let status = self.router.health_check(config).await;
                let mut reply = ActaMessage::new(
                    MessageType::LlmHealthCheck,
                    MessageSource::System,
                    serde_json::to_value(&status).unwrap_or_default(),
                )
                .with_reply_to(&envelope.id);
                if let Some(correlation) = &envelope.correlation_id {
                    reply = reply.with_correlation(correlation.clone());
                }
                Ok(Routed::HealthCheck(reply))
            }
            _ => Ok(Routed::Passthrough(envelope)),
        }
    }
}

/// Error reply for a message that failed envelope validation; best-effort
/// linkage to whatever ids the raw value carried.
fn error_reply(raw: &Value, code: &'static str, message: &str) -> ActaMessage {
    let mut reply = ActaMessage::new(
        MessageType::TaskError,
        MessageSource::System,
        serde_json::json!({"taskId": "", "code": code, "message": message}),
    );
    if let Some(id) = raw.get("id").and_then(Value::as_str) {
        reply = reply.with_reply_to(id);
    }
    if let Some(correlation) = raw.get("correlationId").and_then(Value::as_str) {
        reply = reply.with_correlation(correlation);
    }
    reply
}

/// Error reply for a payload failure on a decoded envelope. Chat messages
/// answer with `chat.error`, everything else with `task.error`.
fn reply_for(envelope: &ActaMessage, code: &'static str, message: &str) -> ActaMessage {
    let reply_type = match envelope.message_type {
        MessageType::ChatRequest | MessageType::ChatResponse | MessageType::ChatError => {
            MessageType::ChatError
        }
        _ => MessageType::TaskError,
    };
    let payload = match reply_type {
        MessageType::ChatError => serde_json::json!({"code": code, "message": message}),
        _ => serde_json::json!({"taskId": "", "code": code, "message": message}),
    };
    let mut reply =
        ActaMessage::new(reply_type, MessageSource::System, payload).with_reply_to(&envelope.id);
    if let Some(correlation) = &envelope.correlation_id {
        reply = reply.with_correlation(correlation.clone());
    }
    reply
}
