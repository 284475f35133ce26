//! The message envelope shared by both directions of the IPC transport.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::util::now_millis;

/// The closed set of recognised message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    #[serde(rename = "task.request")]
    TaskRequest,
    #[serde(rename = "task.stop")]
    TaskStop,
    #[serde(rename = "task.plan")]
    TaskPlan,
    #[serde(rename = "task.step")]
    TaskStep,
    #[serde(rename = "task.permission")]
    TaskPermission,
    #[serde(rename = "task.result")]
    TaskResult,
    #[serde(rename = "task.error")]
    TaskError,
    #[serde(rename = "permission.request")]
    PermissionRequest,
    #[serde(rename = "permission.response")]
    PermissionResponse,
    #[serde(rename = "llm.healthCheck")]
    LlmHealthCheck,
    #[serde(rename = "profile.list")]
    ProfileList,
    #[serde(rename = "profile.create")]
    ProfileCreate,
    #[serde(rename = "profile.delete")]
    ProfileDelete,
    #[serde(rename = "profile.switch")]
    ProfileSwitch,
    #[serde(rename = "profile.active")]
    ProfileActive,
    #[serde(rename = "profile.get")]
    ProfileGet,
    #[serde(rename = "profile.update")]
    ProfileUpdate,
    #[serde(rename = "chat.request")]
    ChatRequest,
    #[serde(rename = "chat.response")]
    ChatResponse,
    #[serde(rename = "chat.error")]
    ChatError,
    #[serde(rename = "memory.read")]
    MemoryRead,
    #[serde(rename = "memory.write")]
    MemoryWrite,
    #[serde(rename = "trust.prompt")]
    TrustPrompt,
    #[serde(rename = "system.event")]
    SystemEvent,
}

impl MessageType {
    /// Parse from the wire string; `None` for anything outside the set.
    pub fn parse(raw: &str) -> Option<Self> {
        serde_json::from_value(Value::String(raw.to_string())).ok()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::TaskRequest => "task.request",
            MessageType::TaskStop => "task.stop",
            MessageType::TaskPlan => "task.plan",
            MessageType::TaskStep => "task.step",
            MessageType::TaskPermission => "task.permission",
            MessageType::TaskResult => "task.result",
            MessageType::TaskError => "task.error",
            MessageType::PermissionRequest => "permission.request",
            MessageType::PermissionResponse => "permission.response",
            MessageType::LlmHealthCheck => "llm.healthCheck",
            MessageType::ProfileList => "profile.list",
            MessageType::ProfileCreate => "profile.create",
            MessageType::ProfileDelete => "profile.delete",
            MessageType::ProfileSwitch => "profile.switch",
            MessageType::ProfileActive => "profile.active",
            MessageType::ProfileGet => "profile.get",
            MessageType::ProfileUpdate => "profile.update",
            MessageType::ChatRequest => "chat.request",
            MessageType::ChatResponse => "chat.response",
            MessageType::ChatError => "chat.error",
            MessageType::MemoryRead => "memory.read",
            MessageType::MemoryWrite => "memory.write",
            MessageType::TrustPrompt => "trust.prompt",
            MessageType::SystemEvent => "system.event",
        }
    }
}

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageSource {
    Ui,
    Agent,
    Tool,
    System,
}

/// The bidirectional IPC envelope.
///
/// `id` uniquely identifies the message; `correlation_id` links a
/// request/response family; `reply_to` points at the concrete message being
/// answered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActaMessage {
    pub id: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub source: MessageSource,
    pub timestamp: i64,
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

impl ActaMessage {
    /// New envelope with a fresh id and the current timestamp.
    pub fn new(message_type: MessageType, source: MessageSource, payload: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            message_type,
            source,
            timestamp: now_millis(),
            payload,
            profile_id: None,
            correlation_id: None,
            reply_to: None,
        }
    }

    pub fn with_correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_profile(mut self, profile_id: impl Into<String>) -> Self {
        self.profile_id = Some(profile_id.into());
        self
    }

    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_strings_round_trip() {
        for t in [
            MessageType::TaskRequest,
            MessageType::LlmHealthCheck,
            MessageType::PermissionResponse,
            MessageType::SystemEvent,
        ] {
            assert_eq!(MessageType::parse(t.as_str()), Some(t));
        }
    }

    #[test]
    fn unknown_type_does_not_parse() {
        assert_eq!(MessageType::parse("task.unknown"), None);
        assert_eq!(MessageType::parse(""), None);
    }

    #[test]
    fn envelope_serialises_with_type_key() {
        let msg = ActaMessage::new(
            MessageType::TaskResult,
            MessageSource::Agent,
            serde_json::json!({"success": true}),
        )
        .with_correlation("corr-1")
        .with_profile("default");

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "task.result");
        assert_eq!(json["source"], "agent");
        assert_eq!(json["correlationId"], "corr-1");
        assert_eq!(json["profileId"], "default");
        assert!(json.get("replyTo").is_none());
    }

    #[test]
    fn envelope_deserialises_from_wire_shape() {
        let raw = serde_json::json!({
            "id": "m-1",
            "type": "permission.response",
            "source": "ui",
            "timestamp": 123,
            "payload": {"requestId": "r-1", "decision": "allow"},
            "replyTo": "m-0"
        });
        let msg: ActaMessage = serde_json::from_value(raw).unwrap();
        assert_eq!(msg.message_type, MessageType::PermissionResponse);
        assert_eq!(msg.reply_to.as_deref(), Some("m-0"));
    }

    #[test]
    fn fresh_envelopes_get_unique_ids() {
        let a = ActaMessage::new(MessageType::SystemEvent, MessageSource::System, Value::Null);
        let b = ActaMessage::new(MessageType::SystemEvent, MessageSource::System, Value::Null);
        assert_ne!(a.id, b.id);
    }
}
