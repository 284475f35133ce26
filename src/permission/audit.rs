//! Append-only audit trail of permission activity.
//!
//! Kept in memory behind a mutex with a snapshot accessor so the embedding
//! process can render a permission history; every entry is mirrored to the
//! structured log.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::trust::Decision;
use crate::util::now_millis;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditKind {
    #[serde(rename = "permission.request")]
    Request,
    #[serde(rename = "permission.decision")]
    Decision,
    #[serde(rename = "permission.timeout")]
    Timeout,
    #[serde(rename = "permission.orphan_response")]
    OrphanResponse,
}

/// One entry in the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    #[serde(rename = "type")]
    pub kind: AuditKind,
    pub timestamp: i64,
    pub request_id: String,
    pub correlation_id: String,
    pub profile_id: String,
    pub tool: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remember: Option<bool>,
}

impl AuditEvent {
    pub fn new(
        kind: AuditKind,
        request_id: impl Into<String>,
        correlation_id: impl Into<String>,
        profile_id: impl Into<String>,
        tool: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            timestamp: now_millis(),
            request_id: request_id.into(),
            correlation_id: correlation_id.into(),
            profile_id: profile_id.into(),
            tool: tool.into(),
            decision: None,
            remember: None,
        }
    }

    pub fn with_decision(mut self, decision: Decision) -> Self {
        self.decision = Some(decision);
        self
    }

    pub fn with_remember(mut self, remember: bool) -> Self {
        self.remember = Some(remember);
        self
    }
}

/// Shared audit trail. Clone the `Arc`, not the log.
pub struct AuditLog {
    entries: Mutex<Vec<AuditEvent>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn append(&self, event: AuditEvent) {
        tracing::info!(
            kind = ?event.kind,
            request_id = %event.request_id,
            tool = %event.tool,
            decision = ?event.decision,
            remember = ?event.remember,
            "permission audit"
        );
        self.entries
            .lock()
            .expect("audit log lock poisoned")
            .push(event);
    }

    /// Snapshot of the trail, oldest first.
    pub fn snapshot(&self) -> Vec<AuditEvent> {
        self.entries
            .lock()
            .expect("audit log lock poisoned")
            .clone()
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_snapshot() {
        let log = AuditLog::new();
        log.append(
            AuditEvent::new(AuditKind::Request, "r1", "c1", "default", "file.read"),
        );
        log.append(
            AuditEvent::new(AuditKind::Decision, "r1", "c1", "default", "file.read")
                .with_decision(Decision::Allow)
                .with_remember(true),
        );

        let entries = log.snapshot();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, AuditKind::Request);
        assert_eq!(entries[1].decision, Some(Decision::Allow));
        assert_eq!(entries[1].remember, Some(true));
    }

    #[test]
    fn kind_serialises_with_dotted_names() {
        let event = AuditEvent::new(AuditKind::Timeout, "r1", "c1", "default", "file.read");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "permission.timeout");
        assert_eq!(json["requestId"], "r1");
    }
}
