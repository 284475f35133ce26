//! Permission prompt coordinator.
//!
//! Correlates outbound `permission.request` envelopes with inbound
//! `permission.response` messages. Each pending prompt is a slot holding a
//! one-shot completion and a cancel handle for its 30 s timeout timer; slot
//! removal and completion happen inside one critical section so a late
//! response can never race an already-timed-out slot.

use std::{collections::HashMap, sync::Arc, sync::Mutex, time::Duration};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::audit::{AuditEvent, AuditKind, AuditLog};
use crate::events::{OutboundBus, PromptPublisher};
use crate::ipc::envelope::{ActaMessage, MessageSource, MessageType};
use crate::profile::ProfileManager;
use crate::trust::{Decision, NewRule, PermissionRequest, Remember};
use crate::util::now_millis;

/// How long a prompt may stay unanswered before it resolves to deny.
pub const PERMISSION_TIMEOUT: Duration = Duration::from_secs(30);

// ─── Rule persistence seam ──────────────────────────────────────────────────

/// Persists a user's "remember this" choice as a durable allow rule.
pub trait RuleSink: Send + Sync {
    fn remember_allow(&self, profile_id: &str, tool: &str, scope_prefix: Option<&str>);
}

impl RuleSink for ProfileManager {
    fn remember_allow(&self, profile_id: &str, tool: &str, scope_prefix: Option<&str>) {
        let result = self
            .get_profile(profile_id)
            .and_then(|profile| self.rule_store(&profile))
            .map(|store| {
                store.upsert(NewRule {
                    tool: tool.to_string(),
                    scope_prefix: scope_prefix.map(str::to_string),
                    decision: Decision::Allow,
                    remember: Some(Remember::Persistent),
                })
            });
        match result {
            Ok(Ok(rule)) => tracing::info!(rule = %rule.id, profile = %profile_id, "remembered allow rule"),
            Ok(Err(e)) => tracing::warn!(error = %e, "failed to persist remembered rule"),
            Err(e) => tracing::warn!(error = %e, "failed to resolve rule store for remembered rule"),
        }
    }
}

// ─── Pending state ──────────────────────────────────────────────────────────

struct PendingDecision {
    tx: oneshot::Sender<Decision>,
    timeout: JoinHandle<()>,
}

#[derive(Clone)]
struct PendingContext {
    request: PermissionRequest,
    correlation_id: String,
    profile_id: String,
}

#[derive(Default)]
struct CoordinatorState {
    decisions: HashMap<String, PendingDecision>,
    contexts: HashMap<String, PendingContext>,
    /// `<correlationId>:<requestId>` → envelope id.
    index: HashMap<String, String>,
}

fn request_key(correlation_id: &str, request_id: &str) -> String {
    format!("{correlation_id}:{request_id}")
}

// ─── Coordinator ────────────────────────────────────────────────────────────

/// Owns the pending-prompt maps and the prompt/response/timeout lifecycle.
pub struct PermissionCoordinator {
    state: Arc<Mutex<CoordinatorState>>,
    bus: Arc<OutboundBus>,
    audit: Arc<AuditLog>,
    rules: Arc<dyn RuleSink>,
    timeout: Duration,
}

impl PermissionCoordinator {
    pub fn new(bus: Arc<OutboundBus>, audit: Arc<AuditLog>, rules: Arc<dyn RuleSink>) -> Self {
        Self {
            state: Arc::new(Mutex::new(CoordinatorState::default())),
            bus,
            audit,
            rules,
            timeout: PERMISSION_TIMEOUT,
        }
    }

    /// Override the prompt timeout (tests use milliseconds).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Numbers of pending decisions, contexts, and index entries.
    pub fn pending_counts(&self) -> (usize, usize, usize) {
        let state = self.state.lock().expect("permission state lock poisoned");
        (
            state.decisions.len(),
            state.contexts.len(),
            state.index.len(),
        )
    }

    /// Suspend until the user answers the prompt for `request`, or the
    /// timeout resolves it to deny.
    pub async fn wait_for_permission(
        &self,
        request: &PermissionRequest,
        correlation_id: &str,
    ) -> Decision {
        let mut request = request.clone();
        if request.id.is_empty() {
            request.id = uuid::Uuid::new_v4().to_string();
        }
        let key = request_key(correlation_id, &request.id);
        let (tx, rx) = oneshot::channel();

        {
            let mut state = self.state.lock().expect("permission state lock poisoned");
            let msg_id = match state.index.get(&key) {
                Some(existing) => existing.clone(),
                None => {
                    let fresh = uuid::Uuid::new_v4().to_string();
                    state.index.insert(key.clone(), fresh.clone());
                    fresh
                }
            };

            // A newer wait supersedes any prior pending decision for the
            // same prompt; the superseded waiter resolves to deny.
            if let Some(previous) = state.decisions.remove(&msg_id) {
                previous.timeout.abort();
            }

            let timeout_handle = tokio::spawn(Self::timeout_task(
                self.state.clone(),
                self.audit.clone(),
                msg_id.clone(),
                self.timeout,
            ));
            state.decisions.insert(
                msg_id.clone(),
                PendingDecision {
                    tx,
                    timeout: timeout_handle,
                },
            );
            state.contexts.entry(msg_id).or_insert(PendingContext {
                request: request.clone(),
                correlation_id: correlation_id.to_string(),
                profile_id: request.profile_id.clone(),
            });
        }

        // A dropped sender means the slot was superseded or shut down.
        rx.await.unwrap_or(Decision::Deny)
    }

    async fn timeout_task(
        state: Arc<Mutex<CoordinatorState>>,
        audit: Arc<AuditLog>,
        msg_id: String,
        timeout: Duration,
    ) {
        tokio::time::sleep(timeout).await;
        let (pending, context) = {
            let mut state = state.lock().expect("permission state lock poisoned");
            let Some(pending) = state.decisions.remove(&msg_id) else {
                return; // already resolved
            };
            let context = state.contexts.remove(&msg_id);
            if let Some(ctx) = &context {
                state
                    .index
                    .remove(&request_key(&ctx.correlation_id, &ctx.request.id));
            }
            (pending, context)
        };

        if let Some(ctx) = context {
            audit.append(
                AuditEvent::new(
                    AuditKind::Timeout,
                    &ctx.request.id,
                    &ctx.correlation_id,
                    &ctx.profile_id,
                    &ctx.request.tool,
                )
                .with_decision(Decision::Deny),
            );
        }
        tracing::warn!(msg_id = %msg_id, "permission prompt timed out, denying");
        let _ = pending.tx.send(Decision::Deny);
    }

    /// Handle an inbound `permission.response` envelope. Unknown or
    /// already-resolved prompts are logged and discarded.
    pub fn handle_response(&self, envelope: &ActaMessage) {
        let payload_request_id = envelope
            .payload
            .get("requestId")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let raw_decision = envelope
            .payload
            .get("decision")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let remember = envelope
            .payload
            .get("remember")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let (pending, context) = {
            let mut state = self.state.lock().expect("permission state lock poisoned");
            let msg_id = match &envelope.reply_to {
                Some(reply_to) => Some(reply_to.clone()),
                None => envelope.correlation_id.as_deref().and_then(|correlation| {
                    state
                        .index
                        .get(&request_key(correlation, payload_request_id))
                        .cloned()
                }),
            };

            let Some(msg_id) = msg_id else {
                drop(state);
                self.discard_orphan(envelope, payload_request_id);
                return;
            };
            let Some(pending) = state.decisions.remove(&msg_id) else {
                drop(state);
                self.discard_orphan(envelope, payload_request_id);
                return;
            };
            let context = state.contexts.remove(&msg_id);
            if let Some(ctx) = &context {
                state
                    .index
                    .remove(&request_key(&ctx.correlation_id, &ctx.request.id));
            }
            (pending, context)
        };

        pending.timeout.abort();

        // Anything that is not an explicit deny counts as allow.
        let decision = if raw_decision == "deny" {
            Decision::Deny
        } else {
            Decision::Allow
        };

        if let Some(ctx) = &context {
            // Only allow decisions become durable rules; a remembered deny
            // is recorded in the audit trail but adds no rule.
            if remember && decision == Decision::Allow {
                self.rules.remember_allow(
                    &ctx.profile_id,
                    &ctx.request.tool,
                    ctx.request.scope.as_deref(),
                );
            }
            self.audit.append(
                AuditEvent::new(
                    AuditKind::Decision,
                    &ctx.request.id,
                    &ctx.correlation_id,
                    &ctx.profile_id,
                    &ctx.request.tool,
                )
                .with_decision(decision)
                .with_remember(remember),
            );
        }

        let _ = pending.tx.send(decision);
    }

    fn discard_orphan(&self, envelope: &ActaMessage, request_id: &str) {
        tracing::warn!(
            envelope_id = %envelope.id,
            request_id = %request_id,
            "permission response without a pending prompt, ignoring"
        );
        self.audit.append(AuditEvent::new(
            AuditKind::OrphanResponse,
            request_id,
            envelope.correlation_id.as_deref().unwrap_or(""),
            envelope.profile_id.as_deref().unwrap_or(""),
            "",
        ));
    }

    /// Resolve every pending prompt to deny and clear all maps.
    pub fn shutdown(&self) {
        let drained: Vec<(String, PendingDecision)> = {
            let mut state = self.state.lock().expect("permission state lock poisoned");
            state.contexts.clear();
            state.index.clear();
            state.decisions.drain().collect()
        };
        for (msg_id, pending) in drained {
            pending.timeout.abort();
            tracing::debug!(msg_id = %msg_id, "resolving pending prompt on shutdown");
            let _ = pending.tx.send(Decision::Deny);
        }
    }
}

impl PromptPublisher for PermissionCoordinator {
    /// Broadcast a prompt envelope and register its correlation state.
    fn publish_prompt(
        &self,
        request: &PermissionRequest,
        correlation_id: &str,
        profile_id: &str,
    ) -> String {
        let mut request = request.clone();
        if request.id.is_empty() {
            request.id = uuid::Uuid::new_v4().to_string();
        }
        let key = request_key(correlation_id, &request.id);
        let msg_id = uuid::Uuid::new_v4().to_string();

        {
            let mut state = self.state.lock().expect("permission state lock poisoned");
            state.index.insert(key, msg_id.clone());
            state.contexts.insert(
                msg_id.clone(),
                PendingContext {
                    request: request.clone(),
                    correlation_id: correlation_id.to_string(),
                    profile_id: profile_id.to_string(),
                },
            );
        }

        let envelope = ActaMessage {
            id: msg_id.clone(),
            message_type: MessageType::PermissionRequest,
            source: MessageSource::Agent,
            timestamp: now_millis(),
            payload: serde_json::to_value(&request).unwrap_or_default(),
            profile_id: Some(profile_id.to_string()),
            correlation_id: Some(correlation_id.to_string()),
            reply_to: None,
        };
        self.bus.publish(envelope);

        self.audit.append(AuditEvent::new(
            AuditKind::Request,
            &request.id,
            correlation_id,
            profile_id,
            &request.tool,
        ));
        msg_id
    }
}
