//! Shared types for the trust subsystem.
//!
//! Serialised shapes use camelCase keys: they appear verbatim in persisted
//! rule files, profile documents, and IPC payloads.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Integer trust tier, 0–4. Higher values allow more without prompting.
pub type TrustLevel = u8;

/// Trust level assumed when a profile does not set one.
pub const DEFAULT_TRUST_LEVEL: TrustLevel = 2;

// ─── Decisions ──────────────────────────────────────────────────────────────

/// Risk tier of a permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// Outcome of a trust evaluation or a user prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Deny,
    Ask,
    Allow,
}

/// Which evaluation stage produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecisionSource {
    HardBlock,
    Rule,
    ToolDefault,
    DomainDefault,
    ProfileDefault,
}

/// How long a remembered rule should live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Remember {
    Session,
    Persistent,
}

// ─── TrustRule ──────────────────────────────────────────────────────────────

/// A remembered decision stored durably per profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustRule {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    pub tool: String,
    /// When absent the rule matches any scope of the tool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope_prefix: Option<String>,
    pub decision: Decision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remember: Option<Remember>,
}

impl TrustRule {
    /// Whether this rule matches a request for `tool` with the given `scope`.
    pub fn matches(&self, tool: &str, scope: Option<&str>) -> bool {
        if self.tool != tool {
            return false;
        }
        match &self.scope_prefix {
            None => true,
            Some(prefix) => scope.is_some_and(|s| s.starts_with(prefix.as_str())),
        }
    }
}

// ─── HardBlockConfig ────────────────────────────────────────────────────────

/// Non-overridable deny lists checked before every other stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HardBlockConfig {
    /// Exact tool ids.
    pub blocked_tools: Vec<String>,
    /// Exact domain names (the part of a tool id before the first `.`).
    pub blocked_domains: Vec<String>,
    /// String prefixes matched against the request scope.
    pub blocked_scope_prefixes: Vec<String>,
}

// ─── TrustConfig ────────────────────────────────────────────────────────────

/// Per-profile trust settings: a default level plus per-tool and per-domain
/// overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrustConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_trust_level: Option<TrustLevel>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub tools: HashMap<String, TrustLevel>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub domains: HashMap<String, TrustLevel>,
}

impl TrustConfig {
    pub fn effective_default(&self) -> TrustLevel {
        self.default_trust_level.unwrap_or(DEFAULT_TRUST_LEVEL)
    }
}

// ─── PermissionRequest / PermissionDecision ─────────────────────────────────

/// A runtime-authored description of an action whose policy must be checked.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRequest {
    pub id: String,
    pub tool: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    pub action: String,
    pub reason: String,
    /// File path or sub-resource identifier, matched by prefix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub risk: RiskLevel,
    pub reversible: bool,
    pub timestamp: i64,
    pub profile_id: String,
}

impl PermissionRequest {
    /// Explicit domain, or the substring of the tool id before the first `.`.
    pub fn effective_domain(&self) -> Option<&str> {
        if let Some(domain) = self.domain.as_deref()
            && !domain.is_empty()
        {
            return Some(domain);
        }
        match self.tool.split_once('.') {
            Some((domain, _)) if !domain.is_empty() => Some(domain),
            _ => None,
        }
    }
}

/// The evaluator's verdict for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionDecision {
    pub request_id: String,
    pub decision: Decision,
    pub trust_level: TrustLevel,
    pub reason: String,
    pub source: DecisionSource,
}
