//! Profile document schema and validation.
//!
//! Profiles are the unit of isolation: identity, trust settings, LLM
//! configuration, and the relative sub-paths anchoring per-profile state.
//! The serialised shape uses camelCase keys and is what lands in
//! `<root>/<id>/profile.json`.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::ProfileError;
use crate::trust::TrustConfig;
use crate::util::now_millis;

pub const PROFILE_SCHEMA_VERSION: u32 = 1;

/// Default model assigned when a configuration names none.
pub const DEFAULT_MODEL: &str = "llama3:8b";

/// Default base URL for the Ollama adapter.
pub const OLLAMA_DEFAULT_BASE_URL: &str = "http://localhost:11434";

static PROFILE_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    // The pattern is a compile-time constant.
    Regex::new("^[a-z0-9][a-z0-9-_]{2,63}$").expect("profile id regex")
});

/// Whether `id` is a well-formed profile identity. The character set rules
/// out separators and `..`, so a valid id can never escape the root.
pub fn is_valid_profile_id(id: &str) -> bool {
    PROFILE_ID_RE.is_match(id)
}

/// A safe relative path: no leading separator, no drive letter, no `..`
/// segment.
pub fn is_safe_relative_path(path: &str) -> bool {
    if path.is_empty() || path.starts_with('/') || path.starts_with('\\') {
        return false;
    }
    if path.len() >= 2 && path.as_bytes()[1] == b':' {
        return false;
    }
    !path.split(['/', '\\']).any(|segment| segment == "..")
}

// ─── LLM configuration ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmMode {
    Local,
    Cloud,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterId {
    Ollama,
    Lmstudio,
    Openai,
    Anthropic,
    Gemini,
}

impl AdapterId {
    /// Adapters that talk to a hosted service rather than a local runtime.
    pub fn is_cloud(self) -> bool {
        matches!(self, AdapterId::Openai | AdapterId::Anthropic | AdapterId::Gemini)
    }
}

/// Sampling defaults applied when a request does not override them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LlmDefaults {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmConfig {
    pub mode: LlmMode,
    pub adapter_id: AdapterId,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_warn_before_sending: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defaults: Option<LlmDefaults>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            mode: LlmMode::Local,
            adapter_id: AdapterId::Ollama,
            model: DEFAULT_MODEL.to_string(),
            base_url: Some(OLLAMA_DEFAULT_BASE_URL.to_string()),
            endpoint: None,
            api_key: None,
            headers: None,
            cloud_warn_before_sending: Some(true),
            defaults: None,
        }
    }
}

// ─── Paths ──────────────────────────────────────────────────────────────────

fn default_logs() -> String {
    "logs".to_string()
}
fn default_memory() -> String {
    "memory".to_string()
}
fn default_trust() -> String {
    "trust".to_string()
}

/// Relative sub-paths under the profile directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfilePaths {
    #[serde(default = "default_logs")]
    pub logs: String,
    #[serde(default = "default_memory")]
    pub memory: String,
    #[serde(default = "default_trust")]
    pub trust: String,
}

impl Default for ProfilePaths {
    fn default() -> Self {
        Self {
            logs: default_logs(),
            memory: default_memory(),
            trust: default_trust(),
        }
    }
}

// ─── Profile ────────────────────────────────────────────────────────────────

/// One isolated tenant of runtime state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub name: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub schema_version: u32,
    #[serde(default)]
    pub setup_complete: bool,
    #[serde(default)]
    pub trust: TrustConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub paths: ProfilePaths,
}

impl Profile {
    pub fn new(id: impl Into<String>, name: impl Into<String>, llm: LlmConfig) -> Self {
        let now = now_millis();
        Self {
            id: id.into(),
            name: name.into(),
            created_at: now,
            updated_at: now,
            schema_version: PROFILE_SCHEMA_VERSION,
            setup_complete: false,
            trust: TrustConfig::default(),
            llm,
            paths: ProfilePaths::default(),
        }
    }

    /// Forward-compatible normalisation applied on every read.
    pub fn normalise(&mut self) {
        if self.llm.cloud_warn_before_sending.is_none() {
            self.llm.cloud_warn_before_sending = Some(true);
        }
        match (&self.llm.base_url, &self.llm.endpoint) {
            (Some(base), None) => self.llm.endpoint = Some(base.clone()),
            (None, Some(endpoint)) => self.llm.base_url = Some(endpoint.clone()),
            (None, None) if self.llm.adapter_id == AdapterId::Ollama => {
                self.llm.base_url = Some(OLLAMA_DEFAULT_BASE_URL.to_string());
                self.llm.endpoint = Some(OLLAMA_DEFAULT_BASE_URL.to_string());
            }
            _ => {}
        }
    }

    /// Structural validation; every persisted profile must pass.
    pub fn validate(&self) -> Result<(), ProfileError> {
        if !is_valid_profile_id(&self.id) {
            return Err(ProfileError::InvalidId(self.id.clone()));
        }
        if self.llm.model.trim().is_empty() {
            return Err(ProfileError::InvalidLlmConfig("model must be non-empty".into()));
        }
        if self.llm.mode == LlmMode::Local
            && self.llm.base_url.is_none()
            && self.llm.endpoint.is_none()
        {
            return Err(ProfileError::InvalidLlmConfig(
                "local mode requires baseUrl or endpoint".into(),
            ));
        }
        if let Some(defaults) = &self.llm.defaults {
            if let Some(t) = defaults.temperature
                && !(0.0..=2.0).contains(&t)
            {
                return Err(ProfileError::InvalidLlmConfig(format!(
                    "temperature {t} outside [0, 2]"
                )));
            }
            if defaults.max_tokens == Some(0) {
                return Err(ProfileError::InvalidLlmConfig(
                    "maxTokens must be positive".into(),
                ));
            }
        }
        for (label, path) in [
            ("logs", &self.paths.logs),
            ("memory", &self.paths.memory),
            ("trust", &self.paths.trust),
        ] {
            if !is_safe_relative_path(path) {
                return Err(ProfileError::InvalidPath(format!("{label}: {path}")));
            }
        }
        if let Some(level) = self.trust.default_trust_level
            && level > 4
        {
            return Err(ProfileError::InvalidLlmConfig(format!(
                "trust level {level} outside 0..=4"
            )));
        }
        Ok(())
    }
}
