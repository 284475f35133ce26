//! Router seam between the planner and concrete model providers.
//!
//! The core never speaks a provider dialect; adapters (Ollama, LM Studio,
//! OpenAI, Anthropic, Gemini, generic) implement [`LlmRouter`] on top of
//! [`crate::llm::http::HttpClient`] in the embedding process.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A single completion request as issued by the planner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmRequest {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl LlmRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            max_tokens: None,
            temperature: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Completion text plus the model that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmResponse {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Connection overrides carried by an `llm.healthCheck` request. Every
/// field is optional; absent fields fall back to the profile's stored LLM
/// configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HealthCheckConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adapter_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

/// Error detail of a failed probe, as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Result of an `llm.healthCheck` probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub models: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<HealthError>,
}

impl HealthStatus {
    pub fn healthy(models: Vec<String>) -> Self {
        Self {
            ok: true,
            models: Some(models),
            error: None,
        }
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            models: None,
            error: Some(HealthError {
                message: message.into(),
                code: None,
            }),
        }
    }

    /// Attach a stable error code to an unhealthy status.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        if let Some(error) = &mut self.error {
            error.code = Some(code.into());
        }
        self
    }
}

/// Dispatches completions to the configured provider adapter.
#[async_trait]
pub trait LlmRouter: Send + Sync {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse, CoreError>;

    /// Probe provider reachability and list available models, applying any
    /// connection overrides from the request. Routers without model
    /// discovery may keep the default, which reports reachable with no
    /// model list.
    async fn health_check(&self, _config: HealthCheckConfig) -> HealthStatus {
        HealthStatus::healthy(Vec::new())
    }
}
