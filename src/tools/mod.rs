//! Tool abstraction and registry.
//!
//! The orchestrator executes plan steps through a single registry interface:
//! `get(id)` for dispatch, `list()` for the planner's tool catalogue. Tool
//! implementations live in the embedding process; the core only defines the
//! seam.

use std::{collections::HashMap, path::PathBuf, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─── ToolResult ─────────────────────────────────────────────────────────────

/// The result of executing a [`Tool`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Human-readable output (stdout, file contents, a summary line, …).
    pub output: String,
    /// Whether the tool considered the execution successful.
    pub success: bool,
    /// Paths or identifiers of artefacts produced by the execution.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<String>,
    /// Optional structured metadata for machine consumption.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            success: true,
            artifacts: Vec::new(),
            metadata: None,
        }
    }

    pub fn err(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            success: false,
            artifacts: Vec::new(),
            metadata: None,
        }
    }

    pub fn with_artifact(mut self, artifact: impl Into<String>) -> Self {
        self.artifacts.push(artifact.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

// ─── ToolContext ────────────────────────────────────────────────────────────

/// Per-invocation context handed to every tool.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Profile on whose behalf the tool runs.
    pub profile_id: String,
    /// Working directory for relative paths.
    pub cwd: PathBuf,
    /// Scratch directory the tool may write to freely.
    pub temp_dir: PathBuf,
    /// Capability strings granted for this invocation (empty by default;
    /// the trust engine gates execution before the tool is reached).
    pub permissions: Vec<String>,
}

// ─── Tool ───────────────────────────────────────────────────────────────────

/// A capability the orchestrator can invoke as a plan step.
///
/// Implementations must be `Send + Sync` so they can be held in a shared
/// `Arc<dyn Tool>` registry.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Stable dotted identifier, e.g. `"file.read"`. The substring before
    /// the first `.` is the tool's domain for trust purposes.
    fn id(&self) -> &str;

    /// Human-readable description used in the planner's tool catalogue.
    fn description(&self) -> &str;

    /// Names of the input fields the tool accepts, listed in the planner
    /// prompt so the model produces well-formed step inputs.
    fn input_fields(&self) -> Vec<String> {
        Vec::new()
    }

    /// Execute with a structured `input` object. A returned `Err` is treated
    /// as a tool exception; a `ToolResult` with `success = false` is a
    /// logical failure.
    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<ToolResult, String>;
}

/// Summary of a registered tool, as handed to the planner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input_fields: Vec<String>,
}

// ─── ToolRegistry ───────────────────────────────────────────────────────────

/// Central registry of available tools.
///
/// Populated once at startup and then shared as `Arc<ToolRegistry>`.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Overwrites any previous tool with the same id.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.id().to_string(), tool);
    }

    /// Look up a tool by id.
    pub fn get(&self, id: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(id).cloned()
    }

    /// List all registered tools for the planner's catalogue.
    pub fn list(&self) -> Vec<ToolInfo> {
        let mut infos: Vec<ToolInfo> = self
            .tools
            .values()
            .map(|t| ToolInfo {
                id: t.id().to_string(),
                description: Some(t.description().to_string()),
                input_fields: t.input_fields(),
            })
            .collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
