//! Profile state: documents, the active-profile pointer, lock files, and
//! legacy migration. All durable state in the core lives under the profile
//! store root.

use std::path::PathBuf;

use thiserror::Error;

pub mod lock;
pub mod manager;
pub mod migration;
pub mod store;
pub mod types;

pub use lock::LockFile;
pub use manager::{PROFILE_ID_ENV, ProfileManager};
pub use migration::LegacySettings;
pub use types::{
    AdapterId, LlmConfig, LlmDefaults, LlmMode, Profile, ProfilePaths, is_safe_relative_path,
    is_valid_profile_id,
};

/// Errors local to profile storage. These never cross the IPC boundary
/// directly; callers translate them into wire errors where needed.
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("invalid profile id '{0}'")]
    InvalidId(String),

    #[error("unsafe profile path '{0}'")]
    InvalidPath(String),

    #[error("invalid llm configuration: {0}")]
    InvalidLlmConfig(String),

    #[error("profile '{0}' not found")]
    NotFound(String),

    #[error("profile '{0}' already exists")]
    AlreadyExists(String),

    #[error("store is locked at {0}")]
    Locked(PathBuf),

    #[error("profile store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("profile document is malformed: {0}")]
    Json(#[from] serde_json::Error),
}
