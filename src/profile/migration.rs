//! One-shot migration of legacy profile data into the current store.
//!
//! The legacy layout (a previous generation of the assistant) kept one
//! `config.json` per profile directory. Migration runs at most once per
//! store, gated by a marker file, and synthesises current-format profile
//! documents without touching the legacy tree.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use super::{
    ProfileError,
    store::{self, read_pointer},
    types::{AdapterId, DEFAULT_MODEL, LlmConfig, LlmMode, Profile, is_valid_profile_id},
};
use crate::util::now_millis;

/// Marker written after a migration attempt so it never re-runs.
pub const MARKER_FILE: &str = "legacyMigration.json";

/// Explicit legacy root override.
pub const LEGACY_ROOT_ENV: &str = "ACTA_LEGACY_PROFILE_ROOT";

/// Set to `1` to re-run migration even when the marker exists.
pub const FORCE_ENV: &str = "ACTA_FORCE_LEGACY_MIGRATION";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MigrationMarker {
    #[serde(skip_serializing_if = "Option::is_none")]
    legacy_profiles_root: Option<String>,
    completed_at: i64,
}

/// Shape of a legacy per-profile `config.json`. Every field is optional;
/// anything unreadable falls back to defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyConfig {
    name: Option<String>,
    model_provider: Option<String>,
    model: Option<String>,
    endpoint: Option<String>,
    trust_level: Option<i64>,
}

/// Where to look for legacy data, resolved from the environment.
#[derive(Debug, Clone, Default)]
pub struct LegacySettings {
    pub explicit_root: Option<PathBuf>,
    pub force: bool,
}

impl LegacySettings {
    pub fn from_env() -> Self {
        Self {
            explicit_root: std::env::var_os(LEGACY_ROOT_ENV).map(PathBuf::from),
            force: std::env::var(FORCE_ENV).is_ok_and(|v| v == "1"),
        }
    }
}

/// Candidate legacy roots in priority order: the explicit override, then the
/// platform config directory under `ACTA/profiles` and `acta/profiles`.
fn candidate_roots(settings: &LegacySettings) -> Vec<PathBuf> {
    if let Some(root) = &settings.explicit_root {
        return vec![root.clone()];
    }
    let mut candidates = Vec::new();
    if let Some(config) = dirs::config_dir() {
        candidates.push(config.join("ACTA").join("profiles"));
        candidates.push(config.join("acta").join("profiles"));
    }
    candidates
}

/// Run legacy migration into `root` if it has not run before.
///
/// Returns the legacy store's active profile id when one was found, so the
/// caller can adopt it. Always writes the marker, even when no legacy data
/// exists, so the filesystem probe happens once.
pub fn run(root: &Path, settings: &LegacySettings) -> Result<Option<String>, ProfileError> {
    let marker_path = root.join(MARKER_FILE);
    if marker_path.exists() && !settings.force {
        return Ok(None);
    }

    let legacy_root = candidate_roots(settings)
        .into_iter()
        .find(|p| p.is_dir());

    let Some(legacy_root) = legacy_root else {
        write_marker(root, None)?;
        return Ok(None);
    };

    tracing::info!(legacy_root = %legacy_root.display(), "migrating legacy profiles");
    let legacy_active = read_pointer(&legacy_root);

    let entries = match fs::read_dir(&legacy_root) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(error = %e, "legacy root unreadable, skipping migration");
            write_marker(root, Some(&legacy_root))?;
            return Ok(None);
        }
    };

    let mut migrated = 0usize;
    for entry in entries.filter_map(|e| e.ok()) {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('_') || !is_valid_profile_id(&name) {
            continue;
        }
        if !entry.path().is_dir() {
            continue;
        }
        let target_dir = root.join(&name);
        if target_dir.join(store::PROFILE_FILE).exists() {
            continue; // already present in the new store
        }

        let config = read_legacy_config(&entry.path());
        let profile = synthesise(&name, config);
        store::write_profile(&target_dir, &profile)?;
        migrated += 1;
    }
    tracing::info!(migrated, "legacy migration complete");

    write_marker(root, Some(&legacy_root))?;
    Ok(legacy_active)
}

fn read_legacy_config(dir: &Path) -> LegacyConfig {
    let path = dir.join("config.json");
    fs::read_to_string(&path)
        .ok()
        .and_then(|content| serde_json::from_str(&content).ok())
        .unwrap_or_default()
}

/// Build a current-format profile from a legacy config.
fn synthesise(id: &str, config: LegacyConfig) -> Profile {
    let trust_level = config.trust_level.unwrap_or(2).clamp(0, 3) as u8;

    let adapter_id = match config.model_provider.as_deref() {
        Some("openai") => AdapterId::Openai,
        Some("anthropic") => AdapterId::Anthropic,
        Some("gemini") => AdapterId::Gemini,
        Some("lmstudio") => AdapterId::Lmstudio,
        _ => AdapterId::Ollama,
    };
    let mode = if adapter_id.is_cloud() {
        LlmMode::Cloud
    } else {
        LlmMode::Local
    };

    let llm = LlmConfig {
        mode,
        adapter_id,
        model: config
            .model
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        endpoint: config.endpoint.clone(),
        base_url: match mode {
            LlmMode::Local => config
                .endpoint
                .or_else(|| LlmConfig::default().base_url),
            LlmMode::Cloud => None,
        },
        ..LlmConfig::default()
    };

    let name = config
        .name
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| id.to_string());

    let mut profile = Profile::new(id, name, llm);
    profile.trust.default_trust_level = Some(trust_level);
    profile
}

fn write_marker(root: &Path, legacy_root: Option<&Path>) -> Result<(), ProfileError> {
    crate::util::write_atomic_json(
        &root.join(MARKER_FILE),
        &MigrationMarker {
            legacy_profiles_root: legacy_root.map(|p| p.display().to_string()),
            completed_at: now_millis(),
        },
    )?;
    Ok(())
}
