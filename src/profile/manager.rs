//! Profile manager: the owner of the store root.
//!
//! Anchors per-profile directories, the active-profile pointer, and legacy
//! migration. Pointer mutations cross the coarse `.lock-activeProfile`
//! lock; per-profile document writes cross `.lock-<id>`. Both are
//! exclusive-create lock files (see [`super::lock`]).

use std::{
    fs,
    path::{Path, PathBuf},
};

use super::{
    ProfileError,
    lock::LockFile,
    migration::{self, LegacySettings},
    store,
    types::{LlmConfig, Profile, is_safe_relative_path, is_valid_profile_id},
};
use crate::trust::RuleStore;
use crate::util::now_millis;

/// Env var suggesting the default profile id at first initialisation.
pub const PROFILE_ID_ENV: &str = "ACTA_PROFILE_ID";

const ACTIVE_LOCK: &str = ".lock-activeProfile";
const TRASH_DIR: &str = ".trash";

/// Owns the profile store rooted at one directory.
pub struct ProfileManager {
    root: PathBuf,
}

impl ProfileManager {
    /// Create a manager over `root`. Logs any lock files left behind by a
    /// crashed process; those require manual cleanup before the operations
    /// they guard can proceed.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        if let Ok(entries) = fs::read_dir(&root) {
            for entry in entries.filter_map(|e| e.ok()) {
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.starts_with(".lock-") {
                    tracing::warn!(
                        lock = %entry.path().display(),
                        "stale lock file found at startup; remove it manually if no other process is running"
                    );
                }
            }
        }
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // ── Directories ─────────────────────────────────────────────────────

    /// Resolve the directory for `id`, rejecting anything that would escape
    /// the root.
    pub fn profile_dir(&self, id: &str) -> Result<PathBuf, ProfileError> {
        if !is_valid_profile_id(id) {
            return Err(ProfileError::InvalidId(id.to_string()));
        }
        let dir = self.root.join(id);
        // The id regex already excludes separators; keep the containment
        // check as the last line of defence.
        if !dir.starts_with(&self.root) {
            return Err(ProfileError::InvalidId(id.to_string()));
        }
        Ok(dir)
    }

    fn sub_dir(&self, profile: &Profile, relative: &str) -> Result<PathBuf, ProfileError> {
        if !is_safe_relative_path(relative) {
            return Err(ProfileError::InvalidPath(relative.to_string()));
        }
        Ok(self.profile_dir(&profile.id)?.join(relative))
    }

    /// Effective log directory for `profile`. The logger factory takes this
    /// by injection rather than through process-global state.
    pub fn logs_dir(&self, profile: &Profile) -> Result<PathBuf, ProfileError> {
        self.sub_dir(profile, &profile.paths.logs)
    }

    pub fn memory_dir(&self, profile: &Profile) -> Result<PathBuf, ProfileError> {
        self.sub_dir(profile, &profile.paths.memory)
    }

    pub fn trust_dir(&self, profile: &Profile) -> Result<PathBuf, ProfileError> {
        self.sub_dir(profile, &profile.paths.trust)
    }

    /// Rule store bound to `profile`'s trust directory.
    pub fn rule_store(&self, profile: &Profile) -> Result<RuleStore, ProfileError> {
        Ok(RuleStore::new(self.trust_dir(profile)?))
    }

    // ── Reads ───────────────────────────────────────────────────────────

    pub fn get_profile(&self, id: &str) -> Result<Profile, ProfileError> {
        store::read_profile(&self.profile_dir(id)?)
    }

    /// All readable profiles, in lexicographic id order.
    pub fn list_profiles(&self) -> Vec<Profile> {
        let mut profiles: Vec<Profile> = match fs::read_dir(&self.root) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .filter_map(|entry| {
                    let name = entry.file_name().to_string_lossy().into_owned();
                    if !is_valid_profile_id(&name) || !entry.path().is_dir() {
                        return None;
                    }
                    store::read_profile(&entry.path()).ok()
                })
                .collect(),
            Err(_) => Vec::new(),
        };
        profiles.sort_by(|a, b| a.id.cmp(&b.id));
        profiles
    }

    pub fn active_profile_id(&self) -> Option<String> {
        store::read_pointer(&self.root)
    }

    pub fn active_profile(&self) -> Option<Profile> {
        let id = self.active_profile_id()?;
        self.get_profile(&id).ok()
    }

    // ── Initialisation ──────────────────────────────────────────────────

    /// Establish an active profile, migrating legacy data if present.
    ///
    /// Reads the default-id suggestion and legacy settings from the
    /// environment; see [`initialize_with`] for the injectable variant.
    pub fn initialize(&self) -> Result<Profile, ProfileError> {
        let hint = std::env::var(PROFILE_ID_ENV).ok();
        self.initialize_with(hint.as_deref(), &LegacySettings::from_env())
    }

    /// Establish an active profile using explicit settings.
    ///
    /// 1. Adopt a readable pointer target.
    /// 2. Otherwise run legacy migration (at most once).
    /// 3. Adopt the legacy active id, else the lexicographically first
    ///    profile, writing the pointer.
    /// 4. With no profiles at all, create a default one.
    pub fn initialize_with(
        &self,
        default_id_hint: Option<&str>,
        legacy: &LegacySettings,
    ) -> Result<Profile, ProfileError> {
        fs::create_dir_all(&self.root)?;
        let _lock = LockFile::acquire(self.root.join(ACTIVE_LOCK))?;

        if let Some(id) = store::read_pointer(&self.root)
            && let Ok(profile) = self.get_profile(&id)
        {
            return Ok(profile);
        }

        let legacy_active = migration::run(&self.root, legacy)?;

        let profiles = self.list_profiles();
        if let Some(first) = profiles.first() {
            let adopted = legacy_active
                .filter(|id| profiles.iter().any(|p| &p.id == id))
                .unwrap_or_else(|| first.id.clone());
            store::write_pointer(&self.root, Some(&adopted))?;
            return self.get_profile(&adopted);
        }

        let id = default_id_hint
            .map(|h| h.to_lowercase())
            .filter(|h| is_valid_profile_id(h))
            .unwrap_or_else(|| "default".to_string());
        let profile = Profile::new(&id, "Default", LlmConfig::default());
        profile.validate()?;
        store::write_profile(&self.profile_dir(&id)?, &profile)?;
        store::write_pointer(&self.root, Some(&id))?;
        tracing::info!(profile = %id, "created default profile");
        Ok(profile)
    }

    // ── Mutations ───────────────────────────────────────────────────────

    /// Create a new profile. Becomes active when no pointer exists yet.
    pub fn create_profile(
        &self,
        id: &str,
        name: &str,
        llm: Option<LlmConfig>,
    ) -> Result<Profile, ProfileError> {
        let dir = self.profile_dir(id)?;
        let _profile_lock = LockFile::acquire(self.root.join(format!(".lock-{id}")))?;
        if dir.join(store::PROFILE_FILE).exists() {
            return Err(ProfileError::AlreadyExists(id.to_string()));
        }
        let profile = Profile::new(id, name, llm.unwrap_or_default());
        profile.validate()?;
        store::write_profile(&dir, &profile)?;

        let _pointer_lock = LockFile::acquire(self.root.join(ACTIVE_LOCK))?;
        if store::read_pointer(&self.root).is_none() {
            store::write_pointer(&self.root, Some(id))?;
        }
        Ok(profile)
    }

    /// Replace a profile document. `updatedAt` is stamped here.
    pub fn update_profile(&self, mut profile: Profile) -> Result<Profile, ProfileError> {
        profile.validate()?;
        let dir = self.profile_dir(&profile.id)?;
        let _profile_lock = LockFile::acquire(self.root.join(format!(".lock-{}", profile.id)))?;
        if !dir.join(store::PROFILE_FILE).exists() {
            return Err(ProfileError::NotFound(profile.id.clone()));
        }
        profile.updated_at = now_millis();
        store::write_profile(&dir, &profile)?;
        Ok(profile)
    }

    /// Point the store at a different existing profile.
    pub fn switch_profile(&self, id: &str) -> Result<Profile, ProfileError> {
        let profile = self.get_profile(id)?;
        let _pointer_lock = LockFile::acquire(self.root.join(ACTIVE_LOCK))?;
        store::write_pointer(&self.root, Some(id))?;
        Ok(profile)
    }

    /// Delete a profile. With `delete_files = false` the directory is
    /// archived under `.trash/<id>-<timestamp>`; with `true` it is removed
    /// recursively. A deleted active profile hands the pointer to the first
    /// remaining profile, or clears it.
    pub fn delete_profile(&self, id: &str, delete_files: bool) -> Result<(), ProfileError> {
        let dir = self.profile_dir(id)?;
        {
            let _profile_lock = LockFile::acquire(self.root.join(format!(".lock-{id}")))?;
            if !dir.exists() {
                return Err(ProfileError::NotFound(id.to_string()));
            }
            if delete_files {
                fs::remove_dir_all(&dir)?;
            } else {
                let trash = self.root.join(TRASH_DIR);
                fs::create_dir_all(&trash)?;
                fs::rename(&dir, trash.join(format!("{id}-{}", now_millis())))?;
            }
        }

        let _pointer_lock = LockFile::acquire(self.root.join(ACTIVE_LOCK))?;
        if store::read_pointer(&self.root).as_deref() == Some(id) {
            let next = self.list_profiles().first().map(|p| p.id.clone());
            store::write_pointer(&self.root, next.as_deref())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn no_legacy() -> LegacySettings {
        LegacySettings {
            // A path that never exists, so platform directories are not probed.
            explicit_root: Some(PathBuf::from("/nonexistent/acta-legacy")),
            force: false,
        }
    }

    fn manager(dir: &TempDir) -> ProfileManager {
        ProfileManager::new(dir.path().join("profiles"))
    }

    #[test]
    fn first_init_creates_default_profile() {
        let dir = TempDir::new().unwrap();
        let m = manager(&dir);
        let profile = m.initialize_with(None, &no_legacy()).unwrap();
        assert_eq!(profile.id, "default");
        assert_eq!(profile.name, "Default");
        assert_eq!(m.active_profile_id().as_deref(), Some("default"));
    }

    #[test]
    fn init_honours_id_hint_lowercased() {
        let dir = TempDir::new().unwrap();
        let m = manager(&dir);
        let profile = m.initialize_with(Some("Work-Box"), &no_legacy()).unwrap();
        assert_eq!(profile.id, "work-box");
    }

    #[test]
    fn init_ignores_invalid_hint() {
        let dir = TempDir::new().unwrap();
        let m = manager(&dir);
        let profile = m.initialize_with(Some("_bad!"), &no_legacy()).unwrap();
        assert_eq!(profile.id, "default");
    }

    #[test]
    fn init_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let m = manager(&dir);
        let first = m.initialize_with(None, &no_legacy()).unwrap();
        let second = m.initialize_with(None, &no_legacy()).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(m.list_profiles().len(), 1);
    }

    #[test]
    fn init_adopts_first_existing_profile() {
        let dir = TempDir::new().unwrap();
        let m = manager(&dir);
        m.create_profile("beta", "Beta", None).unwrap();
        m.create_profile("alpha", "Alpha", None).unwrap();
        store::write_pointer(m.root(), None).unwrap();

        let adopted = m.initialize_with(None, &no_legacy()).unwrap();
        assert_eq!(adopted.id, "alpha");
    }

    #[test]
    fn init_recovers_from_dangling_pointer() {
        let dir = TempDir::new().unwrap();
        let m = manager(&dir);
        m.create_profile("alpha", "Alpha", None).unwrap();
        store::write_pointer(m.root(), Some("ghost-profile")).unwrap();

        let adopted = m.initialize_with(None, &no_legacy()).unwrap();
        assert_eq!(adopted.id, "alpha");
    }

    #[test]
    fn create_get_update_round_trip() {
        let dir = TempDir::new().unwrap();
        let m = manager(&dir);
        let mut profile = m.create_profile("alpha", "Alpha", None).unwrap();
        profile.setup_complete = true;
        let updated = m.update_profile(profile.clone()).unwrap();
        assert!(updated.updated_at >= profile.created_at);

        let loaded = m.get_profile("alpha").unwrap();
        assert!(loaded.setup_complete);
    }

    #[test]
    fn create_duplicate_fails() {
        let dir = TempDir::new().unwrap();
        let m = manager(&dir);
        m.create_profile("alpha", "Alpha", None).unwrap();
        assert!(matches!(
            m.create_profile("alpha", "Again", None),
            Err(ProfileError::AlreadyExists(_))
        ));
    }

    #[test]
    fn create_rejects_invalid_id() {
        let dir = TempDir::new().unwrap();
        let m = manager(&dir);
        assert!(matches!(
            m.create_profile("Bad Id", "X", None),
            Err(ProfileError::InvalidId(_))
        ));
    }

    #[test]
    fn update_missing_profile_fails() {
        let dir = TempDir::new().unwrap();
        let m = manager(&dir);
        let ghost = Profile::new("ghost", "Ghost", LlmConfig::default());
        assert!(matches!(
            m.update_profile(ghost),
            Err(ProfileError::NotFound(_))
        ));
    }

    #[test]
    fn switch_changes_pointer() {
        let dir = TempDir::new().unwrap();
        let m = manager(&dir);
        m.create_profile("alpha", "Alpha", None).unwrap();
        m.create_profile("beta", "Beta", None).unwrap();
        m.switch_profile("beta").unwrap();
        assert_eq!(m.active_profile_id().as_deref(), Some("beta"));
    }

    #[test]
    fn switch_to_missing_profile_fails() {
        let dir = TempDir::new().unwrap();
        let m = manager(&dir);
        assert!(m.switch_profile("ghost").is_err());
    }

    #[test]
    fn delete_archives_to_trash_by_default() {
        let dir = TempDir::new().unwrap();
        let m = manager(&dir);
        m.create_profile("alpha", "Alpha", None).unwrap();
        m.delete_profile("alpha", false).unwrap();

        assert!(!m.root().join("alpha").exists());
        let trash_entries: Vec<_> = fs::read_dir(m.root().join(TRASH_DIR))
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert_eq!(trash_entries.len(), 1);
        assert!(
            trash_entries[0]
                .file_name()
                .to_string_lossy()
                .starts_with("alpha-")
        );
    }

    #[test]
    fn delete_files_removes_recursively() {
        let dir = TempDir::new().unwrap();
        let m = manager(&dir);
        m.create_profile("alpha", "Alpha", None).unwrap();
        m.delete_profile("alpha", true).unwrap();
        assert!(!m.root().join("alpha").exists());
        assert!(!m.root().join(TRASH_DIR).exists());
    }

    #[test]
    fn deleting_active_profile_promotes_next() {
        let dir = TempDir::new().unwrap();
        let m = manager(&dir);
        m.create_profile("alpha", "Alpha", None).unwrap();
        m.create_profile("beta", "Beta", None).unwrap();
        assert_eq!(m.active_profile_id().as_deref(), Some("alpha"));

        m.delete_profile("alpha", true).unwrap();
        assert_eq!(m.active_profile_id().as_deref(), Some("beta"));
    }

    #[test]
    fn deleting_last_profile_clears_pointer() {
        let dir = TempDir::new().unwrap();
        let m = manager(&dir);
        m.create_profile("alpha", "Alpha", None).unwrap();
        m.delete_profile("alpha", true).unwrap();
        assert_eq!(m.active_profile_id(), None);
    }

    #[test]
    fn list_skips_unreadable_and_foreign_dirs() {
        let dir = TempDir::new().unwrap();
        let m = manager(&dir);
        m.create_profile("alpha", "Alpha", None).unwrap();
        fs::create_dir_all(m.root().join(".trash")).unwrap();
        fs::create_dir_all(m.root().join("no-doc-here")).unwrap();
        let ids: Vec<_> = m.list_profiles().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["alpha"]);
    }

    #[test]
    fn held_pointer_lock_blocks_initialize() {
        let dir = TempDir::new().unwrap();
        let m = manager(&dir);
        fs::create_dir_all(m.root()).unwrap();
        let _held = LockFile::acquire(m.root().join(ACTIVE_LOCK)).unwrap();
        assert!(matches!(
            m.initialize_with(None, &no_legacy()),
            Err(ProfileError::Locked(_))
        ));
    }

    #[test]
    fn trust_dir_and_rule_store_resolve_under_profile() {
        let dir = TempDir::new().unwrap();
        let m = manager(&dir);
        let profile = m.create_profile("alpha", "Alpha", None).unwrap();
        let trust_dir = m.trust_dir(&profile).unwrap();
        assert!(trust_dir.ends_with("alpha/trust"));
        let rules = m.rule_store(&profile).unwrap();
        assert!(rules.path().ends_with("alpha/trust/rules.json"));
    }
}
