//! Durable per-profile rule store.
//!
//! Rules live in a single JSON array at `<profile_dir>/<trust_path>/rules.json`.
//! Reads tolerate a missing or corrupt file and skip entries that fail
//! structural validation. Writes go through a temp file and rename so a
//! crash mid-write never leaves a truncated store.

use std::{fs, path::PathBuf};

use thiserror::Error;

use super::types::{Decision, Remember, TrustRule};
use crate::util::{now_millis, write_atomic_json};

/// Name of the rules file inside the profile's trust directory.
pub const RULES_FILE: &str = "rules.json";

#[derive(Debug, Error)]
pub enum RuleStoreError {
    #[error("a rule with id '{0}' already exists")]
    DuplicateId(String),

    #[error("failed to persist rules: {0}")]
    Io(#[from] std::io::Error),
}

/// A rule as submitted by callers, before the store assigns id/createdAt.
#[derive(Debug, Clone)]
pub struct NewRule {
    pub tool: String,
    pub scope_prefix: Option<String>,
    pub decision: Decision,
    pub remember: Option<Remember>,
}

/// Deterministic rule id: one rule per (tool, scope prefix) pair.
pub fn rule_id(tool: &str, scope_prefix: Option<&str>) -> String {
    format!("{tool}@{}", scope_prefix.unwrap_or("*"))
}

/// Rule store bound to one profile's `rules.json`.
///
/// Reads and writes are read-modify-write sequences; callers serialise them
/// through the owning profile's operation lock.
pub struct RuleStore {
    path: PathBuf,
}

impl RuleStore {
    /// `trust_dir` is the profile's resolved trust directory.
    pub fn new(trust_dir: impl Into<PathBuf>) -> Self {
        Self {
            path: trust_dir.into().join(RULES_FILE),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// All structurally valid rules, in file order. Missing, corrupt, or
    /// non-array contents yield an empty list.
    pub fn list(&self) -> Vec<TrustRule> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(_) => return Vec::new(),
        };
        let entries: Vec<serde_json::Value> = match serde_json::from_str(&content) {
            Ok(serde_json::Value::Array(items)) => items,
            _ => return Vec::new(),
        };
        entries
            .into_iter()
            .filter_map(|entry| match serde_json::from_value::<TrustRule>(entry) {
                Ok(rule) => Some(rule),
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), error = %e, "skipping invalid rule entry");
                    None
                }
            })
            .collect()
    }

    /// Append a new rule. Fails if a rule with the same computed id exists.
    pub fn add(&self, new: NewRule) -> Result<TrustRule, RuleStoreError> {
        let id = rule_id(&new.tool, new.scope_prefix.as_deref());
        let mut rules = self.list();
        if rules.iter().any(|r| r.id == id) {
            return Err(RuleStoreError::DuplicateId(id));
        }
        let rule = materialise(id, new);
        rules.push(rule.clone());
        self.write(&rules)?;
        Ok(rule)
    }

    /// Insert or replace the rule with the same computed id. Replacing a rule
    /// with an identical body leaves the file untouched.
    pub fn upsert(&self, new: NewRule) -> Result<TrustRule, RuleStoreError> {
        let id = rule_id(&new.tool, new.scope_prefix.as_deref());
        let mut rules = self.list();
        if let Some(existing) = rules.iter_mut().find(|r| r.id == id) {
            if existing.decision == new.decision
                && existing.remember == new.remember
                && existing.scope_prefix == new.scope_prefix
            {
                return Ok(existing.clone());
            }
            let created_at = existing.created_at;
            let mut rule = materialise(id, new);
            rule.created_at = created_at;
            *existing = rule.clone();
            self.write(&rules)?;
            return Ok(rule);
        }
        let rule = materialise(id, new);
        rules.push(rule.clone());
        self.write(&rules)?;
        Ok(rule)
    }

    /// Remove a rule by id. Returns whether anything was removed.
    pub fn remove(&self, id: &str) -> Result<bool, RuleStoreError> {
        let mut rules = self.list();
        let before = rules.len();
        rules.retain(|r| r.id != id);
        if rules.len() == before {
            return Ok(false);
        }
        self.write(&rules)?;
        Ok(true)
    }

    /// First rule matching the request, using the evaluator's matching.
    pub fn find_matching(&self, tool: &str, scope: Option<&str>) -> Option<TrustRule> {
        self.list().into_iter().find(|r| r.matches(tool, scope))
    }

    fn write(&self, rules: &[TrustRule]) -> Result<(), RuleStoreError> {
        write_atomic_json(&self.path, &rules)?;
        Ok(())
    }
}

fn materialise(id: String, new: NewRule) -> TrustRule {
    TrustRule {
        id,
        created_at: Some(now_millis()),
        tool: new.tool,
        scope_prefix: new.scope_prefix,
        decision: new.decision,
        remember: new.remember,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> RuleStore {
        RuleStore::new(dir.path().join("trust"))
    }

    fn allow_rule(tool: &str, scope: Option<&str>) -> NewRule {
        NewRule {
            tool: tool.into(),
            scope_prefix: scope.map(str::to_string),
            decision: Decision::Allow,
            remember: Some(Remember::Persistent),
        }
    }

    #[test]
    fn missing_file_lists_empty() {
        let dir = TempDir::new().unwrap();
        assert!(store(&dir).list().is_empty());
    }

    #[test]
    fn add_then_list_round_trips() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        let added = s.add(allow_rule("file.read", Some("/tmp/"))).unwrap();
        assert_eq!(added.id, "file.read@/tmp/");
        assert!(added.created_at.is_some());

        let listed = s.list();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0], added);
    }

    #[test]
    fn duplicate_add_fails() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        s.add(allow_rule("file.read", None)).unwrap();
        let err = s.add(allow_rule("file.read", None)).unwrap_err();
        assert!(matches!(err, RuleStoreError::DuplicateId(id) if id == "file.read@*"));
    }

    #[test]
    fn upsert_replaces_decision_and_keeps_created_at() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        let first = s.add(allow_rule("file.read", None)).unwrap();
        let updated = s
            .upsert(NewRule {
                tool: "file.read".into(),
                scope_prefix: None,
                decision: Decision::Deny,
                remember: Some(Remember::Persistent),
            })
            .unwrap();
        assert_eq!(updated.id, first.id);
        assert_eq!(updated.decision, Decision::Deny);
        assert_eq!(updated.created_at, first.created_at);
        assert_eq!(s.list().len(), 1);
    }

    #[test]
    fn upsert_same_body_is_noop() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        s.upsert(allow_rule("file.read", Some("/tmp/"))).unwrap();
        let before = fs::read_to_string(s.path()).unwrap();
        s.upsert(allow_rule("file.read", Some("/tmp/"))).unwrap();
        let after = fs::read_to_string(s.path()).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn remove_existing_and_missing() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        let rule = s.add(allow_rule("web.fetch", None)).unwrap();
        assert!(s.remove(&rule.id).unwrap());
        assert!(!s.remove(&rule.id).unwrap());
        assert!(s.list().is_empty());
    }

    #[test]
    fn corrupt_file_reads_as_empty() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        fs::create_dir_all(s.path().parent().unwrap()).unwrap();
        fs::write(s.path(), "not json at all").unwrap();
        assert!(s.list().is_empty());
    }

    #[test]
    fn non_array_contents_read_as_empty() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        fs::create_dir_all(s.path().parent().unwrap()).unwrap();
        fs::write(s.path(), "{\"tool\": \"file.read\"}").unwrap();
        assert!(s.list().is_empty());
    }

    #[test]
    fn invalid_entries_are_skipped() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        fs::create_dir_all(s.path().parent().unwrap()).unwrap();
        fs::write(
            s.path(),
            r#"[
                {"id": "a", "tool": "file.read", "decision": "allow"},
                {"id": "b", "tool": "file.read", "decision": "shrug"},
                {"id": 42, "tool": "file.read", "decision": "deny"}
            ]"#,
        )
        .unwrap();
        let rules = s.list();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].id, "a");
    }

    #[test]
    fn find_matching_uses_scope_prefix() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        s.add(allow_rule("file.read", Some("/home/"))).unwrap();
        assert!(s.find_matching("file.read", Some("/home/u/x")).is_some());
        assert!(s.find_matching("file.read", Some("/etc/x")).is_none());
        assert!(s.find_matching("file.write", Some("/home/u/x")).is_none());
    }

    #[test]
    fn directory_created_on_first_write() {
        let dir = TempDir::new().unwrap();
        let s = RuleStore::new(dir.path().join("deep").join("trust"));
        s.add(allow_rule("file.read", None)).unwrap();
        assert!(s.path().exists());
    }
}
