//! Small shared helpers: wall-clock timestamps and crash-safe JSON writes.

use std::{fs, io::Write, path::Path};

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Temp-file name used for atomic writes: `.tmp-<basename>-<millis>-<uuid>`.
fn tmp_name(basename: &str) -> String {
    format!(".tmp-{}-{}-{}", basename, now_millis(), uuid::Uuid::new_v4())
}

/// Atomically replace `path` with `content`.
///
/// Writes a temp file in the same directory, flushes it to disk, then renames
/// it onto `path` so readers see either the old or the new complete file.
/// Parent directories are created on first write.
pub fn write_atomic(path: &Path, content: &str) -> std::io::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let basename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    let tmp_path = parent.join(tmp_name(&basename));

    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(content.as_bytes())?;
    file.sync_all()?;
    drop(file);

    match fs::rename(&tmp_path, path) {
        Ok(()) => Ok(()),
        Err(e) => {
            // Leave no temp litter on a failed rename.
            let _ = fs::remove_file(&tmp_path);
            Err(e)
        }
    }
}

/// Serialise `value` as pretty-printed JSON with a trailing newline and write
/// it atomically to `path`.
pub fn write_atomic_json<T: serde::Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
    let mut content = serde_json::to_string_pretty(value).map_err(std::io::Error::other)?;
    content.push('\n');
    write_atomic(path, &content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn write_atomic_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a").join("b").join("out.json");
        write_atomic(&path, "{}").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "{}");
    }

    #[test]
    fn write_atomic_replaces_existing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.json");
        write_atomic(&path, "old").unwrap();
        write_atomic(&path, "new").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
    }

    #[test]
    fn write_atomic_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.json");
        write_atomic(&path, "content").unwrap();
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".tmp-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn write_atomic_json_pretty_prints_with_newline() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.json");
        write_atomic_json(&path, &serde_json::json!({"profileId": "default"})).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.ends_with('\n'));
        assert!(content.contains("  \"profileId\""));
    }

    #[test]
    fn now_millis_is_recent() {
        // Sanity: later than 2024-01-01 in epoch millis.
        assert!(now_millis() > 1_704_067_200_000);
    }
}
