//! Exclusive-create lock files.
//!
//! A lock is held by creating the file with `create_new`, which succeeds iff
//! the file does not exist; failure to create is the contention signal. The
//! lock is released by closing and unlinking the file. After a crash a stale
//! lock file remains and requires manual cleanup; the profile manager logs
//! any it finds at startup.

use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use super::ProfileError;

/// A held filesystem lock. Released on drop.
#[derive(Debug)]
pub struct LockFile {
    path: PathBuf,
}

impl LockFile {
    /// Acquire the lock at `path`, creating parent directories first.
    ///
    /// Fails with [`ProfileError::Locked`] when the file already exists.
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self, ProfileError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(ProfileError::Locked(path));
            }
            Err(e) => return Err(ProfileError::Io(e)),
        };
        // The pid helps a human decide whether a stale lock is safe to sweep.
        let _ = write!(file, "{}", std::process::id());
        drop(file);
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to unlink lock file");
        }
    }
}
