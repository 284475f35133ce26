//! On-disk profile documents and the active-profile pointer.
//!
//! Documents are pretty-printed JSON with a trailing newline, replaced
//! atomically through a temp file and rename.

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use super::{ProfileError, types::Profile};
use crate::util::write_atomic_json;

/// Per-profile document file name.
pub const PROFILE_FILE: &str = "profile.json";

/// Pointer file at the store root.
pub const POINTER_FILE: &str = "activeProfile.json";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActivePointer {
    profile_id: String,
}

/// Read and normalise the profile document under `dir`.
pub fn read_profile(dir: &Path) -> Result<Profile, ProfileError> {
    let path = dir.join(PROFILE_FILE);
    let content = fs::read_to_string(&path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ProfileError::NotFound(dir.display().to_string())
        } else {
            ProfileError::Io(e)
        }
    })?;
    let mut profile: Profile = serde_json::from_str(&content)?;
    profile.normalise();
    Ok(profile)
}

/// Atomically write the profile document under `dir`.
pub fn write_profile(dir: &Path, profile: &Profile) -> Result<(), ProfileError> {
    write_atomic_json(&dir.join(PROFILE_FILE), profile)?;
    Ok(())
}

/// Best-effort read of the active-profile pointer. Missing or malformed
/// contents read as "no pointer".
pub fn read_pointer(root: &Path) -> Option<String> {
    let content = fs::read_to_string(root.join(POINTER_FILE)).ok()?;
    let pointer: ActivePointer = serde_json::from_str(&content).ok()?;
    if pointer.profile_id.is_empty() {
        None
    } else {
        Some(pointer.profile_id)
    }
}

/// Atomically write (or clear) the active-profile pointer.
pub fn write_pointer(root: &Path, profile_id: Option<&str>) -> Result<(), ProfileError> {
    let path = root.join(POINTER_FILE);
    match profile_id {
        Some(id) => {
            write_atomic_json(
                &path,
                &ActivePointer {
                    profile_id: id.to_string(),
                },
            )?;
        }
        None => {
            if let Err(e) = fs::remove_file(&path)
                && e.kind() != std::io::ErrorKind::NotFound
            {
                return Err(ProfileError::Io(e));
            }
        }
    }
    Ok(())
}
