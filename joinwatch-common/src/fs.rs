//! Atomic file writes
//!
//! Both the bootstrap TOML and the monitor state file are replaced as a whole.
//! Writes go to `<target>.tmp` first and are renamed over the target, so a
//! reader sees either the old or the new content, never a torn file.

use crate::{Error, Result};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Path of the temporary sibling used while writing `target`
pub fn temp_path_for(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    target.with_file_name(name)
}

/// Write `contents` to `target` atomically
///
/// **Algorithm:**
/// 1. Create parent directories if missing
/// 2. Write and fsync `<target>.tmp`
/// 3. Rename over `target`
pub fn write_atomic(target: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let temp = temp_path_for(target);
    {
        let mut file = std::fs::File::create(&temp)?;
        file.write_all(contents)?;
        file.sync_all()?;
    }

    std::fs::rename(&temp, target).map_err(|e| {
        // Leave no stray temp file behind on a failed rename
        let _ = std::fs::remove_file(&temp);
        Error::Io(e)
    })
}

/// Restrict `path` to owner read/write (0600)
///
/// No-op on non-Unix platforms.
pub fn set_owner_only(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, perms)?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

/// Check whether `path` is readable by group or others
#[cfg(unix)]
pub fn permissions_loose(path: &Path) -> Result<bool> {
    use std::os::unix::fs::PermissionsExt;
    let mode = std::fs::metadata(path)?.permissions().mode();
    Ok(mode & 0o077 != 0)
}
