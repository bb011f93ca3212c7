//! Single-instance locking.
//!
//! Two runs interleaving their backend calls would race on the shared
//! kernel state (last writer wins), so overlapping runs fail fast behind an
//! advisory flock instead.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

const LOCK_PATH: &str = "/run/transtunnel.lock";

/// Holds the exclusive lock for the lifetime of the run; released on drop.
pub struct LockGuard {
    _file: File,
}

impl LockGuard {
    pub fn acquire() -> Result<Self> {
        Self::acquire_at(Path::new(LOCK_PATH))
    }

    /// Open-or-create with read+write (no truncate) so there is no window
    /// between creating the file and locking it.
    pub fn acquire_at(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).ok();
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("Failed to open lock file {}", path.display()))?;

        let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o600));

        file.try_lock_exclusive().map_err(|_| {
            anyhow::anyhow!(
                "Another transtunnel run holds {}; wait for it to finish",
                path.display()
            )
        })?;

        Ok(Self { _file: file })
    }
}
