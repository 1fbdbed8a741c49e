//! Advisory cross-process lock serializing every read-modify-write on the store.
//!
//! The lock is an OS `flock`-style exclusive lock on a zero-content file. It is
//! released when the [`LockGuard`] drops, and by the OS if the holding process
//! exits. Processes that never call [`acquire_lock`] are not constrained.

use crate::core::error::{FrontdeskError, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Held exclusive lock. Unlocks on drop.
#[derive(Debug)]
pub struct LockGuard {
    file: File,
    path: PathBuf,
}

/// Blocks until this process holds the exclusive lock at `lock_path`.
///
/// There is no timeout: a caller that needs one must wrap the call.
pub fn acquire_lock(lock_path: &Path) -> Result<LockGuard> {
    if let Some(parent) = lock_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path)
        .map_err(|e| {
            FrontdeskError::LockError(format!("open {}: {}", lock_path.display(), e))
        })?;

    file.lock_exclusive().map_err(|e| {
        FrontdeskError::LockError(format!("lock {}: {}", lock_path.display(), e))
    })?;

    debug!(path = %lock_path.display(), "acquired state lock");
    Ok(LockGuard {
        file,
        path: lock_path.to_path_buf(),
    })
}

/// Explicit release; equivalent to dropping the guard.
pub fn release_lock(guard: LockGuard) {
    drop(guard);
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            debug!(path = %self.path.display(), error = %e, "failed to release state lock");
            return;
        }
        debug!(path = %self.path.display(), "released state lock");
    }
}
