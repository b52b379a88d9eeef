//! Advisory lock around the mutation phase of a target.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;

use fd_lock::RwLock;
use tracing::debug;

use crate::error::{DotKitError, Result};

/// Run `f` while holding an exclusive lock on `path`.
///
/// Fails fast with [`DotKitError::Locked`] if another process holds it. The
/// lock file is never removed, so every process locks the same inode.
pub fn with_target_lock<T>(path: &Path, f: impl FnOnce() -> Result<T>) -> Result<T> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)?;

    let mut lock = RwLock::new(file);
    let _guard = match lock.try_write() {
        Ok(guard) => guard,
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
            return Err(DotKitError::Locked {
                path: path.to_path_buf(),
            });
        }
        Err(e) => return Err(e.into()),
    };
    debug!(path = %path.display(), "lock acquired");
    f()
}
