//! Atomic read-modify-write access to shared JSON documents.
//!
//! Writes go to a temporary file next to the document which is then renamed
//! over it. A copy of the previous document is kept until the rename has
//! succeeded and restored if anything fails.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{DotKitError, Result};

const TEMP_PREFIX: &str = ".dot-kit-tmp";
const BACKUP_SUFFIX: &str = ".dot-kit.bak";

/// A JSON object document that other tools also write to
#[derive(Debug, Clone)]
pub struct SharedDocument {
    path: PathBuf,
}

impl SharedDocument {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read the document; a missing or blank file reads as `{}`
    pub fn read(&self) -> Result<Value> {
        if !self.path.exists() {
            return Ok(Value::Object(Map::new()));
        }
        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(Value::Object(Map::new()));
        }

        let value: Value =
            serde_json::from_str(&content).map_err(|e| DotKitError::DocumentParse {
                path: self.path.clone(),
                message: e.to_string(),
            })?;
        if !value.is_object() {
            return Err(DotKitError::DocumentShape {
                path: self.path.clone(),
                message: "top level must be an object".to_string(),
            });
        }
        Ok(value)
    }

    /// Apply `mutate` to the document and persist the result.
    ///
    /// If `mutate` fails the document is untouched. Unchanged documents and
    /// dry runs are never rewritten.
    pub fn update<T>(
        &self,
        dry_run: bool,
        mutate: impl FnOnce(&mut Value) -> Result<T>,
    ) -> Result<T> {
        let original = self.read()?;
        let mut doc = original.clone();
        let out = mutate(&mut doc)?;

        if dry_run || doc == original {
            return Ok(out);
        }

        let backup = self.backup()?;
        match write_json_atomic(&self.path, &doc) {
            Ok(()) => {
                if let Some(backup) = backup {
                    fs::remove_file(&backup)?;
                }
                debug!(path = %self.path.display(), "document updated");
                Ok(out)
            }
            Err(e) => {
                if let Some(backup) = backup {
                    if let Err(restore) = self.restore(&backup) {
                        warn!(path = %self.path.display(), error = %restore, "failed to restore backup");
                    }
                }
                Err(e)
            }
        }
    }

    /// Put the backup back; a symlinked document keeps its link
    fn restore(&self, backup: &Path) -> Result<()> {
        let is_link = fs::symlink_metadata(&self.path)
            .map(|meta| meta.file_type().is_symlink())
            .unwrap_or(false);
        if is_link {
            fs::copy(backup, &self.path)?;
            fs::remove_file(backup)?;
        } else {
            fs::rename(backup, &self.path)?;
        }
        Ok(())
    }

    fn backup(&self) -> Result<Option<PathBuf>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let backup = self
            .path
            .with_file_name(format!("{}{}", file_name, BACKUP_SUFFIX));
        fs::copy(&self.path, &backup)?;
        Ok(Some(backup))
    }
}

/// Serialize `value` as pretty JSON and atomically replace `path`.
///
/// A symlinked document is written through to its target.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let path = match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => path.canonicalize()?,
        _ => path.to_path_buf(),
    };
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    sweep_stale_temp_files(dir);

    let mut tmp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .suffix(".json")
        .tempfile_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, value)?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;

    if let Ok(meta) = fs::metadata(&path) {
        fs::set_permissions(tmp.path(), meta.permissions())?;
    }

    tmp.persist(&path).map_err(|e| e.error)?;
    Ok(())
}

/// Remove temp files left behind by an interrupted run
pub fn sweep_stale_temp_files(dir: &Path) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        if name.to_string_lossy().starts_with(TEMP_PREFIX) {
            match fs::remove_file(entry.path()) {
                Ok(()) => debug!(path = %entry.path().display(), "removed stale temp file"),
                Err(e) => warn!(path = %entry.path().display(), error = %e, "failed to remove stale temp file"),
            }
        }
    }
}
