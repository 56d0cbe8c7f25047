//! Checkpoint writes go to `<db>.tmp` and are renamed over the real file once committed.

use anyhow::{Context, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::utils::config::PackagePaths;

/// Sibling temp file of a checkpoint database.
pub fn temp_path_for(db_path: &Path) -> PathBuf {
    let name = db_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_else(|| PackagePaths::get().output_filename());
    let dir = db_path.parent().unwrap_or(Path::new("."));
    dir.join(format!("{name}.tmp"))
}

/// Delete the `-wal` / `-shm` files SQLite may leave next to `db`.
fn remove_sqlite_sidecars(db: &Path) {
    let Some(name) = db.file_name().map(|n| n.to_string_lossy().into_owned()) else {
        return;
    };
    let dir = db.parent().unwrap_or(Path::new("."));
    for suffix in ["-wal", "-shm"] {
        let _ = std::fs::remove_file(dir.join(format!("{name}{suffix}")));
    }
}

/// Where one checkpoint is written.
pub struct CheckpointTarget {
    final_path: PathBuf,
    temp_path: PathBuf,
    /// False when a stale temp file could not be removed; the database is then written in place.
    atomic: bool,
}

impl CheckpointTarget {
    /// Clear any temp file a crashed run left behind.
    pub fn prepare(db_path: &Path) -> Result<Self> {
        let temp_path = temp_path_for(db_path);
        let mut atomic = true;
        if temp_path.exists() {
            remove_sqlite_sidecars(&temp_path);
            match std::fs::remove_file(&temp_path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                    log::warn!(
                        "Cannot replace {}; writing the checkpoint in place",
                        temp_path.display()
                    );
                    atomic = false;
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("remove stale temp checkpoint {}", temp_path.display())
                    });
                }
            }
        }
        Ok(CheckpointTarget {
            final_path: db_path.to_path_buf(),
            temp_path,
            atomic,
        })
    }

    /// File to open and write.
    pub fn work_path(&self) -> &Path {
        if self.atomic {
            &self.temp_path
        } else {
            &self.final_path
        }
    }

    /// Move the written temp file over the real checkpoint. Call after the connection is closed.
    pub fn finish(self) -> Result<()> {
        if !self.atomic {
            return Ok(());
        }
        std::fs::rename(&self.temp_path, &self.final_path).with_context(|| {
            format!(
                "rename temp checkpoint {} -> {}",
                self.temp_path.display(),
                self.final_path.display()
            )
        })?;
        remove_sqlite_sidecars(&self.temp_path);
        Ok(())
    }
}
