//! Session partition directories
//!
//! Each profile's browser session state lives in `Partitions/<identity>`.
//! The window runtime creates and fills these; this module only computes
//! their location and moves them when a profile is renamed. Contents are
//! never inspected.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::constants;
use crate::error::{ProfileError, Result};
use crate::profile::ProfileId;

/// What a partition rename did on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "kebab-case")]
pub enum PartitionMove {
    /// The old profile never had a partition (e.g. never opened)
    NothingToMove,
    /// The directory was moved. `backup` is where a directory that already
    /// occupied the destination was moved aside to.
    Moved {
        from: PathBuf,
        to: PathBuf,
        backup: Option<PathBuf>,
    },
}

type Clock = fn() -> chrono::DateTime<chrono::Local>;

#[derive(Debug, Clone)]
pub struct PartitionManager {
    root: PathBuf,
    /// Source of backup timestamps
    clock: Clock,
}

/// True if anything (dir, file, dangling link) exists at `path`
fn occupied(path: &Path) -> bool {
    path.symlink_metadata().is_ok()
}

/// Final step of a rename. On failure, whatever was moved aside to `backup`
/// goes back to `to`.
fn move_into_place(from: &Path, to: &Path, backup: Option<&Path>) -> Result<()> {
    let Err(e) = fs::rename(from, to) else {
        return Ok(());
    };
    error!(from = %from.display(), to = %to.display(), error = %e, "Failed to move partition");
    if let Some(backup) = backup {
        match fs::rename(backup, to) {
            Ok(()) => info!(backup = %backup.display(), "Put displaced partition back"),
            Err(restore_err) => error!(
                backup = %backup.display(),
                error = %restore_err,
                "Failed to put displaced partition back"
            ),
        }
    }
    Err(ProfileError::io(from, e))
}

impl PartitionManager {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            clock: chrono::Local::now,
        }
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic location of a profile's partition. No I/O.
    pub fn path_for(&self, id: &ProfileId) -> PathBuf {
        self.root.join(id.as_str())
    }

    pub fn exists(&self, id: &ProfileId) -> bool {
        occupied(&self.path_for(id))
    }

    /// Move `old`'s partition to `new`'s location.
    ///
    /// Anything already at the destination is moved to a timestamped backup
    /// path first; it is never overwritten or deleted. The move itself is a
    /// single `rename`. On failure the destination backup is put back, so the
    /// filesystem looks as it did before the call.
    pub fn rename(&self, old: &ProfileId, new: &ProfileId) -> Result<PartitionMove> {
        let from = self.path_for(old);
        let to = self.path_for(new);

        if !occupied(&from) {
            debug!(profile = %old, "No partition to move");
            return Ok(PartitionMove::NothingToMove);
        }

        let backup = if occupied(&to) {
            Some(self.move_aside(new, &to)?)
        } else {
            None
        };

        move_into_place(&from, &to, backup.as_deref())?;

        info!(from = %old, to = %new, "Moved session partition");
        Ok(PartitionMove::Moved { from, to, backup })
    }

    /// Move whatever occupies `path` to `<identity>.backup-<timestamp>[-n]`
    fn move_aside(&self, id: &ProfileId, path: &Path) -> Result<PathBuf> {
        let stamp = (self.clock)().format(constants::TIMESTAMP_FORMAT);
        let base = format!("{}{}{}", id, constants::partition::BACKUP_INFIX, stamp);

        for attempt in 0..constants::partition::MAX_BACKUP_ATTEMPTS {
            let name = if attempt == 0 {
                base.clone()
            } else {
                format!("{base}-{attempt}")
            };
            let candidate = self.root.join(name);
            if occupied(&candidate) {
                continue;
            }

            fs::rename(path, &candidate).map_err(|e| ProfileError::io(path, e))?;
            warn!(
                occupied = %path.display(),
                backup = %candidate.display(),
                "Partition destination already existed, moved it aside"
            );
            return Ok(candidate);
        }

        Err(ProfileError::PartitionConflict {
            path: path.to_path_buf(),
        })
    }

    /// Delete a profile's session data. Only for an explicit user reset;
    /// returns false if there was nothing to delete.
    pub fn clear(&self, id: &ProfileId) -> Result<bool> {
        let path = self.path_for(id);
        if !occupied(&path) {
            return Ok(false);
        }
        let result = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        result.map_err(|e| ProfileError::io(&path, e))?;
        info!(profile = %id, "Cleared session partition");
        Ok(true)
    }

    /// Backups previously created for `id`, sorted by name (oldest first)
    #[cfg(test)]
    pub fn backups_for(&self, id: &ProfileId) -> Result<Vec<PathBuf>> {
        let prefix = format!("{}{}", id, constants::partition::BACKUP_INFIX);
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ProfileError::io(&self.root, e)),
        };

        let mut backups: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().starts_with(&prefix))
            .map(|entry| entry.path())
            .collect();
        backups.sort();
        Ok(backups)
    }
}
