//! Configuration Backup Manager
//!
//! Handles creation, listing, reading, and pruning of config snapshots.
//! Snapshots are .tar.gz archives holding `config.json`, stored in the
//! `backups` subdirectory of the config root.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result, bail};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::constants;

const ARCHIVE_EXTENSION: &str = ".tar.gz";

/// Why a snapshot was taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupKind {
    /// Requested explicitly by the user; never pruned
    Manual,
    /// Taken automatically before a migration rewrote the config file
    Migration,
}

impl BackupKind {
    fn prefix(self) -> &'static str {
        match self {
            BackupKind::Manual => "manual",
            BackupKind::Migration => "migration",
        }
    }

    /// Kind of a snapshot this manager wrote; `None` for any other file
    fn from_filename(filename: &str) -> Option<Self> {
        [BackupKind::Manual, BackupKind::Migration]
            .into_iter()
            .find(|kind| filename.starts_with(&format!("{}_backup_", kind.prefix())))
    }
}

/// Represents a backup file
#[derive(Debug, Clone, Serialize)]
pub struct BackupEntry {
    pub filename: String,
    pub path: PathBuf,
    #[serde(skip)]
    pub timestamp: SystemTime,
    pub kind: BackupKind,
}

#[derive(Debug, Clone)]
pub struct BackupManager {
    config_file: PathBuf,
    backup_dir: PathBuf,
}

impl BackupManager {
    pub fn new(config_file: PathBuf, backup_dir: PathBuf) -> Self {
        Self {
            config_file,
            backup_dir,
        }
    }

    /// Snapshot the current config file
    pub fn create_backup(&self, kind: BackupKind) -> Result<PathBuf> {
        if !self.backup_dir.exists() {
            fs::create_dir_all(&self.backup_dir).context("Failed to create backup directory")?;
        }

        let mut file = fs::File::open(&self.config_file).with_context(|| {
            format!(
                "Failed to open config file for backup: {:?}",
                self.config_file
            )
        })?;

        // Generate filename: <kind>_backup_YYYYMMDD_HHMMSS[_n].tar.gz
        let datetime: chrono::DateTime<chrono::Local> = SystemTime::now().into();
        let stem = format!(
            "{}_backup_{}",
            kind.prefix(),
            datetime.format(constants::TIMESTAMP_FORMAT)
        );
        let backup_path = self.free_path(&stem);

        let tar_gz = fs::File::create(&backup_path).context("Failed to create backup file")?;
        let enc = GzEncoder::new(tar_gz, Compression::default());
        let mut tar = tar::Builder::new(enc);
        tar.append_file(constants::config::FILENAME, &mut file)
            .context("Failed to add config file to archive")?;
        tar.into_inner()
            .context("Failed to finish backup archive")?
            .finish()
            .context("Failed to flush backup archive")?;

        info!(path = %backup_path.display(), kind = ?kind, "Created config backup");
        Ok(backup_path)
    }

    fn free_path(&self, stem: &str) -> PathBuf {
        let mut candidate = self.backup_dir.join(format!("{stem}{ARCHIVE_EXTENSION}"));
        let mut n = 1;
        while candidate.exists() {
            candidate = self
                .backup_dir
                .join(format!("{stem}_{n}{ARCHIVE_EXTENSION}"));
            n += 1;
        }
        candidate
    }

    /// List all available backups, newest first
    pub fn list_backups(&self) -> Result<Vec<BackupEntry>> {
        if !self.backup_dir.exists() {
            return Ok(Vec::new());
        }

        let mut backups = Vec::new();
        for entry in fs::read_dir(&self.backup_dir)? {
            let entry = entry?;
            let filename = entry.file_name().to_string_lossy().to_string();
            if !filename.ends_with(ARCHIVE_EXTENSION) {
                continue;
            }
            let Some(kind) = BackupKind::from_filename(&filename) else {
                debug!(filename = %filename, "Skipping foreign archive in backup directory");
                continue;
            };
            let path = entry.path();
            let timestamp = fs::metadata(&path)?
                .modified()
                .unwrap_or(SystemTime::UNIX_EPOCH);

            backups.push(BackupEntry {
                kind,
                filename,
                path,
                timestamp,
            });
        }

        // Newest first; same-second snapshots fall back to name order
        backups.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| b.filename.cmp(&a.filename))
        });

        Ok(backups)
    }

    /// Extract the config document text stored in a backup
    pub fn read_backup(&self, filename: &str) -> Result<String> {
        let backup_path = self.resolve(filename)?;
        let tar_gz = fs::File::open(&backup_path).context("Failed to open backup file")?;
        let mut archive = tar::Archive::new(GzDecoder::new(tar_gz));

        for entry in archive.entries().context("Failed to read backup archive")? {
            let mut entry = entry.context("Corrupt entry in backup archive")?;
            if entry.path()?.as_ref() == Path::new(constants::config::FILENAME) {
                let mut contents = String::new();
                entry
                    .read_to_string(&mut contents)
                    .context("Failed to read config from backup")?;
                return Ok(contents);
            }
        }

        bail!("Backup {} does not contain {}", filename, constants::config::FILENAME)
    }

    /// Delete a specific backup file
    pub fn delete_backup(&self, filename: &str) -> Result<()> {
        let backup_path = self.resolve(filename)?;
        fs::remove_file(&backup_path)
            .with_context(|| format!("Failed to delete backup file: {}", filename))?;
        info!(filename, "Deleted backup");
        Ok(())
    }

    /// Prune old backups, keeping the newest `retention_count` automatic ones.
    /// Manual backups are never pruned. Returns how many were removed.
    pub fn prune_backups(&self, retention_count: u32) -> Result<usize> {
        let backups = self.list_backups()?;
        let mut removed = 0;

        for backup in backups
            .iter()
            .filter(|b| b.kind != BackupKind::Manual)
            .skip(retention_count as usize)
        {
            if let Err(e) = fs::remove_file(&backup.path) {
                error!(path = %backup.path.display(), error = %e, "Failed to prune backup");
            } else {
                info!(filename = %backup.filename, "Pruned old backup");
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Map a bare filename to a path inside the backup directory
    fn resolve(&self, filename: &str) -> Result<PathBuf> {
        if Path::new(filename).file_name().and_then(|n| n.to_str()) != Some(filename) {
            bail!("Invalid backup filename: {}", filename);
        }
        let backup_path = self.backup_dir.join(filename);
        if !backup_path.exists() {
            bail!("Backup file not found: {}", filename);
        }
        Ok(backup_path)
    }
}
