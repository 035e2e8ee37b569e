//! Config store: the single reader/writer of `config.json`
//!
//! Keeps the migrated document in a lock-free cache (readers get a copy),
//! and serializes all writers behind one re-entrant lock. Writes go to a
//! temp file in the same directory and are renamed over the real path, so
//! the file on disk is always either the old or the new document.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arc_swap::ArcSwapOption;
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, error, info, warn};

use crate::config::backup::{BackupKind, BackupManager};
use crate::config::document::ConfigDocument;
use crate::config::migration;
use crate::config::paths::AppPaths;
use crate::constants;
use crate::error::{ProfileError, Result};

pub struct ConfigStore {
    paths: AppPaths,
    backups: BackupManager,
    cache: ArcSwapOption<ConfigDocument>,
    writer: ReentrantMutex<()>,
    /// Set when config.json exists but could not be read. The file is then
    /// never overwritten by this process.
    unreadable: AtomicBool,
}

impl ConfigStore {
    pub fn new(paths: AppPaths) -> Self {
        let backups = BackupManager::new(paths.config_file(), paths.backups_dir());
        Self {
            paths,
            backups,
            cache: ArcSwapOption::empty(),
            writer: ReentrantMutex::new(()),
            unreadable: AtomicBool::new(false),
        }
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    pub fn backups(&self) -> &BackupManager {
        &self.backups
    }

    /// Hold this to make a read-modify-write sequence (including filesystem
    /// work outside the document) uninterruptible with respect to other
    /// writers. Re-entrant, so `save` can be called while holding it.
    pub fn write_lock(&self) -> ReentrantMutexGuard<'_, ()> {
        self.writer.lock()
    }

    /// Return a copy of the current document, reading and migrating the file
    /// on first use. Never fails: a missing or unreadable file yields the
    /// default single-profile document.
    pub fn load(&self) -> ConfigDocument {
        if let Some(doc) = self.cache.load_full() {
            return (*doc).clone();
        }

        let _guard = self.writer.lock();
        // Another thread may have populated the cache while we waited
        if let Some(doc) = self.cache.load_full() {
            return (*doc).clone();
        }

        let doc = self.read_from_disk();
        self.cache.store(Some(Arc::new(doc.clone())));
        doc
    }

    /// Normalize `doc`, make it the cached document, then write it to disk.
    ///
    /// A failed write is logged and returned, but the cache keeps the new
    /// document: the running process stays on its last good state. Nothing
    /// is written while the file on disk is one that could not be read.
    pub fn save(&self, mut doc: ConfigDocument) -> Result<()> {
        let _guard = self.writer.lock();

        if doc.normalize() {
            debug!("Normalized config document before save");
        }
        self.cache.store(Some(Arc::new(doc.clone())));

        if self.unreadable.load(Ordering::Acquire) {
            let config_path = self.paths.config_file();
            error!(path = %config_path.display(), "Config file could not be read, refusing to overwrite it");
            return Err(ProfileError::io(
                config_path,
                std::io::Error::other("existing config could not be read, not overwriting it"),
            ));
        }

        self.write_atomic(&doc).inspect_err(|e| {
            error!(error = %e, "Failed to persist config, keeping in-memory copy");
        })
    }

    fn read_from_disk(&self) -> ConfigDocument {
        let config_path = self.paths.config_file();

        let bytes = match fs::read(&config_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return self.create_default("Config file not found");
            }
            Err(e) => {
                // Leave an unreadable file alone; it may be fixable by the user
                error!(path = %config_path.display(), error = %e, "Failed to read config, using defaults without saving");
                self.unreadable.store(true, Ordering::Release);
                return ConfigDocument::default();
            }
        };

        // Invalid UTF-8 is decoded lossily so the profile list survives; the
        // original bytes are kept next to the file first
        let (contents, lossy) = match String::from_utf8(bytes) {
            Ok(contents) => (contents, false),
            Err(e) => {
                warn!(path = %config_path.display(), error = %e, "Config file is not valid UTF-8");
                if !self.set_aside(&config_path, true) {
                    self.unreadable.store(true, Ordering::Release);
                }
                (String::from_utf8_lossy(e.as_bytes()).into_owned(), true)
            }
        };
        if contents.trim().is_empty() {
            return self.create_default("Config file is empty");
        }

        let raw: Value = match serde_json::from_str(&contents) {
            Ok(raw) => raw,
            Err(e) => {
                error!(path = %config_path.display(), error = %e, "Failed to parse config JSON");
                if !self.set_aside(&config_path, false) {
                    self.unreadable.store(true, Ordering::Release);
                    return ConfigDocument::default();
                }
                return self.create_default("Replacing unparsable config");
            }
        };

        let doc = migration::migrate(raw.clone());

        let unchanged = serde_json::to_value(&doc).is_ok_and(|migrated| migrated == raw);
        if (!unchanged || lossy) && !self.unreadable.load(Ordering::Acquire) {
            info!("Config document changed by migration, rewriting");
            if !lossy && let Err(e) = self.backups.create_backup(BackupKind::Migration) {
                warn!(error = %e, "Failed to snapshot config before migration");
            }
            if let Err(e) = self.write_atomic(&doc) {
                error!(error = %e, "Failed to write migrated config");
            }
        }

        info!(
            profiles = doc.profiles.len(),
            active = %doc.active_profile,
            "Loaded config"
        );
        doc
    }

    fn create_default(&self, reason: &str) -> ConfigDocument {
        let config_path = self.paths.config_file();
        info!(path = %config_path.display(), "{reason}, creating default config");
        let doc = ConfigDocument::default();
        if let Err(e) = self.write_atomic(&doc) {
            error!(error = %e, "Failed to write default config");
        }
        doc
    }

    /// Keep a damaged config as `config.json.corrupt-<ts>` so it is never
    /// lost to a later save. Moves it unless `keep_original` is set, in
    /// which case it is copied. Returns false if that failed.
    fn set_aside(&self, config_path: &Path, keep_original: bool) -> bool {
        let datetime = chrono::Local::now().format(constants::TIMESTAMP_FORMAT);
        let aside = config_path.with_file_name(format!(
            "{}.{}-{}",
            constants::config::FILENAME,
            constants::config::CORRUPT_SUFFIX,
            datetime
        ));
        let result = if keep_original {
            fs::copy(config_path, &aside).map(|_| ())
        } else {
            fs::rename(config_path, &aside)
        };
        match result {
            Ok(()) => {
                warn!(path = %aside.display(), "Set damaged config aside");
                true
            }
            Err(e) => {
                error!(error = %e, "Failed to set damaged config aside");
                false
            }
        }
    }

    fn write_atomic(&self, doc: &ConfigDocument) -> Result<()> {
        let config_path = self.paths.config_file();
        let dir = self.paths.root();
        fs::create_dir_all(dir).map_err(|e| ProfileError::io(dir, e))?;

        let json = serde_json::to_string_pretty(doc)?;

        // Temp file must live in the same directory for the rename to be atomic
        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| ProfileError::io(dir, e))?;
        let tmp_path = tmp.path().to_path_buf();
        tmp.write_all(json.as_bytes())
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| ProfileError::io(&tmp_path, e))?;
        tmp.persist(&config_path)
            .map_err(|e| ProfileError::io(&config_path, e.error))?;

        info!(path = %config_path.display(), "Saved config");
        Ok(())
    }
}
