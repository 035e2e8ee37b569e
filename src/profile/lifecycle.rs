//! Profile lifecycle controller
//!
//! Coordinates the config store, the registry and the partition directories
//! for each user-facing command, and tells the window runtime what changed.
//! Every mutating command runs under the store's write lock from validation
//! to the last signal, so commands never interleave.
//!
//! Ordering rule: the filesystem is changed before the document is
//! committed. If the partition move fails, the document is not touched.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::common::ipc::{ShellSignal, SignalSink};
use crate::config::{BackupEntry, BackupKind, ConfigStore, migration};
use crate::constants;
use crate::error::{ProfileError, Result};
use crate::profile::partition::{PartitionManager, PartitionMove};
use crate::profile::registry::{EffectiveSettings, ProfileRegistry, SettingsUpdate};
use crate::profile::ProfileId;

/// Result of create, switch, delete and restore
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleOutcome {
    /// The profile the command acted on
    pub profile: ProfileId,
    pub profiles: Vec<ProfileId>,
    pub active: ProfileId,
    pub restart_required: bool,
    pub persisted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameOutcome {
    /// The document now carries the new identity
    pub committed: bool,
    pub restart_required: bool,
    pub persisted: bool,
    pub previous: ProfileId,
    pub profile: ProfileId,
    pub partition: PartitionMove,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReset {
    pub profile: ProfileId,
    /// False if the profile had no session data yet
    pub cleared: bool,
    pub restart_required: bool,
}

fn backup_error(e: anyhow::Error) -> ProfileError {
    ProfileError::Backup(format!("{e:#}"))
}

pub struct ProfileLifecycleController<S: SignalSink> {
    registry: ProfileRegistry,
    partitions: PartitionManager,
    sink: S,
}

impl<S: SignalSink> ProfileLifecycleController<S> {
    pub fn new(store: Arc<ConfigStore>, sink: S) -> Self {
        let partitions = PartitionManager::new(store.paths().partitions_dir());
        debug!(root = %partitions.root().display(), "Session partitions root");
        Self {
            registry: ProfileRegistry::new(store),
            partitions,
            sink,
        }
    }

    #[cfg(test)]
    pub fn registry(&self) -> &ProfileRegistry {
        &self.registry
    }

    #[cfg(test)]
    pub fn partitions(&self) -> &PartitionManager {
        &self.partitions
    }

    #[cfg(test)]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    #[cfg(test)]
    pub fn with_partitions(mut self, partitions: PartitionManager) -> Self {
        self.partitions = partitions;
        self
    }

    fn store(&self) -> &ConfigStore {
        self.registry.store()
    }

    pub fn effective_settings(&self) -> EffectiveSettings {
        self.registry.effective_settings()
    }

    /// Directory the window should bind its session to
    pub fn active_partition(&self) -> PathBuf {
        let (_, active) = self.registry.profiles();
        self.partitions.path_for(&active)
    }

    pub fn save_active_settings(&self, partial: &Map<String, Value>) -> Result<SettingsUpdate> {
        let _guard = self.store().write_lock();
        let update = self.registry.update_active_settings(partial)?;
        self.sink.emit(ShellSignal::SettingsUpdated {
            settings: update.settings.clone(),
        });
        Ok(update)
    }

    /// Remember the page the window is showing. No signal: the window
    /// already knows where it is.
    pub fn record_url(&self, url: &str) -> Result<SettingsUpdate> {
        let _guard = self.store().write_lock();
        let mut partial = Map::new();
        partial.insert("lastUrl".to_string(), Value::String(url.to_string()));
        debug!(url, "Recording visited URL");
        self.registry.update_active_settings(&partial)
    }

    pub fn create_profile(&self, name: &str) -> Result<LifecycleOutcome> {
        let _guard = self.store().write_lock();
        let (id, persisted) = self.registry.create(name)?;
        Ok(self.announce(id, false, persisted))
    }

    /// Make `identity` active. Always requires a restart, even if it was
    /// already active: the window picks its partition only at launch.
    pub fn switch_profile(&self, identity: &str) -> Result<LifecycleOutcome> {
        let _guard = self.store().write_lock();
        let (id, persisted) = self.registry.set_active(identity)?;
        Ok(self.announce(id, true, persisted))
    }

    /// Delete a profile. Its partition directory stays on disk.
    pub fn delete_profile(&self, identity: &str) -> Result<LifecycleOutcome> {
        let _guard = self.store().write_lock();
        let deleted = self.registry.delete(identity)?;
        if self.partitions.exists(&deleted.removed) {
            info!(
                profile = %deleted.removed,
                path = %self.partitions.path_for(&deleted.removed).display(),
                "Leaving partition of deleted profile on disk"
            );
        }
        Ok(self.announce(deleted.removed, deleted.was_active, deleted.persisted))
    }

    pub fn rename_profile(&self, old: &str, new: &str) -> Result<RenameOutcome> {
        let _guard = self.store().write_lock();
        let doc = self.store().load();

        let new_id = self.registry.validate_new_identity(&doc, new)?;
        let old_id = doc
            .find(old)
            .cloned()
            .ok_or_else(|| ProfileError::NotFound(old.to_string()))?;

        let partition = self.partitions.rename(&old_id, &new_id).inspect_err(|e| {
            warn!(from = %old_id, to = %new_id, error = %e, "Partition move failed, rename aborted");
        })?;

        let renamed = self.registry.rename_identity(&old_id, &new_id)?;
        let outcome = self.announce(new_id.clone(), renamed.was_active, renamed.persisted);

        Ok(RenameOutcome {
            committed: true,
            restart_required: outcome.restart_required,
            persisted: outcome.persisted,
            previous: old_id,
            profile: new_id,
            partition,
        })
    }

    /// Wipe the active profile's session data
    pub fn reset_session(&self) -> Result<SessionReset> {
        let _guard = self.store().write_lock();
        let (_, active) = self.registry.profiles();
        let cleared = self.partitions.clear(&active)?;
        info!(profile = %active, cleared, "Session reset requested");
        self.sink.emit(ShellSignal::RestartRequired);
        Ok(SessionReset {
            profile: active,
            cleared,
            restart_required: true,
        })
    }

    pub fn create_backup(&self) -> Result<PathBuf> {
        let _guard = self.store().write_lock();
        // Materializes config.json if this is a first run
        self.store().load();
        self.store()
            .backups()
            .create_backup(BackupKind::Manual)
            .map_err(backup_error)
    }

    pub fn list_backups(&self) -> Result<Vec<BackupEntry>> {
        self.store().backups().list_backups().map_err(backup_error)
    }

    pub fn delete_backup(&self, filename: &str) -> Result<()> {
        self.store()
            .backups()
            .delete_backup(filename)
            .map_err(backup_error)
    }

    /// Keep the newest `keep` automatic snapshots; manual ones are kept
    pub fn prune_backups(&self, keep: Option<u32>) -> Result<usize> {
        let keep = keep.unwrap_or(constants::config::backup::DEFAULT_RETENTION);
        self.store()
            .backups()
            .prune_backups(keep)
            .map_err(backup_error)
    }

    /// Replace the current document with the one in a snapshot. Partitions
    /// are left as they are; a profile whose directory is gone simply
    /// starts with an empty session.
    pub fn restore_backup(&self, filename: &str) -> Result<LifecycleOutcome> {
        let _guard = self.store().write_lock();
        let contents = self
            .store()
            .backups()
            .read_backup(filename)
            .map_err(backup_error)?;
        let doc = migration::parse_document(&contents)?;

        info!(filename, active = %doc.active_profile, "Restoring config from backup");
        let persisted = self.store().save(doc).is_ok();
        let (_, active) = self.registry.profiles();
        Ok(self.announce(active, true, persisted))
    }

    /// Tell the window runtime about the new profile list, and if the active
    /// partition changed, about the new settings and the restart
    fn announce(&self, profile: ProfileId, restart_required: bool, persisted: bool) -> LifecycleOutcome {
        let effective = self.registry.effective_settings();

        self.sink.emit(ShellSignal::ProfilesUpdated {
            profiles: effective.profiles.clone(),
            active: effective.active.clone(),
        });
        if restart_required {
            self.sink.emit(ShellSignal::SettingsUpdated {
                settings: effective.settings,
            });
            self.sink.emit(ShellSignal::RestartRequired);
        }

        LifecycleOutcome {
            profile,
            profiles: effective.profiles,
            active: effective.active,
            restart_required,
            persisted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppPaths, ConfigDocument, ProfileSettings};
    use crate::profile::partition::tests::{fixed_clock, occupy_backup_names};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::fs;
    use std::path::Path;

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<ShellSignal>>);

    impl RecordingSink {
        fn take(&self) -> Vec<ShellSignal> {
            std::mem::take(&mut *self.0.lock())
        }
    }

    impl SignalSink for RecordingSink {
        fn emit(&self, signal: ShellSignal) {
            self.0.lock().push(signal);
        }
    }

    type Controller = ProfileLifecycleController<RecordingSink>;

    fn controller_in(root: &Path) -> Controller {
        let store = Arc::new(ConfigStore::new(AppPaths::new(root)));
        ProfileLifecycleController::new(store, RecordingSink::default())
    }

    fn id(raw: &str) -> ProfileId {
        ProfileId::parse(raw).unwrap()
    }

    fn seed_partition(controller: &Controller, profile: &str, marker: &str) {
        let dir = controller.partitions().path_for(&id(profile));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("Cookies"), marker).unwrap();
    }

    fn read_marker(controller: &Controller, profile: &str) -> String {
        let dir = controller.partitions().path_for(&id(profile));
        fs::read_to_string(dir.join("Cookies")).unwrap()
    }

    fn doc(controller: &Controller) -> ConfigDocument {
        controller.registry().store().load()
    }

    fn dir_listing(path: &Path) -> Vec<String> {
        let mut names: Vec<String> = match fs::read_dir(path) {
            Ok(entries) => entries
                .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
                .collect(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }

    fn has_restart(signals: &[ShellSignal]) -> bool {
        signals.contains(&ShellSignal::RestartRequired)
    }

    #[test]
    fn test_create_signals_profiles_without_restart() {
        let temp = tempfile::tempdir().unwrap();
        let controller = controller_in(temp.path());

        let outcome = controller.create_profile("my profile!").unwrap();
        assert_eq!(outcome.profile, id("myprofile"));
        assert_eq!(outcome.profiles, vec![id("default"), id("myprofile")]);
        assert!(!outcome.restart_required);
        assert!(outcome.persisted);

        assert_eq!(
            controller.sink().take(),
            vec![ShellSignal::ProfilesUpdated {
                profiles: vec![id("default"), id("myprofile")],
                active: id("default"),
            }]
        );

        let err = controller.create_profile("myprofile").unwrap_err();
        assert!(matches!(err, ProfileError::AlreadyExists(_)));
        assert!(controller.sink().take().is_empty());
    }

    #[test]
    fn test_switch_always_requires_restart() {
        let temp = tempfile::tempdir().unwrap();
        let controller = controller_in(temp.path());
        controller.create_profile("work").unwrap();
        controller.sink().take();

        let outcome = controller.switch_profile("work").unwrap();
        assert!(outcome.restart_required);
        assert_eq!(outcome.active, id("work"));
        let signals = controller.sink().take();
        assert!(has_restart(&signals));
        assert!(signals.contains(&ShellSignal::SettingsUpdated {
            settings: ProfileSettings::default()
        }));

        // Switching to the already-active profile still restarts
        let outcome = controller.switch_profile("work").unwrap();
        assert!(outcome.restart_required);
        assert!(has_restart(&controller.sink().take()));
    }

    #[test]
    fn test_switch_unknown_profile() {
        let temp = tempfile::tempdir().unwrap();
        let controller = controller_in(temp.path());

        let err = controller.switch_profile("ghost").unwrap_err();
        assert!(matches!(err, ProfileError::NotFound(_)));
        assert_eq!(doc(&controller).active_profile, id("default"));
        assert!(controller.sink().take().is_empty());
    }

    #[test]
    fn test_rename_inactive_moves_partition_without_restart() {
        let temp = tempfile::tempdir().unwrap();
        let controller = controller_in(temp.path());
        controller.create_profile("work").unwrap();
        seed_partition(&controller, "work", "work-session");
        controller.sink().take();

        let outcome = controller.rename_profile("work", "office").unwrap();
        assert!(outcome.committed);
        assert!(!outcome.restart_required);
        assert_eq!(outcome.previous, id("work"));
        assert_eq!(outcome.profile, id("office"));
        assert!(matches!(outcome.partition, PartitionMove::Moved { backup: None, .. }));

        assert_eq!(read_marker(&controller, "office"), "work-session");
        assert!(!controller.partitions().exists(&id("work")));
        assert_eq!(doc(&controller).profiles, vec![id("default"), id("office")]);
        assert!(!has_restart(&controller.sink().take()));
    }

    #[test]
    fn test_rename_active_requires_restart() {
        let temp = tempfile::tempdir().unwrap();
        let controller = controller_in(temp.path());
        controller.sink().take();

        let outcome = controller.rename_profile("default", "main").unwrap();
        assert!(outcome.restart_required);
        assert_eq!(outcome.partition, PartitionMove::NothingToMove);
        assert_eq!(doc(&controller).active_profile, id("main"));
        assert!(has_restart(&controller.sink().take()));
    }

    #[test]
    fn test_rename_onto_stale_partition_backs_it_up_once() {
        let temp = tempfile::tempdir().unwrap();
        let controller = controller_in(temp.path());
        controller.create_profile("work").unwrap();
        seed_partition(&controller, "work", "live");
        seed_partition(&controller, "office", "stale");

        let outcome = controller.rename_profile("work", "office").unwrap();

        let PartitionMove::Moved {
            backup: Some(backup),
            ..
        } = &outcome.partition
        else {
            panic!("expected a backup, got {:?}", outcome.partition);
        };
        assert_eq!(fs::read_to_string(backup.join("Cookies")).unwrap(), "stale");
        assert_eq!(read_marker(&controller, "office"), "live");
        assert_eq!(
            controller.partitions().backups_for(&id("office")).unwrap().len(),
            1
        );
        assert!(doc(&controller).contains(&id("office")));
    }

    #[test]
    fn test_rename_rejections_leave_filesystem_untouched() {
        let temp = tempfile::tempdir().unwrap();
        let controller = controller_in(temp.path());
        controller.create_profile("work").unwrap();
        controller.create_profile("home").unwrap();
        seed_partition(&controller, "work", "w");
        seed_partition(&controller, "home", "h");
        controller.sink().take();

        let partitions_root = controller.partitions().root().to_path_buf();
        let before_dirs = dir_listing(&partitions_root);
        let before_doc = doc(&controller);

        let cases = [
            ("work", "home"),
            ("work", "HOME"),
            ("work", "Work"),
            ("work", "!!!"),
            ("ghost", "spirit"),
        ];
        for (old, new) in cases {
            let err = controller.rename_profile(old, new).unwrap_err();
            assert!(err.is_recoverable(), "{old} -> {new}: {err}");
        }

        assert_eq!(dir_listing(&partitions_root), before_dirs);
        assert_eq!(doc(&controller), before_doc);
        assert!(controller.sink().take().is_empty());
    }

    #[test]
    fn test_failed_partition_move_leaves_document_untouched() {
        let temp = tempfile::tempdir().unwrap();
        let controller = controller_in(temp.path());
        let partitions = controller.partitions().clone().with_clock(fixed_clock);
        let controller = controller.with_partitions(partitions);
        controller.create_profile("work").unwrap();
        seed_partition(&controller, "work", "live");
        seed_partition(&controller, "office", "stale");
        occupy_backup_names(controller.partitions(), "office");
        let before_doc = doc(&controller);
        let on_disk_before =
            fs::read_to_string(controller.registry().store().paths().config_file()).unwrap();
        controller.sink().take();

        let err = controller.rename_profile("work", "office").unwrap_err();
        assert!(matches!(err, ProfileError::PartitionConflict { .. }));
        assert!(!err.is_recoverable());

        assert_eq!(doc(&controller), before_doc);
        assert_eq!(
            fs::read_to_string(controller.registry().store().paths().config_file()).unwrap(),
            on_disk_before
        );
        assert_eq!(read_marker(&controller, "work"), "live");
        assert_eq!(read_marker(&controller, "office"), "stale");
        assert!(controller.sink().take().is_empty());
    }

    #[test]
    fn test_rename_retry_after_interrupted_commit_converges() {
        let temp = tempfile::tempdir().unwrap();
        {
            let controller = controller_in(temp.path());
            controller.create_profile("work").unwrap();
            seed_partition(&controller, "work", "live");
            // Process dies after the partition move, before the document commit
            controller
                .partitions()
                .rename(&id("work"), &id("office"))
                .unwrap();
        }

        let controller = controller_in(temp.path());
        assert!(doc(&controller).contains(&id("work")));
        assert_eq!(read_marker(&controller, "office"), "live");

        let outcome = controller.rename_profile("work", "office").unwrap();
        assert_eq!(outcome.partition, PartitionMove::NothingToMove);
        assert_eq!(doc(&controller).profiles, vec![id("default"), id("office")]);
        assert_eq!(read_marker(&controller, "office"), "live");
        assert!(controller.partitions().backups_for(&id("office")).unwrap().is_empty());
    }

    #[test]
    fn test_delete_active_requires_restart_and_keeps_partition() {
        let temp = tempfile::tempdir().unwrap();
        let controller = controller_in(temp.path());
        controller.create_profile("work").unwrap();
        controller.switch_profile("work").unwrap();
        seed_partition(&controller, "work", "live");
        controller.sink().take();

        let outcome = controller.delete_profile("work").unwrap();
        assert!(outcome.restart_required);
        assert_eq!(outcome.profile, id("work"));
        assert_eq!(outcome.active, id("default"));
        assert!(has_restart(&controller.sink().take()));
        assert_eq!(read_marker(&controller, "work"), "live");

        let err = controller.delete_profile("default").unwrap_err();
        assert!(matches!(err, ProfileError::LastProfileProtected(_)));
        assert!(controller.sink().take().is_empty());
    }

    #[test]
    fn test_delete_inactive_does_not_restart() {
        let temp = tempfile::tempdir().unwrap();
        let controller = controller_in(temp.path());
        controller.create_profile("work").unwrap();
        controller.sink().take();

        let outcome = controller.delete_profile("work").unwrap();
        assert!(!outcome.restart_required);
        assert!(!has_restart(&controller.sink().take()));
    }

    #[test]
    fn test_active_partition_follows_switch() {
        let temp = tempfile::tempdir().unwrap();
        let controller = controller_in(temp.path());
        controller.create_profile("work").unwrap();

        let partitions = temp.path().join("Partitions");
        assert_eq!(controller.active_partition(), partitions.join("default"));
        controller.switch_profile("work").unwrap();
        assert_eq!(controller.active_partition(), partitions.join("work"));
    }

    #[test]
    fn test_save_active_settings_signals_new_settings() {
        let temp = tempfile::tempdir().unwrap();
        let controller = controller_in(temp.path());

        let partial = json!({"showUrlInTitleBar": true});
        let update = controller
            .save_active_settings(partial.as_object().unwrap())
            .unwrap();
        assert!(update.settings.show_url_in_title_bar);

        assert_eq!(
            controller.sink().take(),
            vec![ShellSignal::SettingsUpdated {
                settings: update.settings.clone()
            }]
        );
        assert!(controller.effective_settings().settings.show_url_in_title_bar);
    }

    #[test]
    fn test_record_url_is_silent() {
        let temp = tempfile::tempdir().unwrap();
        let controller = controller_in(temp.path());
        controller
            .save_active_settings(json!({"startupMode": "resume-last"}).as_object().unwrap())
            .unwrap();
        controller.sink().take();

        controller.record_url("https://example.com/chat/42").unwrap();

        assert!(controller.sink().take().is_empty());
        let settings = controller.effective_settings().settings;
        assert_eq!(settings.start_url(), "https://example.com/chat/42");
    }

    #[test]
    fn test_reset_session_clears_only_active_partition() {
        let temp = tempfile::tempdir().unwrap();
        let controller = controller_in(temp.path());
        controller.create_profile("work").unwrap();
        seed_partition(&controller, "default", "d");
        seed_partition(&controller, "work", "w");
        controller.sink().take();

        let reset = controller.reset_session().unwrap();
        assert_eq!(reset.profile, id("default"));
        assert!(reset.cleared);
        assert!(!controller.partitions().exists(&id("default")));
        assert_eq!(read_marker(&controller, "work"), "w");
        assert_eq!(controller.sink().take(), vec![ShellSignal::RestartRequired]);

        let again = controller.reset_session().unwrap();
        assert!(!again.cleared);
        assert!(again.restart_required);
    }

    #[test]
    fn test_restore_backup_replaces_document() {
        let temp = tempfile::tempdir().unwrap();
        let controller = controller_in(temp.path());
        controller.create_profile("work").unwrap();

        let path = controller.create_backup().unwrap();
        let filename = path.file_name().unwrap().to_string_lossy().to_string();

        controller.create_profile("scratch").unwrap();
        controller.switch_profile("scratch").unwrap();
        controller.sink().take();

        let outcome = controller.restore_backup(&filename).unwrap();
        assert!(outcome.restart_required);
        assert_eq!(outcome.profiles, vec![id("default"), id("work")]);
        assert_eq!(outcome.active, id("default"));

        let signals = controller.sink().take();
        assert!(matches!(signals[0], ShellSignal::ProfilesUpdated { .. }));
        assert!(matches!(signals[1], ShellSignal::SettingsUpdated { .. }));
        assert_eq!(signals[2], ShellSignal::RestartRequired);

        // The restored document was written through, not just cached
        let fresh = controller_in(temp.path());
        assert_eq!(doc(&fresh), doc(&controller));
    }

    #[test]
    fn test_restore_missing_backup() {
        let temp = tempfile::tempdir().unwrap();
        let controller = controller_in(temp.path());

        let err = controller.restore_backup("nope.tar.gz").unwrap_err();
        assert!(matches!(err, ProfileError::Backup(_)));
        assert_eq!(err.kind(), "backup");
        assert!(controller.sink().take().is_empty());
    }

    #[test]
    fn test_backup_list_delete_and_prune() {
        let temp = tempfile::tempdir().unwrap();
        let controller = controller_in(temp.path());

        let first = controller.create_backup().unwrap();
        controller.create_backup().unwrap();
        assert_eq!(controller.list_backups().unwrap().len(), 2);

        // Manual snapshots survive pruning
        assert_eq!(controller.prune_backups(Some(0)).unwrap(), 0);

        let name = first.file_name().unwrap().to_string_lossy().to_string();
        controller.delete_backup(&name).unwrap();
        assert_eq!(controller.list_backups().unwrap().len(), 1);
    }
}
