//! Profile registry: the ordered identity set and the active pointer
//!
//! Every mutation is a read-modify-write of the config document performed
//! under the store's write lock, committed through `ConfigStore::save`.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::config::{ConfigDocument, ConfigStore, ProfileSettings};
use crate::error::{ProfileError, Result};
use crate::profile::ProfileId;

/// Settings of the active profile plus the profile list
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveSettings {
    pub settings: ProfileSettings,
    pub profiles: Vec<ProfileId>,
    pub active: ProfileId,
}

/// Result of merging a partial settings update
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub settings: ProfileSettings,
    /// Keys that were recognized and applied
    pub applied: Vec<String>,
    /// False if the document could not be written (cache still updated)
    pub persisted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deleted {
    pub removed: ProfileId,
    pub was_active: bool,
    pub persisted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Renamed {
    pub was_active: bool,
    pub persisted: bool,
}

pub struct ProfileRegistry {
    store: Arc<ConfigStore>,
}

impl ProfileRegistry {
    pub fn new(store: Arc<ConfigStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    pub fn profiles(&self) -> (Vec<ProfileId>, ProfileId) {
        let doc = self.store.load();
        (doc.profiles, doc.active_profile)
    }

    /// Settings for the active profile, falling back to defaults if the
    /// entry is somehow missing
    pub fn effective_settings(&self) -> EffectiveSettings {
        let doc = self.store.load();
        let settings = match doc.active_settings() {
            Some(settings) => settings.clone(),
            None => {
                warn!(profile = %doc.active_profile, "Active profile has no settings entry, using defaults");
                ProfileSettings::default()
            }
        };
        EffectiveSettings {
            settings,
            profiles: doc.profiles,
            active: doc.active_profile,
        }
    }

    /// Merge the recognized keys of `partial` into the active profile only
    pub fn update_active_settings(&self, partial: &Map<String, Value>) -> Result<SettingsUpdate> {
        let _guard = self.store.write_lock();
        let mut doc = self.store.load();

        let active = doc.active_profile.clone();
        let entry = doc.profile_settings.entry(active.clone()).or_default();
        let applied = entry.merge_recognized(partial)?;
        let settings = entry.clone();

        info!(profile = %active, keys = ?applied, "Updating profile settings");
        let persisted = self.commit(doc);
        Ok(SettingsUpdate {
            settings,
            applied,
            persisted,
        })
    }

    /// Sanitize `requested` and check it against existing identities
    /// (ignoring case). No side effects.
    pub fn validate_new_identity(&self, doc: &ConfigDocument, requested: &str) -> Result<ProfileId> {
        let id = ProfileId::sanitize(requested)?;
        if let Some(existing) = doc.find_colliding(&id) {
            return Err(ProfileError::AlreadyExists(existing.clone()));
        }
        Ok(id)
    }

    /// Add a profile with default settings. Returns the sanitized identity.
    pub fn create(&self, requested: &str) -> Result<(ProfileId, bool)> {
        let _guard = self.store.write_lock();
        let mut doc = self.store.load();

        let id = self.validate_new_identity(&doc, requested)?;
        doc.profiles.push(id.clone());
        doc.profile_settings
            .insert(id.clone(), ProfileSettings::default());

        info!(profile = %id, requested, "Creating profile");
        let persisted = self.commit(doc);
        Ok((id, persisted))
    }

    /// Remove a profile and its settings. Its partition directory is left
    /// on disk. If it was active, the first remaining profile becomes active.
    pub fn delete(&self, identity: &str) -> Result<Deleted> {
        let _guard = self.store.write_lock();
        let mut doc = self.store.load();

        let removed = doc
            .find(identity)
            .cloned()
            .ok_or_else(|| ProfileError::NotFound(identity.to_string()))?;
        if doc.profiles.len() == 1 {
            return Err(ProfileError::LastProfileProtected(removed));
        }

        doc.profiles.retain(|p| *p != removed);
        doc.profile_settings.remove(&removed);

        let was_active = doc.is_active(&removed);
        if was_active {
            doc.active_profile = doc.profiles[0].clone();
            info!(profile = %removed, new_active = %doc.active_profile, "Deleting active profile");
        } else {
            info!(profile = %removed, "Deleting profile");
        }

        let persisted = self.commit(doc);
        Ok(Deleted {
            removed,
            was_active,
            persisted,
        })
    }

    /// Make a known profile active
    pub fn set_active(&self, identity: &str) -> Result<(ProfileId, bool)> {
        let _guard = self.store.write_lock();
        let mut doc = self.store.load();

        let id = doc
            .find(identity)
            .cloned()
            .ok_or_else(|| ProfileError::NotFound(identity.to_string()))?;
        doc.active_profile = id.clone();

        info!(profile = %id, "Switching active profile");
        let persisted = self.commit(doc);
        Ok((id, persisted))
    }

    /// Replace `old` with `new` in place, carrying its settings over.
    /// Only the document changes; the partition must already have been moved.
    pub fn rename_identity(&self, old: &ProfileId, new: &ProfileId) -> Result<Renamed> {
        let _guard = self.store.write_lock();
        let mut doc = self.store.load();

        let slot = doc
            .profiles
            .iter_mut()
            .find(|p| **p == *old)
            .ok_or_else(|| ProfileError::NotFound(old.to_string()))?;
        *slot = new.clone();

        let settings = doc.profile_settings.remove(old).unwrap_or_default();
        doc.profile_settings.insert(new.clone(), settings);

        let was_active = doc.is_active(old);
        if was_active {
            doc.active_profile = new.clone();
        }

        info!(from = %old, to = %new, "Renaming profile");
        let persisted = self.commit(doc);
        Ok(Renamed {
            was_active,
            persisted,
        })
    }

    /// Save failures are non-fatal: the store keeps the new document cached
    fn commit(&self, doc: ConfigDocument) -> bool {
        self.store.save(doc).is_ok()
    }
}
