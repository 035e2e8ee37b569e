//! The persisted configuration document
//!
//! Shape on disk:
//! `{ "profiles": [..], "activeProfile": "..", "profileSettings": { id: {..} } }`
//! plus any top-level keys written by other app versions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::config::settings::ProfileSettings;
use crate::profile::ProfileId;

/// Top-level configuration with profile support
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigDocument {
    /// Profile identities in display order. Never empty.
    pub profiles: Vec<ProfileId>,
    /// Identity bound to the running window's partition. Always a member of `profiles`.
    pub active_profile: ProfileId,
    /// One entry per identity in `profiles`, nothing else
    pub profile_settings: BTreeMap<ProfileId, ProfileSettings>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for ConfigDocument {
    fn default() -> Self {
        let id = ProfileId::default_identity();
        let mut profile_settings = BTreeMap::new();
        profile_settings.insert(id.clone(), ProfileSettings::default());
        Self {
            profiles: vec![id.clone()],
            active_profile: id,
            profile_settings,
            extra: Map::new(),
        }
    }
}

impl ConfigDocument {
    pub fn contains(&self, id: &ProfileId) -> bool {
        self.profiles.contains(id)
    }

    /// Look up a known identity from an unvalidated string
    pub fn find(&self, raw: &str) -> Option<&ProfileId> {
        self.profiles.iter().find(|p| p.as_str() == raw)
    }

    /// Existing identity that `candidate` would collide with, if any
    pub fn find_colliding(&self, candidate: &ProfileId) -> Option<&ProfileId> {
        self.profiles.iter().find(|p| p.collides_with(candidate))
    }

    pub fn is_active(&self, id: &ProfileId) -> bool {
        self.active_profile == *id
    }

    pub fn active_settings(&self) -> Option<&ProfileSettings> {
        self.profile_settings.get(&self.active_profile)
    }

    /// Re-establish the document invariants.
    ///
    /// Duplicate identities (ignoring case) are dropped, an empty profile list
    /// gets the default identity, a dangling active pointer falls back to the
    /// first profile, and the settings map is trimmed/filled to match
    /// `profiles` exactly. Returns true if anything changed.
    pub fn normalize(&mut self) -> bool {
        let mut changed = false;

        let mut unique: Vec<ProfileId> = Vec::with_capacity(self.profiles.len());
        for id in self.profiles.drain(..) {
            if unique.iter().any(|p| p.collides_with(&id)) {
                warn!(profile = %id, "Dropping duplicate profile identity");
                changed = true;
                continue;
            }
            unique.push(id);
        }
        self.profiles = unique;

        if self.profiles.is_empty() {
            self.profiles.push(ProfileId::default_identity());
            changed = true;
        }

        if !self.contains(&self.active_profile) {
            let fallback = self.profiles[0].clone();
            warn!(
                active = %self.active_profile,
                fallback = %fallback,
                "Active profile is not a known profile, falling back"
            );
            self.active_profile = fallback;
            changed = true;
        }

        let profiles = &self.profiles;
        let before = self.profile_settings.len();
        self.profile_settings.retain(|id, _| profiles.contains(id));
        if self.profile_settings.len() != before {
            changed = true;
        }

        for id in &self.profiles {
            if !self.profile_settings.contains_key(id) {
                self.profile_settings
                    .insert(id.clone(), ProfileSettings::default());
                changed = true;
            }
        }

        changed
    }
}
