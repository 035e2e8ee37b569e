//! Schema migration for configuration documents
//!
//! Older releases stored a single flat settings object at the top level of
//! `config.json`. This lifts such files into the profile-aware schema and
//! repairs hand-edited documents. The pass is idempotent: feeding its output
//! back in yields the same document.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::config::document::ConfigDocument;
use crate::config::settings::{ProfileSettings, RECOGNIZED_KEYS};
use crate::error::Result;
use crate::profile::ProfileId;

const KEY_PROFILES: &str = "profiles";
const KEY_ACTIVE: &str = "activeProfile";
const KEY_SETTINGS: &str = "profileSettings";

/// Parse config text (e.g. from a backup) and migrate it
pub fn parse_document(contents: &str) -> Result<ConfigDocument> {
    let raw: Value = serde_json::from_str(contents)?;
    Ok(migrate(raw))
}

/// Migrate a raw JSON value into a well-formed document
pub fn migrate(raw: Value) -> ConfigDocument {
    let mut root = match raw {
        Value::Object(map) => map,
        other => {
            warn!(found = %json_kind(&other), "Config root is not an object, starting fresh");
            Map::new()
        }
    };

    // Flat pre-profile keys never stay at the top level
    let legacy: Map<String, Value> = RECOGNIZED_KEYS
        .iter()
        .filter_map(|key| root.remove(*key).map(|value| (key.to_string(), value)))
        .collect();

    // Raw identity -> sanitized identity, so settings keys follow renames
    let mut renamed: HashMap<String, ProfileId> = HashMap::new();
    // Raw identities that were listed but not kept
    let mut dropped: HashSet<String> = HashSet::new();
    let mut profiles: Vec<ProfileId> = Vec::new();

    match root.remove(KEY_PROFILES) {
        Some(Value::Array(items)) => {
            for item in items {
                let Some(raw_id) = item.as_str() else {
                    warn!(value = %item, "Skipping non-string profile identity");
                    continue;
                };
                let id = match ProfileId::sanitize(raw_id) {
                    Ok(id) => id,
                    Err(e) => {
                        warn!(error = %e, "Skipping unusable profile identity");
                        dropped.insert(raw_id.to_string());
                        continue;
                    }
                };
                if profiles.iter().any(|p| p.collides_with(&id)) {
                    warn!(profile = %id, "Skipping duplicate profile identity");
                    dropped.insert(raw_id.to_string());
                    continue;
                }
                if id != raw_id {
                    warn!(from = %raw_id, to = %id, "Sanitized stored profile identity");
                }
                renamed.insert(raw_id.to_string(), id.clone());
                profiles.push(id);
            }
        }
        Some(other) => warn!(found = %json_kind(&other), "Ignoring malformed profile list"),
        None => debug!("No profile list found, assuming single default profile"),
    }

    if profiles.is_empty() {
        profiles.push(ProfileId::default_identity());
    }

    let active_profile = root
        .remove(KEY_ACTIVE)
        .and_then(|value| value.as_str().map(str::to_string))
        .and_then(|raw_id| resolve(&renamed, &raw_id))
        .filter(|id| profiles.contains(id))
        .unwrap_or_else(|| profiles[0].clone());

    let mut profile_settings: BTreeMap<ProfileId, ProfileSettings> = BTreeMap::new();
    match root.remove(KEY_SETTINGS) {
        Some(Value::Object(entries)) => {
            if !legacy.is_empty() {
                debug!(
                    keys = legacy.len(),
                    "Dropping stray top-level settings from a profile-aware config"
                );
            }
            for (raw_id, entry) in entries {
                // An entry keyed by the exact raw identity that was kept wins
                // over one that only sanitizes to the same identity
                let exact = renamed.get(&raw_id).cloned();
                if exact.is_none() && dropped.contains(&raw_id) {
                    warn!(profile = %raw_id, "Dropping settings for duplicate profile");
                    continue;
                }
                let Some(id) = exact
                    .clone()
                    .or_else(|| ProfileId::sanitize(&raw_id).ok())
                    .filter(|id| profiles.contains(id))
                else {
                    warn!(profile = %raw_id, "Dropping settings for unknown profile");
                    continue;
                };
                if exact.is_none() && profile_settings.contains_key(&id) {
                    debug!(profile = %raw_id, "Settings for this profile already taken from its listed name");
                    continue;
                }
                let settings = match entry {
                    Value::Object(map) => ProfileSettings::from_lenient(&map),
                    other => {
                        warn!(profile = %id, found = %json_kind(&other), "Malformed profile settings, using defaults");
                        ProfileSettings::default()
                    }
                };
                profile_settings.insert(id, settings);
            }
        }
        other => {
            if let Some(other) = other {
                warn!(found = %json_kind(&other), "Ignoring malformed profile settings map");
            }
            // Pre-profile file: the flat keys become the active profile's settings
            if !legacy.is_empty() {
                info!(
                    profile = %active_profile,
                    keys = legacy.len(),
                    "Migrating legacy flat settings into profile"
                );
            }
            profile_settings.insert(
                active_profile.clone(),
                ProfileSettings::from_lenient(&legacy),
            );
        }
    }

    let mut doc = ConfigDocument {
        profiles,
        active_profile,
        profile_settings,
        extra: root,
    };
    doc.normalize();
    doc
}

fn resolve(renamed: &HashMap<String, ProfileId>, raw_id: &str) -> Option<ProfileId> {
    renamed
        .get(raw_id)
        .cloned()
        .or_else(|| ProfileId::sanitize(raw_id).ok())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
