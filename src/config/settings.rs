//! Per-profile settings record
//!
//! Field names match the flat legacy schema so that pre-profile config files
//! can be lifted into a profile entry without renaming anything.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::constants::defaults::browsing;
use crate::error::Result;

/// Where the developer tools panel opens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevToolsMode {
    /// Separate window
    #[default]
    Detach,
    /// Docked to the right edge of the main window
    Right,
    /// Docked to the bottom edge of the main window
    Bottom,
}

/// Which page the window loads when it starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StartupMode {
    #[default]
    HomePage,
    CustomUrl,
    ResumeLast,
}

/// Side of the custom title bar holding the window buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowControlsPosition {
    /// Follow the platform convention
    #[default]
    Auto,
    Left,
    Right,
}

/// Every key the business logic understands. Anything else is carried
/// through untouched in `ProfileSettings::extra`.
pub const RECOGNIZED_KEYS: &[&str] = &[
    "autoClearCookies",
    "showUrlInTitleBar",
    "enableDevTools",
    "devToolsMode",
    "enableReplyNotification",
    "startupMode",
    "customHomePage",
    "language",
    "avatar",
    "windowControlsPosition",
    "lastUrl",
];

/// Profile settings - everything the window runtime needs for one profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSettings {
    /// Clear the partition's cookies every time the window starts
    #[serde(default)]
    pub auto_clear_cookies: bool,
    /// Show the current URL in the custom title bar
    #[serde(default)]
    pub show_url_in_title_bar: bool,
    #[serde(default)]
    pub enable_dev_tools: bool,
    #[serde(default)]
    pub dev_tools_mode: DevToolsMode,
    /// Desktop notification when a streamed reply finishes
    #[serde(default)]
    pub enable_reply_notification: bool,
    #[serde(default)]
    pub startup_mode: StartupMode,
    #[serde(default = "default_home_page")]
    pub custom_home_page: String,
    /// Display language tag, or "auto"
    #[serde(default = "default_language")]
    pub language: String,
    /// Avatar image reference (path or data URL), shown in the title bar
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default)]
    pub window_controls_position: WindowControlsPosition,
    /// Last URL the window navigated to (used by `StartupMode::ResumeLast`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_url: Option<String>,

    /// Keys written by other versions of the app, preserved verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_home_page() -> String {
    browsing::HOME_PAGE.to_string()
}

fn default_language() -> String {
    browsing::LANGUAGE.to_string()
}

impl Default for ProfileSettings {
    fn default() -> Self {
        Self {
            auto_clear_cookies: false,
            show_url_in_title_bar: false,
            enable_dev_tools: false,
            dev_tools_mode: DevToolsMode::default(),
            enable_reply_notification: false,
            startup_mode: StartupMode::default(),
            custom_home_page: default_home_page(),
            language: default_language(),
            avatar: None,
            window_controls_position: WindowControlsPosition::default(),
            last_url: None,
            extra: Map::new(),
        }
    }
}

impl ProfileSettings {
    /// Build settings from a raw JSON object, filling gaps with defaults.
    /// Recognized keys with unusable values fall back to their default
    /// instead of failing the whole record; unrecognized keys go to `extra`.
    pub fn from_lenient(raw: &Map<String, Value>) -> Self {
        let mut settings = Self::default();
        if let Err(e) = settings.merge_recognized(raw) {
            warn!(error = %e, "Failed to merge stored settings, using defaults");
            settings = Self::default();
        }
        settings.extra = raw
            .iter()
            .filter(|(key, _)| !RECOGNIZED_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        settings
    }

    /// URL the window should load when it starts
    pub fn start_url(&self) -> &str {
        match self.startup_mode {
            StartupMode::HomePage => browsing::HOME_PAGE,
            StartupMode::CustomUrl => {
                let custom = self.custom_home_page.trim();
                if custom.is_empty() {
                    browsing::HOME_PAGE
                } else {
                    custom
                }
            }
            StartupMode::ResumeLast => self
                .last_url
                .as_deref()
                .filter(|url| !url.trim().is_empty())
                .unwrap_or(browsing::HOME_PAGE),
        }
    }

    /// Merge the recognized keys of `partial` into these settings.
    ///
    /// Unrecognized keys in `partial` are ignored. A recognized key whose value
    /// does not fit its type is skipped with a warning; `null` resets the key
    /// to its default. Returns the keys that were applied.
    pub fn merge_recognized(&mut self, partial: &Map<String, Value>) -> Result<Vec<String>> {
        let Value::Object(mut current) = serde_json::to_value(&*self)? else {
            return Ok(Vec::new());
        };

        let mut applied = Vec::new();
        for key in RECOGNIZED_KEYS {
            let Some(value) = partial.get(*key) else {
                continue;
            };

            let mut candidate = current.clone();
            if value.is_null() {
                candidate.remove(*key);
            } else {
                candidate.insert(key.to_string(), value.clone());
            }

            match serde_json::from_value::<ProfileSettings>(Value::Object(candidate.clone())) {
                Ok(_) => {
                    current = candidate;
                    applied.push(key.to_string());
                }
                Err(e) => warn!(key = %key, error = %e, "Ignoring invalid setting value"),
            }
        }

        for key in partial.keys().filter(|k| !RECOGNIZED_KEYS.contains(&k.as_str())) {
            debug!(key = %key, "Ignoring unrecognized setting key");
        }

        *self = serde_json::from_value(Value::Object(current))?;
        Ok(applied)
    }
}
