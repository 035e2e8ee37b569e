use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::error;

use crate::config::ProfileSettings;
use crate::error::ProfileError;
use crate::profile::ProfileId;

/// Commands sent from the UI to the shell core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum ShellCommand {
    GetEffectiveSettings,
    /// Merge these keys into the active profile's settings
    SaveActiveSettings {
        settings: Map<String, Value>,
    },
    CreateProfile {
        name: String,
    },
    SwitchProfile {
        identity: String,
    },
    RenameProfile {
        old: String,
        new: String,
    },
    DeleteProfile {
        identity: String,
    },
    /// Window navigated; remembered for "resume last page" startup
    RecordUrl {
        url: String,
    },
    /// Wipe the active profile's session data
    ResetSession,
    CreateBackup,
    ListBackups,
    RestoreBackup {
        filename: String,
    },
    DeleteBackup {
        filename: String,
    },
    PruneBackups {
        #[serde(default)]
        keep: Option<u32>,
    },
}

/// Signals sent from the shell core to the window runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "kebab-case")]
pub enum ShellSignal {
    SettingsUpdated {
        settings: ProfileSettings,
    },
    ProfilesUpdated {
        profiles: Vec<ProfileId>,
        active: ProfileId,
    },
    /// The active partition changed; the window must be relaunched
    RestartRequired,
}

/// Where the lifecycle controller delivers its signals
pub trait SignalSink {
    fn emit(&self, signal: ShellSignal);
}

impl<T: SignalSink + ?Sized> SignalSink for Arc<T> {
    fn emit(&self, signal: ShellSignal) {
        (**self).emit(signal)
    }
}

impl SignalSink for std::sync::mpsc::Sender<ShellSignal> {
    fn emit(&self, signal: ShellSignal) {
        if let Err(e) = self.send(signal) {
            error!(error = %e, "Signal receiver is gone");
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplyError {
    pub kind: String,
    pub message: String,
}

/// Answer to one `ShellCommand`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ReplyError>,
}

impl Reply {
    pub fn success<T: Serialize>(result: &T) -> Self {
        match serde_json::to_value(result) {
            Ok(value) => Self {
                ok: true,
                result: Some(value),
                error: None,
            },
            Err(e) => Self::failure(&ProfileError::from(e)),
        }
    }

    pub fn failure(err: &ProfileError) -> Self {
        Self::error(err.kind(), err.to_string())
    }

    pub fn error(kind: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            result: None,
            error: Some(ReplyError {
                kind: kind.to_string(),
                message: message.into(),
            }),
        }
    }
}

/// Writes one JSON object per line; shared by replies and signals
pub struct JsonLines<W: Write> {
    out: Mutex<W>,
}

impl<W: Write> JsonLines<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn write<T: Serialize>(&self, message: &T) {
        let line = match serde_json::to_string(message) {
            Ok(line) => line,
            Err(e) => {
                error!(error = %e, "Failed to serialize outbound message");
                return;
            }
        };
        let mut out = self.out.lock();
        if let Err(e) = writeln!(out, "{line}").and_then(|_| out.flush()) {
            error!(error = %e, "Failed to write outbound message");
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

impl<W: Write> SignalSink for JsonLines<W> {
    fn emit(&self, signal: ShellSignal) {
        self.write(&signal);
    }
}
