//! Application-wide constants
//!
//! This module contains all magic numbers and string literals used throughout
//! the application, providing a single source of truth for constant values.

/// Configuration paths and filenames
pub mod config {
    /// Application directory name under XDG config
    pub const APP_DIR: &str = "studio-shell";

    /// Configuration filename
    pub const FILENAME: &str = "config.json";

    /// Environment variable that overrides the configuration root
    pub const DIR_ENV_VAR: &str = "STUDIO_SHELL_CONFIG_DIR";

    /// Suffix appended to a config file that failed to parse
    pub const CORRUPT_SUFFIX: &str = "corrupt";

    /// Backup settings
    pub mod backup {
        /// Subdirectory (under the config root) holding config snapshots
        pub const SUBDIR: &str = "backups";

        /// Number of non-manual snapshots kept by default when pruning
        pub const DEFAULT_RETENTION: u32 = 5;
    }
}

/// Session partition layout
pub mod partition {
    /// Directory (under the config root) holding one subdirectory per profile
    pub const SUBDIR: &str = "Partitions";

    /// Infix used for directories moved aside on a rename collision.
    /// Contains a '.', which can never appear in a profile identity.
    pub const BACKUP_INFIX: &str = ".backup-";

    /// How many suffixed backup names are tried before giving up
    pub const MAX_BACKUP_ATTEMPTS: u32 = 100;
}

/// Timestamp format shared by backup file and directory names
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Default configuration values
/// These are used when creating new profiles or filling missing config fields
pub mod defaults {
    /// Profile identity settings
    pub mod profile {
        /// Identity of the profile created on first run (and for legacy migration)
        pub const IDENTITY: &str = "default";
    }

    /// Window/navigation settings
    pub mod browsing {
        /// Page loaded when no custom home page is configured
        pub const HOME_PAGE: &str = "https://aistudio.google.com/prompts/new_chat";

        /// Display language tag ("auto" follows the system locale)
        pub const LANGUAGE: &str = "auto";
    }
}
