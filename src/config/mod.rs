//! Configuration management
//!
//! Handles profile-based configuration with JSON persistence: the settings
//! record, the on-disk document and its migration, the cached store, and
//! compressed config snapshots.

pub mod backup;
pub mod document;
pub mod migration;
pub mod paths;
pub mod settings;
pub mod store;

pub use backup::{BackupEntry, BackupKind};
pub use document::ConfigDocument;
pub use paths::AppPaths;
pub use settings::ProfileSettings;
pub use store::ConfigStore;
