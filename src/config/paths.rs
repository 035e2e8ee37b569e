//! On-disk layout under the per-user configuration root

use std::path::{Path, PathBuf};

use crate::constants;

/// Resolved locations of everything the shell persists
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    root: PathBuf,
}

impl AppPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve the root: explicit override, then `STUDIO_SHELL_CONFIG_DIR`,
    /// then the platform config directory.
    pub fn resolve(override_dir: Option<PathBuf>) -> Self {
        if let Some(dir) = override_dir {
            return Self::new(dir);
        }
        if let Some(dir) = std::env::var_os(constants::config::DIR_ENV_VAR)
            && !dir.is_empty()
        {
            return Self::new(PathBuf::from(dir));
        }
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(constants::config::APP_DIR);
        Self::new(path)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join(constants::config::FILENAME)
    }

    pub fn partitions_dir(&self) -> PathBuf {
        self.root.join(constants::partition::SUBDIR)
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.root.join(constants::config::backup::SUBDIR)
    }
}
