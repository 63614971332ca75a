//! Where ham-stream keeps its files.
//!
//! Both files live in one per-user directory named after the application
//! (`dirs::config_dir()/ham-stream`, e.g. `~/.config/ham-stream` on Linux):
//!
//! * `settings.toml`: the typed [`StreamSettings`](super::StreamSettings)
//! * `voter.toml`: the sectioned [`Config`](super::Config) a voter reads

use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub settings_file: PathBuf,
    pub voter_file: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "ham-stream";

    /// The per-user location, or `./ham-stream` where the platform has none.
    pub fn new() -> Self {
        let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::in_dir(base.join(Self::APP_NAME))
    }

    /// Lay the files out under `config_dir`.
    pub fn in_dir(config_dir: impl Into<PathBuf>) -> Self {
        let config_dir = config_dir.into();
        Self {
            settings_file: config_dir.join("settings.toml"),
            voter_file: config_dir.join("voter.toml"),
            config_dir,
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
