//! Configuration module for ham-stream.
//!
//! Provides `StreamSettings` (typed pipeline settings with TOML persistence),
//! the sectioned `Config` / `ConfigLookup` pair used by the voter, and
//! `AppPaths` for the per-user configuration directory.

pub mod lookup;
pub mod paths;
pub mod settings;

pub use lookup::{Config, ConfigLookup};
pub use paths::AppPaths;
pub use settings::{
    AudioSettings, FifoSettings, PacerSettings, ResamplerSettings, StreamSettings,
};
