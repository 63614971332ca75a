//! Stream settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files.  Every section is
//! `#[serde(default)]`, so a partial file fills the gaps with defaults and
//! sections belonging to other components are ignored.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// AudioSettings
// ---------------------------------------------------------------------------

/// Sample rate of the producer feeding the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Input sample rate in Hz.
    pub sample_rate: u32,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
        }
    }
}

// ---------------------------------------------------------------------------
// FifoSettings
// ---------------------------------------------------------------------------

/// Elastic buffer sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FifoSettings {
    /// Capacity in milliseconds of audio.
    pub size_ms: u32,
    /// Prebuffer threshold in milliseconds; 0 disables prebuffering.
    pub prebuf_ms: u32,
}

impl FifoSettings {
    pub fn size_samples(&self, sample_rate: u32) -> usize {
        ms_to_samples(self.size_ms, sample_rate).max(1)
    }

    pub fn prebuf_samples(&self, sample_rate: u32) -> usize {
        ms_to_samples(self.prebuf_ms, sample_rate)
    }
}

impl Default for FifoSettings {
    fn default() -> Self {
        Self {
            size_ms: 1000,
            prebuf_ms: 100,
        }
    }
}

// ---------------------------------------------------------------------------
// PacerSettings
// ---------------------------------------------------------------------------

/// Real-time pacing of the output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacerSettings {
    /// Samples emitted per tick.
    pub block_size: usize,
    /// Prebuffer before pacing starts, in milliseconds.
    pub prebuf_ms: u32,
}

impl Default for PacerSettings {
    fn default() -> Self {
        Self {
            block_size: 256,
            prebuf_ms: 100,
        }
    }
}

// ---------------------------------------------------------------------------
// ResamplerSettings
// ---------------------------------------------------------------------------

/// Integer-ratio rate conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResamplerSettings {
    /// Decimation / interpolation factor.
    pub factor: usize,
    /// Number of FIR taps.  Ideally a multiple of `factor`; other values are
    /// accepted.
    pub taps: usize,
}

impl Default for ResamplerSettings {
    fn default() -> Self {
        Self { factor: 2, taps: 32 }
    }
}

// ---------------------------------------------------------------------------
// StreamSettings (top-level)
// ---------------------------------------------------------------------------

/// Top-level settings, persisted to `settings.toml`.
///
/// # Example
///
/// ```no_run
/// use ham_stream::config::StreamSettings;
///
/// // Load (returns Default when file is missing)
/// let settings = StreamSettings::load().unwrap();
///
/// // Modify and save
/// // settings.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    pub audio: AudioSettings,
    pub fifo: FifoSettings,
    pub pacer: PacerSettings,
    pub resampler: ResamplerSettings,
}

impl StreamSettings {
    /// Load settings from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(StreamSettings::default())` when the file does not exist
    /// yet, so callers never need to special-case a missing file.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from `path`; a missing file gives the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    /// Save settings to the platform-appropriate `settings.toml`, creating
    /// parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Write to `path`, creating its directory.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        let content = toml::to_string_pretty(self).context("serializing stream settings")?;
        std::fs::write(path, content).with_context(|| format!("writing {}", path.display()))
    }

    /// Returns `true` when no `settings.toml` file exists yet.
    pub fn is_first_run() -> bool {
        !AppPaths::new().settings_file.exists()
    }
}

fn ms_to_samples(ms: u32, sample_rate: u32) -> usize {
    (u64::from(ms) * u64::from(sample_rate) / 1000) as usize
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
