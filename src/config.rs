use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Main configuration for videosnap
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Media engine settings
    pub engine: EngineConfig,

    /// Render/export settings
    pub render: RenderConfig,

    /// Motion tracker settings
    pub tracker: TrackerConfig,

    /// Audio mixing settings
    pub audio: AudioConfig,

    /// Default filter parameters
    pub filters: FilterConfig,

    /// Logging output
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|_| ConfigError::ParseFailed {
            path: path.display().to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidValue {
            key: "config".to_string(),
            value: e.to_string(),
        })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.render.validate()?;
        self.tracker.validate()?;
        self.filters.validate()?;
        Ok(())
    }
}

/// Which backend serves media outside the native formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendSelection {
    /// Use ffmpeg when it is installed, native formats otherwise
    Auto,
    /// Native formats only (`.frames` sequences and audio files)
    Native,
    /// Require ffmpeg; initialisation fails without it
    Ffmpeg,
}

/// Media engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub backend: BackendSelection,

    /// ffmpeg executable name or path
    pub ffmpeg_bin: String,

    /// ffprobe executable name or path
    pub ffprobe_bin: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: BackendSelection::Auto,
            ffmpeg_bin: "ffmpeg".to_string(),
            ffprobe_bin: "ffprobe".to_string(),
        }
    }
}

/// Render orchestration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Preset used when a boundary call does not name one
    pub default_preset: String,

    /// Log progress every N frames
    pub progress_interval: u64,

    /// Threads in the pixel-processing pool
    pub processing_threads: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            default_preset: "source".to_string(),
            progress_interval: 30,
            processing_threads: num_cpus::get(),
        }
    }
}

impl RenderConfig {
    fn validate(&self) -> Result<()> {
        if self.processing_threads == 0 {
            return Err(ConfigError::InvalidValue {
                key: "render.processing_threads".to_string(),
                value: self.processing_threads.to_string(),
            }
            .into());
        }

        if self.progress_interval == 0 {
            return Err(ConfigError::InvalidValue {
                key: "render.progress_interval".to_string(),
                value: self.progress_interval.to_string(),
            }
            .into());
        }

        Ok(())
    }
}

/// Motion tracker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Half-size of the search window around the previous position (pixels)
    pub search_radius: u32,

    /// Matches below this confidence reuse the last confident position
    pub confidence_threshold: f32,

    /// Tracking is lost once less than this fraction of the region is inside the frame
    pub min_visible_fraction: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            search_radius: 16,
            confidence_threshold: 0.8,
            min_visible_fraction: 0.5,
        }
    }
}

impl TrackerConfig {
    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigError::InvalidValue {
                key: "tracker.confidence_threshold".to_string(),
                value: self.confidence_threshold.to_string(),
            }
            .into());
        }

        if !(self.min_visible_fraction > 0.0 && self.min_visible_fraction <= 1.0) {
            return Err(ConfigError::InvalidValue {
                key: "tracker.min_visible_fraction".to_string(),
                value: self.min_visible_fraction.to_string(),
            }
            .into());
        }

        Ok(())
    }
}

/// Audio mixing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Scale the mix down when the summed peak exceeds full scale
    pub normalize: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self { normalize: true }
    }
}

/// Defaults for effects created by name
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub oldfilm_grain: f32,
    pub oldfilm_vignette: f32,
    pub oldfilm_fade: f32,

    /// Seed for deterministic film grain
    pub grain_seed: u64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            oldfilm_grain: 0.3,
            oldfilm_vignette: 0.5,
            oldfilm_fade: 0.2,
            grain_seed: 0x5eed,
        }
    }
}

impl FilterConfig {
    fn validate(&self) -> Result<()> {
        for (key, value) in [
            ("filters.oldfilm_grain", self.oldfilm_grain),
            ("filters.oldfilm_vignette", self.oldfilm_vignette),
            ("filters.oldfilm_fade", self.oldfilm_fade),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: value.to_string(),
                }
                .into());
            }
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when RUST_LOG is unset
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
