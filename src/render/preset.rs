use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{EditorError, RenderError, Result};

/// Named bundle of output encoding parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub name: String,

    /// Output size; `None` keeps the timeline's native size
    pub resolution: Option<(u32, u32)>,

    /// Output frame rate; `None` keeps the timeline's native rate
    pub frame_rate: Option<f64>,

    /// Video bitrate in kbit/s; 0 lets the encoder choose
    pub bitrate_kbps: u32,

    pub codec: String,
}

impl Preset {
    pub fn low() -> Self {
        Self::sized("low", 640, 360, 1000)
    }

    pub fn medium() -> Self {
        Self::sized("medium", 1280, 720, 4000)
    }

    pub fn high() -> Self {
        Self::sized("high", 1920, 1080, 8000)
    }

    /// Keep the source size and rate
    pub fn source() -> Self {
        Self {
            name: "source".to_string(),
            resolution: None,
            frame_rate: None,
            bitrate_kbps: 0,
            codec: "h264".to_string(),
        }
    }

    fn sized(name: &str, width: u32, height: u32, bitrate_kbps: u32) -> Self {
        Self {
            name: name.to_string(),
            resolution: Some((width, height)),
            frame_rate: None,
            bitrate_kbps,
            codec: "h264".to_string(),
        }
    }

    /// Look up a built-in preset by name
    pub fn named(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().as_str() {
            "low" => Ok(Self::low()),
            "medium" => Ok(Self::medium()),
            "high" => Ok(Self::high()),
            "source" | "original" => Ok(Self::source()),
            other => Err(RenderError::InvalidPreset {
                details: format!("unknown preset '{}' (low, medium, high, source)", other),
            }
            .into()),
        }
    }

    pub fn with_frame_rate(mut self, fps: f64) -> Self {
        self.frame_rate = Some(fps);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if let Some((width, height)) = self.resolution {
            if width == 0 || height == 0 {
                return Err(invalid(format!("{}: resolution {}x{}", self.name, width, height)));
            }
        }
        if let Some(fps) = self.frame_rate {
            if !(fps.is_finite() && fps > 0.0) {
                return Err(invalid(format!("{}: frame rate {}", self.name, fps)));
            }
        }
        if self.codec.trim().is_empty() {
            return Err(invalid(format!("{}: empty codec", self.name)));
        }
        Ok(())
    }
}

fn invalid(details: String) -> EditorError {
    RenderError::InvalidPreset { details }.into()
}

impl Default for Preset {
    fn default() -> Self {
        Self::source()
    }
}

impl FromStr for Preset {
    type Err = EditorError;

    fn from_str(s: &str) -> Result<Self> {
        Self::named(s)
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some((w, h)) = self.resolution {
            write!(f, " {}x{}", w, h)?;
        }
        if self.bitrate_kbps > 0 {
            write!(f, " {} kbps", self.bitrate_kbps)?;
        }
        write!(f, " {}", self.codec)
    }
}
