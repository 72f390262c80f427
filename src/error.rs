use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::render::JobFailure;

/// Main error type for the videosnap library
#[derive(Error, Debug)]
pub enum EditorError {
    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Filter error: {0}")]
    Filter(#[from] FilterError),

    #[error("Timeline error: {0}")]
    Timeline(#[from] TimelineError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Tracking error: {0}")]
    Tracking(#[from] TrackingError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while opening, decoding or writing media
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Media file not found: {path}")]
    NotFound { path: String },

    #[error("Unsupported media format: {path} ({reason})")]
    UnsupportedFormat { path: String, reason: String },

    #[error("Decoding failed for {path}: {reason}")]
    DecodeFailed { path: String, reason: String },

    #[error("Encoding failed for {path}: {reason}")]
    EncodeFailed { path: String, reason: String },

    #[error("Writing failed for {path}: {reason}")]
    WriteFailed { path: String, reason: String },

    #[error("Media engine unavailable: {reason}")]
    EngineUnavailable { reason: String },
}

/// Errors raised while building or evaluating a filter chain
#[derive(Error, Debug)]
pub enum FilterError {
    #[error("Unsupported filter: {name}")]
    Unsupported { name: String },

    #[error("Invalid parameter '{parameter}' for {stage}: {reason}")]
    InvalidParameter {
        stage: String,
        parameter: String,
        reason: String,
    },

    #[error("Invalid keyframes: {reason}")]
    InvalidKeyframes { reason: String },
}

/// Errors raised by timeline editing operations
#[derive(Error, Debug)]
pub enum TimelineError {
    #[error("Invalid range [{start:.3}, {end:.3}) for media of {duration:.3}s")]
    InvalidRange { start: f64, end: f64, duration: f64 },

    #[error("Empty input: {what}")]
    EmptyInput { what: String },
}

/// Errors raised by render jobs
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Frame {frame} failed in stage '{stage}': {source}")]
    Frame {
        frame: u64,
        stage: String,
        #[source]
        source: Box<EditorError>,
    },

    #[error("Job {job} cancelled after {frame} frames")]
    Cancelled { job: u64, frame: u64 },

    #[error("Job {job} failed: {failure}")]
    JobFailed { job: u64, failure: JobFailure },

    #[error("Invalid preset: {details}")]
    InvalidPreset { details: String },
}

/// Errors raised by the motion tracker
#[derive(Error, Debug)]
pub enum TrackingError {
    #[error("Tracking lost at frame {frame}")]
    Lost { frame: u64 },

    #[error("Invalid tracking region: {reason}")]
    InvalidRegion { reason: String },
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path}")]
    ParseFailed { path: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
}

/// Flat classification of every failure the editor can report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    NotFound,
    UnsupportedFormat,
    UnsupportedFilter,
    InvalidParameter,
    InvalidRange,
    EmptyInput,
    EncodeFailure,
    DecodeFailure,
    DiskWriteFailure,
    Cancelled,
    TrackingLost,
    EngineUnavailable,
    Config,
}

impl ErrorKind {
    /// Validation kinds are raised before any render resource is used
    pub fn is_structural(self) -> bool {
        matches!(
            self,
            Self::InvalidParameter | Self::InvalidRange | Self::EmptyInput | Self::UnsupportedFilter
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Convenience type alias for Results using EditorError
pub type Result<T> = std::result::Result<T, EditorError>;

impl EditorError {
    /// Shorthand for an invalid filter parameter
    pub fn invalid_parameter(
        stage: impl Into<String>,
        parameter: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        FilterError::InvalidParameter {
            stage: stage.into(),
            parameter: parameter.into(),
            reason: reason.into(),
        }
        .into()
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Media(e) => match e {
                MediaError::NotFound { .. } => ErrorKind::NotFound,
                MediaError::UnsupportedFormat { .. } => ErrorKind::UnsupportedFormat,
                MediaError::DecodeFailed { .. } => ErrorKind::DecodeFailure,
                MediaError::EncodeFailed { .. } => ErrorKind::EncodeFailure,
                MediaError::WriteFailed { .. } => ErrorKind::DiskWriteFailure,
                MediaError::EngineUnavailable { .. } => ErrorKind::EngineUnavailable,
            },
            Self::Filter(e) => match e {
                FilterError::Unsupported { .. } => ErrorKind::UnsupportedFilter,
                FilterError::InvalidParameter { .. } | FilterError::InvalidKeyframes { .. } => {
                    ErrorKind::InvalidParameter
                }
            },
            Self::Timeline(e) => match e {
                TimelineError::InvalidRange { .. } => ErrorKind::InvalidRange,
                TimelineError::EmptyInput { .. } => ErrorKind::EmptyInput,
            },
            Self::Render(e) => match e {
                RenderError::Frame { source, .. } => source.kind(),
                RenderError::Cancelled { .. } => ErrorKind::Cancelled,
                RenderError::JobFailed { failure, .. } => failure.kind,
                RenderError::InvalidPreset { .. } => ErrorKind::InvalidParameter,
            },
            Self::Tracking(e) => match e {
                TrackingError::Lost { .. } => ErrorKind::TrackingLost,
                TrackingError::InvalidRegion { .. } => ErrorKind::InvalidParameter,
            },
            Self::Config(_) => ErrorKind::Config,
            Self::Io(_) => ErrorKind::DiskWriteFailure,
        }
    }

    /// Check if this error is recoverable (can be retried)
    pub fn is_recoverable(&self) -> bool {
        match self {
            // IO errors might be temporary
            Self::Io(_) => true,
            Self::Media(MediaError::WriteFailed { .. }) => true,
            Self::Render(RenderError::Cancelled { .. }) => true,
            _ => false,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Media(MediaError::NotFound { path }) => {
                format!("Could not find '{}'. Please check the file exists.", path)
            }
            Self::Media(MediaError::UnsupportedFormat { path, .. }) => {
                format!("'{}' is not a format videosnap can read or write.", path)
            }
            Self::Media(MediaError::EngineUnavailable { .. }) => {
                "The media engine is not available. Install ffmpeg or use .frames/.wav media."
                    .to_string()
            }
            Self::Filter(FilterError::Unsupported { name }) => format!(
                "Effect '{}' not found. Available effects: grayscale, sepia, invert, oldfilm",
                name
            ),
            Self::Render(RenderError::Cancelled { .. }) => "The export was cancelled.".to_string(),
            Self::Config(ConfigError::FileNotFound { path }) => {
                format!("Configuration file '{}' not found.", path)
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let err: EditorError = MediaError::NotFound { path: "a.mp4".into() }.into();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = EditorError::invalid_parameter("sepia", "amount", "out of range");
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
        assert!(err.kind().is_structural());

        let err: EditorError = TimelineError::EmptyInput { what: "handles".into() }.into();
        assert_eq!(err.kind(), ErrorKind::EmptyInput);
    }

    #[test]
    fn test_frame_error_keeps_inner_kind() {
        let inner: EditorError = MediaError::DecodeFailed {
            path: "clip.frames".into(),
            reason: "truncated png".into(),
        }
        .into();
        let err: EditorError = RenderError::Frame {
            frame: 12,
            stage: "decode".into(),
            source: Box::new(inner),
        }
        .into();

        assert_eq!(err.kind(), ErrorKind::DecodeFailure);
        assert!(err.to_string().contains("Frame 12"));
    }

    #[test]
    fn test_cancelled_is_not_structural() {
        let err: EditorError = RenderError::Cancelled { job: 1, frame: 3 }.into();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(!err.kind().is_structural());
        assert!(err.is_recoverable());
    }
}
