//! # videosnap
//!
//! A native video-editing pipeline: trim, split, keyframed filters, text and
//! picture-in-picture compositing, speed ramps, audio mixing and motion
//! tracking, all rendered through cancellable background jobs.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use videosnap::{config::Config, Editor};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let editor = Editor::new(Config::default())?;
//!
//! let info = editor.get_video_info("holiday.mp4")?;
//! println!("{}", info);
//!
//! editor.trim("holiday.mp4", "intro.mp4", 0.0, 5.0).await?;
//! editor.apply_effect("intro.mp4", "intro_sepia.mp4", "sepia").await?;
//! editor.shutdown();
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`media`] - the engine context, media handles, frames and audio
//! - [`filters`] - filter stages, keyframe tracks and the filter chain
//! - [`timeline`] - segments, trim/split and audio mixing
//! - [`render`] - presets, render jobs and the job orchestrator
//! - [`tracking`] - region tracking and trajectories
//! - [`editor`] - one call per editing operation on top of all of the above
//! - [`config`] - configuration management
//!
//! ## Custom Filters
//!
//! Register your own stage by implementing [`CustomFilter`](filters::CustomFilter):
//!
//! ```rust,no_run
//! use std::collections::BTreeMap;
//! use std::sync::Arc;
//! use videosnap::filters::{CustomFilter, FilterRegistry, FrameContext};
//! use videosnap::media::Frame;
//! use videosnap::Result;
//!
//! struct Posterize;
//!
//! impl CustomFilter for Posterize {
//!     fn name(&self) -> &str {
//!         "posterize"
//!     }
//!
//!     fn apply(&self, frame: &mut Frame, params: &BTreeMap<String, f64>, _ctx: &FrameContext) -> Result<()> {
//!         let levels = params.get("levels").copied().unwrap_or(4.0).max(2.0);
//!         let step = 255.0 / (levels - 1.0);
//!         for byte in frame.as_rgb_bytes_mut() {
//!             *byte = ((*byte as f64 / step).round() * step) as u8;
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let mut registry = FilterRegistry::new();
//! registry.register_custom(Arc::new(Posterize));
//! ```

pub mod config;
pub mod editor;
pub mod error;
pub mod filters;
pub mod logging;
pub mod media;
pub mod render;
pub mod timeline;
pub mod tracking;

// Re-export commonly used types for convenience
pub use crate::{
    config::Config,
    editor::{AudioSummary, Editor},
    error::{EditorError, ErrorKind, Result},
    filters::{FilterChain, FilterRegistry, FilterStage, KeyframeTrack},
    media::{Engine, MediaHandle, MediaInfo},
    render::{JobHandle, JobState, Preset, RenderOrchestrator},
    timeline::Timeline,
    tracking::{MotionTracker, MotionTrajectory},
};
