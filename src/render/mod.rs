//! Render jobs: presets, the frame pipeline and the job orchestrator.
//!
//! A job is validated when submitted, then runs on its own worker:
//! decode, apply the filter chain, encode, one frame at a time. Output is
//! written to a hidden `.<name>.partial.<ext>` sibling and renamed onto the
//! requested path only once the encoder has finished, so a failed or
//! cancelled job never leaves a truncated file behind.

pub mod job;
pub mod locks;
pub mod orchestrator;
pub mod pipeline;
pub mod preset;

pub use job::{JobFailure, JobHandle, JobId, JobState, RenderSummary};
pub use locks::PathLocks;
pub use orchestrator::RenderOrchestrator;
pub use pipeline::{staging_path, RenderPlan, RenderRequest};
pub use preset::Preset;
