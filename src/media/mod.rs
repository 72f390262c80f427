//! Media access: probed handles, frames, audio buffers and the engine that
//! decodes and encodes them.

pub mod audio;
pub mod engine;
pub mod ffmpeg;
pub mod handle;
pub mod native;
pub mod types;

pub use audio::{mix_buffers, AudioBuffer};
pub use engine::{Engine, FrameSink, FrameSource, MediaBackend, SinkSpec};
pub use handle::MediaHandle;
pub use types::{luma, Frame, MediaInfo, Rect};
