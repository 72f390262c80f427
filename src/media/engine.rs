//! The decode/encode capability the editor consumes.
//!
//! An [`Engine`] is the process-wide media context. It is created once with
//! [`Engine::init`], cloned into every component that touches media, and torn
//! down with [`Engine::shutdown`]. Any use after shutdown fails with
//! `EngineUnavailable`.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::{BackendSelection, EngineConfig};
use crate::error::{MediaError, Result};
use crate::media::audio::AudioBuffer;
use crate::media::ffmpeg::FfmpegBackend;
use crate::media::native::NativeBackend;
use crate::media::types::{Frame, MediaInfo};

/// Random-access reader over the video frames of one media resource
pub trait FrameSource: Send {
    fn info(&self) -> &MediaInfo;

    /// Decode the frame with the given index
    fn read_frame(&mut self, index: u64) -> Result<Frame>;
}

/// Encoder output for one file
pub trait FrameSink: Send {
    /// Append one frame; frames must match the sink's dimensions
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;

    /// Flush everything and close the file, returning the frame count
    fn finish(self: Box<Self>) -> Result<u64>;

    /// Stop writing without finalising; the caller removes the partial file
    fn abort(self: Box<Self>);
}

/// Output parameters handed to a backend when opening a sink
#[derive(Debug, Clone)]
pub struct SinkSpec {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    pub codec: String,
    pub bitrate_kbps: u32,

    /// Audio to mux alongside the video, already timed to the output
    pub audio: Option<AudioBuffer>,
}

/// A decode/encode implementation for some set of formats
pub trait MediaBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this backend reads paths like `path`
    fn handles(&self, path: &Path) -> bool;

    /// Whether this backend can create files like `path`
    fn writes(&self, path: &Path) -> bool {
        self.handles(path)
    }

    fn probe(&self, path: &Path) -> Result<MediaInfo>;

    fn open_video(&self, info: &MediaInfo) -> Result<Box<dyn FrameSource>>;

    /// Decode the whole audio track, if there is one
    fn read_audio(&self, info: &MediaInfo) -> Result<Option<AudioBuffer>>;

    fn create_sink(&self, path: &Path, spec: SinkSpec) -> Result<Box<dyn FrameSink>>;

    fn write_audio(&self, path: &Path, audio: &AudioBuffer) -> Result<()>;

    /// Release process-wide resources
    fn shutdown(&self) {}
}

struct EngineInner {
    backends: Vec<Box<dyn MediaBackend>>,
    running: AtomicBool,
}

/// Shared media engine context
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Initialise the engine according to configuration
    pub fn init(config: &EngineConfig) -> Result<Self> {
        let mut backends: Vec<Box<dyn MediaBackend>> = vec![Box::new(NativeBackend::new())];

        match config.backend {
            BackendSelection::Native => {}
            BackendSelection::Ffmpeg => {
                let ffmpeg = FfmpegBackend::new(&config.ffmpeg_bin, &config.ffprobe_bin);
                if !ffmpeg.is_available() {
                    return Err(MediaError::EngineUnavailable {
                        reason: format!("'{}' not found", config.ffmpeg_bin),
                    }
                    .into());
                }
                backends.push(Box::new(ffmpeg));
            }
            BackendSelection::Auto => {
                let ffmpeg = FfmpegBackend::new(&config.ffmpeg_bin, &config.ffprobe_bin);
                if ffmpeg.is_available() {
                    backends.push(Box::new(ffmpeg));
                } else {
                    warn!("ffmpeg not found, only .frames and audio files are supported");
                }
            }
        }

        let engine = Self::with_backends(backends);
        info!("Media engine ready ({})", engine.backend_names().join(", "));
        Ok(engine)
    }

    /// Engine with only the pure-Rust backend
    pub fn native() -> Self {
        Self::with_backends(vec![Box::new(NativeBackend::new())])
    }

    /// Engine over an explicit backend list; earlier backends win
    pub fn with_backends(backends: Vec<Box<dyn MediaBackend>>) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                backends,
                running: AtomicBool::new(true),
            }),
        }
    }

    pub fn backend_names(&self) -> Vec<String> {
        self.inner.backends.iter().map(|b| b.name().to_string()).collect()
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Tear the engine down; every clone observes the shutdown
    pub fn shutdown(&self) {
        if self.inner.running.swap(false, Ordering::AcqRel) {
            for backend in &self.inner.backends {
                backend.shutdown();
            }
            info!("Media engine shut down");
        }
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(MediaError::EngineUnavailable {
                reason: "engine has been shut down".to_string(),
            }
            .into())
        }
    }

    fn backend_for(&self, path: &Path) -> Result<&dyn MediaBackend> {
        self.select_backend(path, |b| b.handles(path))
    }

    fn writer_for(&self, path: &Path) -> Result<&dyn MediaBackend> {
        self.select_backend(path, |b| b.writes(path))
    }

    fn select_backend<F>(&self, path: &Path, accepts: F) -> Result<&dyn MediaBackend>
    where
        F: Fn(&dyn MediaBackend) -> bool,
    {
        self.ensure_running()?;
        self.inner
            .backends
            .iter()
            .map(|b| &**b)
            .find(|b| accepts(*b))
            .ok_or_else(|| {
                MediaError::UnsupportedFormat {
                    path: path.display().to_string(),
                    reason: format!("no backend among [{}]", self.backend_names().join(", ")),
                }
                .into()
            })
    }

    /// Probe a media file's metadata
    pub fn probe(&self, path: &Path) -> Result<MediaInfo> {
        self.ensure_running()?;
        if !path.exists() {
            return Err(MediaError::NotFound {
                path: path.display().to_string(),
            }
            .into());
        }
        let backend = self.backend_for(path)?;
        debug!("Probing {:?} with {} backend", path, backend.name());
        backend.probe(path)
    }

    pub fn open_video(&self, info: &MediaInfo) -> Result<Box<dyn FrameSource>> {
        if !info.has_video() {
            return Err(MediaError::DecodeFailed {
                path: info.path.display().to_string(),
                reason: "no video track".to_string(),
            }
            .into());
        }
        self.backend_for(&info.path)?.open_video(info)
    }

    pub fn read_audio(&self, info: &MediaInfo) -> Result<Option<AudioBuffer>> {
        if !info.has_audio() {
            return Ok(None);
        }
        self.backend_for(&info.path)?.read_audio(info)
    }

    pub fn create_sink(&self, path: &Path, spec: SinkSpec) -> Result<Box<dyn FrameSink>> {
        self.writer_for(path)?.create_sink(path, spec)
    }

    pub fn write_audio(&self, path: &Path, audio: &AudioBuffer) -> Result<()> {
        self.writer_for(path)?.write_audio(path, audio)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("backends", &self.backend_names())
            .field("running", &self.is_running())
            .finish()
    }
}
