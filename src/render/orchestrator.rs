//! Render job submission and worker lifecycle.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::config::RenderConfig;
use crate::error::{ConfigError, MediaError, Result};
use crate::filters::FilterChain;
use crate::media::{AudioBuffer, Engine};
use crate::render::job::{JobFailure, JobHandle, JobId, JobState, RenderSummary};
use crate::render::locks::PathLocks;
use crate::render::pipeline::{
    commit_output, discard_staging, render_to, staging_path, write_audio_staged, RenderPlan, RenderRequest,
};
use crate::render::preset::Preset;
use crate::timeline::Timeline;

/// Accepts render jobs and runs each on its own worker thread
#[derive(Clone)]
pub struct RenderOrchestrator {
    engine: Engine,
    locks: PathLocks,
    next_id: Arc<AtomicU64>,
    pool: Arc<rayon::ThreadPool>,
    progress_interval: u64,
}

impl RenderOrchestrator {
    pub fn new(engine: Engine, config: &RenderConfig) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.processing_threads)
            .thread_name(|i| format!("videosnap-px-{}", i))
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                key: "render.processing_threads".to_string(),
                value: format!("{} ({})", config.processing_threads, e),
            })?;

        Ok(Self {
            engine,
            locks: PathLocks::new(),
            next_id: Arc::new(AtomicU64::new(1)),
            pool: Arc::new(pool),
            progress_interval: config.progress_interval.max(1),
        })
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn locks(&self) -> &PathLocks {
        &self.locks
    }

    /// Validate and queue a render; returns immediately
    ///
    /// Structural problems (empty timeline, bad chain, bad preset) are
    /// returned here and no job is created. Inside a Tokio runtime the
    /// worker runs on the blocking pool, otherwise on a plain thread.
    pub fn submit(
        &self,
        timeline: &Timeline,
        chain: &FilterChain,
        preset: Preset,
        output: impl AsRef<Path>,
    ) -> Result<JobHandle> {
        if !self.engine.is_running() {
            return Err(MediaError::EngineUnavailable {
                reason: "engine has been shut down".to_string(),
            }
            .into());
        }

        let request = RenderRequest {
            timeline: timeline.clone(),
            chain: chain.clone(),
            preset,
            output: output.as_ref().to_path_buf(),
        };
        let plan = RenderPlan::resolve(&request)?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let submitted_at = Utc::now();
        let (tx, rx) = watch::channel(JobState::Queued);
        let cancel = Arc::new(AtomicBool::new(false));
        let handle = JobHandle::new(id, request.output.clone(), submitted_at, rx, Arc::clone(&cancel));

        info!(
            "Job {} queued: {} segments, chain [{}], preset {} -> {:?}",
            id,
            request.timeline.segments().len(),
            request.chain.stages().iter().map(|s| s.name()).collect::<Vec<_>>().join(", "),
            request.preset,
            request.output
        );

        let worker = JobWorker {
            id,
            engine: self.engine.clone(),
            locks: self.locks.clone(),
            pool: Arc::clone(&self.pool),
            progress_interval: self.progress_interval,
            request,
            plan,
            state: tx,
            cancel,
            submitted_at,
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn_blocking(move || worker.run());
            }
            Err(_) => {
                std::thread::spawn(move || worker.run());
            }
        }

        Ok(handle)
    }

    /// Submit and wait for the result
    pub async fn render(
        &self,
        timeline: &Timeline,
        chain: &FilterChain,
        preset: Preset,
        output: impl AsRef<Path>,
    ) -> Result<RenderSummary> {
        self.submit(timeline, chain, preset, output)?.result().await
    }

    /// Write an audio file under the same per-path lock renders use
    pub async fn write_audio(&self, output: &Path, audio: AudioBuffer) -> Result<()> {
        let _guard = self.locks.acquire(output).await;
        let engine = self.engine.clone();
        let path = output.to_path_buf();
        tokio::task::spawn_blocking(move || write_audio_staged(&engine, &path, &audio))
            .await
            .map_err(|e| MediaError::WriteFailed {
                path: output.display().to_string(),
                reason: format!("audio writer stopped: {}", e),
            })?
    }
}

impl std::fmt::Debug for RenderOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderOrchestrator")
            .field("engine", &self.engine)
            .field("threads", &self.pool.current_num_threads())
            .field("progress_interval", &self.progress_interval)
            .finish()
    }
}

/// Everything one job's worker thread owns
struct JobWorker {
    id: JobId,
    engine: Engine,
    locks: PathLocks,
    pool: Arc<rayon::ThreadPool>,
    progress_interval: u64,
    request: RenderRequest,
    plan: RenderPlan,
    state: watch::Sender<JobState>,
    cancel: Arc<AtomicBool>,
    submitted_at: chrono::DateTime<Utc>,
}

impl JobWorker {
    fn run(self) {
        let output = self.request.output.clone();
        let _guard = self.locks.acquire_blocking(&output);
        debug!("Job {} holds output lock for {:?}", self.id, output);

        let staging = staging_path(&output);
        let result = self
            .render(&staging)
            .and_then(|frames| commit_output(&staging, &output).map(|_| frames));

        let state = match result {
            Ok(frames) => {
                let summary = RenderSummary {
                    job_id: self.id,
                    output: output.clone(),
                    frames,
                    duration: self.plan.output_duration,
                    width: self.plan.width,
                    height: self.plan.height,
                    frame_rate: self.plan.frame_rate,
                    has_audio: self.plan.has_audio,
                    submitted_at: self.submitted_at,
                    finished_at: Utc::now(),
                };
                info!("Job {} completed: {} frames written to {:?}", self.id, frames, output);
                JobState::Completed(summary)
            }
            Err(e) => {
                discard_staging(&staging);
                let failure = JobFailure::from_error(&e);
                if failure.is_cancelled() {
                    info!("Job {} cancelled at frame {}", self.id, failure.frame.unwrap_or(0));
                } else {
                    error!("Job {} failed: {}", self.id, e);
                }
                JobState::Failed(failure)
            }
        };
        self.state.send_replace(state);
    }

    fn render(&self, staging: &Path) -> Result<u64> {
        let total = self.plan.total_frames;
        self.state.send_replace(JobState::Running {
            frames_done: 0,
            total_frames: total,
        });

        self.pool.install(|| {
            render_to(
                &self.engine,
                self.id,
                &self.request,
                &self.plan,
                staging,
                &self.cancel,
                |done, total| {
                    self.state.send_replace(JobState::Running {
                        frames_done: done,
                        total_frames: total,
                    });
                    if done % self.progress_interval == 0 || done == total {
                        info!("Job {}: {}/{} frames", self.id, done, total);
                    }
                },
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::filters::FilterStage;
    use crate::media::{Frame, MediaHandle, SinkSpec};

    fn clip(engine: &Engine, dir: &Path, frames: u64) -> MediaHandle {
        let path = dir.join("in.frames");
        let spec = SinkSpec {
            width: 16,
            height: 8,
            frame_rate: 25.0,
            codec: "png".into(),
            bitrate_kbps: 0,
            audio: None,
        };
        let mut sink = engine.create_sink(&path, spec).unwrap();
        for i in 0..frames {
            sink.write_frame(&Frame::new_filled(16, 8, [i as u8, 100, 200])).unwrap();
        }
        sink.finish().unwrap();
        MediaHandle::open(engine, &path).unwrap()
    }

    fn orchestrator(engine: &Engine) -> RenderOrchestrator {
        let config = RenderConfig {
            processing_threads: 2,
            ..RenderConfig::default()
        };
        RenderOrchestrator::new(engine.clone(), &config).unwrap()
    }

    #[tokio::test]
    async fn test_job_completes_and_reports_summary() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::native();
        let media = clip(&engine, dir.path(), 10);
        let out = dir.path().join("out.frames");

        let chain = FilterChain::new().with(FilterStage::grayscale()).unwrap();
        let handle = orchestrator(&engine)
            .submit(&Timeline::from_media(media), &chain, Preset::source(), &out)
            .unwrap();
        let summary = handle.result().await.unwrap();

        assert_eq!(summary.frames, 10);
        assert_eq!((summary.width, summary.height), (16, 8));
        assert!(summary.finished_at >= summary.submitted_at);
        assert!(out.is_dir());
        assert!(!staging_path(&out).exists());
    }

    #[tokio::test]
    async fn test_structural_errors_surface_at_submit() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::native();
        let orchestrator = orchestrator(&engine);
        let out = dir.path().join("out.frames");

        let err = orchestrator
            .submit(&Timeline::new(), &FilterChain::new(), Preset::source(), &out)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyInput);

        let media = clip(&engine, dir.path(), 2);
        let mut preset = Preset::low();
        preset.resolution = Some((0, 0));
        let err = orchestrator
            .submit(&Timeline::from_media(media), &FilterChain::new(), preset, &out)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn test_cancelled_job_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::native();
        let media = clip(&engine, dir.path(), 50);
        let out = dir.path().join("out.frames");
        let orchestrator = orchestrator(&engine);

        // Hold the path so the job cannot start before it is cancelled
        let guard = orchestrator.locks().acquire(&out).await;
        let handle = orchestrator
            .submit(&Timeline::from_media(media), &FilterChain::new(), Preset::source(), &out)
            .unwrap();
        handle.cancel();
        drop(guard);

        let state = handle.wait().await;
        assert_eq!(state.name(), "cancelled");
        assert_eq!(handle.result().await.unwrap_err().kind(), ErrorKind::Cancelled);
        assert!(!out.exists());
        assert!(!staging_path(&out).exists());
    }

    #[tokio::test]
    async fn test_write_audio_is_staged() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::native();
        let out = dir.path().join("mix.wav");

        orchestrator(&engine)
            .write_audio(&out, AudioBuffer::silence(8000, 1, 0.5))
            .await
            .unwrap();
        assert!(out.is_file());
        assert!(!staging_path(&out).exists());
    }
}
