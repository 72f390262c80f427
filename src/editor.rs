use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::{
    config::Config,
    error::{Result, TimelineError},
    filters::{FilterChain, FilterRegistry, FilterStage, KeyframeTrack, Param, ParamMap, ParamValue},
    media::{Engine, MediaHandle, MediaInfo, Rect},
    render::{Preset, RenderOrchestrator, RenderSummary},
    timeline::{self, Timeline},
    tracking::{MotionTracker, MotionTrajectory},
};

/// Result of an operation that writes only audio
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioSummary {
    pub output: PathBuf,
    pub duration: f64,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Path-level entry points for every editing operation
///
/// The editor owns the shared [`Engine`] plus the components built on it:
/// a filter registry, a render orchestrator and a motion tracker. Every
/// operation that produces media goes through the orchestrator, so it is
/// validated before any work starts and the output path is written
/// atomically under its lock.
pub struct Editor {
    config: Config,
    engine: Engine,
    registry: FilterRegistry,
    orchestrator: RenderOrchestrator,
    tracker: MotionTracker,
}

impl Editor {
    /// Initialise the media engine and all components from configuration
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let engine = Engine::init(&config.engine)?;
        Self::with_engine(engine, config)
    }

    /// Build an editor around an existing engine
    pub fn with_engine(engine: Engine, config: Config) -> Result<Self> {
        let orchestrator = RenderOrchestrator::new(engine.clone(), &config.render)?;
        let tracker = MotionTracker::new(engine.clone(), config.tracker.clone());
        let registry = FilterRegistry::with_defaults(config.filters.clone());
        Ok(Self {
            config,
            engine,
            registry,
            orchestrator,
            tracker,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn registry(&self) -> &FilterRegistry {
        &self.registry
    }

    /// Registry access for adding custom filters
    pub fn registry_mut(&mut self) -> &mut FilterRegistry {
        &mut self.registry
    }

    pub fn orchestrator(&self) -> &RenderOrchestrator {
        &self.orchestrator
    }

    pub fn tracker(&self) -> &MotionTracker {
        &self.tracker
    }

    /// Tear down the media engine; later calls fail with `EngineUnavailable`
    pub fn shutdown(&self) {
        self.engine.shutdown();
    }

    pub fn open<P: AsRef<Path>>(&self, path: P) -> Result<MediaHandle> {
        MediaHandle::open(&self.engine, path)
    }

    fn default_preset(&self) -> Result<Preset> {
        Preset::named(&self.config.render.default_preset)
    }

    async fn render(&self, timeline: &Timeline, chain: &FilterChain, output: &Path) -> Result<RenderSummary> {
        self.orchestrator
            .render(timeline, chain, self.default_preset()?, output)
            .await
    }

    async fn render_with(&self, input: &Path, stage: FilterStage, output: &Path) -> Result<RenderSummary> {
        let media = self.open(input)?;
        let chain = FilterChain::new().with(stage)?;
        self.render(&Timeline::from_media(media), &chain, output).await
    }

    // ==========================================
    // METADATA
    // ==========================================

    /// Probe a media file
    pub fn get_video_info<P: AsRef<Path>>(&self, path: P) -> Result<MediaInfo> {
        let media = self.open(path)?;
        debug!("{}", media.info());
        Ok(media.info().clone())
    }

    // ==========================================
    // TIMELINE OPERATIONS
    // ==========================================

    /// Write `[start, end)` of `input` to `output`
    pub async fn trim<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input: P,
        output: Q,
        start: f64,
        end: f64,
    ) -> Result<RenderSummary> {
        let media = self.open(input)?;
        let timeline = timeline::trim(&media, start, end)?;
        info!("✂️  Trimming {:?} [{:.3}s, {:.3}s)", media.path(), start, end);
        self.render(&timeline, &FilterChain::new(), output.as_ref()).await
    }

    /// Write `[0, point)` to `first` and `[point, duration)` to `second`
    ///
    /// The two halves render concurrently as separate jobs.
    pub async fn split<P: AsRef<Path>, Q: AsRef<Path>, R: AsRef<Path>>(
        &self,
        input: P,
        first: Q,
        second: R,
        point: f64,
    ) -> Result<(RenderSummary, RenderSummary)> {
        let media = self.open(input)?;
        let (head, tail) = timeline::split(&media, point)?;
        info!("✂️  Splitting {:?} at {:.3}s", media.path(), point);

        let chain = FilterChain::new();
        let preset = self.default_preset()?;
        let head_job = self.orchestrator.submit(&head, &chain, preset.clone(), first.as_ref())?;
        let tail_job = self.orchestrator.submit(&tail, &chain, preset, second.as_ref())?;
        let (head_result, tail_result) = tokio::join!(head_job.result(), tail_job.result());
        Ok((head_result?, tail_result?))
    }

    /// Mix the audio of several files, aligned at zero, into one audio file
    pub async fn mix_audio<P: AsRef<Path>, Q: AsRef<Path>>(&self, inputs: &[P], output: Q) -> Result<AudioSummary> {
        let media = inputs.iter().map(|p| self.open(p)).collect::<Result<Vec<_>>>()?;
        let mixed = timeline::mix_audio(&self.engine, &media, self.config.audio.normalize)?;

        let output = output.as_ref();
        let summary = AudioSummary {
            output: output.to_path_buf(),
            duration: mixed.duration(),
            sample_rate: mixed.sample_rate,
            channels: mixed.channels,
        };
        self.orchestrator.write_audio(output, mixed).await?;
        info!("🎵 Mixed {} inputs into {:?}", media.len(), output);
        Ok(summary)
    }

    /// Copy the audio track of `input` into an audio file
    pub async fn extract_audio<P: AsRef<Path>, Q: AsRef<Path>>(&self, input: P, output: Q) -> Result<AudioSummary> {
        let media = self.open(input)?;
        let audio = self.engine.read_audio(media.info())?.ok_or_else(|| TimelineError::EmptyInput {
            what: format!("{} has no audio track", media.path().display()),
        })?;

        let output = output.as_ref();
        let summary = AudioSummary {
            output: output.to_path_buf(),
            duration: audio.duration(),
            sample_rate: audio.sample_rate,
            channels: audio.channels,
        };
        self.orchestrator.write_audio(output, audio).await?;
        info!("🎵 Extracted audio of {:?} to {:?}", media.path(), output);
        Ok(summary)
    }

    // ==========================================
    // EFFECTS
    // ==========================================

    /// Apply a named effect with default parameters
    ///
    /// Unknown names fail with `UnsupportedFilter` before anything is written.
    pub async fn apply_effect<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input: P,
        output: Q,
        effect: &str,
    ) -> Result<RenderSummary> {
        self.apply_effect_with(input, output, effect, ParamMap::new()).await
    }

    /// Apply a named effect with explicit parameters
    pub async fn apply_effect_with<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input: P,
        output: Q,
        effect: &str,
        params: ParamMap,
    ) -> Result<RenderSummary> {
        let stage = self.registry.create(effect, params)?;
        info!("🎨 Applying {} to {:?}", stage.name(), input.as_ref());
        self.render_with(input.as_ref(), stage, output.as_ref()).await
    }

    /// Re-encode `input` with a named preset
    pub async fn export<P: AsRef<Path>, Q: AsRef<Path>>(&self, input: P, output: Q, preset: &str) -> Result<RenderSummary> {
        let preset = Preset::named(preset)?;
        let media = self.open(input)?;
        info!("📦 Exporting {:?} with preset {}", media.path(), preset);
        self.orchestrator
            .render(&Timeline::from_media(media), &FilterChain::new(), preset, output)
            .await
    }

    /// Apply an effect whose parameter follows a keyframe track
    ///
    /// `property` is `effect.param`, or just `effect` to animate the
    /// effect's main parameter (`amount` for colour effects).
    pub async fn apply_keyframe_effect<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input: P,
        output: Q,
        property: &str,
        keyframes: KeyframeTrack,
    ) -> Result<RenderSummary> {
        let (effect, param) = match property.split_once('.') {
            Some((effect, param)) => (effect, Some(param)),
            None => (property, None),
        };
        let stage = self
            .registry
            .create_animated(effect, param, Param::Keyframed(keyframes), ParamMap::new())?;
        info!("🎨 Animating {} on {:?}", property, input.as_ref());
        self.render_with(input.as_ref(), stage, output.as_ref()).await
    }

    /// Draw `text` at (x, y) with an ARGB colour
    #[allow(clippy::too_many_arguments)]
    pub async fn apply_text_overlay<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input: P,
        output: Q,
        text: &str,
        x: f64,
        y: f64,
        font_size: f64,
        color: u32,
    ) -> Result<RenderSummary> {
        let params = ParamMap::new()
            .with("text", text)
            .with("x", x)
            .with("y", y)
            .with("font_size", font_size)
            .with("color", color);
        self.apply_effect_with(input, output, "text-overlay", params).await
    }

    /// Composite `foreground` scaled to `width` x `height` at (x, y)
    #[allow(clippy::too_many_arguments)]
    pub async fn apply_pip<P: AsRef<Path>, F: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        background: P,
        foreground: F,
        output: Q,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    ) -> Result<RenderSummary> {
        let params = ParamMap::new()
            .with("foreground", self.open(foreground)?)
            .with("x", x)
            .with("y", y)
            .with("width", width)
            .with("height", height);
        self.apply_effect_with(background, output, "pip", params).await
    }

    /// Re-time `input` by a speed map: a constant rate or a `t:v,...` track
    pub async fn apply_speed_ramp<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input: P,
        output: Q,
        speed_map: &str,
    ) -> Result<RenderSummary> {
        let params = ParamMap::new().with("speed", ParamValue::parse_loose(speed_map));
        self.apply_effect_with(input, output, "speed-ramp", params).await
    }

    // ==========================================
    // ANALYSIS
    // ==========================================

    /// Track a region over the whole file and write the trajectory as JSON
    ///
    /// A trajectory that lost the region is still written and returned;
    /// check [`MotionTrajectory::lost_at`].
    #[allow(clippy::too_many_arguments)]
    pub async fn track_motion<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input: P,
        output: Q,
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    ) -> Result<MotionTrajectory> {
        let media = self.open(input)?;
        let duration = media.duration;
        let trajectory = self
            .tracker
            .track_async(media, Rect::new(x, y, width, height), 0.0, duration)
            .await?;
        trajectory.save(output.as_ref())?;
        info!("🎯 Trajectory of {} frames written to {:?}", trajectory.len(), output.as_ref());
        Ok(trajectory)
    }
}

impl std::fmt::Debug for Editor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Editor")
            .field("engine", &self.engine)
            .field("filters", &self.registry.list_filters())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::media::{Frame, SinkSpec};

    fn editor() -> Editor {
        Editor::with_engine(Engine::native(), Config::default()).unwrap()
    }

    fn clip(editor: &Editor, path: &Path, frames: u32) {
        let spec = SinkSpec {
            width: 16,
            height: 16,
            frame_rate: 10.0,
            codec: "png".into(),
            bitrate_kbps: 0,
            audio: None,
        };
        let mut sink = editor.engine().create_sink(path, spec).unwrap();
        for i in 0..frames {
            sink.write_frame(&Frame::new_filled(16, 16, [(i * 10) as u8, 80, 160])).unwrap();
        }
        sink.finish().unwrap();
    }

    #[tokio::test]
    async fn test_unknown_effect_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let editor = editor();
        let input = dir.path().join("in.frames");
        clip(&editor, &input, 4);
        let output = dir.path().join("out.frames");

        let err = editor.apply_effect(&input, &output, "vaporwave").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFilter);
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_keyframe_property_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let editor = editor();
        let input = dir.path().join("in.frames");
        clip(&editor, &input, 4);

        let track = KeyframeTrack::linear(&[(0.0, 0.0), (0.3, 1.0)]).unwrap();
        let summary = editor
            .apply_keyframe_effect(&input, dir.path().join("a.frames"), "sepia.amount", track.clone())
            .await
            .unwrap();
        assert_eq!(summary.frames, 4);

        let err = editor
            .apply_keyframe_effect(&input, dir.path().join("b.frames"), "sepia.radius", track)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
    }

    #[tokio::test]
    async fn test_shutdown_makes_engine_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let editor = editor();
        let input = dir.path().join("in.frames");
        clip(&editor, &input, 2);

        editor.shutdown();
        let err = editor.get_video_info(&input).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EngineUnavailable);
    }
}
