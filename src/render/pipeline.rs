//! Frame-by-frame materialisation of a timeline through a filter chain.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use crate::error::{EditorError, MediaError, RenderError, Result, TimelineError};
use crate::filters::composite::overlay_scaled;
use crate::filters::{FilterChain, FilterStage, FrameContext};
use crate::media::{AudioBuffer, Engine, Frame, FrameSource, Rect, SinkSpec};
use crate::render::job::JobId;
use crate::render::preset::Preset;
use crate::timeline::{frame_count_for, Timeline};

/// Everything a render needs, owned so the caller can keep editing
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub timeline: Timeline,
    pub chain: FilterChain,
    pub preset: Preset,
    pub output: PathBuf,
}

/// Output geometry and timing resolved from timeline, chain and preset
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPlan {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,

    /// Timeline length before any speed ramp
    pub input_duration: f64,
    pub output_duration: f64,
    pub input_frames: u64,
    pub total_frames: u64,
    pub has_audio: bool,
}

impl RenderPlan {
    /// Validate the request structurally and work out the output shape
    pub fn resolve(request: &RenderRequest) -> Result<Self> {
        request.timeline.validate()?;
        request.chain.validate()?;
        request.preset.validate()?;

        let Some((native_w, native_h)) = request.timeline.canvas_size() else {
            return Self::resolve_audio_only(request);
        };
        let (width, height) = request.preset.resolution.unwrap_or((native_w, native_h));
        let frame_rate = request
            .preset
            .frame_rate
            .or_else(|| request.timeline.frame_rate())
            .filter(|fps| *fps > 0.0)
            .ok_or_else(|| RenderError::InvalidPreset {
                details: "no frame rate in preset or timeline".to_string(),
            })?;

        let input_duration = request.timeline.duration();
        let output_duration = request.chain.output_duration(input_duration);
        let total_frames = frame_count_for(output_duration, frame_rate);
        if total_frames == 0 {
            return Err(TimelineError::EmptyInput {
                what: "render would produce no frames".to_string(),
            }
            .into());
        }

        Ok(Self {
            width,
            height,
            frame_rate,
            input_duration,
            output_duration,
            input_frames: frame_count_for(input_duration, frame_rate),
            total_frames,
            has_audio: request.timeline.has_audio(),
        })
    }

    /// Timelines without video render their mixed audio only
    fn resolve_audio_only(request: &RenderRequest) -> Result<Self> {
        if !request.timeline.has_audio() {
            return Err(TimelineError::EmptyInput {
                what: "timeline has neither video nor audio".to_string(),
            }
            .into());
        }
        if let Some(stage) = request.chain.stages().iter().find(|s| !matches!(s, FilterStage::SpeedRamp(_))) {
            return Err(EditorError::invalid_parameter(
                stage.name(),
                "input",
                "video stage applied to a timeline without video",
            ));
        }

        let input_duration = request.timeline.duration();
        Ok(Self {
            width: 0,
            height: 0,
            frame_rate: 0.0,
            input_duration,
            output_duration: request.chain.output_duration(input_duration),
            input_frames: 0,
            total_frames: 0,
            has_audio: true,
        })
    }

    pub fn is_audio_only(&self) -> bool {
        self.total_frames == 0
    }
}

/// Hidden sibling the output is rendered into before it is committed
///
/// The extension is kept so the same backend handles both paths.
pub fn staging_path(output: &Path) -> PathBuf {
    let stem = output.file_stem().and_then(|s| s.to_str()).unwrap_or("output");
    let name = match output.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!(".{}.partial.{}", stem, ext),
        None => format!(".{}.partial", stem),
    };
    output.with_file_name(name)
}

/// Remove a file or sequence directory; missing paths are fine
pub fn remove_output(path: &Path) -> io::Result<()> {
    let result = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) => Err(e),
    };
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Move a finished staging file onto the output path
pub fn commit_output(staging: &Path, output: &Path) -> Result<()> {
    let write_failed = |e: io::Error| MediaError::WriteFailed {
        path: output.display().to_string(),
        reason: e.to_string(),
    };
    remove_output(output).map_err(write_failed)?;
    fs::rename(staging, output).map_err(write_failed)?;
    Ok(())
}

/// Discard a staging file, logging rather than failing
pub fn discard_staging(staging: &Path) {
    if let Err(e) = remove_output(staging) {
        warn!("Failed to remove partial output {:?}: {}", staging, e);
    }
}

/// Write an audio file through a staging path
pub fn write_audio_staged(engine: &Engine, output: &Path, audio: &AudioBuffer) -> Result<()> {
    let staging = staging_path(output);
    let result = engine
        .write_audio(&staging, audio)
        .and_then(|_| commit_output(&staging, output));
    if result.is_err() {
        discard_staging(&staging);
    }
    result
}

/// Decoders for every segment, opened on first use
struct TimelineCompositor<'a> {
    engine: &'a Engine,
    timeline: &'a Timeline,
    width: u32,
    height: u32,
    frame_rate: f64,
    sources: HashMap<usize, Box<dyn FrameSource>>,
    recent: Vec<(u64, Frame)>,
}

impl<'a> TimelineCompositor<'a> {
    fn new(engine: &'a Engine, timeline: &'a Timeline, plan: &RenderPlan) -> Self {
        Self {
            engine,
            timeline,
            width: plan.width,
            height: plan.height,
            frame_rate: plan.frame_rate,
            sources: HashMap::new(),
            recent: Vec::with_capacity(2),
        }
    }

    fn read_segment_frame(&mut self, index: usize, t: f64) -> Result<Frame> {
        let segment = &self.timeline.segments()[index];
        if !self.sources.contains_key(&index) {
            let source = self.engine.open_video(segment.media.info())?;
            self.sources.insert(index, source);
        }
        let frame_index = segment.source_frame(t);
        match self.sources.get_mut(&index) {
            Some(source) => source.read_frame(frame_index),
            None => Err(MediaError::DecodeFailed {
                path: segment.media.path().display().to_string(),
                reason: "decoder unavailable".to_string(),
            }
            .into()),
        }
    }

    /// Composite the timeline at time `t`
    fn compose(&mut self, t: f64) -> Result<Frame> {
        let mut canvas = Frame::new_black(self.width, self.height);

        let background = self
            .timeline
            .background_at(t)
            .filter(|(_, s)| s.media.has_video())
            .map(|(i, _)| i);
        if let Some(index) = background {
            let frame = self.read_segment_frame(index, t)?;
            if frame.width() == self.width && frame.height() == self.height {
                canvas = frame;
            } else {
                let rect = fit_rect(frame.width(), frame.height(), self.width, self.height);
                overlay_scaled(&mut canvas, &frame, rect, 1.0);
            }
        }

        let foreground: Vec<(usize, Option<Rect>)> = self
            .timeline
            .foreground_at(t)
            .filter(|(_, s)| s.media.has_video())
            .map(|(i, s)| (i, s.placement))
            .collect();
        for (index, placement) in foreground {
            let frame = self.read_segment_frame(index, t)?;
            let rect = placement.unwrap_or_else(|| Rect::new(0, 0, self.width, self.height));
            overlay_scaled(&mut canvas, &frame, rect, 1.0);
        }

        Ok(canvas)
    }

    /// Composite frame on the output grid, reusing the last two results
    fn grid_frame(&mut self, grid_index: u64) -> Result<Frame> {
        if let Some((_, frame)) = self.recent.iter().find(|(i, _)| *i == grid_index) {
            return Ok(frame.clone());
        }
        let frame = self.compose(grid_index as f64 / self.frame_rate)?;
        if self.recent.len() == 2 {
            self.recent.remove(0);
        }
        self.recent.push((grid_index, frame.clone()));
        Ok(frame)
    }

    /// Frame at a fractional input time, blending neighbours between grid points
    fn frame_at(&mut self, t: f64, input_frames: u64) -> Result<Frame> {
        let position = (t * self.frame_rate).max(0.0);
        let last = input_frames.saturating_sub(1);
        let base = ((position + 1e-6).floor() as u64).min(last);
        let frac = (position - base as f64).clamp(0.0, 1.0) as f32;

        let first = self.grid_frame(base)?;
        if frac < 1e-3 || base >= last {
            return Ok(first);
        }
        let next = self.grid_frame(base + 1)?;
        Ok(first.blend(&next, frac))
    }
}

/// Largest rectangle with the source aspect ratio centred in the canvas
fn fit_rect(src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> Rect {
    if src_w == 0 || src_h == 0 {
        return Rect::new(0, 0, dst_w, dst_h);
    }
    let scale = (dst_w as f64 / src_w as f64).min(dst_h as f64 / src_h as f64);
    let w = ((src_w as f64 * scale).round() as u32).clamp(1, dst_w.max(1));
    let h = ((src_h as f64 * scale).round() as u32).clamp(1, dst_h.max(1));
    Rect::new(((dst_w - w) / 2) as i32, ((dst_h - h) / 2) as i32, w, h)
}

/// Mix the audio of every segment into one track covering the timeline
pub fn timeline_audio(engine: &Engine, timeline: &Timeline) -> Result<Option<AudioBuffer>> {
    let mut decoded: Vec<(usize, AudioBuffer)> = Vec::new();
    for (i, segment) in timeline.segments().iter().enumerate() {
        if let Some(audio) = engine.read_audio(segment.media.info())? {
            decoded.push((i, audio));
        }
    }
    if decoded.is_empty() {
        return Ok(None);
    }

    let sample_rate = decoded.iter().map(|(_, a)| a.sample_rate).max().unwrap_or(44100);
    let channels = decoded.iter().map(|(_, a)| a.channels).max().unwrap_or(2);
    let mut mixed = AudioBuffer::silence(sample_rate, channels, timeline.duration());

    for (i, audio) in decoded {
        let segment = &timeline.segments()[i];
        let piece = audio
            .slice(segment.in_point, segment.out_point)
            .convert(sample_rate, channels);
        let offset = (segment.position * sample_rate as f64).round() as usize * channels as usize;
        for (out, s) in mixed.samples.iter_mut().skip(offset).zip(&piece.samples) {
            *out += s;
        }
    }
    mixed.normalize_headroom();
    Ok(Some(mixed))
}

fn frame_error(frame: u64, stage: &str) -> impl FnOnce(EditorError) -> EditorError + '_ {
    move |e| {
        RenderError::Frame {
            frame,
            stage: stage.to_string(),
            source: Box::new(e),
        }
        .into()
    }
}

/// Render `request` into `target`, polling `cancel` between frames
///
/// `progress` is called with (frames_done, total) after every frame. On any
/// error or cancellation the sink is aborted; removing whatever it left at
/// `target` is the caller's job.
pub fn render_to<P>(
    engine: &Engine,
    job: JobId,
    request: &RenderRequest,
    plan: &RenderPlan,
    target: &Path,
    cancel: &AtomicBool,
    mut progress: P,
) -> Result<u64>
where
    P: FnMut(u64, u64),
{
    let audio = match timeline_audio(engine, &request.timeline).map_err(frame_error(0, "audio"))? {
        Some(audio) => match request.chain.speed_map() {
            Some(map) => Some(audio.remap(plan.output_duration, |t| map.input_time(t))),
            None => Some(audio),
        },
        None => None,
    };

    if plan.is_audio_only() {
        if cancel.load(Ordering::Acquire) {
            return Err(RenderError::Cancelled { job, frame: 0 }.into());
        }
        let audio = audio.unwrap_or_else(|| AudioBuffer::silence(44100, 2, plan.output_duration));
        info!("Job {}: writing {:.3}s of audio", job, audio.duration());
        engine.write_audio(target, &audio).map_err(frame_error(0, "encode"))?;
        return Ok(0);
    }

    let spec = SinkSpec {
        width: plan.width,
        height: plan.height,
        frame_rate: plan.frame_rate,
        codec: request.preset.codec.clone(),
        bitrate_kbps: request.preset.bitrate_kbps,
        audio,
    };
    let mut sink = engine.create_sink(target, spec)?;
    let mut runner = match request.chain.prepare(engine) {
        Ok(runner) => runner,
        Err(e) => {
            sink.abort();
            return Err(e);
        }
    };
    let mut compositor = TimelineCompositor::new(engine, &request.timeline, plan);
    let ramped = request.chain.speed_map().is_some();

    info!(
        "Job {}: rendering {} frames at {}x{} @ {:.2} fps",
        job, plan.total_frames, plan.width, plan.height, plan.frame_rate
    );

    for index in 0..plan.total_frames {
        if cancel.load(Ordering::Acquire) {
            sink.abort();
            return Err(RenderError::Cancelled { job, frame: index }.into());
        }

        let output_time = index as f64 / plan.frame_rate;
        let input_time = request.chain.input_time(output_time);

        let step = (|| -> Result<()> {
            let mut frame = if ramped {
                compositor.frame_at(input_time, plan.input_frames)
            } else {
                compositor.compose(output_time)
            }
            .map_err(frame_error(index, "decode"))?;

            runner.apply(
                &mut frame,
                FrameContext { time: input_time, index },
                FrameContext { time: output_time, index },
            )?;

            sink.write_frame(&frame).map_err(frame_error(index, "encode"))
        })();

        if let Err(e) = step {
            sink.abort();
            return Err(e);
        }
        progress(index + 1, plan.total_frames);
    }

    let written = sink.finish().map_err(frame_error(plan.total_frames, "finalize"))?;
    debug!("Job {}: sink finished with {} frames", job, written);
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::{FilterStage, SpeedMap};
    use crate::media::MediaHandle;

    fn write_clip(engine: &Engine, path: &Path, colors: &[[u8; 3]], fps: f64) -> MediaHandle {
        let spec = SinkSpec {
            width: 8,
            height: 6,
            frame_rate: fps,
            codec: "png".into(),
            bitrate_kbps: 0,
            audio: None,
        };
        let mut sink = engine.create_sink(path, spec).unwrap();
        for color in colors {
            sink.write_frame(&Frame::new_filled(8, 6, *color)).unwrap();
        }
        sink.finish().unwrap();
        MediaHandle::open(engine, path).unwrap()
    }

    #[test]
    fn test_staging_path_keeps_extension() {
        assert_eq!(staging_path(Path::new("/tmp/out.mp4")), PathBuf::from("/tmp/.out.partial.mp4"));
        assert_eq!(staging_path(Path::new("clip.frames")), PathBuf::from(".clip.partial.frames"));
    }

    #[test]
    fn test_fit_rect_letterboxes() {
        assert_eq!(fit_rect(16, 9, 16, 16), Rect::new(0, 3, 16, 9));
        assert_eq!(fit_rect(4, 4, 16, 8), Rect::new(4, 0, 8, 8));
    }

    #[test]
    fn test_render_applies_chain() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::native();
        let clip = write_clip(&engine, &dir.path().join("in.frames"), &[[10, 20, 30]; 5], 10.0);

        let request = RenderRequest {
            timeline: Timeline::from_media(clip),
            chain: FilterChain::new().with(FilterStage::invert()).unwrap(),
            preset: Preset::source(),
            output: dir.path().join("out.frames"),
        };
        let plan = RenderPlan::resolve(&request).unwrap();
        let mut last = 0;
        let frames = render_to(
            &engine,
            1,
            &request,
            &plan,
            &request.output,
            &AtomicBool::new(false),
            |done, _| last = done,
        )
        .unwrap();
        assert_eq!(frames, 5);
        assert_eq!(last, 5);

        let out = MediaHandle::open(&engine, &request.output).unwrap();
        let mut source = engine.open_video(out.info()).unwrap();
        assert_eq!(source.read_frame(0).unwrap().get_pixel(0, 0), [245, 235, 225]);
    }

    #[test]
    fn test_speed_ramp_halves_frames_and_blends() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::native();
        let colors: Vec<[u8; 3]> = (0..10).map(|i| [i * 20, 0, 0]).collect();
        let clip = write_clip(&engine, &dir.path().join("in.frames"), &colors, 10.0);

        let fast = RenderRequest {
            timeline: Timeline::from_media(clip.clone()),
            chain: FilterChain::new()
                .with(FilterStage::SpeedRamp(SpeedMap::parse("2").unwrap()))
                .unwrap(),
            preset: Preset::source(),
            output: dir.path().join("fast.frames"),
        };
        assert_eq!(RenderPlan::resolve(&fast).unwrap().total_frames, 5);

        let slow = RenderRequest {
            chain: FilterChain::new()
                .with(FilterStage::SpeedRamp(SpeedMap::parse("0.5").unwrap()))
                .unwrap(),
            output: dir.path().join("slow.frames"),
            ..fast
        };
        let plan = RenderPlan::resolve(&slow).unwrap();
        assert_eq!(plan.total_frames, 20);
        render_to(&engine, 2, &slow, &plan, &slow.output, &AtomicBool::new(false), |_, _| {}).unwrap();

        let out = MediaHandle::open(&engine, &slow.output).unwrap();
        let mut source = engine.open_video(out.info()).unwrap();
        // Output frame 1 sits halfway between source frames 0 and 1
        assert_eq!(source.read_frame(1).unwrap().get_pixel(0, 0), [10, 0, 0]);
    }

    #[test]
    fn test_audio_only_timeline_renders_audio() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::native();
        let input = dir.path().join("in.wav");
        crate::media::native::write_wav(&input, &AudioBuffer::new(vec![0.2; 8000 * 2], 8000, 1)).unwrap();
        let media = MediaHandle::open(&engine, &input).unwrap();

        let request = RenderRequest {
            timeline: crate::timeline::trim(&media, 0.5, 1.5).unwrap(),
            chain: FilterChain::new(),
            preset: Preset::source(),
            output: dir.path().join("out.wav"),
        };
        let plan = RenderPlan::resolve(&request).unwrap();
        assert!(plan.is_audio_only());
        render_to(&engine, 4, &request, &plan, &request.output, &AtomicBool::new(false), |_, _| {}).unwrap();

        let out = MediaHandle::open(&engine, &request.output).unwrap();
        assert!((out.duration - 1.0).abs() < 1e-3);

        let sepia = RenderRequest {
            chain: FilterChain::new().with(FilterStage::sepia()).unwrap(),
            ..request
        };
        assert_eq!(RenderPlan::resolve(&sepia).unwrap_err().kind(), crate::error::ErrorKind::InvalidParameter);
    }

    #[test]
    fn test_cancel_before_first_frame() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::native();
        let clip = write_clip(&engine, &dir.path().join("in.frames"), &[[0, 0, 0]; 3], 10.0);
        let request = RenderRequest {
            timeline: Timeline::from_media(clip),
            chain: FilterChain::new(),
            preset: Preset::source(),
            output: dir.path().join("out.frames"),
        };
        let plan = RenderPlan::resolve(&request).unwrap();
        let err = render_to(&engine, 3, &request, &plan, &request.output, &AtomicBool::new(true), |_, _| {})
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Cancelled);
    }
}
