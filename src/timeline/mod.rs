//! Timeline composition.
//!
//! A [`Timeline`] places trimmed [`Segment`]s of media on a shared time axis.
//! Background segments form the picture; foreground segments are composited
//! on top. Timelines are plain values: render jobs clone them on submit, so
//! later edits never reach an in-flight render.

pub mod editor;
pub mod segment;

use serde::Serialize;

use crate::error::{Result, TimelineError};
use crate::media::MediaHandle;

pub use editor::{mix_audio, split, trim};
pub use segment::{check_range, Layer, Segment};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Timeline {
    segments: Vec<Segment>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Timeline playing one resource from start to end
    pub fn from_media(media: MediaHandle) -> Self {
        Self {
            segments: vec![Segment::whole(media)],
        }
    }

    /// Add a validated segment
    pub fn add(&mut self, segment: Segment) -> Result<()> {
        segment.validate()?;
        self.segments.push(segment);
        Ok(())
    }

    /// Append `[in_point, out_point)` of `media` after the current background
    pub fn append(&mut self, media: MediaHandle, in_point: f64, out_point: f64) -> Result<()> {
        let position = self.background_end();
        self.add(Segment::new(media, in_point, out_point)?.at(position))
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// End of the last segment on any layer
    pub fn duration(&self) -> f64 {
        self.segments.iter().map(Segment::end).fold(0.0, f64::max)
    }

    fn background_end(&self) -> f64 {
        self.segments
            .iter()
            .filter(|s| s.layer == Layer::Background)
            .map(Segment::end)
            .fold(0.0, f64::max)
    }

    /// Join timelines end to end, each starting where the previous one ends
    pub fn concat(parts: &[Timeline]) -> Timeline {
        let mut segments = Vec::new();
        let mut offset = 0.0;
        for part in parts {
            for segment in &part.segments {
                segments.push(segment.clone().at(segment.position + offset));
            }
            offset += part.duration();
        }
        Timeline { segments }
    }

    /// Structural check run before a render job is accepted
    pub fn validate(&self) -> Result<()> {
        if self.segments.is_empty() {
            return Err(TimelineError::EmptyInput {
                what: "timeline has no segments".to_string(),
            }
            .into());
        }
        for segment in &self.segments {
            segment.validate()?;
        }
        Ok(())
    }

    /// Topmost background segment covering `t`; later segments win overlaps
    pub fn background_at(&self, t: f64) -> Option<(usize, &Segment)> {
        self.segments
            .iter()
            .enumerate()
            .rev()
            .find(|(_, s)| s.layer == Layer::Background && s.covers(t))
    }

    /// Foreground segments covering `t`, bottom to top
    pub fn foreground_at(&self, t: f64) -> impl Iterator<Item = (usize, &Segment)> {
        self.segments
            .iter()
            .enumerate()
            .filter(move |(_, s)| s.layer == Layer::Foreground && s.covers(t))
    }

    /// First segment with a video track, preferring the background layer
    fn reference_video(&self) -> Option<&Segment> {
        self.segments
            .iter()
            .find(|s| s.layer == Layer::Background && s.media.has_video())
            .or_else(|| self.segments.iter().find(|s| s.media.has_video()))
    }

    pub fn has_video(&self) -> bool {
        self.reference_video().is_some()
    }

    pub fn has_audio(&self) -> bool {
        self.segments.iter().any(|s| s.media.has_audio())
    }

    /// Native frame rate of the reference segment
    pub fn frame_rate(&self) -> Option<f64> {
        self.reference_video().map(|s| s.media.frame_rate)
    }

    /// Native frame size of the reference segment
    pub fn canvas_size(&self) -> Option<(u32, u32)> {
        self.reference_video().map(|s| (s.media.width, s.media.height))
    }

    /// Distinct media resources the timeline references
    pub fn media(&self) -> Vec<MediaHandle> {
        let mut handles: Vec<MediaHandle> = Vec::new();
        for segment in &self.segments {
            if !handles.iter().any(|h| h.same_resource(&segment.media)) {
                handles.push(segment.media.clone());
            }
        }
        handles
    }

    /// Summary suitable for logs and JSON output
    pub fn summary(&self) -> TimelineSummary {
        TimelineSummary {
            segments: self.segments.len(),
            duration: self.duration(),
            frame_rate: self.frame_rate(),
            canvas: self.canvas_size(),
        }
    }
}

/// Number of frames needed to cover `duration` seconds at `fps`
pub fn frame_count_for(duration: f64, fps: f64) -> u64 {
    if duration <= 0.0 || fps <= 0.0 {
        return 0;
    }
    (duration * fps - 1e-6).ceil().max(0.0) as u64
}

/// Snap a time to the nearest frame boundary
pub fn snap_to_frame(t: f64, fps: f64) -> f64 {
    if fps <= 0.0 {
        return t;
    }
    (t * fps).round() / fps
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineSummary {
    pub segments: usize,
    pub duration: f64,
    pub frame_rate: Option<f64>,
    pub canvas: Option<(u32, u32)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::media::MediaInfo;
    use std::path::PathBuf;

    fn clip(name: &str, duration: f64) -> MediaHandle {
        MediaHandle::from_info(MediaInfo {
            path: PathBuf::from(name),
            duration,
            width: 16,
            height: 9,
            frame_rate: 25.0,
            frame_count: (duration * 25.0).round() as u64,
            audio_channels: 0,
            sample_rate: 0,
            format: "frames".into(),
        })
    }

    #[test]
    fn test_empty_timeline_is_empty_input() {
        let err = Timeline::new().validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyInput);
    }

    #[test]
    fn test_append_and_lookup() {
        let mut timeline = Timeline::new();
        timeline.append(clip("a.frames", 4.0), 1.0, 3.0).unwrap();
        timeline.append(clip("b.frames", 2.0), 0.0, 2.0).unwrap();
        assert_eq!(timeline.duration(), 4.0);

        let (index, segment) = timeline.background_at(2.5).unwrap();
        assert_eq!(index, 1);
        assert_eq!(segment.source_time(2.5), 0.5);
        assert!(timeline.background_at(4.0).is_none());
    }

    #[test]
    fn test_concat_offsets_positions() {
        let a = Timeline::from_media(clip("a.frames", 1.5));
        let b = Timeline::from_media(clip("b.frames", 2.5));
        let joined = Timeline::concat(&[a, b]);
        assert_eq!(joined.duration(), 4.0);
        assert_eq!(joined.segments()[1].position, 1.5);
    }

    #[test]
    fn test_frame_count_for() {
        assert_eq!(frame_count_for(2.0, 25.0), 50);
        assert_eq!(frame_count_for(2.01, 25.0), 51);
        assert_eq!(frame_count_for(0.1 + 0.2, 10.0), 3);
        assert_eq!(frame_count_for(0.0, 25.0), 0);
    }

    #[test]
    fn test_foreground_layers() {
        let mut timeline = Timeline::from_media(clip("bg.frames", 4.0));
        timeline
            .add(Segment::whole(clip("fg.frames", 1.0)).at(1.0).on_layer(Layer::Foreground))
            .unwrap();
        assert_eq!(timeline.foreground_at(1.5).count(), 1);
        assert_eq!(timeline.foreground_at(3.0).count(), 0);
        assert_eq!(timeline.media().len(), 2);
    }
}
