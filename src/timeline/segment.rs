use serde::{Deserialize, Serialize};

use crate::error::{Result, TimelineError};
use crate::media::{MediaHandle, Rect};

/// Tolerance for comparing user-supplied times against probed durations
pub(crate) const TIME_EPSILON: f64 = 1e-9;

/// Compositing layer of a segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    #[default]
    Background,
    Foreground,
}

/// A trimmed piece of one media resource placed on the timeline
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub media: MediaHandle,

    /// Source range `[in_point, out_point)` in seconds
    pub in_point: f64,
    pub out_point: f64,

    pub layer: Layer,

    /// Start on the timeline's time axis, in seconds
    pub position: f64,

    /// Where a foreground segment is drawn; `None` covers the whole canvas
    pub placement: Option<Rect>,
}

impl Segment {
    /// Background segment at position zero
    pub fn new(media: MediaHandle, in_point: f64, out_point: f64) -> Result<Self> {
        let segment = Self {
            media,
            in_point,
            out_point,
            layer: Layer::Background,
            position: 0.0,
            placement: None,
        };
        segment.validate()?;
        Ok(segment)
    }

    /// Segment spanning the whole resource
    pub fn whole(media: MediaHandle) -> Self {
        let duration = media.duration;
        Self {
            media,
            in_point: 0.0,
            out_point: duration,
            layer: Layer::Background,
            position: 0.0,
            placement: None,
        }
    }

    pub fn at(mut self, position: f64) -> Self {
        self.position = position;
        self
    }

    pub fn on_layer(mut self, layer: Layer) -> Self {
        self.layer = layer;
        self
    }

    pub fn placed(mut self, placement: Rect) -> Self {
        self.placement = Some(placement);
        self
    }

    /// Check `0 <= in < out <= duration` and a non-negative position
    pub fn validate(&self) -> Result<()> {
        check_range(self.in_point, self.out_point, self.media.duration)?;
        if !self.position.is_finite() || self.position < 0.0 {
            return Err(TimelineError::InvalidRange {
                start: self.position,
                end: self.position + self.duration(),
                duration: self.media.duration,
            }
            .into());
        }
        Ok(())
    }

    pub fn duration(&self) -> f64 {
        self.out_point - self.in_point
    }

    /// Timeline time at which this segment ends
    pub fn end(&self) -> f64 {
        self.position + self.duration()
    }

    /// Whether timeline time `t` falls inside `[position, end)`
    pub fn covers(&self, t: f64) -> bool {
        t + TIME_EPSILON >= self.position && t + TIME_EPSILON < self.end()
    }

    /// Source time shown at timeline time `t`
    pub fn source_time(&self, t: f64) -> f64 {
        (self.in_point + (t - self.position)).clamp(self.in_point, self.out_point)
    }

    /// Source frame shown at timeline time `t`
    pub fn source_frame(&self, t: f64) -> u64 {
        self.media.frame_index_at(self.source_time(t))
    }
}

/// Validate a `[start, end)` range against a duration
pub fn check_range(start: f64, end: f64, duration: f64) -> Result<()> {
    let valid = start.is_finite()
        && end.is_finite()
        && start >= 0.0
        && start < end
        && end <= duration + TIME_EPSILON;
    if valid {
        Ok(())
    } else {
        Err(TimelineError::InvalidRange { start, end, duration }.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::media::MediaInfo;
    use std::path::PathBuf;

    fn clip(duration: f64, fps: f64) -> MediaHandle {
        MediaHandle::from_info(MediaInfo {
            path: PathBuf::from("clip.frames"),
            duration,
            width: 8,
            height: 8,
            frame_rate: fps,
            frame_count: (duration * fps).round() as u64,
            audio_channels: 0,
            sample_rate: 0,
            format: "frames".into(),
        })
    }

    #[test]
    fn test_range_validation() {
        let media = clip(10.0, 10.0);
        assert!(Segment::new(media.clone(), 0.0, 10.0).is_ok());
        for (start, end) in [(5.0, 5.0), (6.0, 5.0), (-1.0, 2.0), (0.0, 10.5), (f64::NAN, 1.0)] {
            let err = Segment::new(media.clone(), start, end).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidRange, "{}..{}", start, end);
        }
    }

    #[test]
    fn test_source_mapping() {
        let segment = Segment::new(clip(10.0, 10.0), 2.0, 6.0).unwrap().at(1.0);
        assert_eq!(segment.end(), 5.0);
        assert!(segment.covers(1.0));
        assert!(!segment.covers(5.0));
        assert_eq!(segment.source_time(2.0), 3.0);
        assert_eq!(segment.source_frame(2.0), 30);
    }
}
