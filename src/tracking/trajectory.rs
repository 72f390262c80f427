use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{EditorError, MediaError, Result, TrackingError};
use crate::filters::{Interpolation, Keyframe, KeyframeTrack};
use crate::media::Rect;

/// Tracked region for one analysed frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    pub frame: u64,

    /// Presentation time of the frame in seconds
    pub time: f64,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,

    /// Match quality in [0, 1]
    pub confidence: f32,

    /// Position was carried over from the last confident frame
    pub low_confidence: bool,
}

impl TrajectoryPoint {
    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }
}

/// Per-frame positions of a tracked region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionTrajectory {
    pub source: PathBuf,
    pub frame_rate: f64,

    /// Region as selected on the first frame
    pub region: Rect,
    pub points: Vec<TrajectoryPoint>,

    /// Frame at which the region was lost; the trajectory stops before it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lost_at: Option<u64>,
}

impl MotionTrajectory {
    pub fn new(source: PathBuf, frame_rate: f64, region: Rect) -> Self {
        Self {
            source,
            frame_rate,
            region,
            points: Vec::new(),
            lost_at: None,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn is_lost(&self) -> bool {
        self.lost_at.is_some()
    }

    pub fn low_confidence_frames(&self) -> Vec<u64> {
        self.points.iter().filter(|p| p.low_confidence).map(|p| p.frame).collect()
    }

    /// The tracking-lost indicator as an error, if tracking was lost
    pub fn lost_error(&self) -> Option<EditorError> {
        self.lost_at.map(|frame| TrackingError::Lost { frame }.into())
    }

    /// Fail with `TrackingLost` unless the whole range was tracked
    pub fn into_complete(self) -> Result<Self> {
        match self.lost_error() {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }

    /// Linear keyframe tracks for the region's x and y over time
    ///
    /// Lets an overlay stage follow the tracked object.
    pub fn to_keyframe_tracks(&self) -> Result<(KeyframeTrack, KeyframeTrack)> {
        let xs = self.points.iter().map(|p| Keyframe::new(p.time, p.x as f64)).collect();
        let ys = self.points.iter().map(|p| Keyframe::new(p.time, p.y as f64)).collect();
        Ok((
            KeyframeTrack::new(xs, Interpolation::Linear)?,
            KeyframeTrack::new(ys, Interpolation::Linear)?,
        ))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            MediaError::EncodeFailed {
                path: self.source.display().to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            MediaError::DecodeFailed {
                path: "trajectory".to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        fs::write(path, json).map_err(|e| {
            MediaError::WriteFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn point(frame: u64, x: i32, low_confidence: bool) -> TrajectoryPoint {
        TrajectoryPoint {
            frame,
            time: frame as f64 / 10.0,
            x,
            y: 2,
            width: 8,
            height: 8,
            confidence: if low_confidence { 0.4 } else { 1.0 },
            low_confidence,
        }
    }

    fn trajectory() -> MotionTrajectory {
        let mut t = MotionTrajectory::new(PathBuf::from("clip.frames"), 10.0, Rect::new(0, 2, 8, 8));
        t.points = vec![point(0, 0, false), point(1, 4, false), point(2, 4, true)];
        t
    }

    #[test]
    fn test_keyframe_tracks_follow_points() {
        let (x, y) = trajectory().to_keyframe_tracks().unwrap();
        assert!((x.evaluate(0.05) - 2.0).abs() < 1e-9);
        assert_eq!(x.evaluate(5.0), 4.0);
        assert_eq!(y.evaluate(0.1), 2.0);
    }

    #[test]
    fn test_empty_trajectory_has_no_tracks() {
        let t = MotionTrajectory::new(PathBuf::from("clip.frames"), 10.0, Rect::new(0, 0, 4, 4));
        assert!(t.to_keyframe_tracks().is_err());
    }

    #[test]
    fn test_lost_indicator() {
        let mut t = trajectory();
        assert!(t.clone().into_complete().is_ok());

        t.lost_at = Some(3);
        assert_eq!(t.lost_error().unwrap().kind(), ErrorKind::TrackingLost);
        assert_eq!(t.low_confidence_frames(), vec![2]);
    }

    #[test]
    fn test_json_keeps_lost_marker() {
        let mut t = trajectory();
        t.lost_at = Some(3);
        let parsed = MotionTrajectory::from_json(&t.to_json().unwrap()).unwrap();
        assert_eq!(parsed, t);
    }
}
