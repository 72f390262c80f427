use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{EditorError, FilterError, Result};

/// How values are produced between two keyframes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    #[default]
    Linear,
    /// Hold the previous keyframe's value until the next one
    Step,
}

/// A single (time, value) point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    /// Seconds from the start of the stream
    pub time: f64,
    pub value: f64,
}

impl Keyframe {
    pub fn new(time: f64, value: f64) -> Self {
        Self { time, value }
    }
}

/// Time-indexed values for one animatable parameter
///
/// Tracks hold at least one point with strictly increasing, non-negative
/// timestamps. Evaluation outside the covered range clamps to the nearest
/// endpoint. Tracks are immutable once built and safe to evaluate from any
/// number of render workers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyframeTrack {
    points: Vec<Keyframe>,
    interpolation: Interpolation,
}

impl KeyframeTrack {
    pub fn new(points: Vec<Keyframe>, interpolation: Interpolation) -> Result<Self> {
        if points.is_empty() {
            return Err(invalid("a track needs at least one keyframe"));
        }
        for point in &points {
            if !point.time.is_finite() || point.time < 0.0 {
                return Err(invalid(format!("timestamp {} must be finite and >= 0", point.time)));
            }
            if !point.value.is_finite() {
                return Err(invalid(format!("value at {}s is not finite", point.time)));
            }
        }
        if let Some(pair) = points.windows(2).find(|pair| pair[1].time <= pair[0].time) {
            return Err(invalid(format!(
                "timestamps must strictly increase ({} then {})",
                pair[0].time, pair[1].time
            )));
        }

        Ok(Self { points, interpolation })
    }

    /// Linear track from (time, value) pairs
    pub fn linear(pairs: &[(f64, f64)]) -> Result<Self> {
        Self::new(
            pairs.iter().map(|&(time, value)| Keyframe::new(time, value)).collect(),
            Interpolation::Linear,
        )
    }

    /// Single-point track, constant everywhere
    pub fn constant(value: f64) -> Self {
        Self {
            points: vec![Keyframe::new(0.0, value)],
            interpolation: Interpolation::Linear,
        }
    }

    pub fn points(&self) -> &[Keyframe] {
        &self.points
    }

    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    /// Value at time `t`, clamped to the endpoints
    pub fn evaluate(&self, t: f64) -> f64 {
        let first = self.points[0];
        let last = self.points[self.points.len() - 1];
        if t <= first.time {
            return first.value;
        }
        if t >= last.time {
            return last.value;
        }

        // Index of the first point strictly after t; always in 1..len here
        let next = self.points.partition_point(|p| p.time <= t);
        let a = self.points[next - 1];
        let b = self.points[next];
        match self.interpolation {
            Interpolation::Step => a.value,
            Interpolation::Linear => {
                let frac = (t - a.time) / (b.time - a.time);
                a.value + (b.value - a.value) * frac
            }
        }
    }

    /// Exact integral of the track from 0 to `t`
    pub fn integrate(&self, t: f64) -> f64 {
        if t <= 0.0 {
            return 0.0;
        }

        let first = self.points[0];
        let mut total = first.value * t.min(first.time);
        if t <= first.time {
            return total;
        }

        for pair in self.points.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if t <= a.time {
                break;
            }
            let end = t.min(b.time);
            let span = end - a.time;
            total += match self.interpolation {
                Interpolation::Step => a.value * span,
                Interpolation::Linear => 0.5 * (a.value + self.evaluate(end)) * span,
            };
        }

        let last = self.points[self.points.len() - 1];
        if t > last.time {
            total += last.value * (t - last.time);
        }
        total
    }

    pub fn min_value(&self) -> f64 {
        self.points.iter().map(|p| p.value).fold(f64::INFINITY, f64::min)
    }

    pub fn max_value(&self) -> f64 {
        self.points.iter().map(|p| p.value).fold(f64::NEG_INFINITY, f64::max)
    }

    /// True when every point holds the same value
    pub fn is_constant(&self) -> bool {
        self.min_value() == self.max_value()
    }
}

fn invalid(reason: impl Into<String>) -> EditorError {
    FilterError::InvalidKeyframes { reason: reason.into() }.into()
}

/// Parses `"0:1.0,2.5:0.5"`; a leading `"step;"` selects step interpolation
impl FromStr for KeyframeTrack {
    type Err = EditorError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (interpolation, body) = match s.split_once(';') {
            Some((mode, body)) => {
                let mode = match mode.trim().to_lowercase().as_str() {
                    "linear" => Interpolation::Linear,
                    "step" => Interpolation::Step,
                    other => return Err(invalid(format!("unknown interpolation '{}'", other))),
                };
                (mode, body)
            }
            None => (Interpolation::Linear, s),
        };

        let mut points = Vec::new();
        for entry in body.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (time, value) = entry
                .split_once(':')
                .ok_or_else(|| invalid(format!("expected time:value, got '{}'", entry)))?;
            let time = time
                .trim()
                .parse::<f64>()
                .map_err(|_| invalid(format!("bad timestamp '{}'", time.trim())))?;
            let value = value
                .trim()
                .parse::<f64>()
                .map_err(|_| invalid(format!("bad value '{}'", value.trim())))?;
            points.push(Keyframe::new(time, value));
        }

        Self::new(points, interpolation)
    }
}

impl fmt::Display for KeyframeTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.interpolation == Interpolation::Step {
            write!(f, "step;")?;
        }
        for (i, point) in self.points.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}:{}", point.time, point.value)?;
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct RawTrack {
    points: Vec<Keyframe>,
    #[serde(default)]
    interpolation: Interpolation,
}

// Deserialisation goes through `new` so invariants hold for loaded tracks too
impl<'de> Deserialize<'de> for KeyframeTrack {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = RawTrack::deserialize(deserializer)?;
        KeyframeTrack::new(raw.points, raw.interpolation).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_linear_midpoint() {
        let track = KeyframeTrack::linear(&[(1.0, 10.0), (3.0, 30.0)]).unwrap();
        assert_eq!(track.evaluate(2.0), 20.0);
    }

    #[test]
    fn test_clamps_outside_range() {
        let track = KeyframeTrack::linear(&[(1.0, 10.0), (3.0, 30.0)]).unwrap();
        assert_eq!(track.evaluate(0.0), 10.0);
        assert_eq!(track.evaluate(100.0), 30.0);
    }

    #[test]
    fn test_step_holds_previous_value() {
        let track: KeyframeTrack = "step;0:1,2:5".parse().unwrap();
        assert_eq!(track.interpolation(), Interpolation::Step);
        assert_eq!(track.evaluate(1.99), 1.0);
        assert_eq!(track.evaluate(2.0), 5.0);
    }

    #[test]
    fn test_rejects_bad_tracks() {
        let empty = KeyframeTrack::new(vec![], Interpolation::Linear).unwrap_err();
        assert_eq!(empty.kind(), ErrorKind::InvalidParameter);

        assert!(KeyframeTrack::linear(&[(1.0, 0.0), (1.0, 2.0)]).is_err());
        assert!(KeyframeTrack::linear(&[(-0.5, 0.0)]).is_err());
        assert!("0:1,abc".parse::<KeyframeTrack>().is_err());
        assert!("cubic;0:1".parse::<KeyframeTrack>().is_err());
    }

    #[test]
    fn test_integrate() {
        // Ramp 1 -> 3 over two seconds, then held at 3
        let track = KeyframeTrack::linear(&[(0.0, 1.0), (2.0, 3.0)]).unwrap();
        assert!((track.integrate(2.0) - 4.0).abs() < 1e-12);
        assert!((track.integrate(3.0) - 7.0).abs() < 1e-12);
        assert!((track.integrate(1.0) - 1.5).abs() < 1e-12);

        let step: KeyframeTrack = "step;1:2,3:4".parse().unwrap();
        assert!((step.integrate(4.0) - (2.0 + 4.0 + 4.0)).abs() < 1e-12);
    }

    #[test]
    fn test_display_parses_back() {
        let track: KeyframeTrack = "step;0:1,2.5:0.5".parse().unwrap();
        let again: KeyframeTrack = track.to_string().parse().unwrap();
        assert_eq!(track, again);
    }

    #[test]
    fn test_deserialize_validates() {
        let bad = r#"{"points":[{"time":2.0,"value":1.0},{"time":1.0,"value":2.0}]}"#;
        assert!(serde_json::from_str::<KeyframeTrack>(bad).is_err());
    }
}
