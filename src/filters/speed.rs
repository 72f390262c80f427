use crate::error::Result;
use crate::filters::keyframe::KeyframeTrack;
use crate::filters::params::Param;

const STAGE: &str = "speed-ramp";

/// Playback-rate curve over output time
///
/// Output second `t` shows input time `∫₀ᵗ speed(u) du`. Speeds must stay
/// strictly positive so the mapping is monotonic and invertible.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeedMap {
    speed: Param,
}

impl SpeedMap {
    pub fn new(speed: impl Into<Param>) -> Result<Self> {
        let map = Self { speed: speed.into() };
        map.validate()?;
        Ok(map)
    }

    /// Parse a speed-map description such as `"0:1,2:0.5,4:2"`
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = spec.trim();
        if let Ok(constant) = spec.parse::<f64>() {
            return Self::new(constant);
        }
        let track: KeyframeTrack = spec.parse()?;
        Self::new(track)
    }

    pub fn validate(&self) -> Result<()> {
        self.speed.check_positive(STAGE, "speed")
    }

    pub fn param(&self) -> &Param {
        &self.speed
    }

    pub(crate) fn param_mut(&mut self) -> &mut Param {
        &mut self.speed
    }

    /// Rate multiplier at output time `t`
    pub fn speed_at(&self, t: f64) -> f64 {
        self.speed.evaluate(t)
    }

    /// Input time shown at output time `t`
    pub fn input_time(&self, t: f64) -> f64 {
        match &self.speed {
            Param::Constant(rate) => rate * t.max(0.0),
            Param::Keyframed(track) => track.integrate(t),
        }
    }

    /// Output duration needed to play `input_duration` seconds of input
    pub fn output_duration(&self, input_duration: f64) -> f64 {
        if input_duration <= 0.0 {
            return 0.0;
        }
        if let Param::Constant(rate) = &self.speed {
            return input_duration / rate;
        }

        // input_time is strictly increasing, so bisect for its inverse
        let (min_speed, _) = self.speed.bounds();
        let mut lo = 0.0;
        let mut hi = input_duration / min_speed.max(f64::EPSILON);
        for _ in 0..100 {
            let mid = 0.5 * (lo + hi);
            if self.input_time(mid) < input_duration {
                lo = mid;
            } else {
                hi = mid;
            }
            if hi - lo < 1e-9 {
                break;
            }
        }
        hi
    }
}
