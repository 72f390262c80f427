use tracing::debug;

use crate::error::{EditorError, RenderError, Result};
use crate::filters::params::Param;
use crate::filters::speed::SpeedMap;
use crate::filters::stage::{FilterStage, FrameContext};
use crate::media::{Engine, Frame, FrameSource, MediaHandle};

/// Ordered filter stages; an empty chain is the identity
///
/// Stages are validated as they are added, so a chain that exists is
/// structurally sound and can only fail at render time on I/O.
#[derive(Debug, Clone, Default)]
pub struct FilterChain {
    stages: Vec<FilterStage>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_stages(stages: Vec<FilterStage>) -> Result<Self> {
        let mut chain = Self::new();
        for stage in stages {
            chain.push(stage)?;
        }
        Ok(chain)
    }

    /// Append a stage after validating it
    pub fn push(&mut self, stage: FilterStage) -> Result<()> {
        stage.validate()?;
        if matches!(stage, FilterStage::SpeedRamp(_)) && self.speed_map().is_some() {
            return Err(EditorError::invalid_parameter(
                "speed-ramp",
                "speed",
                "a chain may hold only one speed ramp",
            ));
        }
        self.stages.push(stage);
        Ok(())
    }

    /// Builder-style [`FilterChain::push`]
    pub fn with(mut self, stage: FilterStage) -> Result<Self> {
        self.push(stage)?;
        Ok(self)
    }

    pub fn stages(&self) -> &[FilterStage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Re-check every stage
    pub fn validate(&self) -> Result<()> {
        let mut ramps = 0;
        for stage in &self.stages {
            stage.validate()?;
            if matches!(stage, FilterStage::SpeedRamp(_)) {
                ramps += 1;
            }
        }
        if ramps > 1 {
            return Err(EditorError::invalid_parameter(
                "speed-ramp",
                "speed",
                "a chain may hold only one speed ramp",
            ));
        }
        Ok(())
    }

    pub fn speed_map(&self) -> Option<&SpeedMap> {
        self.stages.iter().find_map(|stage| match stage {
            FilterStage::SpeedRamp(map) => Some(map),
            _ => None,
        })
    }

    /// Animate a parameter addressed as `stage.param`, or `stage` for its main parameter
    ///
    /// The first stage with a matching name is updated.
    pub fn set_param(&mut self, property: &str, value: Param) -> Result<()> {
        let (stage_name, param_name) = match property.split_once('.') {
            Some((stage, param)) => (stage.trim(), Some(param.trim())),
            None => (property.trim(), None),
        };

        let stage = self
            .stages
            .iter_mut()
            .find(|s| s.name() == stage_name)
            .ok_or_else(|| EditorError::invalid_parameter(stage_name, "property", "no such stage in the chain"))?;

        let param_name = param_name.unwrap_or_else(|| stage.primary_param());
        let previous = {
            let slot = stage
                .param_mut(param_name)
                .ok_or_else(|| EditorError::invalid_parameter(stage_name, param_name, "not an animatable parameter"))?;
            std::mem::replace(slot, value)
        };

        if let Err(e) = stage.validate() {
            if let Some(slot) = stage.param_mut(param_name) {
                *slot = previous;
            }
            return Err(e);
        }
        Ok(())
    }

    /// Input time presented at output time `t`
    pub fn input_time(&self, t: f64) -> f64 {
        self.speed_map().map_or(t, |map| map.input_time(t))
    }

    /// Length of the output for `input_duration` seconds of input
    pub fn output_duration(&self, input_duration: f64) -> f64 {
        self.speed_map()
            .map_or(input_duration, |map| map.output_duration(input_duration))
    }

    /// Open the resources the stages need for one render
    pub fn prepare(&self, engine: &Engine) -> Result<ChainRunner> {
        let mut stages = Vec::with_capacity(self.stages.len());
        let mut ramp_position = None;

        for (i, stage) in self.stages.iter().enumerate() {
            let foreground = match stage {
                FilterStage::Pip(pip) => Some(ForegroundReader {
                    source: engine.open_video(pip.foreground.info())?,
                    handle: pip.foreground.clone(),
                    cached_index: None,
                    cached: Frame::new_black(0, 0),
                }),
                FilterStage::SpeedRamp(_) => {
                    ramp_position = Some(i);
                    None
                }
                _ => None,
            };
            stages.push((stage.clone(), foreground));
        }

        debug!("Prepared filter chain with {} stages", stages.len());
        Ok(ChainRunner { stages, ramp_position })
    }
}

/// Decoder for a picture-in-picture foreground, sampled by presentation time
struct ForegroundReader {
    source: Box<dyn FrameSource>,
    handle: MediaHandle,
    cached_index: Option<u64>,
    cached: Frame,
}

impl ForegroundReader {
    fn frame_at(&mut self, time: f64) -> Result<&Frame> {
        let index = self.handle.frame_index_at(time);
        if self.cached_index != Some(index) {
            self.cached = self.source.read_frame(index)?;
            self.cached_index = Some(index);
        }
        Ok(&self.cached)
    }
}

/// A chain bound to open decoders for the duration of one render
pub struct ChainRunner {
    stages: Vec<(FilterStage, Option<ForegroundReader>)>,
    ramp_position: Option<usize>,
}

impl ChainRunner {
    /// Run every stage over `frame`
    ///
    /// Stages ahead of a speed ramp see the input timing, stages after it
    /// see the output timing. Without a ramp both are the same.
    pub fn apply(&mut self, frame: &mut Frame, input: FrameContext, output: FrameContext) -> Result<()> {
        let ramp_position = self.ramp_position;
        for (i, (stage, foreground)) in self.stages.iter_mut().enumerate() {
            let ctx = match ramp_position {
                Some(ramp) if i < ramp => input,
                _ => output,
            };

            let result = match foreground {
                Some(reader) => reader
                    .frame_at(ctx.time)
                    .and_then(|fg| stage.apply(frame, &ctx, Some(fg))),
                None => stage.apply(frame, &ctx, None),
            };

            result.map_err(|e| RenderError::Frame {
                frame: output.index,
                stage: stage.name().to_string(),
                source: Box::new(e),
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::filters::keyframe::KeyframeTrack;

    fn ctx(time: f64, index: u64) -> FrameContext {
        FrameContext { time, index }
    }

    #[test]
    fn test_empty_chain_is_identity() {
        let chain = FilterChain::new();
        let mut runner = chain.prepare(&Engine::native()).unwrap();
        let original = Frame::new_filled(4, 4, [10, 20, 30]);
        let mut frame = original.clone();
        runner.apply(&mut frame, ctx(0.0, 0), ctx(0.0, 0)).unwrap();
        assert_eq!(frame, original);
    }

    #[test]
    fn test_stages_apply_in_order() {
        let chain = FilterChain::new()
            .with(FilterStage::invert())
            .unwrap()
            .with(FilterStage::grayscale())
            .unwrap();
        let mut runner = chain.prepare(&Engine::native()).unwrap();
        let mut frame = Frame::new_filled(1, 1, [255, 0, 0]);
        runner.apply(&mut frame, ctx(0.0, 0), ctx(0.0, 0)).unwrap();
        // invert -> (0,255,255), luma = (587*255 + 114*255 + 500) / 1000 = 179
        assert_eq!(frame.get_pixel(0, 0), [179, 179, 179]);
    }

    #[test]
    fn test_second_speed_ramp_rejected() {
        let ramp = FilterStage::SpeedRamp(SpeedMap::parse("2").unwrap());
        let err = FilterChain::new().with(ramp.clone()).unwrap().with(ramp).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
    }

    #[test]
    fn test_set_param_by_property() {
        let mut chain = FilterChain::new().with(FilterStage::sepia()).unwrap();
        let track = KeyframeTrack::linear(&[(0.0, 0.0), (2.0, 1.0)]).unwrap();
        chain.set_param("sepia.amount", Param::Keyframed(track.clone())).unwrap();
        chain.set_param("sepia", Param::Keyframed(track)).unwrap();

        let err = chain.set_param("sepia.amount", Param::Constant(3.0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
        // Rejected values leave the previous track in place
        assert!(chain.validate().is_ok());

        assert!(chain.set_param("invert", Param::Constant(1.0)).is_err());
        assert!(chain.set_param("sepia.bogus", Param::Constant(1.0)).is_err());
    }

    #[test]
    fn test_speed_timing() {
        let chain = FilterChain::new()
            .with(FilterStage::SpeedRamp(SpeedMap::parse("2").unwrap()))
            .unwrap();
        assert_eq!(chain.output_duration(4.0), 2.0);
        assert_eq!(chain.input_time(1.0), 2.0);
    }
}
