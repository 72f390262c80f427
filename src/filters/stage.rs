use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{EditorError, Result};
use crate::filters::color;
use crate::filters::composite::{overlay_scaled, placement};
use crate::filters::oldfilm::{apply_old_film, OldFilmLook};
use crate::filters::params::Param;
use crate::filters::speed::SpeedMap;
use crate::filters::text::draw_text;
use crate::media::{Frame, MediaHandle};

/// Timing of the frame a stage is being applied to
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameContext {
    /// Presentation time in seconds
    pub time: f64,

    /// Output frame index
    pub index: u64,
}

/// User-supplied frame transform
///
/// Custom filters receive their numeric parameters already evaluated at the
/// frame's presentation time.
pub trait CustomFilter: Send + Sync {
    /// Returns the unique name of this filter
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Check parameters at chain construction
    fn validate(&self, params: &BTreeMap<String, Param>) -> Result<()> {
        let _ = params;
        Ok(())
    }

    fn apply(&self, frame: &mut Frame, params: &BTreeMap<String, f64>, ctx: &FrameContext) -> Result<()>;
}

#[derive(Clone)]
pub struct CustomStage {
    pub filter: Arc<dyn CustomFilter>,
    pub params: BTreeMap<String, Param>,
}

impl fmt::Debug for CustomStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomStage")
            .field("filter", &self.filter.name())
            .field("params", &self.params)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OldFilm {
    pub grain: Param,
    pub vignette: Param,
    pub fade: Param,
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextOverlay {
    pub text: String,
    pub x: Param,
    pub y: Param,
    pub font_size: Param,

    /// 0xAARRGGBB
    pub color: u32,
    pub opacity: Param,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PictureInPicture {
    pub foreground: MediaHandle,
    pub x: Param,
    pub y: Param,
    pub width: Param,
    pub height: Param,
    pub opacity: Param,
}

/// One step of a filter chain
#[derive(Debug, Clone)]
pub enum FilterStage {
    Grayscale { amount: Param },
    Sepia { amount: Param },
    Invert { amount: Param },
    OldFilm(OldFilm),
    TextOverlay(TextOverlay),
    Pip(PictureInPicture),
    /// Re-times the stream; handled by the chain rather than per frame
    SpeedRamp(SpeedMap),
    Custom(CustomStage),
}

impl FilterStage {
    pub fn grayscale() -> Self {
        FilterStage::Grayscale { amount: Param::Constant(1.0) }
    }

    pub fn sepia() -> Self {
        FilterStage::Sepia { amount: Param::Constant(1.0) }
    }

    pub fn invert() -> Self {
        FilterStage::Invert { amount: Param::Constant(1.0) }
    }

    pub fn name(&self) -> &str {
        match self {
            FilterStage::Grayscale { .. } => "grayscale",
            FilterStage::Sepia { .. } => "sepia",
            FilterStage::Invert { .. } => "invert",
            FilterStage::OldFilm(_) => "oldfilm",
            FilterStage::TextOverlay(_) => "text-overlay",
            FilterStage::Pip(_) => "pip",
            FilterStage::SpeedRamp(_) => "speed-ramp",
            FilterStage::Custom(custom) => custom.filter.name(),
        }
    }

    /// Check parameter ranges; run when a chain is built and again on submit
    pub fn validate(&self) -> Result<()> {
        let name = self.name();
        match self {
            FilterStage::Grayscale { amount } | FilterStage::Sepia { amount } | FilterStage::Invert { amount } => {
                amount.check_range(name, "amount", 0.0, 1.0)
            }
            FilterStage::OldFilm(film) => {
                film.grain.check_range(name, "grain", 0.0, 1.0)?;
                film.vignette.check_range(name, "vignette", 0.0, 1.0)?;
                film.fade.check_range(name, "fade", 0.0, 1.0)
            }
            FilterStage::TextOverlay(text) => {
                if text.text.is_empty() {
                    return Err(EditorError::invalid_parameter(name, "text", "must not be empty"));
                }
                text.font_size.check_positive(name, "font_size")?;
                text.opacity.check_range(name, "opacity", 0.0, 1.0)
            }
            FilterStage::Pip(pip) => {
                if !pip.foreground.has_video() {
                    return Err(EditorError::invalid_parameter(
                        name,
                        "foreground",
                        format!("{} has no video track", pip.foreground.path().display()),
                    ));
                }
                pip.width.check_range(name, "width", 1.0, f64::MAX)?;
                pip.height.check_range(name, "height", 1.0, f64::MAX)?;
                pip.opacity.check_range(name, "opacity", 0.0, 1.0)
            }
            FilterStage::SpeedRamp(map) => map.validate(),
            FilterStage::Custom(custom) => custom.filter.validate(&custom.params),
        }
    }

    /// Mutable access to a numeric parameter by name
    pub fn param_mut(&mut self, param: &str) -> Option<&mut Param> {
        match (self, param) {
            (FilterStage::Grayscale { amount }, "amount")
            | (FilterStage::Sepia { amount }, "amount")
            | (FilterStage::Invert { amount }, "amount") => Some(amount),
            (FilterStage::OldFilm(film), "grain") => Some(&mut film.grain),
            (FilterStage::OldFilm(film), "vignette") => Some(&mut film.vignette),
            (FilterStage::OldFilm(film), "fade") => Some(&mut film.fade),
            (FilterStage::TextOverlay(text), "x") => Some(&mut text.x),
            (FilterStage::TextOverlay(text), "y") => Some(&mut text.y),
            (FilterStage::TextOverlay(text), "font_size") => Some(&mut text.font_size),
            (FilterStage::TextOverlay(text), "opacity") => Some(&mut text.opacity),
            (FilterStage::Pip(pip), "x") => Some(&mut pip.x),
            (FilterStage::Pip(pip), "y") => Some(&mut pip.y),
            (FilterStage::Pip(pip), "width") => Some(&mut pip.width),
            (FilterStage::Pip(pip), "height") => Some(&mut pip.height),
            (FilterStage::Pip(pip), "opacity") => Some(&mut pip.opacity),
            (FilterStage::SpeedRamp(map), "speed") => Some(map.param_mut()),
            (FilterStage::Custom(custom), name) => custom.params.get_mut(name),
            _ => None,
        }
    }

    /// Parameter animated when a keyframe property names only the stage
    pub fn primary_param(&self) -> &'static str {
        match self {
            FilterStage::Grayscale { .. } | FilterStage::Sepia { .. } | FilterStage::Invert { .. } => "amount",
            FilterStage::OldFilm(_) => "grain",
            FilterStage::TextOverlay(_) | FilterStage::Pip(_) => "opacity",
            FilterStage::SpeedRamp(_) => "speed",
            FilterStage::Custom(_) => "amount",
        }
    }

    /// Transform one frame in place
    ///
    /// `foreground` is the decoded picture-in-picture frame for this
    /// presentation time; other stages ignore it.
    pub fn apply(&self, frame: &mut Frame, ctx: &FrameContext, foreground: Option<&Frame>) -> Result<()> {
        let t = ctx.time;
        match self {
            FilterStage::Grayscale { amount } => color::grayscale(frame, amount.evaluate(t) as f32),
            FilterStage::Sepia { amount } => color::sepia(frame, amount.evaluate(t) as f32),
            FilterStage::Invert { amount } => color::invert(frame, amount.evaluate(t) as f32),
            FilterStage::OldFilm(film) => {
                let look = OldFilmLook {
                    grain: film.grain.evaluate(t) as f32,
                    vignette: film.vignette.evaluate(t) as f32,
                    fade: film.fade.evaluate(t) as f32,
                    seed: film.seed,
                };
                apply_old_film(frame, &look, ctx.index);
            }
            FilterStage::TextOverlay(text) => draw_text(
                frame,
                &text.text,
                text.x.evaluate(t).round() as i32,
                text.y.evaluate(t).round() as i32,
                text.font_size.evaluate(t) as f32,
                text.color,
                text.opacity.evaluate(t) as f32,
            ),
            FilterStage::Pip(pip) => {
                let fg = foreground.ok_or_else(|| {
                    EditorError::invalid_parameter(self.name(), "foreground", "foreground frame not supplied")
                })?;
                let rect = placement(pip.x.evaluate(t), pip.y.evaluate(t), pip.width.evaluate(t), pip.height.evaluate(t));
                overlay_scaled(frame, fg, rect, pip.opacity.evaluate(t) as f32);
            }
            FilterStage::SpeedRamp(_) => {}
            FilterStage::Custom(custom) => {
                let values: BTreeMap<String, f64> =
                    custom.params.iter().map(|(k, p)| (k.clone(), p.evaluate(t))).collect();
                custom.filter.apply(frame, &values, ctx)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::filters::keyframe::KeyframeTrack;

    struct Brighten;

    impl CustomFilter for Brighten {
        fn name(&self) -> &str {
            "brighten"
        }

        fn apply(&self, frame: &mut Frame, params: &BTreeMap<String, f64>, _ctx: &FrameContext) -> Result<()> {
            let delta = params.get("amount").copied().unwrap_or(0.0) as u8;
            color::map_pixels(frame, |_, _, px| px.map(|c| c.saturating_add(delta)));
            Ok(())
        }
    }

    #[test]
    fn test_keyframed_amount_follows_time() {
        let stage = FilterStage::Invert {
            amount: Param::Keyframed(KeyframeTrack::linear(&[(0.0, 0.0), (1.0, 1.0)]).unwrap()),
        };
        let mut early = Frame::new_filled(2, 2, [0, 0, 0]);
        stage.apply(&mut early, &FrameContext { time: 0.0, index: 0 }, None).unwrap();
        assert_eq!(early.get_pixel(0, 0), [0, 0, 0]);

        let mut late = Frame::new_filled(2, 2, [0, 0, 0]);
        stage.apply(&mut late, &FrameContext { time: 1.0, index: 30 }, None).unwrap();
        assert_eq!(late.get_pixel(0, 0), [255, 255, 255]);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let stage = FilterStage::Sepia { amount: Param::Constant(2.0) };
        assert_eq!(stage.validate().unwrap_err().kind(), ErrorKind::InvalidParameter);
    }

    #[test]
    fn test_custom_stage_receives_evaluated_params() {
        let mut params = BTreeMap::new();
        params.insert("amount".to_string(), Param::Constant(10.0));
        let stage = FilterStage::Custom(CustomStage {
            filter: Arc::new(Brighten),
            params,
        });
        assert_eq!(stage.name(), "brighten");

        let mut frame = Frame::new_filled(1, 1, [5, 5, 5]);
        stage.apply(&mut frame, &FrameContext { time: 0.0, index: 0 }, None).unwrap();
        assert_eq!(frame.get_pixel(0, 0), [15, 15, 15]);
    }

    #[test]
    fn test_param_mut_by_name() {
        let mut stage = FilterStage::grayscale();
        assert!(stage.param_mut("amount").is_some());
        assert!(stage.param_mut("width").is_none());
    }
}
