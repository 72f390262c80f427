use std::collections::HashMap;
use std::sync::Arc;

use crate::config::FilterConfig;
use crate::error::{EditorError, FilterError, Result};
use crate::filters::params::{Param, ParamMap};
use crate::filters::speed::SpeedMap;
use crate::filters::stage::{CustomFilter, CustomStage, FilterStage, OldFilm, PictureInPicture, TextOverlay};

type StageFactory = Box<dyn Fn(&mut ParamMap, &FilterConfig) -> Result<FilterStage> + Send + Sync>;

/// Registry for building filter stages by name
///
/// The registry is the single place where effect names coming from callers
/// are resolved. Built-in stages are always present; custom filters can be
/// registered alongside them.
pub struct FilterRegistry {
    factories: HashMap<String, StageFactory>,
    aliases: HashMap<String, String>,
    defaults: FilterConfig,
}

impl FilterRegistry {
    /// Create a registry with all built-in stages
    pub fn new() -> Self {
        Self::with_defaults(FilterConfig::default())
    }

    /// Built-in stages using the given default parameters
    pub fn with_defaults(defaults: FilterConfig) -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
            aliases: HashMap::new(),
            defaults,
        };

        registry.register_builtin_stages();
        registry
    }

    fn register_builtin_stages(&mut self) {
        self.factories.insert(
            "grayscale".to_string(),
            Box::new(|params: &mut ParamMap, _: &FilterConfig| {
                Ok(FilterStage::Grayscale {
                    amount: params.take_param("grayscale", "amount", 1.0)?,
                })
            }),
        );

        self.factories.insert(
            "sepia".to_string(),
            Box::new(|params: &mut ParamMap, _: &FilterConfig| {
                Ok(FilterStage::Sepia {
                    amount: params.take_param("sepia", "amount", 1.0)?,
                })
            }),
        );

        self.factories.insert(
            "invert".to_string(),
            Box::new(|params: &mut ParamMap, _: &FilterConfig| {
                Ok(FilterStage::Invert {
                    amount: params.take_param("invert", "amount", 1.0)?,
                })
            }),
        );

        self.factories.insert(
            "oldfilm".to_string(),
            Box::new(|params: &mut ParamMap, defaults: &FilterConfig| {
                Ok(FilterStage::OldFilm(OldFilm {
                    grain: params.take_param("oldfilm", "grain", defaults.oldfilm_grain as f64)?,
                    vignette: params.take_param("oldfilm", "vignette", defaults.oldfilm_vignette as f64)?,
                    fade: params.take_param("oldfilm", "fade", defaults.oldfilm_fade as f64)?,
                    seed: params.take_u64("oldfilm", "seed")?.unwrap_or(defaults.grain_seed),
                }))
            }),
        );

        self.factories.insert(
            "text-overlay".to_string(),
            Box::new(|params: &mut ParamMap, _: &FilterConfig| {
                let stage = "text-overlay";
                let text = params
                    .take_text(stage, "text")?
                    .ok_or_else(|| EditorError::invalid_parameter(stage, "text", "required"))?;
                let color = params.take_u64(stage, "color")?.unwrap_or(0xFFFF_FFFF);
                let color = u32::try_from(color)
                    .map_err(|_| EditorError::invalid_parameter(stage, "color", "must fit in 32-bit ARGB"))?;

                Ok(FilterStage::TextOverlay(TextOverlay {
                    text,
                    x: params.take_param(stage, "x", 0.0)?,
                    y: params.take_param(stage, "y", 0.0)?,
                    font_size: params.take_param(stage, "font_size", 24.0)?,
                    color,
                    opacity: params.take_param(stage, "opacity", 1.0)?,
                }))
            }),
        );

        self.factories.insert(
            "pip".to_string(),
            Box::new(|params: &mut ParamMap, _: &FilterConfig| {
                let stage = "pip";
                let foreground = params
                    .take_media(stage, "foreground")?
                    .ok_or_else(|| EditorError::invalid_parameter(stage, "foreground", "required"))?;
                let width = params.take_param(stage, "width", foreground.width as f64)?;
                let height = params.take_param(stage, "height", foreground.height as f64)?;

                Ok(FilterStage::Pip(PictureInPicture {
                    x: params.take_param(stage, "x", 0.0)?,
                    y: params.take_param(stage, "y", 0.0)?,
                    width,
                    height,
                    opacity: params.take_param(stage, "opacity", 1.0)?,
                    foreground,
                }))
            }),
        );

        self.factories.insert(
            "speed-ramp".to_string(),
            Box::new(|params: &mut ParamMap, _: &FilterConfig| {
                let speed = params.take_param("speed-ramp", "speed", 1.0)?;
                Ok(FilterStage::SpeedRamp(SpeedMap::new(speed)?))
            }),
        );

        for (alias, name) in [
            ("greyscale", "grayscale"),
            ("old-film", "oldfilm"),
            ("text", "text-overlay"),
            ("picture-in-picture", "pip"),
            ("speed", "speed-ramp"),
            ("speedramp", "speed-ramp"),
        ] {
            self.aliases.insert(alias.to_string(), name.to_string());
        }
    }

    /// Register a custom filter under its own name
    ///
    /// A custom filter may shadow a built-in stage of the same name.
    pub fn register_custom(&mut self, filter: Arc<dyn CustomFilter>) {
        let name = filter.name().to_lowercase();
        self.factories.insert(
            name.clone(),
            Box::new(move |params: &mut ParamMap, _: &FilterConfig| {
                let params = params.take_all_params(filter.name())?;
                Ok(FilterStage::Custom(CustomStage {
                    filter: Arc::clone(&filter),
                    params,
                }))
            }),
        );
        self.aliases.remove(&name);
    }

    fn resolve(&self, name: &str) -> String {
        let name = name.trim().to_lowercase();
        self.aliases.get(&name).cloned().unwrap_or(name)
    }

    /// Build and validate a stage
    ///
    /// Unknown names fail with `UnsupportedFilter`; parameters of the wrong
    /// type, out of range or not understood by the stage fail with
    /// `InvalidParameter`.
    pub fn create(&self, name: &str, mut params: ParamMap) -> Result<FilterStage> {
        let resolved = self.resolve(name);
        let factory = self
            .factories
            .get(&resolved)
            .ok_or_else(|| FilterError::Unsupported { name: name.to_string() })?;

        let stage = factory(&mut params, &self.defaults)?;
        params.finish(stage.name())?;
        stage.validate()?;
        Ok(stage)
    }

    /// Build a stage with default parameters
    pub fn create_default(&self, name: &str) -> Result<FilterStage> {
        self.create(name, ParamMap::new())
    }

    /// Build a stage whose main parameter follows `value`
    pub fn create_animated(&self, name: &str, param: Option<&str>, value: Param, params: ParamMap) -> Result<FilterStage> {
        let mut stage = self.create(name, params)?;
        let param_name = param.unwrap_or_else(|| stage.primary_param());
        let stage_name = stage.name().to_string();
        let slot = stage
            .param_mut(param_name)
            .ok_or_else(|| EditorError::invalid_parameter(stage_name.as_str(), param_name, "not an animatable parameter"))?;
        *slot = value;
        stage.validate()?;
        Ok(stage)
    }

    /// Check if a stage name (or alias) is known
    pub fn has(&self, name: &str) -> bool {
        self.factories.contains_key(&self.resolve(name))
    }

    /// Get list of all registered stage names
    pub fn list_filters(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::filters::keyframe::KeyframeTrack;
    use crate::filters::stage::FrameContext;
    use crate::media::{Frame, MediaHandle, MediaInfo};
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    struct Posterize;

    impl CustomFilter for Posterize {
        fn name(&self) -> &str {
            "posterize"
        }

        fn apply(&self, frame: &mut Frame, _params: &BTreeMap<String, f64>, _ctx: &FrameContext) -> Result<()> {
            crate::filters::color::map_pixels(frame, |_, _, px| px.map(|c| c & 0xC0));
            Ok(())
        }
    }

    fn clip_handle() -> MediaHandle {
        MediaHandle::from_info(MediaInfo {
            path: PathBuf::from("fg.frames"),
            duration: 1.0,
            width: 64,
            height: 48,
            frame_rate: 10.0,
            frame_count: 10,
            audio_channels: 0,
            sample_rate: 0,
            format: "frames".into(),
        })
    }

    #[test]
    fn test_builtin_stages_and_aliases() {
        let registry = FilterRegistry::new();
        for name in ["grayscale", "greyscale", "sepia", "invert", "oldfilm", "old-film", "Sepia"] {
            assert!(registry.create_default(name).is_ok(), "{}", name);
        }
        assert_eq!(registry.create_default("greyscale").unwrap().name(), "grayscale");
    }

    #[test]
    fn test_unknown_effect_is_unsupported() {
        let err = FilterRegistry::new().create_default("vaporwave").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFilter);
    }

    #[test]
    fn test_type_mismatch_fails_at_construction() {
        let registry = FilterRegistry::new();
        let err = registry
            .create("sepia", ParamMap::new().with("amount", true))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);

        let err = registry
            .create("grayscale", ParamMap::new().with("radius", 3))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);

        let err = registry.create("pip", ParamMap::new().with("foreground", "fg.mp4")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
    }

    #[test]
    fn test_text_overlay_requires_text() {
        let registry = FilterRegistry::new();
        assert!(registry.create_default("text").is_err());
        let stage = registry
            .create("text", ParamMap::new().with("text", "Hello").with("color", "0xFF00FF00"))
            .unwrap();
        match stage {
            FilterStage::TextOverlay(overlay) => assert_eq!(overlay.color, 0xFF00_FF00),
            other => panic!("unexpected stage {:?}", other),
        }
    }

    #[test]
    fn test_pip_defaults_to_foreground_size() {
        let stage = FilterRegistry::new()
            .create("pip", ParamMap::new().with("foreground", clip_handle()))
            .unwrap();
        match stage {
            FilterStage::Pip(pip) => {
                assert_eq!(pip.width, Param::Constant(64.0));
                assert_eq!(pip.height, Param::Constant(48.0));
            }
            other => panic!("unexpected stage {:?}", other),
        }
    }

    #[test]
    fn test_custom_filter_registration() {
        let mut registry = FilterRegistry::new();
        registry.register_custom(Arc::new(Posterize));
        assert!(registry.has("posterize"));
        assert!(registry.list_filters().contains(&"posterize".to_string()));

        let stage = registry.create("posterize", ParamMap::new().with("levels", 4)).unwrap();
        assert_eq!(stage.name(), "posterize");
    }

    #[test]
    fn test_create_animated() {
        let registry = FilterRegistry::new();
        let track = KeyframeTrack::linear(&[(0.0, 0.0), (1.0, 1.0)]).unwrap();
        let stage = registry
            .create_animated("sepia", None, Param::Keyframed(track), ParamMap::new())
            .unwrap();
        match stage {
            FilterStage::Sepia { amount } => assert!(amount.is_animated()),
            other => panic!("unexpected stage {:?}", other),
        }

        let bad = KeyframeTrack::linear(&[(0.0, 0.0), (1.0, 5.0)]).unwrap();
        let err = registry
            .create_animated("invert", Some("amount"), Param::Keyframed(bad), ParamMap::new())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
    }
}
