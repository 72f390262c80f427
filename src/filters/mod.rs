//! Filter chain engine.
//!
//! A [`FilterChain`] is an ordered list of [`FilterStage`]s applied
//! left-to-right to every frame. Stage parameters are either constants or
//! [`KeyframeTrack`]s evaluated at the frame's presentation time. Stages are
//! validated when they are built, so a bad parameter never surfaces
//! mid-render.
//!
//! # Example
//!
//! ```rust
//! use videosnap::filters::{FilterChain, FilterRegistry, KeyframeTrack, ParamMap};
//!
//! let registry = FilterRegistry::new();
//! let fade_in: KeyframeTrack = "0:0,2:1".parse().unwrap();
//! let chain = FilterChain::new()
//!     .with(registry.create("sepia", ParamMap::new().with("amount", fade_in)).unwrap())
//!     .unwrap();
//! assert_eq!(chain.len(), 1);
//! ```

pub mod chain;
pub mod color;
pub mod composite;
pub mod keyframe;
pub mod oldfilm;
pub mod params;
pub mod registry;
pub mod speed;
pub mod stage;
pub mod text;

pub use chain::{ChainRunner, FilterChain};
pub use keyframe::{Interpolation, Keyframe, KeyframeTrack};
pub use params::{Param, ParamMap, ParamValue};
pub use registry::FilterRegistry;
pub use speed::SpeedMap;
pub use stage::{CustomFilter, CustomStage, FilterStage, FrameContext, OldFilm, PictureInPicture, TextOverlay};
