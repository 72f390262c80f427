//! Motion tracking of a rectangular region across frames.

pub mod tracker;
pub mod trajectory;

pub use tracker::MotionTracker;
pub use trajectory::{MotionTrajectory, TrajectoryPoint};
