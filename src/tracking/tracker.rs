use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::TrackerConfig;
use crate::error::{MediaError, Result, TimelineError, TrackingError};
use crate::media::{Engine, Frame, MediaHandle, Rect};
use crate::timeline::check_range;
use crate::tracking::trajectory::{MotionTrajectory, TrajectoryPoint};

/// Luma signature of the region selected on the first frame
struct Template {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl Template {
    fn capture(frame: &Frame, region: Rect) -> Self {
        let mut data = Vec::with_capacity(region.area() as usize);
        for y in 0..region.height {
            for x in 0..region.width {
                let [r, g, b] = frame.get_pixel(region.x as u32 + x, region.y as u32 + y);
                data.push(crate::media::luma(r, g, b));
            }
        }
        Self {
            data,
            width: region.width,
            height: region.height,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    x: i32,
    y: i32,

    /// Mean absolute luma difference over the visible pixels
    mad: f64,
    distance: i64,
}

/// Luma plane of one frame
struct Plane<'a> {
    data: &'a [u8],
    width: u32,
    height: u32,
}

impl Plane<'_> {
    /// Score the template placed at (x, y); `None` when too little of it is in frame
    fn score(&self, template: &Template, x: i32, y: i32, min_visible: f32) -> Option<(f64, f32)> {
        let tx0 = (-x).max(0) as u32;
        let tx1 = (self.width as i64 - x as i64).clamp(0, template.width as i64) as u32;
        let ty0 = (-y).max(0) as u32;
        let ty1 = (self.height as i64 - y as i64).clamp(0, template.height as i64) as u32;
        if tx1 <= tx0 || ty1 <= ty0 {
            return None;
        }

        let count = ((tx1 - tx0) * (ty1 - ty0)) as u64;
        let visible = count as f32 / (template.width * template.height) as f32;
        if visible < min_visible {
            return None;
        }

        let mut sad = 0u64;
        for ty in ty0..ty1 {
            let fy = (y + ty as i32) as usize;
            let frame_row = &self.data[fy * self.width as usize..(fy + 1) * self.width as usize];
            let template_row = &template.data[(ty * template.width) as usize..((ty + 1) * template.width) as usize];
            for tx in tx0..tx1 {
                let fx = (x + tx as i32) as usize;
                sad += (frame_row[fx] as i32 - template_row[tx as usize] as i32).unsigned_abs() as u64;
            }
        }
        Some((sad as f64 / count as f64, visible))
    }

    /// Best match within `radius` of `center`
    fn search(&self, template: &Template, center: (i32, i32), radius: i32, min_visible: f32) -> Option<Candidate> {
        (-radius..=radius)
            .into_par_iter()
            .flat_map_iter(|dy| (-radius..=radius).map(move |dx| (dx, dy)))
            .filter_map(|(dx, dy)| {
                let (x, y) = (center.0 + dx, center.1 + dy);
                self.score(template, x, y, min_visible).map(|(mad, _)| Candidate {
                    x,
                    y,
                    mad,
                    distance: (dx as i64).pow(2) + (dy as i64).pow(2),
                })
            })
            .min_by(|a, b| {
                a.mad
                    .total_cmp(&b.mad)
                    .then(a.distance.cmp(&b.distance))
                    .then(a.y.cmp(&b.y))
                    .then(a.x.cmp(&b.x))
            })
    }
}

/// Template-matching region tracker
///
/// Each frame is searched in a window around the position predicted from
/// the last confident match and its velocity. Matches scoring below the
/// confidence threshold keep the last confident position and are flagged.
/// Tracking stops, with `lost_at` set, once the predicted region or the
/// best match is less than `min_visible_fraction` inside the frame.
#[derive(Debug, Clone)]
pub struct MotionTracker {
    engine: Engine,
    config: TrackerConfig,
}

impl MotionTracker {
    pub fn new(engine: Engine, config: TrackerConfig) -> Self {
        Self { engine, config }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Track `region` over the frames presented in `[start, end]`
    ///
    /// A frame presented exactly at `end` is included.
    pub fn track(&self, media: &MediaHandle, region: Rect, start: f64, end: f64) -> Result<MotionTrajectory> {
        if !media.has_video() {
            return Err(TrackingError::InvalidRegion {
                reason: format!("{} has no video track", media.path().display()),
            }
            .into());
        }
        if region.is_empty() || !region.fits_within(media.width, media.height) {
            return Err(TrackingError::InvalidRegion {
                reason: format!(
                    "{}x{} at ({}, {}) is not inside the {}x{} frame",
                    region.width, region.height, region.x, region.y, media.width, media.height
                ),
            }
            .into());
        }
        check_range(start, end, media.duration)?;

        let first = media.frame_index_at(start);
        let stop = ((end * media.frame_rate + 1e-6).floor() as u64 + 1).min(media.frame_count);
        if stop <= first {
            return Err(TimelineError::EmptyInput {
                what: format!("no frames in [{:.3}, {:.3}]", start, end),
            }
            .into());
        }

        info!(
            "Tracking {}x{} region at ({}, {}) over frames {}..{} of {:?}",
            region.width,
            region.height,
            region.x,
            region.y,
            first,
            stop,
            media.path()
        );

        let mut source = self.engine.open_video(media.info())?;
        let template = Template::capture(&source.read_frame(first)?, region);
        let radius = self.config.search_radius as i32;
        let min_visible = self.config.min_visible_fraction;

        let mut trajectory = MotionTrajectory::new(media.path().to_path_buf(), media.frame_rate, region);
        let point = |frame: u64, x: i32, y: i32, confidence: f32, low_confidence: bool| TrajectoryPoint {
            frame,
            time: frame as f64 / media.frame_rate,
            x,
            y,
            width: region.width,
            height: region.height,
            confidence,
            low_confidence,
        };
        trajectory.points.push(point(first, region.x, region.y, 1.0, false));

        let mut anchor = (region.x, region.y);
        let mut anchor_frame = first;
        let mut velocity = (0.0f64, 0.0f64);

        for index in first + 1..stop {
            let elapsed = (index - anchor_frame) as f64;
            let predicted = (
                anchor.0 + (velocity.0 * elapsed).round() as i32,
                anchor.1 + (velocity.1 * elapsed).round() as i32,
            );
            let predicted_rect = Rect::new(predicted.0, predicted.1, region.width, region.height);
            if predicted_rect.visible_fraction(media.width, media.height) < min_visible {
                info!("Region leaves the frame at frame {}, tracking lost", index);
                trajectory.lost_at = Some(index);
                break;
            }

            let frame = source.read_frame(index)?;
            let luma = frame.luma_plane();
            let plane = Plane {
                data: &luma,
                width: frame.width(),
                height: frame.height(),
            };
            let Some(best) = plane.search(&template, predicted, radius, min_visible) else {
                info!("No visible match at frame {}, tracking lost", index);
                trajectory.lost_at = Some(index);
                break;
            };

            let confidence = (1.0 - best.mad / 255.0).clamp(0.0, 1.0) as f32;
            if confidence >= self.config.confidence_threshold {
                velocity = (
                    (best.x - anchor.0) as f64 / elapsed,
                    (best.y - anchor.1) as f64 / elapsed,
                );
                anchor = (best.x, best.y);
                anchor_frame = index;
                debug!("Frame {}: match at ({}, {}) confidence {:.3}", index, best.x, best.y, confidence);
                trajectory.points.push(point(index, best.x, best.y, confidence, false));
            } else {
                warn!(
                    "Frame {}: confidence {:.3} below {:.3}, keeping last position",
                    index, confidence, self.config.confidence_threshold
                );
                trajectory.points.push(point(index, anchor.0, anchor.1, confidence, true));
            }
        }

        info!(
            "Tracked {} frames ({} low confidence){}",
            trajectory.len(),
            trajectory.low_confidence_frames().len(),
            if trajectory.is_lost() { ", lost" } else { "" }
        );
        Ok(trajectory)
    }

    /// Run [`MotionTracker::track`] on the blocking pool
    pub async fn track_async(&self, media: MediaHandle, region: Rect, start: f64, end: f64) -> Result<MotionTrajectory> {
        let tracker = self.clone();
        let path = media.path().display().to_string();
        tokio::task::spawn_blocking(move || tracker.track(&media, region, start, end))
            .await
            .map_err(|e| MediaError::DecodeFailed {
                path,
                reason: format!("tracking worker stopped: {}", e),
            })?
    }
}
