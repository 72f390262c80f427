use std::fmt;
use std::path::PathBuf;

use image::{ImageBuffer, Rgb, RgbImage};
use serde::{Deserialize, Serialize};

/// Represents a single video frame
///
/// This is a simple wrapper around an RGB image buffer that provides
/// convenient methods for pixel manipulation used by filters.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    buffer: RgbImage,
}

impl Frame {
    /// Create a new frame from an RGB image buffer
    pub fn new(buffer: RgbImage) -> Self {
        Self { buffer }
    }

    /// Create a new frame with the given dimensions filled with black
    pub fn new_black(width: u32, height: u32) -> Self {
        Self {
            buffer: ImageBuffer::new(width, height),
        }
    }

    /// Create a new frame with the given dimensions filled with the specified color
    pub fn new_filled(width: u32, height: u32, color: [u8; 3]) -> Self {
        Self {
            buffer: ImageBuffer::from_pixel(width, height, Rgb(color)),
        }
    }

    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    /// Get a pixel at the given coordinates (returns RGB array)
    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 3] {
        self.buffer.get_pixel(x, y).0
    }

    /// Set a pixel at the given coordinates
    pub fn set_pixel(&mut self, x: u32, y: u32, color: [u8; 3]) {
        self.buffer.put_pixel(x, y, Rgb(color));
    }

    /// Get the underlying image buffer
    pub fn as_image(&self) -> &RgbImage {
        &self.buffer
    }

    /// Get a mutable reference to the underlying image buffer
    pub fn as_image_mut(&mut self) -> &mut RgbImage {
        &mut self.buffer
    }

    pub fn into_image(self) -> RgbImage {
        self.buffer
    }

    /// Raw interleaved RGB bytes
    pub fn as_rgb_bytes(&self) -> &[u8] {
        self.buffer.as_raw()
    }

    /// Mutable raw interleaved RGB bytes
    pub fn as_rgb_bytes_mut(&mut self) -> &mut [u8] {
        &mut *self.buffer
    }

    /// Create a frame from raw RGB bytes
    pub fn from_rgb_bytes(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        ImageBuffer::from_raw(width, height, data).map(|buffer| Self { buffer })
    }

    /// Linear mix of two equally sized frames; `weight` is the share of `other`
    pub fn blend(&self, other: &Frame, weight: f32) -> Frame {
        let weight = weight.clamp(0.0, 1.0);
        if weight <= 0.0 || self.buffer.dimensions() != other.buffer.dimensions() {
            return self.clone();
        }
        if weight >= 1.0 {
            return other.clone();
        }

        let data = self
            .as_rgb_bytes()
            .iter()
            .zip(other.as_rgb_bytes())
            .map(|(&a, &b)| (a as f32 * (1.0 - weight) + b as f32 * weight).round() as u8)
            .collect();

        Frame::from_rgb_bytes(self.width(), self.height(), data)
            .unwrap_or_else(|| self.clone())
    }

    /// Rec.601 luma plane, one byte per pixel
    pub fn luma_plane(&self) -> Vec<u8> {
        self.as_rgb_bytes().chunks_exact(3).map(|px| luma(px[0], px[1], px[2])).collect()
    }

    /// Save the frame as a PNG file
    pub fn save_png<P: AsRef<std::path::Path>>(&self, path: P) -> Result<(), image::ImageError> {
        self.buffer.save(path)
    }
}

/// Integer Rec.601 luma; exact for gray input
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((299 * r as u32 + 587 * g as u32 + 114 * b as u32 + 500) / 1000) as u8
}

/// Axis-aligned pixel rectangle; position may be negative while compositing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Fraction of this rectangle lying inside a `width` x `height` frame
    pub fn visible_fraction(&self, width: u32, height: u32) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        let x0 = self.x.max(0) as i64;
        let y0 = self.y.max(0) as i64;
        let x1 = (self.x as i64 + self.width as i64).min(width as i64);
        let y1 = (self.y as i64 + self.height as i64).min(height as i64);
        if x1 <= x0 || y1 <= y0 {
            return 0.0;
        }
        ((x1 - x0) * (y1 - y0)) as f32 / self.area() as f32
    }

    /// True if the rectangle lies entirely inside a `width` x `height` frame
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.x >= 0
            && self.y >= 0
            && self.x as i64 + self.width as i64 <= width as i64
            && self.y as i64 + self.height as i64 <= height as i64
    }
}

/// Probed metadata of a media resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub path: PathBuf,

    /// Duration in seconds
    pub duration: f64,

    /// Frame size; zero for audio-only media
    pub width: u32,
    pub height: u32,

    /// Frames per second; zero for audio-only media
    pub frame_rate: f64,

    /// Number of video frames
    pub frame_count: u64,

    /// Audio channel count; zero when there is no audio track
    pub audio_channels: u16,

    pub sample_rate: u32,

    /// Container or codec name as reported by the backend
    pub format: String,
}

impl MediaInfo {
    pub fn has_video(&self) -> bool {
        self.frame_count > 0 && self.width > 0 && self.height > 0
    }

    pub fn has_audio(&self) -> bool {
        self.audio_channels > 0
    }

    /// Duration of one frame in seconds
    pub fn frame_interval(&self) -> f64 {
        if self.frame_rate > 0.0 {
            1.0 / self.frame_rate
        } else {
            0.0
        }
    }

    /// Index of the frame displayed at `time`, clamped to the last frame
    pub fn frame_index_at(&self, time: f64) -> u64 {
        if self.frame_count == 0 {
            return 0;
        }
        let index = (time.max(0.0) * self.frame_rate + 1e-6).floor() as u64;
        index.min(self.frame_count - 1)
    }
}

impl fmt::Display for MediaInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Duration: {:.3}s", self.duration)?;
        if self.has_video() {
            write!(
                f,
                ", Video: {}x{} @ {:.2} fps ({} frames)",
                self.width, self.height, self.frame_rate, self.frame_count
            )?;
        }
        if self.has_audio() {
            write!(f, ", Audio: {} ch @ {} Hz", self.audio_channels, self.sample_rate)?;
        }
        write!(f, ", Format: {}", self.format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blend_midpoint() {
        let a = Frame::new_filled(2, 2, [0, 0, 0]);
        let b = Frame::new_filled(2, 2, [200, 100, 50]);
        let mixed = a.blend(&b, 0.5);
        assert_eq!(mixed.get_pixel(1, 1), [100, 50, 25]);
    }

    #[test]
    fn test_luma_is_exact_for_gray() {
        for v in [0u8, 1, 77, 128, 254, 255] {
            assert_eq!(luma(v, v, v), v);
        }
    }

    #[test]
    fn test_visible_fraction() {
        let rect = Rect::new(28, 4, 8, 8);
        assert!((rect.visible_fraction(32, 16) - 0.5).abs() < 1e-6);
        assert_eq!(Rect::new(32, 0, 8, 8).visible_fraction(32, 16), 0.0);
        assert_eq!(Rect::new(0, 0, 8, 8).visible_fraction(32, 16), 1.0);
    }

    #[test]
    fn test_frame_index_at_clamps() {
        let info = MediaInfo {
            path: PathBuf::from("clip.frames"),
            duration: 2.0,
            width: 4,
            height: 4,
            frame_rate: 10.0,
            frame_count: 20,
            audio_channels: 0,
            sample_rate: 0,
            format: "frames".into(),
        };
        assert_eq!(info.frame_index_at(0.0), 0);
        assert_eq!(info.frame_index_at(0.7), 7);
        assert_eq!(info.frame_index_at(5.0), 19);
        assert!(info.to_string().starts_with("Duration: 2.000s"));
    }
}
