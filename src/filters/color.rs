//! Per-pixel colour transforms.
//!
//! Each transform maps one RGB pixel to another and is mixed with the
//! original by `amount` (1.0 = fully filtered). Rows are processed in
//! parallel.

use rayon::prelude::*;

use crate::media::{luma, Frame};

/// Row-parallel per-pixel map over a frame
pub fn map_pixels<F>(frame: &mut Frame, f: F)
where
    F: Fn(u32, u32, [u8; 3]) -> [u8; 3] + Sync,
{
    let width = frame.width() as usize;
    if width == 0 {
        return;
    }
    frame
        .as_rgb_bytes_mut()
        .par_chunks_mut(width * 3)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, px) in row.chunks_exact_mut(3).enumerate() {
                let out = f(x as u32, y as u32, [px[0], px[1], px[2]]);
                px.copy_from_slice(&out);
            }
        });
}

/// Mix two pixels; `amount` is the share of `filtered`
#[inline]
pub fn mix(original: [u8; 3], filtered: [u8; 3], amount: f32) -> [u8; 3] {
    if amount >= 1.0 {
        return filtered;
    }
    if amount <= 0.0 {
        return original;
    }
    let lerp = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * amount).round().clamp(0.0, 255.0) as u8;
    [
        lerp(original[0], filtered[0]),
        lerp(original[1], filtered[1]),
        lerp(original[2], filtered[2]),
    ]
}

/// Desaturate, keeping Rec.601 luma
pub fn grayscale(frame: &mut Frame, amount: f32) {
    map_pixels(frame, |_, _, px| {
        let y = luma(px[0], px[1], px[2]);
        mix(px, [y, y, y], amount)
    });
}

pub const SEPIA_MATRIX: [[f32; 3]; 3] = [
    [0.393, 0.769, 0.189],
    [0.349, 0.686, 0.168],
    [0.272, 0.534, 0.131],
];

#[inline]
pub fn sepia_pixel(px: [u8; 3]) -> [u8; 3] {
    let [r, g, b] = [px[0] as f32, px[1] as f32, px[2] as f32];
    let row = |m: [f32; 3]| (m[0] * r + m[1] * g + m[2] * b).round().clamp(0.0, 255.0) as u8;
    [row(SEPIA_MATRIX[0]), row(SEPIA_MATRIX[1]), row(SEPIA_MATRIX[2])]
}

pub fn sepia(frame: &mut Frame, amount: f32) {
    map_pixels(frame, |_, _, px| mix(px, sepia_pixel(px), amount));
}

pub fn invert(frame: &mut Frame, amount: f32) {
    map_pixels(frame, |_, _, px| mix(px, [255 - px[0], 255 - px[1], 255 - px[2]], amount));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient() -> Frame {
        let mut frame = Frame::new_black(16, 8);
        for y in 0..8 {
            for x in 0..16 {
                frame.set_pixel(x, y, [(x * 16) as u8, (y * 30) as u8, ((x + y) * 9) as u8]);
            }
        }
        frame
    }

    #[test]
    fn test_grayscale_is_idempotent() {
        let mut once = gradient();
        grayscale(&mut once, 1.0);
        let mut twice = once.clone();
        grayscale(&mut twice, 1.0);
        assert_eq!(once, twice);

        let px = once.get_pixel(5, 3);
        assert_eq!(px[0], px[1]);
        assert_eq!(px[1], px[2]);
    }

    #[test]
    fn test_sepia_twice_differs() {
        let mut once = gradient();
        sepia(&mut once, 1.0);
        let mut twice = once.clone();
        sepia(&mut twice, 1.0);
        assert_ne!(once, twice);
    }

    #[test]
    fn test_sepia_matrix_values() {
        // 0.393*100 + 0.769*50 + 0.189*25 = 82.475
        assert_eq!(sepia_pixel([100, 50, 25]), [82, 73, 57]);
        assert_eq!(sepia_pixel([255, 255, 255]), [255, 255, 239]);
    }

    #[test]
    fn test_invert() {
        let mut frame = Frame::new_filled(2, 2, [0, 100, 255]);
        invert(&mut frame, 1.0);
        assert_eq!(frame.get_pixel(0, 0), [255, 155, 0]);
    }

    #[test]
    fn test_zero_amount_is_identity() {
        let original = gradient();
        let mut frame = original.clone();
        sepia(&mut frame, 0.0);
        assert_eq!(frame, original);
    }
}
