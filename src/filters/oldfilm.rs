use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::filters::color::mix;
use crate::media::{luma, Frame};

/// Evaluated old-film settings for one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OldFilmLook {
    /// Grain noise amplitude (0-1)
    pub grain: f32,

    /// Corner darkening (0-1)
    pub vignette: f32,

    /// Desaturation and contrast loss (0-1)
    pub fade: f32,

    pub seed: u64,
}

/// Spread the seed so neighbouring rows get unrelated noise
fn row_seed(seed: u64, frame_index: u64, row: u64) -> u64 {
    let mut z = seed ^ frame_index.wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ row.wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Apply grain, vignette and fade; deterministic for a given seed and frame index
pub fn apply_old_film(frame: &mut Frame, look: &OldFilmLook, frame_index: u64) {
    let width = frame.width() as usize;
    let height = frame.height() as usize;
    if width == 0 || height == 0 {
        return;
    }

    let cx = (width as f32 - 1.0) / 2.0;
    let cy = (height as f32 - 1.0) / 2.0;
    let max_dist_sq = (cx * cx + cy * cy).max(1.0);
    let grain_amplitude = look.grain * 48.0;

    frame
        .as_rgb_bytes_mut()
        .par_chunks_mut(width * 3)
        .enumerate()
        .for_each(|(y, row)| {
            let mut rng = SmallRng::seed_from_u64(row_seed(look.seed, frame_index, y as u64));
            let dy = y as f32 - cy;

            for (x, px) in row.chunks_exact_mut(3).enumerate() {
                let mut out = [px[0], px[1], px[2]];

                // Faded stock: pull towards gray and lift the blacks a little
                if look.fade > 0.0 {
                    let y_val = luma(out[0], out[1], out[2]);
                    out = mix(out, [y_val, y_val, y_val], look.fade * 0.6);
                    let lift = look.fade * 24.0;
                    for c in out.iter_mut() {
                        *c = (*c as f32 * (1.0 - look.fade * 0.1) + lift).clamp(0.0, 255.0) as u8;
                    }
                }

                if look.vignette > 0.0 {
                    let dx = x as f32 - cx;
                    let dist = (dx * dx + dy * dy) / max_dist_sq;
                    let gain = 1.0 - look.vignette * dist * 0.8;
                    for c in out.iter_mut() {
                        *c = (*c as f32 * gain).clamp(0.0, 255.0) as u8;
                    }
                }

                if grain_amplitude > 0.0 {
                    // Monochrome grain, same offset on every channel
                    let noise = rng.gen_range(-1.0f32..=1.0) * grain_amplitude;
                    for c in out.iter_mut() {
                        *c = (*c as f32 + noise).round().clamp(0.0, 255.0) as u8;
                    }
                }

                px.copy_from_slice(&out);
            }
        });
}
