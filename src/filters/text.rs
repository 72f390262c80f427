//! Text rendering with a built-in 5x7 bitmap font.
//!
//! Lowercase letters render as uppercase; characters without a glyph render
//! as a hollow box.

use crate::media::Frame;

const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;
const ADVANCE: u32 = 6;
const LINE_HEIGHT: u32 = 9;

const UNKNOWN_GLYPH: [u8; 7] = [0x1F, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1F];

/// Rows of a glyph, most significant of the low five bits is the leftmost column
fn glyph(c: char) -> [u8; 7] {
    match c.to_ascii_uppercase() {
        ' ' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
        '!' => [0x04, 0x04, 0x04, 0x04, 0x04, 0x00, 0x04],
        '"' => [0x0A, 0x0A, 0x00, 0x00, 0x00, 0x00, 0x00],
        '#' => [0x0A, 0x0A, 0x1F, 0x0A, 0x1F, 0x0A, 0x0A],
        '%' => [0x18, 0x19, 0x02, 0x04, 0x08, 0x13, 0x03],
        '&' => [0x0C, 0x12, 0x14, 0x08, 0x15, 0x12, 0x0D],
        '\'' => [0x04, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00],
        '(' => [0x02, 0x04, 0x08, 0x08, 0x08, 0x04, 0x02],
        ')' => [0x08, 0x04, 0x02, 0x02, 0x02, 0x04, 0x08],
        '*' => [0x00, 0x04, 0x15, 0x0E, 0x15, 0x04, 0x00],
        '+' => [0x00, 0x04, 0x04, 0x1F, 0x04, 0x04, 0x00],
        ',' => [0x00, 0x00, 0x00, 0x00, 0x0C, 0x04, 0x08],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        '/' => [0x00, 0x01, 0x02, 0x04, 0x08, 0x10, 0x00],
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        ';' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x04, 0x08],
        '<' => [0x02, 0x04, 0x08, 0x10, 0x08, 0x04, 0x02],
        '=' => [0x00, 0x00, 0x1F, 0x00, 0x1F, 0x00, 0x00],
        '>' => [0x08, 0x04, 0x02, 0x01, 0x02, 0x04, 0x08],
        '?' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x00, 0x04],
        '@' => [0x0E, 0x11, 0x01, 0x0D, 0x15, 0x15, 0x0E],
        'A' => [0x0E, 0x11, 0x11, 0x11, 0x1F, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1C, 0x12, 0x11, 0x11, 0x11, 0x12, 0x1C],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x11, 0x0A, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        '_' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x1F],
        _ => UNKNOWN_GLYPH,
    }
}

#[inline]
fn glyph_bit(rows: &[u8; 7], col: u32, row: u32) -> bool {
    col < GLYPH_WIDTH && row < GLYPH_HEIGHT && rows[row as usize] & (0x10 >> col) != 0
}

/// Rendered size of `text` in pixels at `font_size`
pub fn measure_text(text: &str, font_size: f32) -> (u32, u32) {
    let scale = font_size / GLYPH_HEIGHT as f32;
    let lines: Vec<&str> = text.split('\n').collect();
    let widest = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0) as u32;
    let width = if widest == 0 {
        0
    } else {
        ((widest * ADVANCE - (ADVANCE - GLYPH_WIDTH)) as f32 * scale).ceil() as u32
    };
    let height = (((lines.len() as u32 - 1) * LINE_HEIGHT + GLYPH_HEIGHT) as f32 * scale).ceil() as u32;
    (width, height)
}

/// Alpha-blend `text` onto the frame with its top-left corner at (x, y)
///
/// `argb` carries the colour and its alpha byte; `opacity` scales that alpha.
/// Glyph pixels falling outside the frame are clipped.
pub fn draw_text(frame: &mut Frame, text: &str, x: i32, y: i32, font_size: f32, argb: u32, opacity: f32) {
    let alpha = ((argb >> 24) & 0xFF) as f32 / 255.0 * opacity.clamp(0.0, 1.0);
    if alpha <= 0.0 || font_size <= 0.0 {
        return;
    }
    let color = [((argb >> 16) & 0xFF) as f32, ((argb >> 8) & 0xFF) as f32, (argb & 0xFF) as f32];

    let scale = font_size as f64 / GLYPH_HEIGHT as f64;
    let glyph_w = (GLYPH_WIDTH as f64 * scale).ceil() as i64;
    let glyph_h = (GLYPH_HEIGHT as f64 * scale).ceil() as i64;
    let (frame_w, frame_h) = (frame.width() as i64, frame.height() as i64);
    let (x, y) = (x as i64, y as i64);

    for (line_no, line) in text.split('\n').enumerate() {
        let line_y = y + (line_no as f64 * LINE_HEIGHT as f64 * scale).round() as i64;
        if line_y >= frame_h {
            break;
        }
        // Only glyph rows that land on the frame
        let rows_from = (-line_y).clamp(0, glyph_h);
        let rows_to = (frame_h - line_y).clamp(0, glyph_h);
        if rows_from >= rows_to {
            continue;
        }

        for (i, c) in line.chars().enumerate() {
            let glyph_x = x + (i as f64 * ADVANCE as f64 * scale).round() as i64;
            if glyph_x >= frame_w {
                break;
            }
            let cols_from = (-glyph_x).clamp(0, glyph_w);
            let cols_to = (frame_w - glyph_x).clamp(0, glyph_w);
            if cols_from >= cols_to {
                continue;
            }
            let rows = glyph(c);

            for gy in rows_from..rows_to {
                let py = (line_y + gy) as u32;
                let row = (gy as f64 / scale) as u32;
                for gx in cols_from..cols_to {
                    if !glyph_bit(&rows, (gx as f64 / scale) as u32, row) {
                        continue;
                    }
                    let px = (glyph_x + gx) as u32;
                    let dst = frame.get_pixel(px, py);
                    let blend = |d: u8, s: f32| (d as f32 * (1.0 - alpha) + s * alpha).round() as u8;
                    frame.set_pixel(px, py, [blend(dst[0], color[0]), blend(dst[1], color[1]), blend(dst[2], color[2])]);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draws_opaque_color() {
        let mut frame = Frame::new_black(40, 20);
        draw_text(&mut frame, "I", 0, 0, 7.0, 0xFFFF0000, 1.0);
        // Top bar of 'I' spans columns 1..=3
        assert_eq!(frame.get_pixel(2, 0), [255, 0, 0]);
        assert_eq!(frame.get_pixel(0, 0), [0, 0, 0]);
    }

    #[test]
    fn test_half_alpha_blends() {
        let mut frame = Frame::new_filled(20, 20, [0, 0, 0]);
        draw_text(&mut frame, "L", 0, 0, 7.0, 0x80FFFFFF, 1.0);
        let px = frame.get_pixel(0, 0);
        assert!(px[0] > 100 && px[0] < 150);
    }

    #[test]
    fn test_clips_outside_frame() {
        let mut frame = Frame::new_black(8, 8);
        draw_text(&mut frame, "HELLO", -20, -3, 14.0, 0xFFFFFFFF, 1.0);
        draw_text(&mut frame, "X", 100, 100, 14.0, 0xFFFFFFFF, 1.0);
    }

    #[test]
    fn test_huge_font_size_is_bounded_by_frame() {
        let mut frame = Frame::new_black(12, 12);
        draw_text(&mut frame, "HI", 0, 0, 1e9, 0xFFFFFFFF, 1.0);
        // Top-left of 'H' is lit, and the glyph covers the whole frame
        assert_eq!(frame.get_pixel(0, 0), [255, 255, 255]);
        assert_eq!(frame.get_pixel(11, 11), [255, 255, 255]);

        let mut frame = Frame::new_black(12, 12);
        draw_text(&mut frame, "HI", -5, -5, f32::MAX, 0xFFFFFFFF, 1.0);
    }

    #[test]
    fn test_scaled_measurement() {
        assert_eq!(measure_text("AB", 7.0), (11, 7));
        assert_eq!(measure_text("AB", 14.0), (22, 14));
        assert_eq!(measure_text("A\nB", 7.0), (5, 16));
    }
}
