use crate::media::{Frame, Rect};

/// Source position and weight for one destination column or row
#[derive(Debug, Clone, Copy)]
struct Tap {
    lo: u32,
    hi: u32,
    frac: f32,
}

/// Bilinear taps mapping destination offsets `[from, to)` of a `target`-long
/// span back onto a `source`-long span, sampling at pixel centres
fn taps(from: i64, to: i64, target: u32, source: u32) -> Vec<Tap> {
    let ratio = source as f64 / target as f64;
    let last = source.saturating_sub(1);
    (from..to)
        .map(|d| {
            let pos = ((d as f64 + 0.5) * ratio - 0.5).clamp(0.0, last as f64);
            let lo = pos.floor() as u32;
            Tap {
                lo,
                hi: (lo + 1).min(last),
                frac: (pos - lo as f64) as f32,
            }
        })
        .collect()
}

/// Scale `foreground` to `target` size and alpha-blend it onto `background`
///
/// The whole foreground maps onto the target rectangle; only the parts of
/// that rectangle lying outside the background are clipped. Work and memory
/// are bounded by the visible area, whatever the target size.
pub fn overlay_scaled(background: &mut Frame, foreground: &Frame, target: Rect, opacity: f32) {
    let opacity = opacity.clamp(0.0, 1.0);
    if target.is_empty() || opacity <= 0.0 || foreground.width() == 0 || foreground.height() == 0 {
        return;
    }

    let bg_w = background.width() as i64;
    let bg_h = background.height() as i64;
    let x0 = (target.x as i64).max(0);
    let y0 = (target.y as i64).max(0);
    let x1 = (target.x as i64 + target.width as i64).min(bg_w);
    let y1 = (target.y as i64 + target.height as i64).min(bg_h);
    if x1 <= x0 || y1 <= y0 {
        return;
    }

    let columns = taps(x0 - target.x as i64, x1 - target.x as i64, target.width, foreground.width());
    let rows = taps(y0 - target.y as i64, y1 - target.y as i64, target.height, foreground.height());
    let fg = foreground.as_image();

    for (y, row) in (y0..y1).zip(&rows) {
        for (x, col) in (x0..x1).zip(&columns) {
            let sample = |px: u32, py: u32| fg.get_pixel(px, py).0;
            let (a, b) = (sample(col.lo, row.lo), sample(col.hi, row.lo));
            let (c, d) = (sample(col.lo, row.hi), sample(col.hi, row.hi));

            let mut src = [0u8; 3];
            for i in 0..3 {
                let top = a[i] as f32 + (b[i] as f32 - a[i] as f32) * col.frac;
                let bottom = c[i] as f32 + (d[i] as f32 - c[i] as f32) * col.frac;
                src[i] = (top + (bottom - top) * row.frac).round().clamp(0.0, 255.0) as u8;
            }

            let out = if opacity >= 1.0 {
                src
            } else {
                let dst = background.get_pixel(x as u32, y as u32);
                let blend = |d: u8, s: u8| (d as f32 * (1.0 - opacity) + s as f32 * opacity).round() as u8;
                [blend(dst[0], src[0]), blend(dst[1], src[1]), blend(dst[2], src[2])]
            };
            background.set_pixel(x as u32, y as u32, out);
        }
    }
}

/// Rectangle from possibly fractional, animated coordinates
pub fn placement(x: f64, y: f64, width: f64, height: f64) -> Rect {
    Rect::new(
        x.round() as i32,
        y.round() as i32,
        width.round().max(0.0) as u32,
        height.round().max(0.0) as u32,
    )
}
