//! Synthetic bullseye marker rendering.
//!
//! Used by the test suite and the benchmark fixtures, and exposed publicly
//! for the `generate` CLI command that prints physical markers. A bullseye
//! of order `n` is a solid dark disk (double stripe width across) inside
//! `n` concentric rings of one stripe width each. Ring brightness climbs
//! towards the center: the outermost ring is as dark as the disk, so the
//! marker opens with a sharp drop from the light background and every ring
//! boundary is a clean brightness step.
//!
//! The monotone ramp is not cosmetic. On rows that cross the ring band but
//! miss the disk, the widest run in the cross-section is always a brighter
//! ring than its neighbours, so the scanline grammar's falling double-width
//! center test cannot misfire there; only rows through the disk produce
//! center hits.

use image::{GrayImage, Luma};

/// Disk and outermost-ring intensity.
pub const DARK: u8 = 20;
/// Background intensity.
pub const LIGHT: u8 = 240;
/// Brightness increase per ring towards the center.
pub const RING_STEP: u8 = 40;

/// Paint a bullseye of ring order `order` onto `img`, centered at
/// `(cx, cy)` with `stripe_w` pixels per ring. Pixels outside the marker
/// are left untouched.
pub fn draw_bullseye(img: &mut GrayImage, cx: f32, cy: f32, order: u32, stripe_w: f32) {
    let outer = stripe_w * (order as f32 + 1.0);
    let (w, h) = img.dimensions();

    let x0 = (cx - outer).floor().max(0.0) as u32;
    let x1 = ((cx + outer).ceil() as u32).min(w.saturating_sub(1));
    let y0 = (cy - outer).floor().max(0.0) as u32;
    let y1 = ((cy + outer).ceil() as u32).min(h.saturating_sub(1));

    for y in y0..=y1 {
        for x in x0..=x1 {
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;
            let d = (dx * dx + dy * dy).sqrt();
            if d >= outer {
                continue;
            }
            let value = if d < stripe_w {
                DARK
            } else {
                // Ring index 1 (innermost) .. order (outermost).
                let ring = (d / stripe_w) as u32;
                DARK.saturating_add((order.saturating_sub(ring)) as u8 * RING_STEP)
            };
            img.put_pixel(x, y, Luma([value]));
        }
    }
}

/// Render a light frame with one bullseye per entry of `centers`.
pub fn frame_with_markers(
    width: u32,
    height: u32,
    centers: &[(f32, f32)],
    order: u32,
    stripe_w: f32,
) -> GrayImage {
    let mut img = GrayImage::from_pixel(width, height, Luma([LIGHT]));
    for &(cx, cy) in centers {
        draw_bullseye(&mut img, cx, cy, order, stripe_w);
    }
    img
}

/// Render a square marker sheet with one centered bullseye, the shape the
/// standalone generator prints.
pub fn marker_image(size: u32, order: u32, stripe_w: f32) -> GrayImage {
    let half = size as f32 / 2.0;
    frame_with_markers(size, size, &[(half, half)], order, stripe_w)
}
