//! Pixel-level drawing helpers. All of them clip to the image bounds.

use image::{Rgb, RgbImage};

pub fn draw_filled_rect(img: &mut RgbImage, x: u32, y: u32, width: u32, height: u32, color: Rgb<u8>) {
    let x_end = x.saturating_add(width).min(img.width());
    let y_end = y.saturating_add(height).min(img.height());
    for py in y..y_end {
        for px in x..x_end {
            img.put_pixel(px, py, color);
        }
    }
}

pub fn draw_vertical_line(img: &mut RgbImage, x: u32, y1: u32, y2: u32, color: Rgb<u8>) {
    let (start, end) = if y1 < y2 { (y1, y2) } else { (y2, y1) };
    if x >= img.width() || img.height() == 0 {
        return;
    }
    for y in start..=end.min(img.height() - 1) {
        img.put_pixel(x, y, color);
    }
}

pub fn draw_horizontal_line(img: &mut RgbImage, y: u32, x1: u32, x2: u32, color: Rgb<u8>) {
    let (start, end) = if x1 < x2 { (x1, x2) } else { (x2, x1) };
    if y >= img.height() || img.width() == 0 {
        return;
    }
    for x in start..=end.min(img.width() - 1) {
        img.put_pixel(x, y, color);
    }
}

/// Horizontal line drawn as `dash` pixels on, `gap` pixels off.
pub fn draw_dashed_horizontal_line(
    img: &mut RgbImage,
    y: u32,
    x1: u32,
    x2: u32,
    dash: u32,
    gap: u32,
    color: Rgb<u8>,
) {
    let (start, end) = if x1 < x2 { (x1, x2) } else { (x2, x1) };
    if y >= img.height() || img.width() == 0 {
        return;
    }
    let period = dash.max(1) + gap;
    for x in start..=end.min(img.width() - 1) {
        if (x - start) % period < dash.max(1) {
            img.put_pixel(x, y, color);
        }
    }
}

/// Bresenham line between two points; off-image pixels are skipped.
pub fn draw_line(img: &mut RgbImage, from: (i64, i64), to: (i64, i64), color: Rgb<u8>) {
    let (mut x, mut y) = from;
    let dx = (to.0 - x).abs();
    let dy = -(to.1 - y).abs();
    let sx = if x < to.0 { 1 } else { -1 };
    let sy = if y < to.1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        put_clipped(img, x, y, color);
        if x == to.0 && y == to.1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

/// Two-pixel-thick variant of [`draw_line`].
pub fn draw_thick_line(img: &mut RgbImage, from: (i64, i64), to: (i64, i64), color: Rgb<u8>) {
    draw_line(img, from, to, color);
    draw_line(img, (from.0, from.1 + 1), (to.0, to.1 + 1), color);
}

fn put_clipped(img: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    if let (Ok(px), Ok(py)) = (u32::try_from(x), u32::try_from(y)) {
        if px < img.width() && py < img.height() {
            img.put_pixel(px, py, color);
        }
    }
}
