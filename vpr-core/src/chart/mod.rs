//! Two-panel PNG chart: candlesticks on top, VPR below.
//!
//! The VPR panel uses a fixed 0-100 scale with dashed guides at both
//! thresholds. Buckets with undefined VPR break the line.

pub mod draw;

use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use thiserror::Error;

use crate::domain::Bucket;
use crate::signal::Thresholds;
use draw::{
    draw_dashed_horizontal_line, draw_filled_rect, draw_horizontal_line, draw_thick_line,
    draw_vertical_line,
};

pub mod colors {
    use image::Rgb;

    pub const GREEN: Rgb<u8> = Rgb([0, 200, 83]);
    pub const RED: Rgb<u8> = Rgb([255, 68, 68]);
    pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
    pub const LIGHT_GRAY: Rgb<u8> = Rgb([200, 200, 200]);
    pub const MID_GRAY: Rgb<u8> = Rgb([140, 140, 140]);
}

/// Smallest size that still leaves room for both panels.
const MIN_SIDE: u32 = 64;

#[derive(Debug, Error)]
pub enum ChartError {
    #[error("nothing to plot: window is empty")]
    EmptyWindow,

    #[error("chart size {width}x{height} is too small (minimum 64x64)")]
    TooSmall { width: u32, height: u32 },

    #[error("PNG encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

#[derive(Debug, Clone)]
pub struct ChartConfig {
    pub width: u32,
    pub height: u32,
    pub thresholds: Thresholds,
    pub margin: u32,
    pub background: Rgb<u8>,
    pub bullish_color: Rgb<u8>,
    pub bearish_color: Rgb<u8>,
    pub vpr_color: Rgb<u8>,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            width: 1000,
            height: 900,
            thresholds: Thresholds::default(),
            margin: 20,
            background: colors::WHITE,
            bullish_color: colors::GREEN,
            bearish_color: colors::RED,
            vpr_color: colors::RED,
        }
    }
}

impl ChartConfig {
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }
}

/// Pixel rectangle of one panel.
#[derive(Debug, Clone, Copy)]
struct Panel {
    left: u32,
    top: u32,
    width: u32,
    height: u32,
}

impl Panel {
    fn right(&self) -> u32 {
        self.left + self.width - 1
    }

    fn bottom(&self) -> u32 {
        self.top + self.height - 1
    }

    /// Map `value` in `[lo, hi]` to a row, `hi` at the top.
    fn y_for(&self, value: f64, lo: f64, hi: f64) -> u32 {
        let frac = ((hi - value) / (hi - lo)).clamp(0.0, 1.0);
        self.top + (frac * f64::from(self.height - 1)).round() as u32
    }

    fn frame(&self, img: &mut RgbImage, color: Rgb<u8>) {
        draw_horizontal_line(img, self.top, self.left, self.right(), color);
        draw_horizontal_line(img, self.bottom(), self.left, self.right(), color);
        draw_vertical_line(img, self.left, self.top, self.bottom(), color);
        draw_vertical_line(img, self.right(), self.top, self.bottom(), color);
    }
}

pub struct ChartRenderer {
    config: ChartConfig,
}

impl ChartRenderer {
    pub fn new(config: ChartConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChartConfig {
        &self.config
    }

    /// Render `window` (oldest first) as PNG bytes.
    pub fn render(&self, window: &[Bucket]) -> Result<Vec<u8>, ChartError> {
        let img = self.draw(window)?;
        let mut bytes = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img).write_to(&mut bytes, ImageFormat::Png)?;
        Ok(bytes.into_inner())
    }

    /// Render into an in-memory image.
    pub fn draw(&self, window: &[Bucket]) -> Result<RgbImage, ChartError> {
        if window.is_empty() {
            return Err(ChartError::EmptyWindow);
        }
        let cfg = &self.config;
        if cfg.width < MIN_SIDE || cfg.height < MIN_SIDE {
            return Err(ChartError::TooSmall {
                width: cfg.width,
                height: cfg.height,
            });
        }

        let mut img = RgbImage::from_pixel(cfg.width, cfg.height, cfg.background);
        let (price, vpr) = self.layout();

        self.draw_candles(&mut img, price, window);
        self.draw_vpr(&mut img, vpr, window);
        price.frame(&mut img, colors::LIGHT_GRAY);
        vpr.frame(&mut img, colors::LIGHT_GRAY);

        Ok(img)
    }

    /// Price panel takes two thirds of the height, VPR the rest.
    fn layout(&self) -> (Panel, Panel) {
        let cfg = &self.config;
        let margin = cfg.margin.min(cfg.width / 8).min(cfg.height / 8);
        let inner_w = cfg.width - 2 * margin;
        let inner_h = cfg.height - 3 * margin;
        let price_h = inner_h * 2 / 3;

        let price = Panel {
            left: margin,
            top: margin,
            width: inner_w,
            height: price_h,
        };
        let vpr = Panel {
            left: margin,
            top: 2 * margin + price_h,
            width: inner_w,
            height: inner_h - price_h,
        };
        (price, vpr)
    }

    fn slot_center(panel: Panel, n: usize, i: usize) -> u32 {
        let slot = f64::from(panel.width) / n as f64;
        panel.left + (slot * (i as f64 + 0.5)) as u32
    }

    fn draw_candles(&self, img: &mut RgbImage, panel: Panel, window: &[Bucket]) {
        let (lo, hi) = price_range(window);
        let n = window.len();
        let body_w = ((f64::from(panel.width) / n as f64) * 0.6).max(1.0) as u32;

        for (i, b) in window.iter().enumerate() {
            if [b.open, b.high, b.low, b.close].iter().any(|v| v.is_nan()) {
                continue;
            }
            let color = if b.close >= b.open {
                self.config.bullish_color
            } else {
                self.config.bearish_color
            };
            let x = Self::slot_center(panel, n, i);

            draw_vertical_line(
                img,
                x,
                panel.y_for(b.high, lo, hi),
                panel.y_for(b.low, lo, hi),
                color,
            );

            let y_open = panel.y_for(b.open, lo, hi);
            let y_close = panel.y_for(b.close, lo, hi);
            let top = y_open.min(y_close);
            let body_h = y_open.abs_diff(y_close).max(1);
            draw_filled_rect(img, x.saturating_sub(body_w / 2), top, body_w, body_h, color);
        }
    }

    fn draw_vpr(&self, img: &mut RgbImage, panel: Panel, window: &[Bucket]) {
        let th = self.config.thresholds;
        for level in [th.hard_to_grow, th.hard_to_fall] {
            if level.is_finite() {
                let y = panel.y_for(level, 0.0, 100.0);
                draw_dashed_horizontal_line(img, y, panel.left, panel.right(), 6, 4, colors::MID_GRAY);
            }
        }

        let n = window.len();
        let mut previous: Option<(i64, i64)> = None;
        for (i, b) in window.iter().enumerate() {
            let point = b.vpr.filter(|v| v.is_finite()).map(|v| {
                (
                    i64::from(Self::slot_center(panel, n, i)),
                    i64::from(panel.y_for(v, 0.0, 100.0)),
                )
            });
            match (previous, point) {
                (Some(from), Some(to)) => draw_thick_line(img, from, to, self.config.vpr_color),
                (None, Some(p)) => draw_thick_line(img, p, p, self.config.vpr_color),
                _ => {}
            }
            previous = point;
        }
    }
}

/// Low/high across the window, padded when flat.
fn price_range(window: &[Bucket]) -> (f64, f64) {
    let lo = window.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
    let hi = window.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
    if !lo.is_finite() || !hi.is_finite() {
        return (0.0, 1.0);
    }
    if hi - lo <= f64::EPSILON {
        (lo - 1.0, hi + 1.0)
    } else {
        (lo, hi)
    }
}
