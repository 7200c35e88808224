// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Aspect-preserving placement of frames on a screen.

use image::imageops::{self, FilterType};
use image::RgbaImage;

use crate::visualizer::Color;

/// Placement of scaled content inside a screen, in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FitRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Scale `content` by `min(screen_w / content_w, screen_h / content_h)` and center it.
#[must_use]
pub fn fit_to_screen(content: (u32, u32), screen: (u32, u32)) -> FitRect {
    let (cw, ch) = content;
    let (sw, sh) = screen;
    if cw == 0 || ch == 0 || sw == 0 || sh == 0 {
        return FitRect::default();
    }

    let ratio = (f64::from(sw) / f64::from(cw)).min(f64::from(sh) / f64::from(ch));
    let width = ((f64::from(cw) * ratio).round() as u32).clamp(1, sw);
    let height = ((f64::from(ch) * ratio).round() as u32).clamp(1, sh);
    FitRect {
        x: (sw - width) / 2,
        y: (sh - height) / 2,
        width,
        height,
    }
}

/// Render `image` scaled to fit a `screen` sized canvas with black bars.
#[must_use]
pub fn letterbox(image: &RgbaImage, screen: (u32, u32)) -> RgbaImage {
    let mut canvas = RgbaImage::from_pixel(screen.0, screen.1, Color::BLACK.to_rgba());
    let rect = fit_to_screen(image.dimensions(), screen);
    if rect.width == 0 || rect.height == 0 {
        return canvas;
    }

    if (rect.width, rect.height) == image.dimensions() {
        imageops::overlay(&mut canvas, image, i64::from(rect.x), i64::from(rect.y));
    } else {
        let scaled = imageops::resize(image, rect.width, rect.height, FilterType::Triangle);
        imageops::overlay(&mut canvas, &scaled, i64::from(rect.x), i64::from(rect.y));
    }
    canvas
}
