// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Skeleton overlay drawing.
//!
//! The [`Annotator`] draws on a copy of the frame, in this order:
//!
//! 1. an optional `N x N` diagnostic grid with row-major cell indices,
//! 2. bones whose two endpoints are both confident enough,
//! 3. dots for confident joints of the style's target set.
//!
//! Several observation layers (body, then hands) can be composited in one pass with
//! [`Annotator::annotate_layers`]; the grid is drawn only once.

use std::fs;
use std::path::{Path, PathBuf};

use ab_glyph::{FontArc, PxScale};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_polygon_mut,
    draw_text_mut, text_size,
};
use imageproc::point::Point;
use imageproc::rect::Rect;

use crate::config::PipelineConfig;
use crate::download::{ASSETS_URL, download_file};
use crate::error::{OverlayError, Result};
use crate::skeleton::{
    BODY_BONES, BODY_TARGET_JOINTS, Bone, HAND_BONES, HAND_FINGERTIP_BONES,
    HAND_FINGERTIP_TARGET_JOINTS, HAND_TARGET_JOINTS, Joint, SkeletonKind, SkeletonObservation,
};
use crate::visualizer::Color;
use crate::{verbose, warn};

/// Font used for grid labels.
pub const DEFAULT_FONT: &str = "Arial.ttf";

/// Pixel height of grid labels.
const GRID_LABEL_SCALE: f32 = 36.0;

/// Which joints and bones to draw for one skeleton family, and in which colors.
#[derive(Debug, Clone, PartialEq)]
pub struct SkeletonStyle {
    pub kind: SkeletonKind,
    pub target_joints: Vec<Joint>,
    pub bones: Vec<Bone>,
    pub dot_color: Color,
    pub bone_color: Color,
}

impl SkeletonStyle {
    /// Shoulders, elbows and wrists: green dots, red bones.
    #[must_use]
    pub fn body() -> Self {
        Self {
            kind: SkeletonKind::Body,
            target_joints: BODY_TARGET_JOINTS.to_vec(),
            bones: BODY_BONES.to_vec(),
            dot_color: Color::GREEN,
            bone_color: Color::RED,
        }
    }

    /// Wrist and index fingertip: orange dots, brown bones.
    #[must_use]
    pub fn hand() -> Self {
        Self {
            kind: SkeletonKind::Hand,
            target_joints: HAND_TARGET_JOINTS.to_vec(),
            bones: HAND_BONES.to_vec(),
            dot_color: Color::ORANGE,
            bone_color: Color::BROWN,
        }
    }

    /// Hand style extended to all five fingertips.
    #[must_use]
    pub fn hand_fingertips() -> Self {
        Self {
            target_joints: HAND_FINGERTIP_TARGET_JOINTS.to_vec(),
            bones: HAND_FINGERTIP_BONES.to_vec(),
            ..Self::hand()
        }
    }
}

/// One set of observations drawn with one style.
#[derive(Debug, Clone, Copy)]
pub struct Layer<'a> {
    pub observations: &'a [SkeletonObservation],
    pub style: &'a SkeletonStyle,
}

impl<'a> Layer<'a> {
    #[must_use]
    pub const fn new(observations: &'a [SkeletonObservation], style: &'a SkeletonStyle) -> Self {
        Self {
            observations,
            style,
        }
    }
}

/// Draws skeleton overlays onto frames.
#[derive(Clone)]
pub struct Annotator {
    bone_confidence: f32,
    dot_confidence: f32,
    dot_radius: i32,
    line_width: f32,
    grid: Option<u32>,
    font: Option<FontArc>,
}

impl std::fmt::Debug for Annotator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Annotator")
            .field("bone_confidence", &self.bone_confidence)
            .field("dot_confidence", &self.dot_confidence)
            .field("dot_radius", &self.dot_radius)
            .field("line_width", &self.line_width)
            .field("grid", &self.grid)
            .field("font", &self.font.is_some())
            .finish()
    }
}

impl Default for Annotator {
    fn default() -> Self {
        Self::new(&PipelineConfig::default())
    }
}

impl Annotator {
    /// Create an annotator from the drawing parameters of `config`. No font is
    /// loaded, so grid cells are drawn without labels until one is attached.
    #[must_use]
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            bone_confidence: config.bone_confidence,
            dot_confidence: config.dot_confidence,
            dot_radius: (config.dot_diameter / 2) as i32,
            line_width: config.line_width as f32,
            grid: config.grid,
            font: None,
        }
    }

    /// Attach a font for grid labels.
    #[must_use]
    pub fn with_font(mut self, font: FontArc) -> Self {
        self.font = Some(font);
        self
    }

    /// Load a TrueType font from disk for grid labels.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file cannot be read, or `ConfigError` if it is not a
    /// valid font.
    pub fn with_font_file<P: AsRef<Path>>(self, path: P) -> Result<Self> {
        let data = fs::read(path.as_ref())?;
        let font = FontArc::try_from_vec(data).map_err(|e| {
            OverlayError::ConfigError(format!("invalid font {}: {e}", path.as_ref().display()))
        })?;
        Ok(self.with_font(font))
    }

    /// Attach the default font, downloading it on first use. Labels are skipped with a
    /// warning if the font cannot be obtained.
    #[must_use]
    pub fn with_default_font(self) -> Self {
        match check_font(DEFAULT_FONT) {
            Some(path) => match self.clone().with_font_file(&path) {
                Ok(annotator) => annotator,
                Err(e) => {
                    warn!("Grid labels disabled: {e}");
                    self
                }
            },
            None => {
                warn!("Grid labels disabled: font {DEFAULT_FONT} unavailable");
                self
            }
        }
    }

    /// Grid size, if the diagnostic grid is enabled.
    #[must_use]
    pub const fn grid(&self) -> Option<u32> {
        self.grid
    }

    /// Annotate one set of observations. The input image is not modified and the
    /// output has the same dimensions.
    #[must_use]
    pub fn annotate(
        &self,
        image: &RgbaImage,
        observations: &[SkeletonObservation],
        style: &SkeletonStyle,
    ) -> RgbaImage {
        self.annotate_layers(image, &[Layer::new(observations, style)])
    }

    /// Annotate several layers in order onto one copy of `image`.
    ///
    /// Within a layer all bones are drawn before any dot. Observations whose kind does
    /// not match the layer style are ignored.
    #[must_use]
    pub fn annotate_layers(&self, image: &RgbaImage, layers: &[Layer<'_>]) -> RgbaImage {
        let mut canvas = image.clone();

        if let Some(n) = self.grid {
            self.draw_grid(&mut canvas, n);
        }

        for layer in layers {
            let style = layer.style;
            let observations = layer
                .observations
                .iter()
                .filter(|obs| obs.kind() == style.kind);

            for obs in observations.clone() {
                self.draw_bones(&mut canvas, obs, style);
            }
            for obs in observations {
                self.draw_dots(&mut canvas, obs, style);
            }
        }

        canvas
    }

    fn draw_bones(&self, canvas: &mut RgbaImage, obs: &SkeletonObservation, style: &SkeletonStyle) {
        let (width, height) = canvas.dimensions();
        let color = style.bone_color.to_rgba();
        for bone in &style.bones {
            let (Some(from), Some(to)) = (
                obs.confident(bone.from, self.bone_confidence),
                obs.confident(bone.to, self.bone_confidence),
            ) else {
                continue;
            };
            let start = from.position.to_pixel(width, height);
            let end = to.position.to_pixel(width, height);
            draw_thick_line(canvas, start, end, self.line_width, color);
        }
    }

    fn draw_dots(&self, canvas: &mut RgbaImage, obs: &SkeletonObservation, style: &SkeletonStyle) {
        let (width, height) = canvas.dimensions();
        let color = style.dot_color.to_rgba();
        for joint in &style.target_joints {
            if let Some(point) = obs.confident(*joint, self.dot_confidence) {
                let (x, y) = point.position.to_pixel(width, height);
                draw_filled_circle_mut(
                    canvas,
                    (x.round() as i32, y.round() as i32),
                    self.dot_radius,
                    color,
                );
            }
        }
    }

    fn draw_grid(&self, canvas: &mut RgbaImage, n: u32) {
        if n == 0 {
            return;
        }
        let (width, height) = canvas.dimensions();
        let cell_w = width as f32 / n as f32;
        let cell_h = height as f32 / n as f32;
        let white = Color::WHITE.to_rgba();
        let scale = PxScale::from(GRID_LABEL_SCALE);

        for row in 0..n {
            for col in 0..n {
                let x0 = (col as f32 * cell_w).round() as i32;
                let y0 = (row as f32 * cell_h).round() as i32;
                let x1 = ((col + 1) as f32 * cell_w).round() as i32;
                let y1 = ((row + 1) as f32 * cell_h).round() as i32;
                let rect =
                    Rect::at(x0, y0).of_size((x1 - x0).max(1) as u32, (y1 - y0).max(1) as u32);
                draw_hollow_rect_mut(canvas, rect, white);

                if let Some(font) = &self.font {
                    let label = (row * n + col).to_string();
                    let (tw, th) = text_size(scale, font, &label);
                    let tx = (x0 + x1) / 2 - tw as i32 / 2;
                    let ty = (y0 + y1) / 2 - th as i32 / 2;
                    draw_text_mut(canvas, white, tx, ty, scale, font, &label);
                }
            }
        }
    }
}

/// Stroke a straight line of `width` pixels with butt ends.
fn draw_thick_line(
    canvas: &mut RgbaImage,
    start: (f32, f32),
    end: (f32, f32),
    width: f32,
    color: Rgba<u8>,
) {
    let (dx, dy) = (end.0 - start.0, end.1 - start.1);
    let length = dx.hypot(dy);
    let half = width / 2.0;

    if length < 0.5 {
        let center = (start.0.round() as i32, start.1.round() as i32);
        draw_filled_circle_mut(canvas, center, half.round() as i32, color);
        return;
    }

    let (nx, ny) = (-dy / length * half, dx / length * half);
    let corner = |x: f32, y: f32| Point::new(x.round() as i32, y.round() as i32);
    let quad = [
        corner(start.0 + nx, start.1 + ny),
        corner(end.0 + nx, end.1 + ny),
        corner(end.0 - nx, end.1 - ny),
        corner(start.0 - nx, start.1 - ny),
    ];

    // draw_polygon_mut rejects a closed polygon; thin strokes can round to one.
    if quad[0] == quad[3] {
        draw_line_segment_mut(canvas, start, end, color);
    } else {
        draw_polygon_mut(canvas, &quad, color);
    }
}

/// Check if font exists locally or download it
pub fn check_font(font: &str) -> Option<PathBuf> {
    let font_name = Path::new(font).file_name()?.to_string_lossy();
    let config_dir = dirs::config_dir()?.join("Ultralytics");
    let font_path = config_dir.join(font_name.as_ref());

    if font_path.exists() {
        return Some(font_path);
    }

    if let Err(e) = fs::create_dir_all(&config_dir) {
        warn!("Failed to create config directory: {e}");
        return None;
    }

    let url = format!("{ASSETS_URL}/{font_name}");
    verbose!("Downloading {url} to {}", font_path.display());
    match download_file(&url, &font_path) {
        Ok(()) => Some(font_path),
        Err(e) => {
            warn!("Failed to download font: {e}");
            None
        }
    }
}
