// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Display orientation derived from a source's preferred transform.
//!
//! Containers store a 2D affine matrix telling players how to rotate the decoded
//! picture. Only the four axis-aligned rotations are recognized; everything else is
//! shown as-is. The orientation is a display concern: joint coordinates are always
//! in the frame's own buffer space.

use image::{RgbaImage, imageops};

/// 2D affine transform `[a b; c d] + (tx, ty)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub tx: f64,
    pub ty: f64,
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl AffineTransform {
    pub const IDENTITY: Self = Self::new(1.0, 0.0, 0.0, 1.0, 0.0, 0.0);

    #[must_use]
    pub const fn new(a: f64, b: f64, c: f64, d: f64, tx: f64, ty: f64) -> Self {
        Self { a, b, c, d, tx, ty }
    }

    /// Pure rotation by a multiple of 90 degrees clockwise, as written by recorders.
    #[must_use]
    pub const fn rotation(rotation: Rotation) -> Self {
        match rotation {
            Rotation::Up => Self::IDENTITY,
            Rotation::Right => Self::new(0.0, 1.0, -1.0, 0.0, 0.0, 0.0),
            Rotation::Down => Self::new(-1.0, 0.0, 0.0, -1.0, 0.0, 0.0),
            Rotation::Left => Self::new(0.0, -1.0, 1.0, 0.0, 0.0, 0.0),
        }
    }

    /// Absolute size of a `width` x `height` picture after applying the linear part.
    #[must_use]
    pub fn display_size(&self, width: u32, height: u32) -> (u32, u32) {
        let (w, h) = (f64::from(width), f64::from(height));
        let out_w = (self.a * w + self.c * h).abs();
        let out_h = (self.b * w + self.d * h).abs();
        (out_w.round() as u32, out_h.round() as u32)
    }
}

/// Rotation needed to show a frame upright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Rotation {
    #[default]
    Up,
    Right,
    Down,
    Left,
}

impl Rotation {
    /// Clockwise rotation in degrees.
    #[must_use]
    pub const fn degrees(self) -> u32 {
        match self {
            Self::Up => 0,
            Self::Right => 90,
            Self::Down => 180,
            Self::Left => 270,
        }
    }
}

/// Result of [`resolve_orientation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Orientation {
    pub rotation: Rotation,
    pub is_portrait: bool,
}

impl Orientation {
    /// Rotate a whole image for display.
    #[must_use]
    pub fn apply(&self, image: &RgbaImage) -> RgbaImage {
        match self.rotation {
            Rotation::Up => image.clone(),
            Rotation::Right => imageops::rotate90(image),
            Rotation::Down => imageops::rotate180(image),
            Rotation::Left => imageops::rotate270(image),
        }
    }
}

/// Classify a preferred transform. Matching is exact on `(a, b, c, d)`; translation
/// is ignored and any other matrix falls back to upright landscape.
#[must_use]
pub fn resolve_orientation(transform: &AffineTransform) -> Orientation {
    let AffineTransform { a, b, c, d, .. } = *transform;
    let (rotation, is_portrait) = match (a, b, c, d) {
        (0.0, 1.0, -1.0, 0.0) => (Rotation::Right, true),
        (0.0, -1.0, 1.0, 0.0) => (Rotation::Left, true),
        (1.0, 0.0, 0.0, 1.0) => (Rotation::Up, false),
        (-1.0, 0.0, 0.0, -1.0) => (Rotation::Down, false),
        _ => (Rotation::Up, false),
    };
    Orientation {
        rotation,
        is_portrait,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_canonical_matrices() {
        let right = resolve_orientation(&AffineTransform::new(0.0, 1.0, -1.0, 0.0, 1080.0, 0.0));
        assert_eq!(right.rotation, Rotation::Right);
        assert!(right.is_portrait);
        assert_eq!(right.rotation.degrees(), 90);

        let left = resolve_orientation(&AffineTransform::new(0.0, -1.0, 1.0, 0.0, 0.0, 1920.0));
        assert_eq!(left.rotation, Rotation::Left);
        assert!(left.is_portrait);

        let up = resolve_orientation(&AffineTransform::IDENTITY);
        assert_eq!(up.rotation, Rotation::Up);
        assert!(!up.is_portrait);

        let down = resolve_orientation(&AffineTransform::new(-1.0, 0.0, 0.0, -1.0, 0.0, 0.0));
        assert_eq!(down.rotation, Rotation::Down);
        assert!(!down.is_portrait);
    }

    #[test]
    fn test_unrecognized_defaults_to_up() {
        let skewed = AffineTransform::new(0.7071, 0.7071, -0.7071, 0.7071, 0.0, 0.0);
        assert_eq!(resolve_orientation(&skewed), Orientation::default());
        let scaled = AffineTransform::new(2.0, 0.0, 0.0, 2.0, 0.0, 0.0);
        assert_eq!(resolve_orientation(&scaled).rotation, Rotation::Up);
    }

    #[test]
    fn test_resolve_is_pure() {
        let t = AffineTransform::rotation(Rotation::Right);
        assert_eq!(resolve_orientation(&t), resolve_orientation(&t));
        assert_eq!(resolve_orientation(&t).rotation, Rotation::Right);
    }

    #[test]
    fn test_display_size() {
        let t = AffineTransform::rotation(Rotation::Right);
        assert_eq!(t.display_size(1920, 1080), (1080, 1920));
        assert_eq!(AffineTransform::IDENTITY.display_size(640, 480), (640, 480));
        let down = AffineTransform::rotation(Rotation::Down);
        assert_eq!(down.display_size(640, 480), (640, 480));
    }

    #[test]
    fn test_apply_rotates_image() {
        let mut image = RgbaImage::new(4, 2);
        image.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        let orientation = Orientation {
            rotation: Rotation::Right,
            is_portrait: true,
        };
        let rotated = orientation.apply(&image);
        assert_eq!(rotated.dimensions(), (2, 4));
        assert_eq!(rotated.get_pixel(1, 0), &Rgba([255, 0, 0, 255]));
    }
}
