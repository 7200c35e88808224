// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use image::Rgba;

/// Color type for overlays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color(pub u8, pub u8, pub u8);

impl Color {
    /// Red color.
    pub const RED: Color = Color(255, 0, 0);
    /// Green color.
    pub const GREEN: Color = Color(0, 255, 0);
    /// Orange color.
    pub const ORANGE: Color = Color(255, 128, 0);
    /// Brown color.
    pub const BROWN: Color = Color(153, 102, 51);
    /// White color.
    pub const WHITE: Color = Color(255, 255, 255);
    /// Black color.
    pub const BLACK: Color = Color(0, 0, 0);

    /// Create a new color from RGB values.
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self(r, g, b)
    }

    /// Opaque RGBA pixel of this color.
    pub const fn to_rgba(self) -> Rgba<u8> {
        Rgba([self.0, self.1, self.2, 255])
    }

    /// Pack into the `0x00RRGGBB` layout used by window framebuffers.
    pub const fn to_u32(self) -> u32 {
        ((self.0 as u32) << 16) | ((self.1 as u32) << 8) | self.2 as u32
    }
}
