// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Window that shows the latest annotated frame.

use std::time::Duration;

use image::RgbaImage;
use minifb::{Key, Window, WindowOptions};

use crate::error::{OverlayError, Result};
use crate::visualizer::Color;
use crate::visualizer::layout::letterbox;

/// A simple frame viewer using minifb.
pub struct Viewer {
    window: Window,
    buffer: Vec<u32>,
    width: usize,
    height: usize,
}

impl Viewer {
    /// Create a new viewer window limited to roughly 60 updates per second.
    ///
    /// # Errors
    ///
    /// Returns `VisualizerError` if the window cannot be created.
    pub fn new(title: &str, width: usize, height: usize) -> Result<Self> {
        let mut window = Window::new(
            title,
            width,
            height,
            WindowOptions {
                resize: true,
                ..WindowOptions::default()
            },
        )
        .map_err(|e| OverlayError::VisualizerError(format!("Failed to create window: {e}")))?;

        window.limit_update_rate(Some(Duration::from_micros(16600)));

        Ok(Self {
            window,
            buffer: vec![0; width * height],
            width,
            height,
        })
    }

    /// Whether the window is still open and no quit key (Escape, Q) is held.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.window.is_open()
            && !self.window.is_key_down(Key::Escape)
            && !self.window.is_key_down(Key::Q)
    }

    pub fn set_title(&mut self, title: &str) {
        self.window.set_title(title);
    }

    /// Draw `image` scaled to fit the current window size. With `None`, the previous
    /// contents are presented again so the window stays responsive.
    ///
    /// Returns `false` once the user closed the window.
    ///
    /// # Errors
    ///
    /// Returns `VisualizerError` if the window cannot be updated.
    pub fn show(&mut self, image: Option<&RgbaImage>) -> Result<bool> {
        if !self.is_open() {
            return Ok(false);
        }

        let (width, height) = self.window.get_size();
        if let Some(image) = image
            && width > 0
            && height > 0
        {
            let canvas = letterbox(image, (width as u32, height as u32));
            self.buffer.clear();
            self.buffer.extend(
                canvas
                    .pixels()
                    .map(|p| Color(p[0], p[1], p[2]).to_u32()),
            );
            self.width = width;
            self.height = height;
        }

        self.window
            .update_with_buffer(&self.buffer, self.width, self.height)
            .map_err(|e| OverlayError::VisualizerError(format!("Failed to update window: {e}")))?;
        Ok(true)
    }
}
