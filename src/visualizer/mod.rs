// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Overlay colors and display helpers.

/// Color definitions.
pub mod color;
/// Scale-to-fit placement.
pub mod layout;

#[cfg(feature = "visualize")]
pub mod viewer;

pub use color::Color;
pub use layout::{FitRect, fit_to_screen, letterbox};

#[cfg(feature = "visualize")]
pub use viewer::Viewer;
