// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Letterbox preprocessing for pose models.

use fast_image_resize::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer, images::Image};
use image::{Rgb, RgbImage, RgbaImage, imageops};
use ndarray::Array4;

use crate::error::{OverlayError, Result};

/// Gray used for letterbox padding.
pub const PAD_VALUE: u8 = 114;

/// Letterboxed tensor plus what is needed to map model coordinates back.
#[derive(Debug, Clone)]
pub struct Letterboxed {
    /// NCHW tensor normalized to [0, 1].
    pub tensor: Array4<f32>,
    /// Original image dimensions (height, width).
    pub orig_shape: (u32, u32),
    /// Scale factors applied (`scale_y`, `scale_x`).
    pub scale: (f32, f32),
    /// Padding applied (`pad_top`, `pad_left`).
    pub padding: (f32, f32),
}

/// Resize `image` into `target_size` (height, width) keeping its aspect ratio, pad the
/// rest with [`PAD_VALUE`] and convert it to a normalized NCHW tensor.
///
/// # Errors
///
/// Returns `DetectionError` if the image is empty or resizing fails.
pub fn letterbox(image: &RgbaImage, target_size: (usize, usize)) -> Result<Letterboxed> {
    let (orig_w, orig_h) = image.dimensions();
    if orig_w == 0 || orig_h == 0 {
        return Err(OverlayError::DetectionError("cannot letterbox an empty image".to_string()));
    }

    let (new_w, new_h, pad_left, pad_top, scale) =
        letterbox_params(orig_w, orig_h, target_size);

    let rgb: Vec<u8> = image.pixels().flat_map(|p| [p[0], p[1], p[2]]).collect();
    let resized = if (new_w, new_h) == (orig_w, orig_h) {
        rgb
    } else {
        let src = Image::from_vec_u8(orig_w, orig_h, rgb, PixelType::U8x3)
            .map_err(|e| OverlayError::DetectionError(format!("Failed to wrap frame: {e}")))?;
        let mut dst = Image::new(new_w, new_h, PixelType::U8x3);
        let options = ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear));
        Resizer::new()
            .resize(&src, &mut dst, Some(&options))
            .map_err(|e| OverlayError::DetectionError(format!("Failed to resize frame: {e}")))?;
        dst.into_vec()
    };
    let resized = RgbImage::from_raw(new_w, new_h, resized)
        .ok_or_else(|| OverlayError::DetectionError("resized buffer has wrong size".to_string()))?;

    #[allow(clippy::cast_possible_truncation)]
    let (target_h, target_w) = (target_size.0 as u32, target_size.1 as u32);
    let mut canvas = RgbImage::from_pixel(target_w, target_h, Rgb([PAD_VALUE; 3]));
    imageops::replace(&mut canvas, &resized, i64::from(pad_left), i64::from(pad_top));

    #[allow(clippy::cast_precision_loss)]
    Ok(Letterboxed {
        tensor: image_to_tensor(&canvas),
        orig_shape: (orig_h, orig_w),
        scale,
        padding: (pad_top as f32, pad_left as f32),
    })
}

/// Scaled size, centered padding and per-axis scale factors for a letterbox.
///
/// Returns `(new_w, new_h, pad_left, pad_top, (scale_y, scale_x))`.
fn letterbox_params(
    orig_width: u32,
    orig_height: u32,
    target_size: (usize, usize),
) -> (u32, u32, u32, u32, (f32, f32)) {
    #[allow(clippy::cast_precision_loss)]
    let (target_h, target_w) = (target_size.0 as f32, target_size.1 as f32);
    #[allow(clippy::cast_precision_loss)]
    let (orig_h, orig_w) = (orig_height as f32, orig_width as f32);

    let scale = (target_h / orig_h).min(target_w / orig_w);

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let new_w = ((orig_w * scale).round() as u32).max(1);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let new_h = ((orig_h * scale).round() as u32).max(1);

    #[allow(clippy::cast_possible_truncation)]
    let pad_left = (target_size.1 as u32).saturating_sub(new_w) / 2;
    #[allow(clippy::cast_possible_truncation)]
    let pad_top = (target_size.0 as u32).saturating_sub(new_h) / 2;

    #[allow(clippy::cast_precision_loss)]
    let scale_x = new_w as f32 / orig_w;
    #[allow(clippy::cast_precision_loss)]
    let scale_y = new_h as f32 / orig_h;

    (new_w, new_h, pad_left, pad_top, (scale_y, scale_x))
}

fn image_to_tensor(image: &RgbImage) -> Array4<f32> {
    let (width, height) = image.dimensions();
    let (w, h) = (width as usize, height as usize);
    let mut tensor = Array4::zeros((1, 3, h, w));

    for (i, chunk) in image.as_raw().chunks_exact(3).enumerate() {
        let (y, x) = (i / w, i % w);
        tensor[[0, 0, y, x]] = f32::from(chunk[0]) / 255.0;
        tensor[[0, 1, y, x]] = f32::from(chunk[1]) / 255.0;
        tensor[[0, 2, y, x]] = f32::from(chunk[2]) / 255.0;
    }

    tensor
}

/// Map a point from letterboxed model space back to the original image.
#[must_use]
pub fn unletterbox(point: (f32, f32), scale: (f32, f32), padding: (f32, f32)) -> (f32, f32) {
    let (scale_y, scale_x) = scale;
    let (pad_top, pad_left) = padding;
    ((point.0 - pad_left) / scale_x, (point.1 - pad_top) / scale_y)
}
