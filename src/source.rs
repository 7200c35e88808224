// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Frame sources.
//!
//! A [`FrameSource`] yields decoded frames one at a time until the end of the stream.
//! Sources are created by a [`SourceOpener`], normally a [`SourceConfig`], so the
//! pipeline can reopen a fresh source after a reset.
//!
//! Available sources:
//!
//! - [`VideoSource`]: movie files, cameras and network streams (`video` feature).
//! - [`ImageSequenceSource`]: a directory of numbered stills played at a fixed rate.
//! - [`MemorySource`]: frames already in memory.

use std::collections::VecDeque;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use image::DynamicImage;

use crate::error::{OverlayError, Result};
use crate::frame::{Frame, PixelBuffer, PixelFormat};
use crate::orientation::AffineTransform;

/// Properties of an opened source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceMetadata {
    /// Frame width in pixels, before any display rotation.
    pub width: u32,
    /// Frame height in pixels, before any display rotation.
    pub height: u32,
    /// Nominal frames per second. Zero if unknown.
    pub frame_rate: f64,
    /// Preferred display transform of the video track.
    pub transform: AffineTransform,
}

impl SourceMetadata {
    /// Size the frames take on screen once the preferred transform is applied.
    #[must_use]
    pub fn display_size(&self) -> (u32, u32) {
        self.transform.display_size(self.width, self.height)
    }
}

/// A producer of decoded frames.
///
/// Sources are opened and read on the pipeline's reader thread and never cross
/// threads afterwards, so decoders holding thread-bound handles are fine.
pub trait FrameSource {
    /// Size, frame rate and preferred transform of the stream.
    ///
    /// # Errors
    ///
    /// Returns `SourceError` if the stream properties cannot be determined.
    fn metadata(&mut self) -> Result<SourceMetadata>;

    /// Next frame, or `None` at the end of the stream.
    ///
    /// # Errors
    ///
    /// Returns `SourceError` if a frame cannot be read or decoded.
    fn read_next(&mut self) -> Result<Option<Frame>>;
}

/// Creates frame sources on demand.
pub trait SourceOpener: Send + Sync {
    /// Open a new source positioned at its first frame.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for missing resources and `SourceError` if the source
    /// cannot be opened.
    fn open(&self) -> Result<Box<dyn FrameSource>>;

    /// Human readable name for logs.
    fn describe(&self) -> String {
        "custom source".to_string()
    }
}

impl<F> SourceOpener for F
where
    F: Fn() -> Result<Box<dyn FrameSource>> + Send + Sync,
{
    fn open(&self) -> Result<Box<dyn FrameSource>> {
        self()
    }
}

/// Which kind of source to open.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceKind {
    /// A capture device or live stream location (device path, `rtsp://`, `http://`).
    LiveCamera { device: String },
    /// A movie file on disk.
    MovieFile { path: PathBuf },
    /// A directory of still images played back at `fps`.
    ImageSequence { dir: PathBuf, fps: f64 },
}

/// Source selection plus an optional override of the preferred transform.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceConfig {
    pub kind: SourceKind,
    /// Transform to report instead of the one found in the container.
    pub transform: Option<AffineTransform>,
}

impl SourceConfig {
    #[must_use]
    pub fn movie<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            kind: SourceKind::MovieFile { path: path.into() },
            transform: None,
        }
    }

    /// Capture device or stream. A bare index such as `"0"` maps to `/dev/video0`.
    #[must_use]
    pub fn camera(device: &str) -> Self {
        let device = match device.parse::<u32>() {
            Ok(idx) => format!("/dev/video{idx}"),
            Err(_) => device.to_string(),
        };
        Self {
            kind: SourceKind::LiveCamera { device },
            transform: None,
        }
    }

    #[must_use]
    pub fn image_sequence<P: Into<PathBuf>>(dir: P, fps: f64) -> Self {
        Self {
            kind: SourceKind::ImageSequence {
                dir: dir.into(),
                fps,
            },
            transform: None,
        }
    }

    /// Report `transform` as the preferred transform of the opened source.
    #[must_use]
    pub const fn with_transform(mut self, transform: AffineTransform) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Check that the referenced resource exists.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the movie file or image directory is missing, or the
    /// playback rate of an image sequence is not positive.
    pub fn validate(&self) -> Result<()> {
        match &self.kind {
            SourceKind::MovieFile { path } if !path.is_file() => Err(OverlayError::ConfigError(
                format!("Movie file not found: {}", path.display()),
            )),
            SourceKind::ImageSequence { dir, .. } if !dir.is_dir() => Err(
                OverlayError::ConfigError(format!("Directory not found: {}", dir.display())),
            ),
            SourceKind::ImageSequence { fps, .. } if !(fps.is_finite() && *fps > 0.0) => {
                Err(OverlayError::ConfigError(format!(
                    "Image sequence fps must be positive, got {fps}"
                )))
            }
            SourceKind::LiveCamera { device } if device.is_empty() => Err(
                OverlayError::ConfigError("Camera device must not be empty".to_string()),
            ),
            _ => Ok(()),
        }
    }
}

impl SourceOpener for SourceConfig {
    fn open(&self) -> Result<Box<dyn FrameSource>> {
        self.validate()?;
        let transform = self.transform.unwrap_or_default();
        match &self.kind {
            SourceKind::ImageSequence { dir, fps } => Ok(Box::new(
                ImageSequenceSource::open(dir, *fps)?.with_transform(transform),
            )),
            SourceKind::MovieFile { path } => open_video(path, self.transform),
            SourceKind::LiveCamera { device } => open_video(Path::new(device), self.transform),
        }
    }

    fn describe(&self) -> String {
        match &self.kind {
            SourceKind::LiveCamera { device } => format!("camera {device}"),
            SourceKind::MovieFile { path } => format!("movie {}", path.display()),
            SourceKind::ImageSequence { dir, fps } => {
                format!("image sequence {} at {fps} fps", dir.display())
            }
        }
    }
}

#[cfg(feature = "video")]
fn open_video(location: &Path, transform: Option<AffineTransform>) -> Result<Box<dyn FrameSource>> {
    let mut source = VideoSource::open(location)?;
    if let Some(transform) = transform {
        source = source.with_transform(transform);
    }
    Ok(Box::new(source))
}

#[cfg(not(feature = "video"))]
fn open_video(
    location: &Path,
    _transform: Option<AffineTransform>,
) -> Result<Box<dyn FrameSource>> {
    Err(OverlayError::FeatureNotEnabled(format!(
        "Opening {} requires the 'video' feature",
        location.display()
    )))
}

/// Frames held in memory, for synthetic feeds and tests.
#[derive(Debug, Clone)]
pub struct MemorySource {
    metadata: SourceMetadata,
    frames: VecDeque<Frame>,
}

impl MemorySource {
    /// Serve `frames` in order with the given metadata.
    #[must_use]
    pub fn new(metadata: SourceMetadata, frames: Vec<Frame>) -> Self {
        Self {
            metadata,
            frames: frames.into(),
        }
    }

    /// `count` frames of a single color, timestamped at `frame_rate`.
    #[must_use]
    pub fn solid(
        width: u32,
        height: u32,
        format: PixelFormat,
        rgba: [u8; 4],
        count: u64,
        frame_rate: f64,
    ) -> Self {
        let buffer = PixelBuffer::filled(width, height, format, rgba);
        let frames = (0..count)
            .map(|index| Frame::new(buffer.clone(), frame_time(index, frame_rate), index))
            .collect();
        Self::new(
            SourceMetadata {
                width,
                height,
                frame_rate,
                transform: AffineTransform::IDENTITY,
            },
            frames,
        )
    }

    #[must_use]
    pub const fn with_transform(mut self, transform: AffineTransform) -> Self {
        self.metadata.transform = transform;
        self
    }

    /// Frames not yet read.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for MemorySource {
    fn metadata(&mut self) -> Result<SourceMetadata> {
        Ok(self.metadata)
    }

    fn read_next(&mut self) -> Result<Option<Frame>> {
        Ok(self.frames.pop_front())
    }
}

/// Still images from a directory, sorted by file name, played at a fixed rate.
#[derive(Debug, Clone)]
pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    cursor: usize,
    fps: f64,
    transform: AffineTransform,
    size: Option<(u32, u32)>,
}

impl ImageSequenceSource {
    /// Collect the image files of `dir`.
    ///
    /// # Errors
    ///
    /// Returns `SourceError` if the directory cannot be read or holds no images.
    pub fn open<P: AsRef<Path>>(dir: P, fps: f64) -> Result<Self> {
        let dir = dir.as_ref();
        let paths = collect_images_from_dir(dir)?;
        if paths.is_empty() {
            return Err(OverlayError::SourceError(format!(
                "No images found in {}",
                dir.display()
            )));
        }
        Ok(Self {
            paths,
            cursor: 0,
            fps,
            transform: AffineTransform::IDENTITY,
            size: None,
        })
    }

    #[must_use]
    pub const fn with_transform(mut self, transform: AffineTransform) -> Self {
        self.transform = transform;
        self
    }

    /// Number of images in the sequence.
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    fn size(&mut self) -> Result<(u32, u32)> {
        if let Some(size) = self.size {
            return Ok(size);
        }
        let first = &self.paths[0];
        let size = image::image_dimensions(first).map_err(|e| {
            OverlayError::SourceError(format!("Failed to read {}: {e}", first.display()))
        })?;
        self.size = Some(size);
        Ok(size)
    }
}

impl FrameSource for ImageSequenceSource {
    fn metadata(&mut self) -> Result<SourceMetadata> {
        let (width, height) = self.size()?;
        Ok(SourceMetadata {
            width,
            height,
            frame_rate: self.fps,
            transform: self.transform,
        })
    }

    fn read_next(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.paths.get(self.cursor).cloned() else {
            return Ok(None);
        };
        let image = load_image(&path).map_err(|e| {
            OverlayError::SourceError(format!("Failed to decode {}: {e}", path.display()))
        })?;
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();
        let expected = self.size()?;
        if (width, height) != expected {
            return Err(OverlayError::SourceError(format!(
                "{} is {width}x{height}, sequence is {}x{}",
                path.display(),
                expected.0,
                expected.1
            )));
        }

        let index = self.cursor as u64;
        self.cursor += 1;
        let buffer = PixelBuffer::new(width, height, PixelFormat::Rgb8, rgb.into_raw())?;
        Ok(Some(Frame::new(buffer, frame_time(index, self.fps), index)))
    }
}

fn frame_time(index: u64, frame_rate: f64) -> Duration {
    if frame_rate > 0.0 {
        Duration::from_secs_f64(index as f64 / frame_rate)
    } else {
        Duration::ZERO
    }
}

/// Collect image paths from a directory.
fn collect_images_from_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(OverlayError::SourceError(format!(
            "Not a directory: {}",
            dir.display()
        )));
    }

    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| is_image_file(path))
        .collect();

    paths.sort();
    Ok(paths)
}

/// Check if a path is an image file based on extension.
fn is_image_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| {
        let ext = ext.to_string_lossy().to_lowercase();
        matches!(
            ext.as_str(),
            "jpg" | "jpeg" | "png" | "bmp" | "gif" | "webp" | "tiff" | "tif"
        )
    })
}

/// Load image helper with a `jpeg-decoder` fast path for JPEG stills.
fn load_image(path: &Path) -> image::ImageResult<DynamicImage> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase);

    if matches!(ext.as_deref(), Some("jpg" | "jpeg"))
        && let Ok(file) = File::open(path)
    {
        let mut decoder = jpeg_decoder::Decoder::new(BufReader::new(file));
        if let Ok(pixels) = decoder.decode()
            && let Some(info) = decoder.info()
        {
            let (width, height) = (u32::from(info.width), u32::from(info.height));
            let decoded = match info.pixel_format {
                jpeg_decoder::PixelFormat::RGB24 => {
                    image::RgbImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgb8)
                }
                jpeg_decoder::PixelFormat::L8 => {
                    image::GrayImage::from_raw(width, height, pixels).map(DynamicImage::ImageLuma8)
                }
                _ => None,
            };
            if let Some(image) = decoded {
                return Ok(image);
            }
        }
    }
    image::open(path)
}

/// Movie file, camera or network stream decoded with FFmpeg.
///
/// FFmpeg does not hand the container's display matrix to `video-rs`, so the
/// reported transform is the identity unless overridden with
/// [`with_transform`](Self::with_transform).
#[cfg(feature = "video")]
pub struct VideoSource {
    decoder: video_rs::decode::Decoder,
    location: PathBuf,
    transform: AffineTransform,
    index: u64,
}

#[cfg(feature = "video")]
impl VideoSource {
    /// Open a movie file, device path or stream URL.
    ///
    /// # Errors
    ///
    /// Returns `SourceError` if FFmpeg cannot open the location or finds no video
    /// track.
    pub fn open<P: AsRef<Path>>(location: P) -> Result<Self> {
        let location = location.as_ref().to_path_buf();
        video_rs::init()
            .map_err(|e| OverlayError::SourceError(format!("Failed to initialize FFmpeg: {e}")))?;
        let decoder = video_rs::decode::Decoder::new(location.clone()).map_err(|e| {
            OverlayError::SourceError(format!(
                "Failed to open video track of {}: {e}",
                location.display()
            ))
        })?;
        Ok(Self {
            decoder,
            location,
            transform: AffineTransform::IDENTITY,
            index: 0,
        })
    }

    #[must_use]
    pub const fn with_transform(mut self, transform: AffineTransform) -> Self {
        self.transform = transform;
        self
    }
}

#[cfg(feature = "video")]
impl FrameSource for VideoSource {
    fn metadata(&mut self) -> Result<SourceMetadata> {
        let (width, height) = self.decoder.size();
        Ok(SourceMetadata {
            width,
            height,
            frame_rate: f64::from(self.decoder.frame_rate()),
            transform: self.transform,
        })
    }

    fn read_next(&mut self) -> Result<Option<Frame>> {
        match self.decoder.decode() {
            Ok((time, frame)) => {
                let shape = frame.shape();
                let (height, width) = (shape[0] as u32, shape[1] as u32);
                let data = frame
                    .as_slice()
                    .map_or_else(|| frame.iter().copied().collect(), <[u8]>::to_vec);
                let buffer = PixelBuffer::new(width, height, PixelFormat::Rgb8, data)?;
                let pts = Duration::from_secs_f64(time.as_secs_f64().max(0.0));
                let index = self.index;
                self.index += 1;
                Ok(Some(Frame::new(buffer, pts, index)))
            }
            Err(video_rs::Error::ReadExhausted | video_rs::Error::DecodeExhausted) => Ok(None),
            Err(e) => Err(OverlayError::SourceError(format!(
                "Failed to decode frame {} of {}: {e}",
                self.index,
                self.location.display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orientation::Rotation;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join(format!("posture-overlay-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_memory_source_drains_in_order() {
        let mut source = MemorySource::solid(4, 4, PixelFormat::Bgra8, [1, 2, 3, 255], 3, 30.0);
        assert_eq!(source.metadata().unwrap().frame_rate, 30.0);
        let indices: Vec<u64> = std::iter::from_fn(|| source.read_next().unwrap())
            .map(|f| f.index)
            .collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert!(source.read_next().unwrap().is_none());
    }

    #[test]
    fn test_memory_source_timestamps() {
        let mut source = MemorySource::solid(2, 2, PixelFormat::Rgb8, [0; 4], 3, 25.0);
        source.read_next().unwrap();
        let second = source.read_next().unwrap().unwrap();
        assert_eq!(second.pts, Duration::from_millis(40));
    }

    #[test]
    fn test_camera_index_maps_to_device() {
        let config = SourceConfig::camera("0");
        assert_eq!(
            config.kind,
            SourceKind::LiveCamera {
                device: "/dev/video0".to_string()
            }
        );
        let stream = SourceConfig::camera("rtsp://example.com/live");
        assert_eq!(stream.describe(), "camera rtsp://example.com/live");
    }

    #[test]
    fn test_missing_movie_is_config_error() {
        let config = SourceConfig::movie("/definitely/not/here.mov");
        let err = config.open().err().unwrap();
        assert!(matches!(err, OverlayError::ConfigError(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_image_sequence_source() {
        let dir = temp_dir("sequence");
        for (i, shade) in [10u8, 20, 30].iter().enumerate() {
            let image = image::RgbImage::from_pixel(6, 4, image::Rgb([*shade, 0, 0]));
            image.save(dir.join(format!("frame_{i:03}.png"))).unwrap();
        }
        std::fs::write(dir.join("notes.txt"), "not an image").unwrap();

        let config = SourceConfig::image_sequence(&dir, 10.0)
            .with_transform(AffineTransform::rotation(Rotation::Right));
        let mut source = config.open().unwrap();
        let metadata = source.metadata().unwrap();
        assert_eq!((metadata.width, metadata.height), (6, 4));
        assert_eq!(metadata.display_size(), (4, 6));

        let mut frames = Vec::new();
        while let Some(frame) = source.read_next().unwrap() {
            frames.push(frame);
        }
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[2].buffer.data()[0], 30);
        assert_eq!(frames[1].pts, Duration::from_millis(100));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_image_sequence_size_mismatch() {
        let dir = temp_dir("mismatch");
        image::RgbImage::new(6, 4).save(dir.join("a.png")).unwrap();
        image::RgbImage::new(8, 4).save(dir.join("b.png")).unwrap();

        let mut source = ImageSequenceSource::open(&dir, 30.0).unwrap();
        assert!(source.read_next().unwrap().is_some());
        let err = source.read_next().unwrap_err();
        assert!(matches!(err, OverlayError::SourceError(ref m) if m.contains("8x4")));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_empty_directory_is_source_error() {
        let dir = temp_dir("empty");
        let err = ImageSequenceSource::open(&dir, 30.0).unwrap_err();
        assert!(matches!(err, OverlayError::SourceError(_)));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file(Path::new("a/b/frame.JPG")));
        assert!(!is_image_file(Path::new("a/b/clip.mp4")));
    }

    #[cfg(not(feature = "video"))]
    #[test]
    fn test_video_requires_feature() {
        let dir = temp_dir("movie");
        let path = dir.join("clip.mov");
        std::fs::write(&path, b"").unwrap();
        let err = SourceConfig::movie(&path).open().err().unwrap();
        assert!(matches!(err, OverlayError::FeatureNotEnabled(_)));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
