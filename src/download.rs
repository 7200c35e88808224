// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Downloading of pose models and fonts.
//!
//! Known pose models are fetched from the Ultralytics asset releases when they are
//! not found locally. Transfers stream into a `.part` file that is renamed into
//! place once complete, so an interrupted download never leaves a truncated model.

use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::error::{OverlayError, Result};

/// Default body pose model name.
pub const DEFAULT_POSE_MODEL: &str = "yolo11n-pose.onnx";

/// URL for downloading the default body pose model.
const DEFAULT_POSE_MODEL_URL: &str =
    "https://github.com/ultralytics/assets/releases/download/v8.3.0/yolo11n-pose.onnx";

/// Release that hosts fonts used for grid labels.
pub const ASSETS_URL: &str = "https://github.com/ultralytics/assets/releases/download/v0.0.0";

/// Connection timeout in seconds.
const CONNECT_TIMEOUT: u64 = 30;

/// Read timeout in seconds.
const READ_TIMEOUT: u64 = 300;

/// Format bytes as human-readable string (e.g., "10.4MB").
fn format_bytes(bytes: f64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    if bytes >= GB {
        format!("{:.1}GB", bytes / GB)
    } else if bytes >= MB {
        format!("{:.1}MB", bytes / MB)
    } else if bytes >= KB {
        format!("{:.1}KB", bytes / KB)
    } else {
        format!("{:.0}B", bytes)
    }
}

/// Format time duration.
fn format_time(seconds: f64) -> String {
    if seconds < 60.0 {
        format!("{seconds:.1}s")
    } else if seconds < 3600.0 {
        let mins = (seconds / 60.0) as u32;
        let secs = seconds % 60.0;
        format!("{mins}:{secs:04.1}")
    } else {
        let hours = (seconds / 3600.0) as u32;
        let mins = ((seconds % 3600.0) / 60.0) as u32;
        let secs = seconds % 60.0;
        format!("{hours}:{mins:02}:{secs:04.1}")
    }
}

/// Generate progress bar string.
fn generate_bar(progress: f64, width: usize) -> String {
    let filled = (progress * width as f64) as usize;
    let partial = progress * width as f64 - filled as f64;

    let mut bar = "━".repeat(filled);
    if filled < width {
        if partial > 0.5 {
            bar.push('╸');
            bar.push_str(&"─".repeat(width - filled - 1));
        } else {
            bar.push_str(&"─".repeat(width - filled));
        }
    }
    bar
}

/// Progress line written to stderr while a transfer runs.
struct Progress {
    desc: String,
    total: u64,
    done: u64,
    start: Instant,
    last_update: Instant,
}

impl Progress {
    const BAR_WIDTH: usize = 12;
    const MIN_UPDATE_INTERVAL: Duration = Duration::from_millis(100);

    fn new(desc: String, total: u64) -> Self {
        let now = Instant::now();
        Self {
            desc,
            total,
            done: 0,
            start: now,
            last_update: now,
        }
    }

    fn advance(&mut self, bytes: usize) {
        self.done += bytes as u64;
        if self.last_update.elapsed() >= Self::MIN_UPDATE_INTERVAL {
            self.last_update = Instant::now();
            eprint!("\r\x1b[K{}", self.line(false));
            std::io::stderr().flush().ok();
        }
    }

    fn finish(&self) {
        eprintln!("\r\x1b[K{}", self.line(true));
    }

    fn line(&self, finished: bool) -> String {
        let elapsed = self.start.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 { self.done as f64 / elapsed } else { 0.0 };
        if self.total == 0 {
            return format!(
                "{}: {} {}/s {}",
                self.desc,
                format_bytes(self.done as f64),
                format_bytes(rate),
                format_time(elapsed)
            );
        }

        let progress = if finished { 1.0 } else { (self.done as f64 / self.total as f64).min(1.0) };
        format!(
            "{}: {}% {} {}/{} {}/s {}",
            self.desc,
            (progress * 100.0) as u8,
            generate_bar(progress, Self::BAR_WIDTH),
            format_bytes(self.done as f64),
            format_bytes(self.total as f64),
            format_bytes(rate),
            format_time(elapsed)
        )
    }
}

/// Stream `url` into `dest` with a progress line.
///
/// The body is written to `dest` with a `.part` extension first and renamed once
/// complete; the partial file is removed on failure.
///
/// # Errors
///
/// Returns `IoError` if the request, the transfer, or the final rename fails.
pub(crate) fn download_file(url: &str, dest: &Path) -> Result<()> {
    let config = ureq::Agent::config_builder()
        .timeout_connect(Some(Duration::from_secs(CONNECT_TIMEOUT)))
        .timeout_recv_body(Some(Duration::from_secs(READ_TIMEOUT)))
        .build();
    let agent = ureq::Agent::new_with_config(config);

    let response = agent.get(url).call().map_err(|e| {
        OverlayError::IoError(match &e {
            ureq::Error::Timeout(_) => format!("Connection timed out while downloading {url}"),
            ureq::Error::Io(io_err) => format!("Network error downloading {url}: {io_err}"),
            _ => format!("Failed to download {url}: {e}"),
        })
    })?;

    let total = response
        .headers()
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);

    let temp_path = dest.with_extension("part");
    let _ = fs::remove_file(&temp_path);

    let mut progress = Progress::new(format!("Downloading {url} to '{}'", dest.display()), total);
    let mut reader = response.into_body().into_reader();
    let transfer = File::create(&temp_path)
        .map_err(|e| {
            OverlayError::IoError(format!("Failed to create {}: {e}", temp_path.display()))
        })
        .and_then(|file| {
            let mut writer = BufWriter::new(file);
            let mut buffer = [0u8; 65536];
            loop {
                let n = reader.read(&mut buffer).map_err(|e| {
                    OverlayError::IoError(format!("Failed to read from network: {e}"))
                })?;
                if n == 0 {
                    break;
                }
                writer
                    .write_all(&buffer[..n])
                    .map_err(|e| OverlayError::IoError(format!("Failed to write download: {e}")))?;
                progress.advance(n);
            }
            writer
                .flush()
                .map_err(|e| OverlayError::IoError(format!("Failed to flush download: {e}")))
        });

    if let Err(e) = transfer {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }
    progress.finish();

    fs::rename(&temp_path, dest).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        OverlayError::IoError(format!("Failed to move download to {}: {e}", dest.display()))
    })
}

/// Download `model_path` if its file name is a known pose model.
///
/// Currently supports `yolo11n-pose.onnx`. The model lands at `model_path` (the
/// current directory for a bare file name).
///
/// # Errors
///
/// Returns `ModelLoadError` for unknown models and `IoError` if the transfer fails.
pub fn try_download_model<P: AsRef<Path>>(model_path: P) -> Result<PathBuf> {
    let path = model_path.as_ref();
    let filename = path.file_name().and_then(|n| n.to_str()).unwrap_or("");

    let url = match filename {
        DEFAULT_POSE_MODEL => DEFAULT_POSE_MODEL_URL,
        _ => {
            return Err(OverlayError::ModelLoadError(format!(
                "Model file not found: {}. Auto-download is only supported for {DEFAULT_POSE_MODEL}",
                path.display(),
            )));
        }
    };

    download_file(url, path)?;
    Ok(path.to_path_buf())
}

/// Resolve a model path, downloading known models that are missing.
///
/// # Errors
///
/// Same as [`try_download_model`] when the file does not exist.
pub fn resolve_model<P: AsRef<Path>>(model_path: P) -> Result<PathBuf> {
    let path = model_path.as_ref();
    if path.exists() {
        Ok(path.to_path_buf())
    } else {
        try_download_model(path)
    }
}
