// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::path::Path;
use std::process;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[cfg(feature = "onnx")]
use posture_overlay::download::resolve_model;
#[cfg(feature = "onnx")]
use posture_overlay::onnx::{DetectorConfig, OnnxPoseDetector};
#[cfg(feature = "visualize")]
use posture_overlay::visualizer::Viewer;
use posture_overlay::{
    Annotator, FrameProcessor, NullDetector, Pipeline, PipelineConfig,
    PipelineCounters, PipelineState, PoseDetector, Result, SkeletonKind, SkeletonStyle,
    SourceConfig, VERSION, error, info, section, success, verbose, warn,
};

use crate::cli::args::RunArgs;

/// Interval between headless status lines.
const STATUS_INTERVAL: Duration = Duration::from_secs(1);

/// Run the overlay pipeline until the source ends or the window is closed.
pub fn run_pipeline(args: &RunArgs) {
    section!("posture-overlay {VERSION}");

    let Some(source) = source_config(args) else {
        error!("One of --movie, --camera or --frames is required");
        process::exit(1);
    };
    if let Err(e) = source.validate() {
        error!("{e}");
        process::exit(1);
    }
    let label = source_label(args);

    let processor = match build_processor(args) {
        Ok(processor) => processor,
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    };

    let mut pipeline = Pipeline::new(source, processor);
    if let Err(e) = pipeline.open() {
        error!("Failed to open {label}: {e}");
        process::exit(1);
    }
    if let Some(meta) = pipeline.metadata() {
        verbose!(
            "{label}: {}x{} at {:.2} fps, rotated {}°",
            meta.width,
            meta.height,
            meta.frame_rate,
            pipeline.orientation().rotation.degrees()
        );
    }
    if let Err(e) = pipeline.start() {
        error!("{e}");
        process::exit(1);
    }

    #[cfg(feature = "visualize")]
    if args.show {
        show_pipeline(&mut pipeline, &label);
        return;
    }
    #[cfg(not(feature = "visualize"))]
    if args.show {
        warn!(
            "--show requires the 'visualize' feature. Compile with --features visualize to enable the window."
        );
    }

    let state = run_headless(&mut pipeline);
    summarize(state, &pipeline.counters());
    if state == PipelineState::Failed {
        process::exit(1);
    }
}

fn source_config(args: &RunArgs) -> Option<SourceConfig> {
    if let Some(path) = &args.movie {
        Some(SourceConfig::movie(path))
    } else if let Some(device) = &args.camera {
        Some(SourceConfig::camera(device))
    } else {
        args.frames
            .as_ref()
            .map(|dir| SourceConfig::image_sequence(dir, args.fps))
    }
}

fn source_label(args: &RunArgs) -> String {
    let path = args.movie.as_deref().or(args.frames.as_deref());
    path.and_then(Path::file_name)
        .map(|n| n.to_string_lossy().into_owned())
        .or_else(|| args.camera.as_ref().map(|c| format!("camera {c}")))
        .unwrap_or_default()
}

fn build_processor(args: &RunArgs) -> Result<FrameProcessor> {
    let hand_style = if args.all_fingertips {
        SkeletonStyle::hand_fingertips()
    } else {
        SkeletonStyle::hand()
    };
    let config = PipelineConfig::new()
        .with_stride(args.stride)
        .with_grid(args.grid)
        .with_hand_style(hand_style);

    let body = build_detector(args.body_model.as_deref(), SkeletonKind::Body)?;
    let hand = build_detector(args.hand_model.as_deref(), SkeletonKind::Hand)?;

    let mut annotator = Annotator::new(&config);
    if config.grid.is_some() {
        annotator = annotator.with_default_font();
    }
    Ok(FrameProcessor::new(config, body, hand)?.with_annotator(annotator))
}

#[cfg(feature = "onnx")]
fn build_detector(model: Option<&Path>, kind: SkeletonKind) -> Result<Arc<dyn PoseDetector>> {
    let Some(model) = model else {
        verbose!("No {kind} model given, {kind} overlay disabled");
        return Ok(Arc::new(NullDetector::new(kind)));
    };
    let path = resolve_model(model)?;
    let detector = OnnxPoseDetector::load(&path, kind, DetectorConfig::new())?;
    Ok(Arc::new(detector))
}

#[cfg(not(feature = "onnx"))]
fn build_detector(model: Option<&Path>, kind: SkeletonKind) -> Result<Arc<dyn PoseDetector>> {
    if model.is_some() {
        return Err(posture_overlay::OverlayError::FeatureNotEnabled(format!(
            "--{kind}-model requires the 'onnx' feature. Compile with --features onnx"
        )));
    }
    verbose!("No {kind} model given, {kind} overlay disabled");
    Ok(Arc::new(NullDetector::new(kind)))
}

/// Poll the slot until the session finishes, printing a status line about once a second.
fn run_headless(pipeline: &mut Pipeline) -> PipelineState {
    let shared = pipeline.shared();
    let mut last_status = Instant::now();

    while !pipeline.state().is_finished() {
        thread::sleep(Duration::from_millis(50));
        if last_status.elapsed() >= STATUS_INTERVAL {
            last_status = Instant::now();
            info!("{}", status_line(&shared.counters()));
        }
    }
    pipeline.wait()
}

fn status_line(counters: &PipelineCounters) -> String {
    format!(
        "Frame Count: {} | Clock Time: {:.3} sec | Process Time: {:.3} sec",
        counters.frame_count, counters.video_time, counters.elapsed_time
    )
}

fn summarize(state: PipelineState, counters: &PipelineCounters) {
    match state {
        PipelineState::Ended => success!(
            "{} frames ({} with pose detection) in {:.3} sec",
            counters.frame_count,
            counters.detections_run,
            counters.elapsed_time
        ),
        PipelineState::Failed if counters.frame_count == 0 => {
            warn!("No frames available");
        }
        _ => info!("Stopped {state} after {}", status_line(counters)),
    }
}

/// Show the latest frame at the display's own cadence until the window is closed.
#[cfg(feature = "visualize")]
fn show_pipeline(pipeline: &mut Pipeline, label: &str) {
    let shared = pipeline.shared();
    let orientation = pipeline.orientation();
    let (width, height) = pipeline
        .metadata()
        .map_or((1280, 720), posture_overlay::SourceMetadata::display_size);

    let mut viewer = match Viewer::new(label, width as usize, height as usize) {
        Ok(viewer) => viewer,
        Err(e) => {
            error!("{e}");
            pipeline.reset();
            return;
        }
    };

    let mut shown_count = u64::MAX;
    let mut reported = false;
    loop {
        let snapshot = shared.snapshot();
        let fresh = snapshot.counters.frame_count != shown_count;
        let image = match snapshot.frame.as_deref() {
            Some(frame) if fresh => match frame.buffer.to_rgba() {
                Ok(image) => Some(orientation.apply(&image)),
                Err(e) => {
                    warn!("{e}");
                    None
                }
            },
            _ => None,
        };
        if fresh {
            shown_count = snapshot.counters.frame_count;
            viewer.set_title(&format!("{} | {label}", status_line(&snapshot.counters)));
        }

        match viewer.show(image.as_ref()) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => {
                error!("{e}");
                break;
            }
        }

        let state = pipeline.state();
        if state.is_finished() && !reported {
            reported = true;
            summarize(state, &snapshot.counters);
        }
    }

    pipeline.reset();
}
