// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::path::PathBuf;

use clap::{ArgGroup, Args, Parser, Subcommand};

/// CLI arguments parser.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(after_help = r#"Examples:
    posture-overlay run --movie clip.mp4 --body-model yolo11n-pose.onnx --show
    posture-overlay run --camera 0 --body-model yolo11n-pose.onnx --hand-model hand-pose.onnx
    posture-overlay run --frames frames/ --fps 25 --grid 10
    posture-overlay run --movie clip.mp4 --stride 1 --verbose false"#)]
pub struct Cli {
    #[command(subcommand)]
    /// Subcommand to execute.
    pub command: Commands,
}

/// Commands for the CLI.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Overlay pose skeletons on a movie, camera, or image sequence
    Run(RunArgs),
}

/// Arguments for the run command.
#[derive(Args, Debug)]
#[command(group(ArgGroup::new("source").required(true).args(["movie", "camera", "frames"])))]
#[allow(clippy::struct_excessive_bools)]
pub struct RunArgs {
    /// Movie file to read
    #[arg(long)]
    pub movie: Option<PathBuf>,

    /// Camera device index or stream location
    #[arg(long)]
    pub camera: Option<String>,

    /// Directory of image frames
    #[arg(long)]
    pub frames: Option<PathBuf>,

    /// Frame rate of an image sequence
    #[arg(long, default_value_t = 30.0)]
    pub fps: f64,

    /// Body pose ONNX model (requires the `onnx` feature)
    #[arg(long)]
    pub body_model: Option<PathBuf>,

    /// Hand pose ONNX model (requires the `onnx` feature)
    #[arg(long)]
    pub hand_model: Option<PathBuf>,

    /// Run detection on every Nth frame
    #[arg(long, default_value_t = 6)]
    pub stride: u64,

    /// Draw an N x N diagnostic grid
    #[arg(long)]
    pub grid: Option<u32>,

    /// Draw all five fingertips instead of the index finger only
    #[arg(long, default_value_t = false)]
    pub all_fingertips: bool,

    /// Display the annotated stream in a window
    #[arg(long, default_value_t = false)]
    pub show: bool,

    /// Show verbose output
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_args_defaults() {
        let args = Cli::parse_from(["app", "run", "--movie", "clip.mp4"]);
        match args.command {
            Commands::Run(run_args) => {
                assert_eq!(run_args.movie, Some(PathBuf::from("clip.mp4")));
                assert_eq!(run_args.stride, 6);
                assert!((run_args.fps - 30.0).abs() < f64::EPSILON);
                assert!(run_args.grid.is_none());
                assert!(run_args.body_model.is_none());
                assert!(!run_args.all_fingertips);
                assert!(!run_args.show);
                assert!(run_args.verbose);
            }
        }
    }

    #[test]
    fn test_run_args_custom() {
        let args = Cli::parse_from([
            "app",
            "run",
            "--frames",
            "frames/",
            "--fps",
            "25",
            "--stride",
            "1",
            "--grid",
            "10",
            "--all-fingertips",
            "--verbose",
            "false",
        ]);
        match args.command {
            Commands::Run(run_args) => {
                assert_eq!(run_args.frames, Some(PathBuf::from("frames/")));
                assert!((run_args.fps - 25.0).abs() < f64::EPSILON);
                assert_eq!(run_args.stride, 1);
                assert_eq!(run_args.grid, Some(10));
                assert!(run_args.all_fingertips);
                assert!(!run_args.verbose);
            }
        }
    }

    #[test]
    fn test_source_is_required_and_exclusive() {
        assert!(Cli::try_parse_from(["app", "run"]).is_err());
        assert!(
            Cli::try_parse_from(["app", "run", "--movie", "a.mp4", "--camera", "0"]).is_err()
        );
    }
}
