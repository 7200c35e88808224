// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

mod cli;

use clap::Parser;
use posture_overlay::logging::set_verbose;

use crate::cli::args::{Cli, Commands};
use crate::cli::run::run_pipeline;

fn main() {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Run(args) => {
            set_verbose(args.verbose);
            run_pipeline(args);
        }
    }
}
