//! ttsprobe: partition and boundary testing of a TTS web frontend
//!
//! ## Usage
//!
//! ```bash
//! ttsprobe                                  # full run against localhost:5000
//! ttsprobe --only-boundary --visible        # boundary cases, browser shown
//! ttsprobe --seed 1234 --no-warmup          # replay an earlier order
//! ttsprobe --from-results out/ttsprobe_results_20260101_120000.json
//! ttsprobe --dry-run                        # simulated frontend, no browser
//! ```
//!
//! Exit status is 0 when every case succeeded, 1 when any case failed,
//! errored or never ran, and 2 when the run could not happen at all.

use clap::Parser;
use std::process::ExitCode;
use ttsprobe_cli::{execute, logging, Cli, RunStatus};

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.quiet);

    match execute(&cli) {
        Ok(RunStatus::Passed) => ExitCode::SUCCESS,
        Ok(RunStatus::CasesFailed) => ExitCode::from(1),
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(2)
        }
    }
}
