//! ttsprobe CLI library
//!
//! Flag parsing, configuration merging and progress output for the
//! `ttsprobe` binary. The engine itself lives in the `ttsprobe` crate.

#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

mod commands;
mod config;
mod error;
pub mod logging;
mod output;
mod runner;

pub use commands::{Cli, ColorArg};
pub use config::{resolve, ColorChoice, FileConfig, Settings};
pub use error::{CliError, CliResult};
pub use output::ProgressReporter;
pub use runner::{execute, RunStatus};
