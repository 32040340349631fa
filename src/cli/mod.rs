//! CLI module for aerocursor
//!
//! Provides command-line interface for:
//! - query: one find request over a dataset
//! - explain: one explain over a dataset
//! - serve: JSON request lines with a background cursor monitor

mod args;
mod commands;
mod dataset;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{boot, explain, query, run, run_command, serve, Config};
pub use dataset::{CollectionSpec, Dataset};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{read_request, read_requests, write_error, write_json};
