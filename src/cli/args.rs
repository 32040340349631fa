//! CLI argument definitions using clap
//!
//! Commands:
//! - aerocursor query --config <path>
//! - aerocursor explain --config <path>
//! - aerocursor serve --config <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// aerocursor - multi-plan query cursors over an in-memory document store
#[derive(Parser, Debug)]
#[command(name = "aerocursor")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one find request read from stdin and exit
    Query {
        /// Path to configuration file
        #[arg(long, default_value = "./aerocursor.json")]
        config: PathBuf,

        /// Dataset to load instead of the one named in the config
        #[arg(long)]
        dataset: Option<PathBuf>,
    },

    /// Explain one find request read from stdin and exit
    Explain {
        /// Path to configuration file
        #[arg(long, default_value = "./aerocursor.json")]
        config: PathBuf,

        /// Dataset to load instead of the one named in the config
        #[arg(long)]
        dataset: Option<PathBuf>,
    },

    /// Answer JSON request lines from stdin until end of input
    Serve {
        /// Path to configuration file
        #[arg(long, default_value = "./aerocursor.json")]
        config: PathBuf,

        /// Dataset to load instead of the one named in the config
        #[arg(long)]
        dataset: Option<PathBuf>,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve_with_dataset() {
        let cli = Cli::try_parse_from(["aerocursor", "serve", "--dataset", "data.json"]).unwrap();
        match cli.command {
            Command::Serve { config, dataset } => {
                assert_eq!(config, PathBuf::from("./aerocursor.json"));
                assert_eq!(dataset, Some(PathBuf::from("data.json")));
            }
            _ => panic!("Expected Serve"),
        }
    }

    #[test]
    fn test_unknown_command_rejected() {
        assert!(Cli::try_parse_from(["aerocursor", "init"]).is_err());
    }
}
