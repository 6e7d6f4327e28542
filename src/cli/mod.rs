//! Command-line interface for scratchdata
//!
//! This module handles:
//! - Command-line argument parsing using clap
//! - Configuration loading and flag overrides
//! - The informational subcommands (config, completion, version)
//!
//! The long-running commands live in [`commands`].

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::{Path, PathBuf};

use crate::config::{Config, LogLevel};
use crate::error::Result;
use crate::export::ExportFormat;

pub mod commands;
pub mod completion;

/// scratchdata - streaming query exports and supervised services
#[derive(Parser, Debug)]
#[command(
    name = "scratchdata",
    version,
    about = "Stream query results as CSV, JSON or NDJSON",
    long_about = "Runs queries against configured destinations and streams the results
to stdout or a file as CSV, a JSON array, or newline-delimited JSON. The serve
command runs the supervised background subsystems until interrupted."
)]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    pub config_file: Option<PathBuf>,

    /// Verbose mode (debug logging)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Very verbose mode (trace logging)
    #[arg(long = "vv", global = true)]
    pub very_verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long = "json-logs", global = true)]
    pub json_logs: bool,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands for scratchdata
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a query and stream the results
    Query {
        /// Destination to query
        #[arg(short = 'd', long, value_name = "NAME")]
        destination: String,

        /// Output format (defaults to export.default_format)
        #[arg(short = 'f', long, value_enum)]
        format: Option<ExportFormat>,

        /// Write to a file instead of stdout
        #[arg(short = 'o', long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Query text
        #[arg(value_name = "QUERY")]
        query: String,
    },

    /// Run supervised subsystems until Ctrl+C or SIGTERM
    Serve,

    /// Show effective configuration
    Config,

    /// Generate shell completion script
    Completion {
        /// Shell type
        #[arg(value_enum, value_name = "SHELL")]
        shell: Shell,
    },

    /// Show version information
    Version,
}

/// CLI interface handler
pub struct CliInterface {
    /// Parsed command-line arguments
    args: CliArgs,

    /// Loaded configuration
    config: Config,
}

impl CliInterface {
    /// Create a new CLI interface from the process arguments
    ///
    /// # Returns
    /// * `Result<Self>` - New CLI interface or error
    pub fn new() -> Result<Self> {
        Self::from_args(CliArgs::parse())
    }

    /// Create a CLI interface from already parsed arguments
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let mut config = Config::load(args.config_file.as_deref())?;
        Self::apply_args_to_config(&mut config, &args);
        Ok(Self { args, config })
    }

    /// Get the effective configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the parsed arguments
    pub fn args(&self) -> &CliArgs {
        &self.args
    }

    /// Explicit configuration file, if one was given
    pub fn config_path(&self) -> Option<&Path> {
        self.args.config_file.as_deref()
    }

    /// Apply command-line overrides to configuration
    fn apply_args_to_config(config: &mut Config, args: &CliArgs) {
        config.logging.level = if args.very_verbose {
            LogLevel::Trace
        } else if args.verbose {
            LogLevel::Debug
        } else {
            config.logging.level
        };

        if args.json_logs {
            config.logging.json = true;
        }
    }

    /// Handle the informational subcommands
    ///
    /// # Returns
    /// * `Result<bool>` - True if the subcommand was handled here
    pub fn handle_subcommand(&self) -> Result<bool> {
        match &self.args.command {
            Commands::Version => {
                self.show_version();
                Ok(true)
            }
            Commands::Completion { shell } => {
                completion::generate_completion(*shell, &mut std::io::stdout())?;
                Ok(true)
            }
            Commands::Config => {
                self.show_config()?;
                Ok(true)
            }
            Commands::Query { .. } | Commands::Serve => Ok(false),
        }
    }

    /// Show version information
    fn show_version(&self) {
        println!("scratchdata version {}", env!("CARGO_PKG_VERSION"));
        println!("Rust version: {}", env!("CARGO_PKG_RUST_VERSION"));
    }

    /// Show effective configuration
    fn show_config(&self) -> Result<()> {
        let path = self
            .config_path()
            .map(Path::to_path_buf)
            .unwrap_or_else(Config::default_path);
        println!("# Configuration file: {}", path.display());
        println!("{}", self.config.to_toml()?);
        Ok(())
    }
}
