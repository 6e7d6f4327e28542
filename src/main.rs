//! scratchdata command-line entry point
//!
//! # Usage
//!
//! ```bash
//! # Stream a query as NDJSON to stdout
//! scratchdata query -d local --format ndjson "select * from events"
//!
//! # Run the supervised subsystems until Ctrl+C
//! scratchdata serve
//! ```

use tracing::info;
use tracing_subscriber::EnvFilter;

use scratchdata::cli::{CliInterface, Commands, commands};
use scratchdata::config::LoggingConfig;
use scratchdata::error::Result;

/// Application entry point
#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Main application logic
///
/// 1. Parse command-line arguments and load configuration
/// 2. Initialize logging
/// 3. Dispatch the subcommand
async fn run() -> Result<()> {
    let cli = CliInterface::new()?;

    initialize_logging(&cli.config().logging);

    if cli.handle_subcommand()? {
        return Ok(());
    }

    match &cli.args().command {
        Commands::Query {
            destination,
            format,
            output,
            query,
        } => {
            let result =
                commands::run_query(cli.config(), destination, *format, output.as_deref(), query)
                    .await?;
            info!(
                "Exported {} rows in {} ms",
                result.rows_exported, result.elapsed_ms
            );
            Ok(())
        }
        Commands::Serve => commands::run_serve(cli.config()).await,
        Commands::Config | Commands::Completion { .. } | Commands::Version => Ok(()),
    }
}

/// Initialize logging from configuration
///
/// Logs go to stderr so stdout stays reserved for exported data. `RUST_LOG`
/// overrides the configured level when set.
///
/// # Arguments
/// * `logging` - Logging configuration after command-line overrides
fn initialize_logging(logging: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.as_filter()));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let result = match (logging.json, logging.timestamps) {
        (true, true) => subscriber.json().try_init(),
        (true, false) => subscriber.json().without_time().try_init(),
        (false, true) => subscriber.try_init(),
        (false, false) => subscriber.without_time().try_init(),
    };

    if let Err(e) = result {
        eprintln!("Failed to initialize logging: {}", e);
    }
}
