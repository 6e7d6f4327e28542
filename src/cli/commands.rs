//! Query and serve commands

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use tokio::io::AsyncWrite;
use tracing::{debug, info};

use crate::config::Config;
use crate::destination::{Destination, DestinationRegistry};
use crate::error::{Result, ScratchError};
use crate::export::{ExportFormat, ExportResult};
use crate::monitor::HealthMonitor;
use crate::supervisor::{Supervisor, shutdown_signal};

/// Run one query and stream the results to stdout or a file
///
/// Ctrl+C or SIGTERM abandons the export and returns
/// [`ScratchError::Cancelled`].
///
/// # Arguments
/// * `config` - Effective configuration
/// * `destination` - Name of the destination to query
/// * `format` - Output format, or the configured default
/// * `output` - Output file; stdout when `None`
/// * `query` - Query text
pub async fn run_query(
    config: &Config,
    destination: &str,
    format: Option<ExportFormat>,
    output: Option<&Path>,
    query: &str,
) -> Result<ExportResult> {
    let export = async {
        match output {
            Some(path) => {
                let mut file = tokio::fs::File::create(path).await?;
                query_into(config, destination, format, &mut file, query).await
            }
            None => {
                let mut stdout = tokio::io::stdout();
                query_into(config, destination, format, &mut stdout, query).await
            }
        }
    };

    // Output already written is truncated; nothing closes it into a valid document
    let result = tokio::select! {
        result = export => result?,
        _ = shutdown_signal() => {
            return Err(ScratchError::Cancelled("query interrupted".to_string()));
        }
    };

    if let Some(path) = output {
        info!("Wrote {} rows to {}", result.rows_exported, path.display());
    }
    Ok(result)
}

/// Run one query against a fresh registry and write to `sink`
pub async fn query_into<W>(
    config: &Config,
    destination: &str,
    format: Option<ExportFormat>,
    sink: &mut W,
    query: &str,
) -> Result<ExportResult>
where
    W: AsyncWrite + Unpin + Send,
{
    let registry = DestinationRegistry::from_config(&config.destinations).await?;
    let format = format.unwrap_or(config.export.default_format);
    debug!("Exporting from '{}' as {}", destination, format);

    let result = match registry.get(destination).await {
        Ok(dest) => {
            dest.export(query, format, sink, &config.export.export_options())
                .await
        }
        Err(e) => Err(e),
    };

    registry.close_all().await;
    result
}

/// Run the supervised subsystems until Ctrl+C or SIGTERM
pub async fn run_serve(config: &Config) -> Result<()> {
    serve_until(config, shutdown_signal()).await
}

/// Run the supervised subsystems until `signal` completes
pub async fn serve_until<S>(config: &Config, signal: S) -> Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    let registry = Arc::new(DestinationRegistry::from_config(&config.destinations).await?);
    let names = registry.names().await;
    info!("Serving {} destination(s): {}", names.len(), names.join(", "));

    let mut supervisor = Supervisor::new().with_drain_timeout(config.supervisor.drain_timeout());
    supervisor.register_subsystem(Arc::new(HealthMonitor::new(
        registry.clone(),
        config.supervisor.health_interval(),
    )))?;

    let teardown_registry = registry.clone();
    supervisor.on_stopped(move || async move {
        teardown_registry.close_all().await;
    })?;

    supervisor.start_with_signal(signal)?;
    supervisor.wait().await?;

    if !registry.is_closed() {
        return Err(ScratchError::Generic(
            "destinations were not closed at teardown".to_string(),
        ));
    }
    Ok(())
}
