//! Destination query contract
//!
//! This module provides:
//! - The [`Destination`] trait every destination store implements
//! - [`Cursor`], the lazy single-pass row source a query returns
//! - [`Row`], [`Value`] and [`Column`], the destination-native data model
//! - [`DestinationRegistry`], the named set of destinations shared across
//!   subsystems and closed exactly once at shutdown
//!
//! Queries are opaque strings. Each call to [`Destination::query`] is an
//! independent execution; the export helpers run exactly one execution per
//! call.

use async_trait::async_trait;
use tokio::io::AsyncWrite;

use crate::error::{ExportStage, Result};
use crate::export::{self, ExportFormat, ExportOptions, ExportResult};

pub mod cursor;
pub mod memory;
pub mod registry;
pub mod row;

pub use cursor::{Cursor, PeekableCursor, TableCursor};
pub use memory::MemoryDestination;
pub use registry::DestinationRegistry;
pub use row::{Column, Row, Value};

/// A destination store that can run queries
#[async_trait]
pub trait Destination: Send + Sync {
    /// Name the destination is registered under
    fn name(&self) -> &str;

    /// Execute a query and return a cursor over its results
    ///
    /// # Returns
    /// * `Err(ConnectionError)` - The destination is unreachable or closed
    /// * `Err(QueryError)` - The destination rejected the query
    async fn query(&self, query: &str) -> Result<Box<dyn Cursor>>;

    /// Check that the destination is reachable
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    /// Release connections held by this destination
    async fn close(&self) -> Result<()> {
        Ok(())
    }

    /// Run a query and stream its results to `sink` in `format`
    async fn export(
        &self,
        query: &str,
        format: ExportFormat,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
        options: &ExportOptions,
    ) -> Result<ExportResult> {
        let cursor = self.query(query).await.map_err(|e| e.at(ExportStage::Query))?;
        export::export(cursor, format, sink, options).await
    }

    /// Stream results as CSV with a header row
    async fn query_csv(
        &self,
        query: &str,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<ExportResult> {
        self.export(query, ExportFormat::Csv, sink, &ExportOptions::default())
            .await
    }

    /// Stream results as a single JSON array of row objects
    async fn query_json(
        &self,
        query: &str,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<ExportResult> {
        self.export(query, ExportFormat::Json, sink, &ExportOptions::default())
            .await
    }

    /// Stream results as newline-delimited JSON
    async fn query_ndjson(
        &self,
        query: &str,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<ExportResult> {
        self.export(query, ExportFormat::Ndjson, sink, &ExportOptions::default())
            .await
    }
}
