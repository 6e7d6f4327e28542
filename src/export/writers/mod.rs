//! Format writers for export operations
//!
//! This module provides a unified interface for encoding rows into
//! different output formats (CSV, JSON array).

use async_trait::async_trait;

use crate::destination::{Column, Row};
use crate::error::Result;

pub mod csv;
pub mod json;

pub use csv::CsvWriter;
pub use json::JsonArrayWriter;

/// Trait for writing rows to an output format
///
/// The coordinator calls [`begin`](FormatWriter::begin) exactly once, then
/// [`write_row`](FormatWriter::write_row) per row in cursor order, then
/// [`finalize`](FormatWriter::finalize). A writer holds at most one row's
/// worth of encoded state between calls.
#[async_trait]
pub trait FormatWriter: Send {
    /// Whether the writer needs the column set before the first row
    ///
    /// When `false`, the coordinator skips column discovery and passes an
    /// empty column list to `begin`.
    fn needs_columns(&self) -> bool {
        false
    }

    /// Emit any prologue (header line, opening bracket)
    ///
    /// # Arguments
    /// * `columns` - Ordered column set discovered for this export
    async fn begin(&mut self, columns: &[Column]) -> Result<()>;

    /// Encode and write a single row
    async fn write_row(&mut self, row: &Row) -> Result<()>;

    /// Emit any epilogue and flush the sink
    async fn finalize(&mut self) -> Result<()>;

    /// Number of rows written so far
    fn rows_written(&self) -> u64;
}
