//! Export coordinator for orchestrating export operations
//!
//! This module provides the driver loop that brings together a destination
//! cursor and a format writer.

use std::time::Instant;

use tracing::{debug, info};

use crate::destination::{Column, Cursor, PeekableCursor};
use crate::error::{ExportStage, Result};

use super::writers::FormatWriter;

/// Result of an export operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportResult {
    /// Number of rows exported
    pub rows_exported: u64,
    /// Time taken for export
    pub elapsed_ms: u64,
}

/// Coordinator for export operations
///
/// Drives a single cursor through a format writer. Column discovery and row
/// fetching share the same cursor: the first row is peeked, never fetched by
/// a second execution.
pub struct ExportCoordinator<W: FormatWriter> {
    /// Row source, with one row of lookahead
    cursor: PeekableCursor,
    /// Format writer for output
    writer: W,
}

impl<W: FormatWriter> ExportCoordinator<W> {
    /// Create a new export coordinator
    pub fn new(cursor: Box<dyn Cursor>, writer: W) -> Self {
        Self {
            cursor: PeekableCursor::new(cursor),
            writer,
        }
    }

    /// Execute the export operation
    ///
    /// 1. Discover columns (declared by the cursor, else from the first row)
    /// 2. Write the prologue
    /// 3. Stream every row through the writer
    /// 4. Finalize and flush
    ///
    /// # Returns
    /// * `Result<ExportResult>` - Export statistics, or the first error
    ///   annotated with its stage
    pub async fn execute(mut self) -> Result<ExportResult> {
        let start_time = Instant::now();

        let columns = if self.writer.needs_columns() {
            self.discover_columns()
                .await
                .map_err(|e| e.at(ExportStage::ColumnDiscovery))?
        } else {
            Vec::new()
        };

        self.writer
            .begin(&columns)
            .await
            .map_err(|e| e.at(ExportStage::Header))?;

        let mut exported = 0u64;
        loop {
            let stage = ExportStage::Row(exported + 1);
            let row = match self.cursor.next_row().await.map_err(|e| e.at(stage))? {
                Some(row) => row,
                None => {
                    debug!("Cursor exhausted after {} rows", exported);
                    break;
                }
            };

            self.writer.write_row(&row).await.map_err(|e| e.at(stage))?;
            exported += 1;

            if exported % 10_000 == 0 {
                debug!("Progress: {} rows exported", exported);
            }
        }

        self.writer
            .finalize()
            .await
            .map_err(|e| e.at(ExportStage::Flush))?;

        let elapsed_ms = start_time.elapsed().as_millis() as u64;
        info!("Export completed: {} rows, {} ms", exported, elapsed_ms);

        Ok(ExportResult {
            rows_exported: exported,
            elapsed_ms,
        })
    }

    async fn discover_columns(&mut self) -> Result<Vec<Column>> {
        if let Some(declared) = self.cursor.columns() {
            return Ok(declared.to_vec());
        }
        Ok(match self.cursor.peek().await? {
            Some(row) => row.columns().map(Column::new).collect(),
            None => Vec::new(),
        })
    }
}
