//! CSV writer for export operations
//!
//! Writes a header line followed by one line per row. Column order is fixed
//! by the coordinator before the first row; values missing from a row are
//! written as the literal `null`.

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::debug;

use crate::destination::{Column, Row, Value};
use crate::error::{Result, ScratchError};

use super::FormatWriter;

/// Writer for CSV format
///
/// Fields containing a comma, quote, CR or LF are quoted with internal
/// quotes doubled. Lines end with `\n`.
pub struct CsvWriter<W: AsyncWrite + Unpin + Send> {
    /// Buffered sink writer
    writer: BufWriter<W>,
    /// Column headers, in output order
    headers: Vec<String>,
    /// Reused line buffer
    line: String,
    /// Number of rows written
    written: u64,
}

impl<W: AsyncWrite + Unpin + Send> CsvWriter<W> {
    /// Create a CSV writer with the default 8 KiB buffer
    pub fn new(sink: W) -> Self {
        Self::with_capacity(sink, 8 * 1024)
    }

    /// Create a CSV writer
    ///
    /// # Arguments
    /// * `sink` - Output sink
    /// * `capacity` - Size of the write buffer in bytes
    pub fn with_capacity(sink: W, capacity: usize) -> Self {
        Self {
            writer: BufWriter::with_capacity(capacity, sink),
            headers: Vec::new(),
            line: String::new(),
            written: 0,
        }
    }

    /// Escape a CSV value if necessary
    ///
    /// # Arguments
    /// * `value` - Value to escape
    ///
    /// # Returns
    /// * `String` - Escaped value
    fn escape_csv_value(value: &str) -> String {
        if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
            // Wrap in quotes and escape internal quotes by doubling them
            format!("\"{}\"", value.replace('"', "\"\""))
        } else {
            value.to_string()
        }
    }

    async fn write_line(&mut self) -> Result<()> {
        self.line.push('\n');
        self.writer
            .write_all(self.line.as_bytes())
            .await
            .map_err(ScratchError::Write)
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> FormatWriter for CsvWriter<W> {
    fn needs_columns(&self) -> bool {
        true
    }

    async fn begin(&mut self, columns: &[Column]) -> Result<()> {
        self.headers = columns.iter().map(|c| c.name.clone()).collect();
        if self.headers.is_empty() {
            // Zero-row result with no declared columns: nothing to write
            debug!("No columns discovered, skipping CSV header");
            return Ok(());
        }

        self.line = self
            .headers
            .iter()
            .map(|h| Self::escape_csv_value(h))
            .collect::<Vec<_>>()
            .join(",");
        self.write_line().await?;
        debug!("Wrote CSV headers: {} fields", self.headers.len());
        Ok(())
    }

    async fn write_row(&mut self, row: &Row) -> Result<()> {
        let mut fields = Vec::with_capacity(self.headers.len());
        let mut matched = 0;
        for header in &self.headers {
            let text = match row.get(header) {
                Some(value) => {
                    matched += 1;
                    value.to_text()
                }
                None => Value::Null.to_text(),
            };
            fields.push(Self::escape_csv_value(&text));
        }
        if matched < row.len() {
            debug!(
                "Row {} has {} column(s) outside the header, dropping them",
                self.written + 1,
                row.len() - matched
            );
        }

        self.line = fields.join(",");
        self.write_line().await?;
        self.written += 1;
        Ok(())
    }

    async fn finalize(&mut self) -> Result<()> {
        self.writer.flush().await.map_err(ScratchError::Write)?;
        debug!("Finalized CSV output ({} rows)", self.written);
        Ok(())
    }

    fn rows_written(&self) -> u64 {
        self.written
    }
}
