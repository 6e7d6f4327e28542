//! JSON array writer for export operations
//!
//! Streams `[`, then one compact object per row separated by commas, then
//! `]`. Only the row currently being encoded is held in memory.

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::debug;

use crate::destination::{Column, Row};
use crate::error::{EncodeError, Result, ScratchError};

use super::FormatWriter;

/// Writer for a single JSON array of row objects
pub struct JsonArrayWriter<W: AsyncWrite + Unpin + Send> {
    /// Buffered sink writer
    writer: BufWriter<W>,
    /// Encoding buffer for the current row
    buf: Vec<u8>,
    /// Number of rows written, doubles as the separator flag
    written: u64,
}

impl<W: AsyncWrite + Unpin + Send> JsonArrayWriter<W> {
    /// Create a JSON array writer with the default 8 KiB buffer
    pub fn new(sink: W) -> Self {
        Self::with_capacity(sink, 8 * 1024)
    }

    /// Create a JSON array writer
    ///
    /// # Arguments
    /// * `sink` - Output sink
    /// * `capacity` - Size of the write buffer in bytes
    pub fn with_capacity(sink: W, capacity: usize) -> Self {
        Self {
            writer: BufWriter::with_capacity(capacity, sink),
            buf: Vec::new(),
            written: 0,
        }
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> FormatWriter for JsonArrayWriter<W> {
    async fn begin(&mut self, _columns: &[Column]) -> Result<()> {
        self.writer.write_all(b"[").await.map_err(ScratchError::Write)
    }

    async fn write_row(&mut self, row: &Row) -> Result<()> {
        let object = row.to_json_object()?;

        self.buf.clear();
        if self.written > 0 {
            self.buf.push(b',');
        }
        serde_json::to_writer(&mut self.buf, &object)
            .map_err(|e| EncodeError::Serialize(e.to_string()))?;

        self.writer
            .write_all(&self.buf)
            .await
            .map_err(ScratchError::Write)?;
        self.written += 1;
        Ok(())
    }

    async fn finalize(&mut self) -> Result<()> {
        self.writer.write_all(b"]").await.map_err(ScratchError::Write)?;
        self.writer.flush().await.map_err(ScratchError::Write)?;
        debug!("Finalized JSON array output ({} rows)", self.written);
        Ok(())
    }

    fn rows_written(&self) -> u64 {
        self.written
    }
}
