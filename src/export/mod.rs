//! Streaming export of query results
//!
//! This module turns a destination [`Cursor`] into CSV, a JSON array, or
//! newline-delimited JSON without ever materializing the full result set:
//! - CSV and JSON are single-task, driven row by row from the cursor
//! - NDJSON re-uses the JSON array writer through a backpressured pipe
//!
//! # Architecture
//!
//! 1. **ExportCoordinator**: pulls rows from the cursor (peeking one row for
//!    column discovery when the format needs it) and feeds a writer
//! 2. **FormatWriter**: encodes rows for one output format
//! 3. **NDJSON bridge**: producer task running the JSON writer into a
//!    [`pipe`], consumer decoding the array element by element
//!
//! Every export fails fast on the first error, annotated with the
//! [`ExportStage`](crate::error::ExportStage) it happened in. Output already
//! written to the sink at that point is truncated, not a resumable prefix.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWrite;

use crate::destination::Cursor;
use crate::error::Result;

pub mod bridge;
pub mod coordinator;
pub mod decoder;
pub mod pipe;
pub mod writers;

pub use bridge::export_ndjson;
pub use coordinator::{ExportCoordinator, ExportResult};
pub use writers::{CsvWriter, FormatWriter, JsonArrayWriter};

/// Output format of an export
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// RFC 4180 style CSV with a header row
    Csv,

    /// A single JSON array of row objects
    Json,

    /// One compact JSON object per line
    Ndjson,
}

/// Tuning knobs for exports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportOptions {
    /// Buffer size of the writer in front of the sink, in bytes
    pub buffer_size: usize,

    /// Capacity of the NDJSON bridge pipe, in bytes
    pub pipe_capacity: usize,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            buffer_size: 8 * 1024,
            pipe_capacity: 4 * 1024,
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Csv => write!(f, "csv"),
            ExportFormat::Json => write!(f, "json"),
            ExportFormat::Ndjson => write!(f, "ndjson"),
        }
    }
}

/// Export a cursor to `sink` in the given format
pub async fn export<W>(
    cursor: Box<dyn Cursor>,
    format: ExportFormat,
    sink: &mut W,
    options: &ExportOptions,
) -> Result<ExportResult>
where
    W: AsyncWrite + Unpin + Send + ?Sized,
{
    match format {
        ExportFormat::Csv => {
            let writer = CsvWriter::with_capacity(sink, options.buffer_size);
            ExportCoordinator::new(cursor, writer).execute().await
        }
        ExportFormat::Json => {
            let writer = JsonArrayWriter::with_capacity(sink, options.buffer_size);
            ExportCoordinator::new(cursor, writer).execute().await
        }
        ExportFormat::Ndjson => export_ndjson(cursor, sink, options).await,
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Cursors and sinks shared by the export tests

    use std::io;
    use std::pin::Pin;
    use std::sync::Arc;
    use std::task::{Context, Poll};

    use async_trait::async_trait;
    use tokio::io::AsyncWrite;

    use crate::destination::{Cursor, Row, TableCursor, Value};
    use crate::error::{QueryError, Result, ScratchError};

    /// The two rows used throughout the format examples
    pub fn example_rows() -> Vec<Row> {
        vec![
            Row::new().with("a", 1).with("b", Value::Null),
            Row::new().with("a", 2).with("b", "x"),
        ]
    }

    pub fn cursor_of(rows: Vec<Row>) -> Box<dyn Cursor> {
        Box::new(TableCursor::new(Arc::new(rows), None))
    }

    pub fn numbered_rows(n: i64) -> Vec<Row> {
        (1..=n)
            .map(|i| Row::new().with("id", i).with("name", format!("row-{i}")))
            .collect()
    }

    /// Yields `rows`, failing when asked for the row at `fail_at` (1-indexed)
    pub struct FailingCursor {
        rows: std::vec::IntoIter<Row>,
        fetched: u64,
        fail_at: u64,
    }

    impl FailingCursor {
        pub fn new(rows: Vec<Row>, fail_at: u64) -> Self {
            Self {
                rows: rows.into_iter(),
                fetched: 0,
                fail_at,
            }
        }
    }

    #[async_trait]
    impl Cursor for FailingCursor {
        async fn next_row(&mut self) -> Result<Option<Row>> {
            self.fetched += 1;
            if self.fetched == self.fail_at {
                return Err(ScratchError::Query(QueryError::Fetch {
                    row: self.fetched,
                    message: "connection reset".to_string(),
                }));
            }
            Ok(self.rows.next())
        }
    }

    /// Sink that accepts `limit` bytes, then fails every write
    pub struct FailingSink {
        pub accepted: Vec<u8>,
        limit: usize,
    }

    impl FailingSink {
        pub fn new(limit: usize) -> Self {
            Self {
                accepted: Vec::new(),
                limit,
            }
        }
    }

    impl AsyncWrite for FailingSink {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            let room = self.limit.saturating_sub(self.accepted.len());
            if room == 0 {
                return Poll::Ready(Err(io::Error::other("disk full")));
            }
            let n = room.min(buf.len());
            self.accepted.extend_from_slice(&buf[..n]);
            Poll::Ready(Ok(n))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }
}
