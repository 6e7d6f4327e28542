//! NDJSON export through the JSON array writer
//!
//! A producer task runs the ordinary JSON array export into a bounded
//! [`pipe`](super::pipe). The calling task decodes that array one object at
//! a time and writes each object back out as a compact line. The pipe's
//! capacity is the backpressure: the producer cannot run further ahead of
//! the consumer than the pipe (plus the writer buffers on each side) holds.

use std::time::Instant;

use tokio::io::{AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use crate::destination::Cursor;
use crate::error::{EncodeError, ExportStage, Result, ScratchError};

use super::coordinator::{ExportCoordinator, ExportResult};
use super::decoder::ArrayDecoder;
use super::pipe::{PipeReader, PipeWriter, pipe};
use super::writers::JsonArrayWriter;
use super::ExportOptions;

/// Export a cursor as newline-delimited JSON
///
/// Succeeds only if the closing bracket of the intermediate array was
/// consumed and neither side failed. Otherwise the first error from either
/// side is returned; a producer failure reaches the caller exactly as the
/// producer saw it. Line order equals cursor row order.
pub async fn export_ndjson<W>(
    cursor: Box<dyn Cursor>,
    sink: &mut W,
    options: &ExportOptions,
) -> Result<ExportResult>
where
    W: AsyncWrite + Unpin + Send + ?Sized,
{
    let start_time = Instant::now();
    // A zero-length read buffer would look like end of stream
    let capacity = options.pipe_capacity.max(1);
    let (pipe_writer, pipe_reader) = pipe(capacity);

    let producer = tokio::spawn(produce(cursor, pipe_writer, capacity));

    // The reader is dropped when `consume` returns, on every path, which
    // unblocks a producer stuck on a full pipe.
    let consumed = consume(pipe_reader, sink, capacity).await;

    // The producer owns the cursor; it must be gone before we return
    let joined = producer.await;
    let lines = consumed?;
    if let Err(e) = joined {
        return Err(ScratchError::Generic(format!("NDJSON producer task failed: {e}")));
    }

    let elapsed_ms = start_time.elapsed().as_millis() as u64;
    info!("NDJSON export completed: {} rows, {} ms", lines, elapsed_ms);
    Ok(ExportResult {
        rows_exported: lines,
        elapsed_ms,
    })
}

/// Producer side: JSON array export into the pipe
async fn produce(cursor: Box<dyn Cursor>, mut pipe: PipeWriter, buffer_size: usize) {
    let writer = JsonArrayWriter::with_capacity(&mut pipe, buffer_size);
    let result = ExportCoordinator::new(cursor, writer).execute().await;

    match result {
        Ok(summary) => {
            debug!("NDJSON producer finished after {} rows", summary.rows_exported);
            if let Err(e) = pipe.shutdown().await {
                debug!("NDJSON producer shutdown failed: {}", e);
            }
        }
        Err(e) => {
            if e.is_write() {
                // The consumer went away first and already has its own error
                debug!("NDJSON producer stopped: {}", e);
            } else {
                warn!("NDJSON producer failed: {}", e);
            }
            pipe.close_with_error(e);
        }
    }
}

/// Consumer side: decode array elements and write them as lines
async fn consume<W>(reader: PipeReader, sink: &mut W, buffer_size: usize) -> Result<u64>
where
    W: AsyncWrite + Unpin + Send + ?Sized,
{
    let mut decoder = ArrayDecoder::new(BufReader::with_capacity(buffer_size, reader));
    decoder.open().await.map_err(|e| e.at(ExportStage::Decode))?;

    let mut line = Vec::new();
    let mut lines = 0u64;
    while decoder.more().await.map_err(|e| e.at(ExportStage::Decode))? {
        let object = decoder
            .next_object()
            .await
            .map_err(|e| e.at(ExportStage::Decode))?;

        line.clear();
        serde_json::to_writer(&mut line, &object).map_err(|e| {
            ScratchError::from(EncodeError::Serialize(e.to_string())).at(ExportStage::Sink)
        })?;
        line.push(b'\n');

        sink.write_all(&line)
            .await
            .map_err(|e| ScratchError::Write(e).at(ExportStage::Sink))?;
        lines += 1;
    }
    decoder.close().await.map_err(|e| e.at(ExportStage::Decode))?;

    sink.flush()
        .await
        .map_err(|e| ScratchError::Write(e).at(ExportStage::Flush))?;
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::pin::Pin;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::task::{Context, Poll};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::destination::{Row, Value};
    use crate::error::QueryError;
    use crate::export::testing::{FailingCursor, FailingSink, cursor_of, example_rows, numbered_rows};

    fn small() -> ExportOptions {
        ExportOptions {
            buffer_size: 256,
            pipe_capacity: 256,
        }
    }

    #[tokio::test]
    async fn test_ndjson_example() {
        let mut out = Vec::new();
        let result = export_ndjson(cursor_of(example_rows()), &mut out, &ExportOptions::default())
            .await
            .unwrap();
        assert_eq!(result.rows_exported, 2);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "{\"a\":1,\"b\":null}\n{\"a\":2,\"b\":\"x\"}\n"
        );
    }

    #[tokio::test]
    async fn test_ndjson_empty_cursor() {
        let mut out = Vec::new();
        let result = export_ndjson(cursor_of(Vec::new()), &mut out, &small()).await.unwrap();
        assert_eq!(result.rows_exported, 0);
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_ndjson_lines_match_json_array() {
        let rows: Vec<Row> = (0..300)
            .map(|i| {
                Row::new()
                    .with("id", i64::from(i))
                    .with("ratio", f64::from(i) / 7.0)
                    .with("label", format!("quote \" comma , brace {{ {i}"))
                    .with("flag", Value::from(if i % 2 == 0 { Some(true) } else { None }))
            })
            .collect();

        let mut json = Vec::new();
        ExportCoordinator::new(cursor_of(rows.clone()), JsonArrayWriter::new(&mut json))
            .execute()
            .await
            .unwrap();
        let array: Vec<serde_json::Value> = serde_json::from_slice(&json).unwrap();

        let mut ndjson = Vec::new();
        export_ndjson(cursor_of(rows), &mut ndjson, &small()).await.unwrap();
        let lines: Vec<serde_json::Value> = String::from_utf8(ndjson)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(lines, array);
    }

    #[tokio::test]
    async fn test_producer_failure_reaches_consumer() {
        let fail_at = 40;
        let mut out = Vec::new();
        let err = export_ndjson(
            Box::new(FailingCursor::new(numbered_rows(100), fail_at)),
            &mut out,
            &small(),
        )
        .await
        .unwrap_err();

        assert_eq!(err.stage(), Some(ExportStage::Row(fail_at)));
        assert!(matches!(err.root(), ScratchError::Query(QueryError::Fetch { row, .. }) if *row == fail_at));

        let emitted = String::from_utf8(out).unwrap().lines().count() as u64;
        assert!(emitted < fail_at, "emitted {} lines", emitted);
    }

    #[tokio::test]
    async fn test_producer_encode_failure() {
        let rows = vec![
            Row::new().with("v", 1.0),
            Row::new().with("v", f64::NAN),
            Row::new().with("v", 3.0),
        ];
        let mut out = Vec::new();
        let err = export_ndjson(cursor_of(rows), &mut out, &small()).await.unwrap_err();
        assert_eq!(err.stage(), Some(ExportStage::Row(2)));
        assert!(matches!(err.root(), ScratchError::Encode(_)));
        assert!(String::from_utf8(out).unwrap().lines().count() < 2);
    }

    #[tokio::test]
    async fn test_sink_failure_does_not_hang_producer() {
        let mut sink = FailingSink::new(100);
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            export_ndjson(cursor_of(numbered_rows(10_000)), &mut sink, &small()),
        )
        .await
        .expect("export must not hang");

        let err = result.unwrap_err();
        assert!(err.is_write());
        assert_eq!(err.stage(), Some(ExportStage::Sink));
    }

    #[tokio::test]
    async fn test_zero_pipe_capacity_still_streams() {
        let options = ExportOptions {
            buffer_size: 0,
            pipe_capacity: 0,
        };
        let mut out = Vec::new();
        let result = export_ndjson(cursor_of(example_rows()), &mut out, &options)
            .await
            .unwrap();
        assert_eq!(result.rows_exported, 2);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "{\"a\":1,\"b\":null}\n{\"a\":2,\"b\":\"x\"}\n"
        );
    }

    /// Slow cursor that flags when it is dropped
    struct DropFlagCursor {
        remaining: i64,
        dropped: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Cursor for DropFlagCursor {
        async fn next_row(&mut self) -> Result<Option<Row>> {
            if self.remaining == 0 {
                return Ok(None);
            }
            self.remaining -= 1;
            tokio::time::sleep(Duration::from_millis(1)).await;
            Ok(Some(Row::new().with("id", self.remaining)))
        }
    }

    impl Drop for DropFlagCursor {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_sink_failure_releases_cursor_before_returning() {
        let dropped = Arc::new(AtomicBool::new(false));
        let cursor = DropFlagCursor {
            remaining: 1_000,
            dropped: dropped.clone(),
        };
        let mut sink = FailingSink::new(10);

        let result = tokio::time::timeout(
            Duration::from_secs(10),
            export_ndjson(Box::new(cursor), &mut sink, &small()),
        )
        .await
        .expect("export must not hang");

        assert!(result.unwrap_err().is_write());
        assert!(dropped.load(Ordering::SeqCst), "cursor outlived the export");
    }

    /// Counts rows handed out by the cursor
    struct CountingCursor {
        remaining: u64,
        produced: Arc<AtomicU64>,
    }

    #[async_trait]
    impl Cursor for CountingCursor {
        async fn next_row(&mut self) -> Result<Option<Row>> {
            if self.remaining == 0 {
                return Ok(None);
            }
            self.remaining -= 1;
            let n = self.produced.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Some(Row::new().with("n", n as i64).with("pad", "xxxxxxxxxx")))
        }
    }

    /// Sink that records how far the producer ran ahead of emitted lines
    struct LaggingSink {
        produced: Arc<AtomicU64>,
        lines: u64,
        max_in_flight: u64,
    }

    impl AsyncWrite for LaggingSink {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            let produced = self.produced.load(Ordering::SeqCst);
            let in_flight = produced.saturating_sub(self.lines);
            self.max_in_flight = self.max_in_flight.max(in_flight);
            self.lines += buf.iter().filter(|b| **b == b'\n').count() as u64;
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_backpressure_bounds_in_flight_rows() {
        let produced = Arc::new(AtomicU64::new(0));
        let cursor = CountingCursor {
            remaining: 5_000,
            produced: produced.clone(),
        };
        let mut sink = LaggingSink {
            produced: produced.clone(),
            lines: 0,
            max_in_flight: 0,
        };

        let result = export_ndjson(Box::new(cursor), &mut sink, &small()).await.unwrap();
        assert_eq!(result.rows_exported, 5_000);
        assert_eq!(sink.lines, 5_000);
        // ~30 bytes per row against 3 x 256 bytes of buffering
        assert!(sink.max_in_flight < 64, "max in flight: {}", sink.max_in_flight);
    }
}
