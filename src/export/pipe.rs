//! In-memory byte pipe with a bounded buffer
//!
//! Built on [`tokio::io::duplex`]: writes suspend while the buffer is full
//! until the reader drains it, which is what bounds memory in the NDJSON
//! bridge. On top of that, the writing side can close the pipe with an
//! error; the reader then gets that error instead of a clean end of stream.

use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};

use crate::error::ScratchError;

type ErrorSlot = Arc<Mutex<Option<ScratchError>>>;

/// Write end of a [`pipe`]
pub struct PipeWriter {
    inner: DuplexStream,
    error: ErrorSlot,
}

/// Read end of a [`pipe`]
///
/// Dropping the reader makes every later write on the writer fail with
/// [`io::ErrorKind::BrokenPipe`].
pub struct PipeReader {
    inner: DuplexStream,
    error: ErrorSlot,
}

/// Create a pipe that buffers at most `capacity` bytes
pub fn pipe(capacity: usize) -> (PipeWriter, PipeReader) {
    let (write_half, read_half) = tokio::io::duplex(capacity.max(1));
    let error = ErrorSlot::default();
    (
        PipeWriter {
            inner: write_half,
            error: error.clone(),
        },
        PipeReader {
            inner: read_half,
            error,
        },
    )
}

impl PipeWriter {
    /// Close the pipe, delivering `err` to the reader once it has drained
    /// the bytes already written
    pub fn close_with_error(self, err: ScratchError) {
        *self.error.lock().unwrap_or_else(PoisonError::into_inner) = Some(err);
        // Dropping the duplex half signals end of stream to the reader
    }
}

impl AsyncWrite for PipeWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

impl AsyncRead for PipeReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let wants_data = buf.remaining() > 0;
        match Pin::new(&mut self.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) if wants_data && buf.filled().len() == before => {
                // End of stream: surface the writer's error, if it left one
                let carried = self
                    .error
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take();
                match carried {
                    Some(err) => Poll::Ready(Err(io::Error::other(err))),
                    None => Poll::Ready(Ok(())),
                }
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;
    use crate::error::{ExportStage, QueryError};

    #[tokio::test]
    async fn test_pipe_passes_bytes_and_eof() {
        let (mut writer, mut reader) = pipe(64);
        writer.write_all(b"hello").await.unwrap();
        drop(writer);

        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"hello");
    }

    #[tokio::test]
    async fn test_pipe_write_blocks_when_full() {
        let (mut writer, mut reader) = pipe(8);
        writer.write_all(b"12345678").await.unwrap();

        // Buffer is full: the next write cannot complete until the reader drains
        let blocked = tokio::time::timeout(Duration::from_millis(50), writer.write_all(b"9")).await;
        assert!(blocked.is_err());

        let mut chunk = [0u8; 8];
        reader.read_exact(&mut chunk).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), writer.write_all(b"9"))
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_reader_sees_writer_error_after_data() {
        let (mut writer, mut reader) = pipe(64);
        writer.write_all(b"[1,").await.unwrap();
        writer.close_with_error(
            ScratchError::from(QueryError::Failed("boom".into())).at(ExportStage::Row(2)),
        );

        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).await.unwrap_err();
        assert_eq!(out, b"[1,");

        let original = ScratchError::from_pipe_read(err);
        assert_eq!(original.stage(), Some(ExportStage::Row(2)));
        assert!(matches!(original.root(), ScratchError::Query(QueryError::Failed(_))));
    }

    #[tokio::test]
    async fn test_writer_fails_once_reader_dropped() {
        let (mut writer, reader) = pipe(4);
        drop(reader);
        let err = writer.write_all(b"data").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
