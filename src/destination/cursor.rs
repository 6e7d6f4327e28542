//! Lazy, single-pass row sources
//!
//! A [`Cursor`] is what a destination hands back for one query execution.
//! It is consumed exactly once by the export that owns it.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

use super::row::{Column, Row};

/// Sequential source of result rows for one query execution
///
/// `Ok(None)` marks the end of the sequence; `Err` is a fetch failure.
/// Cursors are not restartable.
#[async_trait]
pub trait Cursor: Send {
    /// Ordered column list declared by the destination, if it has one
    fn columns(&self) -> Option<&[Column]> {
        None
    }

    /// Fetch the next row
    async fn next_row(&mut self) -> Result<Option<Row>>;
}

/// Cursor wrapper that buffers at most one row ahead of its caller
///
/// Used for column discovery: the first row is inspected, then handed out
/// again by the next [`next_row`](Cursor::next_row) call.
pub struct PeekableCursor {
    inner: Box<dyn Cursor>,
    peeked: Option<Option<Row>>,
}

impl PeekableCursor {
    pub fn new(inner: Box<dyn Cursor>) -> Self {
        Self {
            inner,
            peeked: None,
        }
    }

    /// Look at the next row without consuming it
    pub async fn peek(&mut self) -> Result<Option<&Row>> {
        if self.peeked.is_none() {
            let next = self.inner.next_row().await?;
            self.peeked = Some(next);
        }
        Ok(self.peeked.as_ref().and_then(Option::as_ref))
    }
}

#[async_trait]
impl Cursor for PeekableCursor {
    fn columns(&self) -> Option<&[Column]> {
        self.inner.columns()
    }

    async fn next_row(&mut self) -> Result<Option<Row>> {
        match self.peeked.take() {
            Some(row) => Ok(row),
            None => self.inner.next_row().await,
        }
    }
}

/// Cursor over a shared, already-materialized table
///
/// Rows are cloned out one at a time, so the cursor itself never holds more
/// than the shared table it was created from.
pub struct TableCursor {
    rows: Arc<Vec<Row>>,
    columns: Option<Vec<Column>>,
    position: usize,
}

impl TableCursor {
    pub fn new(rows: Arc<Vec<Row>>, columns: Option<Vec<Column>>) -> Self {
        Self {
            rows,
            columns,
            position: 0,
        }
    }
}

#[async_trait]
impl Cursor for TableCursor {
    fn columns(&self) -> Option<&[Column]> {
        self.columns.as_deref()
    }

    async fn next_row(&mut self) -> Result<Option<Row>> {
        let row = self.rows.get(self.position).cloned();
        if row.is_some() {
            self.position += 1;
        }
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(n: i64) -> Box<dyn Cursor> {
        let rows = (1..=n).map(|i| Row::new().with("i", i)).collect();
        Box::new(TableCursor::new(Arc::new(rows), None))
    }

    #[tokio::test]
    async fn test_peek_does_not_consume() {
        let mut cursor = PeekableCursor::new(table(2));
        let first = cursor.peek().await.unwrap().cloned();
        assert_eq!(first, Some(Row::new().with("i", 1)));
        // Peeking twice returns the same row
        assert_eq!(cursor.peek().await.unwrap().cloned(), first);
        assert_eq!(cursor.next_row().await.unwrap(), first);
        assert_eq!(cursor.next_row().await.unwrap(), Some(Row::new().with("i", 2)));
        assert_eq!(cursor.next_row().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_peek_empty() {
        let mut cursor = PeekableCursor::new(table(0));
        assert!(cursor.peek().await.unwrap().is_none());
        assert!(cursor.next_row().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_table_cursor_declared_columns() {
        let cursor = TableCursor::new(Arc::new(Vec::new()), Some(vec![Column::new("a")]));
        assert_eq!(cursor.columns().unwrap()[0].name, "a");
    }
}
