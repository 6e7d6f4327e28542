//! In-process destination
//!
//! Holds an ordered table of rows and answers every query with a cursor
//! over that table. It can be seeded from an NDJSON file, one object per
//! row, which makes it useful for local runs and for tests.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use crate::error::{ConfigError, ConnectionError, QueryError, Result};

use super::cursor::{Cursor, TableCursor};
use super::row::{Column, Row};
use super::Destination;

/// Destination backed by an in-memory table
pub struct MemoryDestination {
    name: String,
    rows: Arc<Vec<Row>>,
    columns: Option<Vec<Column>>,
    closed: AtomicBool,
}

impl MemoryDestination {
    pub fn new(name: impl Into<String>, rows: Vec<Row>) -> Self {
        Self {
            name: name.into(),
            rows: Arc::new(rows),
            columns: None,
            closed: AtomicBool::new(false),
        }
    }

    /// Declare the column order cursors report
    pub fn with_columns(mut self, columns: Vec<Column>) -> Self {
        self.columns = Some(columns);
        self
    }

    /// Load a table from an NDJSON file
    ///
    /// Blank lines are skipped; every other line must be a JSON object.
    ///
    /// # Arguments
    /// * `name` - Destination name
    /// * `path` - Path to the NDJSON seed file
    pub async fn from_ndjson_file(name: impl Into<String>, path: &Path) -> Result<Self> {
        let file = tokio::fs::File::open(path).await.map_err(|e| {
            ConfigError::FileNotFound(format!("{}: {}", path.display(), e))
        })?;
        let mut lines = BufReader::new(file).lines();

        let mut rows = Vec::new();
        let mut line_number = 0u64;
        while let Some(line) = lines.next_line().await? {
            line_number += 1;
            if line.trim().is_empty() {
                continue;
            }
            let object: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&line)
                .map_err(|e| ConfigError::InvalidFormat(format!(
                    "{} line {}: {}",
                    path.display(),
                    line_number,
                    e
                )))?;
            let row = Row::from_json_object(object).map_err(|reason| {
                ConfigError::InvalidFormat(format!(
                    "{} line {}: {}",
                    path.display(),
                    line_number,
                    reason
                ))
            })?;
            rows.push(row);
        }

        debug!("Loaded {} rows from {}", rows.len(), path.display());
        Ok(Self::new(name, rows))
    }

    /// Number of rows in the table
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ConnectionError::Closed(self.name.clone()).into());
        }
        Ok(())
    }
}

#[async_trait]
impl Destination for MemoryDestination {
    fn name(&self) -> &str {
        &self.name
    }

    async fn query(&self, query: &str) -> Result<Box<dyn Cursor>> {
        self.ensure_open()?;
        if query.trim().is_empty() {
            return Err(QueryError::Failed("empty query".to_string()).into());
        }
        debug!("Memory destination '{}' serving {} rows", self.name, self.rows.len());
        Ok(Box::new(TableCursor::new(
            self.rows.clone(),
            self.columns.clone(),
        )))
    }

    async fn ping(&self) -> Result<()> {
        self.ensure_open()
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        debug!("Closed memory destination '{}'", self.name);
        Ok(())
    }
}
