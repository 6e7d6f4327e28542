//! scratchdata runtime library
//!
//! Streams destination query results to a byte sink as CSV, a JSON array,
//! or newline-delimited JSON, and supervises the long-running subsystems
//! of a scratchdata process.
//!
//! # Modules
//!
//! - `cli`: Command-line interface and the query/serve commands
//! - `config`: Configuration management
//! - `destination`: Destination contract, cursors, rows and the registry
//! - `error`: Error types and handling
//! - `export`: Format writers and the NDJSON bridge
//! - `monitor`: Destination health monitor subsystem
//! - `supervisor`: Subsystem lifecycle and graceful shutdown
//!
//! # Example
//!
//! ```
//! use scratchdata::destination::{Destination, MemoryDestination, Row, Value};
//!
//! # tokio_test::block_on(async {
//! let destination = MemoryDestination::new(
//!     "local",
//!     vec![
//!         Row::new().with("a", 1).with("b", Value::Null),
//!         Row::new().with("a", 2).with("b", "x"),
//!     ],
//! );
//!
//! let mut out = Vec::new();
//! destination.query_ndjson("select * from t", &mut out).await?;
//! assert_eq!(out, b"{\"a\":1,\"b\":null}\n{\"a\":2,\"b\":\"x\"}\n");
//! # Ok::<(), scratchdata::ScratchError>(())
//! # }).unwrap();
//! ```

pub mod cli;
pub mod config;
pub mod destination;
pub mod error;
pub mod export;
pub mod monitor;
pub mod supervisor;

// Re-export commonly used types
pub use config::Config;
pub use destination::{Cursor, Destination, DestinationRegistry, Row, Value};
pub use error::{Result, ScratchError};
pub use export::{ExportFormat, ExportOptions, ExportResult};
pub use supervisor::{Lifecycle, Subsystem, Supervisor};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library version string
///
/// # Returns
/// * `&str` - Version string
pub fn version() -> &'static str {
    VERSION
}
