//! Error handling for the runtime core.
//!
//! This module provides:
//! - A single top-level error type, [`ScratchError`], wrapping specific kinds
//! - Export stage annotation, so a failed export reports where it failed
//! - A crate-wide [`Result`] alias
//!
//! # Example
//!
//! ```rust
//! use scratchdata::error::{ExportStage, QueryError, ScratchError};
//!
//! let err = ScratchError::from(QueryError::Failed("syntax".into())).at(ExportStage::Query);
//! assert_eq!(err.stage(), Some(ExportStage::Query));
//! ```

pub mod kinds;

// Re-export commonly used types
pub use kinds::{
    ConfigError, ConnectionError, DecodeError, EncodeError, ExportStage, QueryError, Result,
    ScratchError, SupervisorError,
};
