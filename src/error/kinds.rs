use std::{fmt, io};

use crate::supervisor::Lifecycle;

/// Crate-wide `Result` type using [`ScratchError`] as the error.
///
/// This alias is re-exported by the parent `error` module and is intended
/// to be used throughout the crate for fallible operations.
pub type Result<T> = std::result::Result<T, ScratchError>;

/// Top-level error type for the runtime core.
///
/// This type wraps more specific error kinds and provides a single
/// error type that can be used throughout the crate.
#[derive(Debug)]
pub enum ScratchError {
    /// Destination connection errors.
    Connection(ConnectionError),

    /// Query execution or row fetch errors.
    Query(QueryError),

    /// A value could not be represented in the target format.
    Encode(EncodeError),

    /// The output sink reported an I/O failure.
    Write(io::Error),

    /// The re-encoder could not decode the intermediate JSON stream.
    Decode(DecodeError),

    /// Work aborted because of shutdown.
    Cancelled(String),

    /// Supervisor lifecycle misuse.
    Supervisor(SupervisorError),

    /// Configuration errors.
    Config(ConfigError),

    /// I/O errors outside of an export sink (files, stdin).
    Io(io::Error),

    /// An export failure annotated with the stage it happened in.
    Export {
        stage: ExportStage,
        source: Box<ScratchError>,
    },

    /// Generic error with a free-form message.
    Generic(String),
}

/// Stage of an export at which a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStage {
    /// Executing the query against the destination.
    Query,

    /// Fetching the first row to discover columns.
    ColumnDiscovery,

    /// Writing the header or opening token.
    Header,

    /// Fetching, encoding or writing the n-th row (1-indexed).
    Row(u64),

    /// Writing the trailer and flushing the sink.
    Flush,

    /// Decoding the intermediate JSON array stream.
    Decode,

    /// Writing a re-encoded line to the caller's sink.
    Sink,
}

/// Destination connection errors.
#[derive(Debug)]
pub enum ConnectionError {
    /// Failed to establish a connection.
    ConnectionFailed(String),

    /// The destination has already been closed.
    Closed(String),

    /// No destination registered under this name.
    UnknownDestination(String),
}

/// Query errors.
#[derive(Debug)]
pub enum QueryError {
    /// The destination rejected or failed the query.
    Failed(String),

    /// The cursor failed while fetching a row.
    Fetch { row: u64, message: String },
}

/// Encoding errors.
#[derive(Debug)]
pub enum EncodeError {
    /// The value has no representation in the target format.
    NotRepresentable { column: String, reason: String },

    /// Serializer failure.
    Serialize(String),
}

/// Errors raised while decoding the JSON array stream.
#[derive(Debug)]
pub enum DecodeError {
    /// A structural token other than the expected one.
    UnexpectedToken { expected: String, found: String },

    /// The stream ended before the closing bracket.
    UnexpectedEof,

    /// Non-whitespace data after the closing bracket.
    TrailingData,

    /// An array element was not a valid JSON object.
    InvalidElement(String),
}

/// Supervisor misuse errors.
#[derive(Debug)]
pub enum SupervisorError {
    /// Operation is not valid in the current lifecycle state.
    InvalidState {
        operation: &'static str,
        state: Lifecycle,
    },

    /// A subsystem with this name was already registered.
    DuplicateSubsystem(String),
}

/// Configuration-specific errors.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file not found.
    FileNotFound(String),

    /// Invalid config format.
    InvalidFormat(String),

    /// Missing required field.
    MissingField(String),

    /// Invalid field value.
    InvalidValue { field: String, value: String },
}

impl ScratchError {
    /// Annotate this error with the export stage it occurred in.
    ///
    /// Errors that already carry a stage keep their original annotation,
    /// so the innermost (first observed) stage wins.
    pub fn at(self, stage: ExportStage) -> Self {
        match self {
            ScratchError::Export { .. } => self,
            other => ScratchError::Export {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// The export stage this error was annotated with, if any.
    pub fn stage(&self) -> Option<ExportStage> {
        match self {
            ScratchError::Export { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// The underlying error with any stage annotation stripped.
    pub fn root(&self) -> &ScratchError {
        match self {
            ScratchError::Export { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether the underlying error is a sink write failure.
    pub fn is_write(&self) -> bool {
        matches!(self.root(), ScratchError::Write(_))
    }

    /// Convert a read error from an in-memory pipe back into the error the
    /// writing side closed the pipe with.
    ///
    /// Plain I/O errors become [`ScratchError::Io`].
    pub(crate) fn from_pipe_read(err: io::Error) -> Self {
        let carries_error = err
            .get_ref()
            .is_some_and(|inner| inner.is::<ScratchError>());
        if !carries_error {
            return ScratchError::Io(err);
        }
        match err.into_inner().map(|inner| inner.downcast::<ScratchError>()) {
            Some(Ok(original)) => *original,
            Some(Err(other)) => ScratchError::Generic(other.to_string()),
            None => ScratchError::Generic("pipe closed with an unknown error".to_string()),
        }
    }
}

/* ========================= Display & Error impls ========================= */

impl fmt::Display for ScratchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScratchError::Connection(e) => write!(f, "Connection error: {e}"),
            ScratchError::Query(e) => write!(f, "Query error: {e}"),
            ScratchError::Encode(e) => write!(f, "Encode error: {e}"),
            ScratchError::Write(e) => write!(f, "Write error: {e}"),
            ScratchError::Decode(e) => write!(f, "Decode error: {e}"),
            ScratchError::Cancelled(msg) => write!(f, "Cancelled: {msg}"),
            ScratchError::Supervisor(e) => write!(f, "Supervisor error: {e}"),
            ScratchError::Config(e) => write!(f, "Configuration error: {e}"),
            ScratchError::Io(e) => write!(f, "I/O error: {e}"),
            ScratchError::Export { stage, source } => write!(f, "{stage}: {source}"),
            ScratchError::Generic(msg) => write!(f, "{msg}"),
        }
    }
}

impl fmt::Display for ExportStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportStage::Query => write!(f, "query"),
            ExportStage::ColumnDiscovery => write!(f, "column discovery"),
            ExportStage::Header => write!(f, "header"),
            ExportStage::Row(n) => write!(f, "row {n}"),
            ExportStage::Flush => write!(f, "flush"),
            ExportStage::Decode => write!(f, "decode"),
            ExportStage::Sink => write!(f, "sink"),
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::ConnectionFailed(msg) => write!(f, "Failed to connect: {msg}"),
            ConnectionError::Closed(name) => write!(f, "Destination '{name}' is closed"),
            ConnectionError::UnknownDestination(name) => {
                write!(f, "Unknown destination: {name}")
            }
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::Failed(msg) => write!(f, "Query failed: {msg}"),
            QueryError::Fetch { row, message } => {
                write!(f, "Failed to fetch row {row}: {message}")
            }
        }
    }
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::NotRepresentable { column, reason } => {
                write!(f, "Column '{column}' is not representable: {reason}")
            }
            EncodeError::Serialize(msg) => write!(f, "Serialization failed: {msg}"),
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::UnexpectedToken { expected, found } => {
                write!(f, "Expected '{expected}', found '{found}'")
            }
            DecodeError::UnexpectedEof => write!(f, "Unexpected end of stream"),
            DecodeError::TrailingData => write!(f, "Trailing data after closing bracket"),
            DecodeError::InvalidElement(msg) => write!(f, "Invalid array element: {msg}"),
        }
    }
}

impl fmt::Display for SupervisorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupervisorError::InvalidState { operation, state } => {
                write!(f, "Cannot {operation} while {state}")
            }
            SupervisorError::DuplicateSubsystem(name) => {
                write!(f, "Subsystem already registered: {name}")
            }
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {path}"),
            ConfigError::InvalidFormat(msg) => write!(f, "Invalid config format: {msg}"),
            ConfigError::MissingField(field) => write!(f, "Missing required field: {field}"),
            ConfigError::InvalidValue { field, value } => {
                write!(f, "Invalid value '{value}' for field '{field}'")
            }
        }
    }
}

impl std::error::Error for ScratchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScratchError::Write(e) | ScratchError::Io(e) => Some(e),
            ScratchError::Export { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}
impl std::error::Error for ConnectionError {}
impl std::error::Error for QueryError {}
impl std::error::Error for EncodeError {}
impl std::error::Error for DecodeError {}
impl std::error::Error for SupervisorError {}
impl std::error::Error for ConfigError {}

/* ========================= Conversions to ScratchError ========================= */

impl From<io::Error> for ScratchError {
    fn from(err: io::Error) -> Self {
        ScratchError::Io(err)
    }
}

impl From<ConnectionError> for ScratchError {
    fn from(err: ConnectionError) -> Self {
        ScratchError::Connection(err)
    }
}

impl From<QueryError> for ScratchError {
    fn from(err: QueryError) -> Self {
        ScratchError::Query(err)
    }
}

impl From<EncodeError> for ScratchError {
    fn from(err: EncodeError) -> Self {
        ScratchError::Encode(err)
    }
}

impl From<DecodeError> for ScratchError {
    fn from(err: DecodeError) -> Self {
        ScratchError::Decode(err)
    }
}

impl From<SupervisorError> for ScratchError {
    fn from(err: SupervisorError) -> Self {
        ScratchError::Supervisor(err)
    }
}

impl From<ConfigError> for ScratchError {
    fn from(err: ConfigError) -> Self {
        ScratchError::Config(err)
    }
}

impl From<String> for ScratchError {
    fn from(msg: String) -> Self {
        ScratchError::Generic(msg)
    }
}

impl From<&str> for ScratchError {
    fn from(msg: &str) -> Self {
        ScratchError::Generic(msg.to_owned())
    }
}
