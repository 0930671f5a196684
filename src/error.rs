//! Error types for model construction, external channels, output and restart text.

use thiserror::Error;

/// Errors detected while building nodes, drives, elements or output channels.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Stream drive declared with no channels.
    #[error("stream drive {label}: illegal number of channels {channels}")]
    InvalidChannelCount { label: u32, channels: i64 },

    /// Socket port falls in the reserved range.
    #[error("stream drive {label}: cannot use reserved port {port} (must be >= {min})")]
    ReservedPort { label: u32, port: u16, min: u16 },

    /// Host or port given together with a local socket path.
    #[error("stream drive {label}: cannot specify {what} for a local socket")]
    LocalSocketConflict { label: u32, what: &'static str },

    #[error("stream drive {label}: invalid \"input every\" value {value}")]
    InvalidInputEvery { label: u32, value: i64 },

    #[error("stream drive {label}: invalid socket timeout value {value}")]
    InvalidTimeout { label: u32, value: f64 },

    #[error("stream drive {label}: invalid echo precision {value}")]
    InvalidEchoPrecision { label: u32, value: i64 },

    #[error("stream drive {label}: expected {expected} initial values, got {got}")]
    InitialValuesMismatch { label: u32, expected: usize, got: usize },

    #[error("{what}({label}): unknown node {node}")]
    UnknownNode { what: &'static str, label: u32, node: u32 },

    #[error("file drive: unknown stream drive {label}")]
    UnknownStreamDrive { label: u32 },

    #[error("file drive on stream drive {label}: channel {index} out of range 1..={channels}")]
    StreamChannelOutOfRange { label: u32, index: usize, channels: usize },

    #[error("duplicate {what} label {label}")]
    DuplicateLabel { what: &'static str, label: u32 },

    #[error("{what}({label}): null direction")]
    NullDirection { what: &'static str, label: u32 },

    #[error("rod({label}): reference length must be positive, got {length}")]
    InvalidRodLength { label: u32, length: f64 },

    #[error("rod({label}): connects node {node} to itself")]
    CoincidentNodes { label: u32, node: u32 },

    #[error("output: precision must be positive, got {0}")]
    InvalidPrecision(i64),

    #[error("unable to decode model configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("stream drive {label}: {source}")]
    Channel {
        label: u32,
        #[source]
        source: ChannelError,
    },

    #[error("unable to open {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for model construction.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Fatal failures of an external data channel.
///
/// A channel closed by the peer is not an error; the consumer reports it as
/// abandoned and keeps going.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("{name}: timed out after {seconds}s waiting for data")]
    Timeout { name: String, seconds: f64 },

    #[error("{name}: connection reset")]
    Reset { name: String },

    #[error("{name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for external channel operations.
pub type ChannelResult<T> = std::result::Result<T, ChannelError>;

/// Failures writing records to output sinks.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("unable to encode record: {0}")]
    Json(#[from] serde_json::Error),

    #[error("vtk export failed: {0}")]
    Vtk(String),
}

/// Result type for output operations.
pub type OutputResult<T> = std::result::Result<T, OutputError>;

/// Errors reading restart text back into element configurations.
#[derive(Debug, Error, PartialEq)]
pub enum RestartError {
    #[error("unexpected end of statement, expected {0}")]
    UnexpectedEnd(&'static str),

    #[error("expected {expected}, found \"{found}\"")]
    Unexpected { expected: &'static str, found: String },

    #[error("unknown {what} \"{found}\"")]
    UnknownKeyword { what: &'static str, found: String },

    #[error("invalid number \"{0}\"")]
    InvalidNumber(String),

    #[error("trailing tokens after statement: \"{0}\"")]
    Trailing(String),
}

/// Result type for restart parsing.
pub type RestartResult<T> = std::result::Result<T, RestartError>;
