//! Error types

use thiserror::Error;

/// A response could not be turned into a sample
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The response was shorter or longer than a status frame. A read timeout
    /// ends up here too, as a short read.
    #[error("Incomplete frame: expected {expected} bytes, got {actual}")]
    IncompleteFrame { expected: usize, actual: usize },
}

/// The byte stream to the BMS failed
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport closed")]
    Closed,
}

/// A record could not be appended to the log
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Log I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Reasons a telemetry session stops on its own
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Gave up after {count} consecutive bad frames")]
    TooManyFailures { count: u32 },
}
