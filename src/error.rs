//! Error types for the RTU slave engine
//!
//! Errors fall into four families, and only the first one ever stops the
//! slave loop:
//!
//! | Family | Variants | Handling |
//! |--------|----------|----------|
//! | Transport | `Transport`, `Io`, `Timeout` | fatal, returned to the caller |
//! | Frame | `Frame` | dropped silently, no response |
//! | Protocol | `Exception` | answered with an exception frame |
//! | Internal | `Internal` | answered with Slave Device Failure, logged |
//!
//! `Configuration` is raised before the loop starts.

use thiserror::Error;

use crate::protocol::ExceptionCode;

/// Result alias used throughout the crate
pub type ModbusResult<T> = Result<T, ModbusError>;

/// Errors produced by the slave engine and its transports
#[derive(Debug, Error)]
pub enum ModbusError {
    /// Serial port unavailable, closed or failing
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// Raw I/O failure on the underlying stream
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A transport operation exceeded its deadline
    #[error("Timeout: {operation} after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// CRC mismatch, truncated or oversized frame
    #[error("Frame error: {message}")]
    Frame { message: String },

    /// Request cannot be honored; becomes an exception response
    #[error("Modbus exception: function=0x{function:02X}, {code}")]
    Exception { function: u8, code: ExceptionCode },

    /// Invariant violation inside the slave
    #[error("Internal error: {message}")]
    Internal { message: String },

    /// Invalid slave or serial configuration
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl ModbusError {
    /// Create a transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(operation: S, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Create a frame error
    pub fn frame<S: Into<String>>(message: S) -> Self {
        Self::Frame {
            message: message.into(),
        }
    }

    /// Create a protocol exception for the given function code
    pub fn exception(function: u8, code: ExceptionCode) -> Self {
        Self::Exception { function, code }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Whether this error must terminate the slave loop
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::Io(_) | Self::Timeout { .. }
        )
    }

    /// Exception code to answer the master with, if this error is answerable.
    ///
    /// Frame errors and transport errors have no answer.
    pub fn exception_code(&self) -> Option<ExceptionCode> {
        match self {
            Self::Exception { code, .. } => Some(*code),
            Self::Internal { .. } => Some(ExceptionCode::SlaveDeviceFailure),
            _ => None,
        }
    }
}

#[cfg(feature = "rtu")]
impl From<tokio_serial::Error> for ModbusError {
    fn from(err: tokio_serial::Error) -> Self {
        Self::transport(err.to_string())
    }
}
