//! Error handling for Sinterkit
//!
//! Provides error types for all layers of the stack:
//! - Transport errors (serial port, I/O)
//! - Protocol errors (malformed or unexpected controller replies)
//! - Validation errors (soft limits, configuration)
//! - Control errors (hardware faults, timeouts, cancellation, state machine violations)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Transport error type
///
/// Represents errors raised while opening or exchanging bytes with a
/// serial port (or a mock standing in for one).
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// Port not found
    #[error("Port not found: {port}")]
    PortNotFound {
        /// The name of the port that was not found.
        port: String,
    },

    /// Port is already in use
    #[error("Port already in use: {port}")]
    PortInUse {
        /// The name of the port that is in use.
        port: String,
    },

    /// Failed to open port
    #[error("Failed to open port {port}: {reason}")]
    FailedToOpen {
        /// The name of the port that failed to open.
        port: String,
        /// The reason the port failed to open.
        reason: String,
    },

    /// No reply arrived within the read deadline
    #[error("Read timed out after {timeout_ms}ms")]
    ReadTimeout {
        /// The timeout duration in milliseconds.
        timeout_ms: u64,
    },

    /// Write failed
    #[error("Write failed: {reason}")]
    WriteFailed {
        /// The reason the write failed.
        reason: String,
    },

    /// Read failed
    #[error("Read failed: {reason}")]
    ReadFailed {
        /// The reason the read failed.
        reason: String,
    },

    /// Port disconnected mid-session
    #[error("Port disconnected: {reason}")]
    Disconnected {
        /// The reason the port disconnected.
        reason: String,
    },

    /// Invalid transport parameters
    #[error("Invalid transport parameters: {reason}")]
    InvalidParameters {
        /// The reason the parameters are invalid.
        reason: String,
    },
}

/// Protocol error type
///
/// Represents errors raised while decoding controller reply lines.
#[derive(Error, Debug, Clone)]
pub enum ProtocolError {
    /// Reply line did not match any known reply shape
    #[error("Malformed reply line: {line:?}")]
    MalformedReply {
        /// The offending reply line, verbatim.
        line: String,
    },

    /// Reply decoded cleanly but was the wrong kind for the command sent
    #[error("Unexpected reply: expected {expected}, got {got}")]
    UnexpectedReply {
        /// What kind of reply the command called for.
        expected: String,
        /// What actually came back.
        got: String,
    },
}

/// Validation error type
///
/// Represents errors caught host-side before any bytes reach the wire.
#[derive(Error, Debug, Clone)]
pub enum ValidationError {
    /// Requested target lies outside the motor's soft limits
    #[error("Axis {axis}: target {requested} outside soft limits [{min}, {max}]")]
    OutOfRange {
        /// The axis number of the rejected move.
        axis: u8,
        /// The requested target position in millimeters.
        requested: f64,
        /// The lower soft limit.
        min: f64,
        /// The upper soft limit.
        max: f64,
    },

    /// No motor is attached for the requested axis
    #[error("No motor attached for axis {axis}")]
    UnknownAxis {
        /// The axis number with no attached motor.
        axis: u8,
    },

    /// Configuration failed validation
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// The reason the configuration is invalid.
        reason: String,
    },
}

/// Control error type
///
/// Represents errors surfaced while driving a motion controller:
/// hardware faults reported by the firmware, stop-confirmation
/// timeouts, cancellation, and state machine violations.
#[derive(Error, Debug, Clone)]
pub enum ControlError {
    /// Firmware reported a fault for the axis
    #[error("Axis {axis} fault {code}: {message}")]
    Hardware {
        /// The axis that reported the fault.
        axis: u8,
        /// The firmware fault code.
        code: u8,
        /// The decoded fault message.
        message: String,
    },

    /// Axis never reported stopped within the poll budget
    #[error("Axis {axis} did not report stopped after {attempts} status polls")]
    StopTimeout {
        /// The axis that never stopped.
        axis: u8,
        /// How many status polls were attempted.
        attempts: u32,
    },

    /// Command was cancelled before completion
    #[error("Command cancelled before completion")]
    Cancelled,

    /// Invalid state transition
    #[error("Invalid state transition from {current} on {event}")]
    InvalidStateTransition {
        /// The current state name.
        current: String,
        /// The event that was rejected.
        event: String,
    },

    /// Generic control error
    #[error("Control error: {message}")]
    Other {
        /// The error message.
        message: String,
    },
}

/// Main error type for Sinterkit
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport error
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Protocol error
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Validation error
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Control error
    #[error(transparent)]
    Control(#[from] ControlError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Aggregated failures from a multi-axis move
    #[error("Multi-axis move failed on {} of {} axes", .failures.len(), .attempted)]
    MultiAxis {
        /// How many axes the move was issued to.
        attempted: usize,
        /// Per-axis failures, in issue order.
        failures: Vec<(u8, Error)>,
    },

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::Transport(TransportError::ReadTimeout { .. })
                | Error::Control(ControlError::StopTimeout { .. })
        )
    }

    /// Check if this is a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Control(ControlError::Cancelled))
    }

    /// Check if this is a host-side validation error
    pub fn is_validation_error(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    /// Check if this is a firmware-reported hardware fault
    pub fn is_hardware_fault(&self) -> bool {
        matches!(self, Error::Control(ControlError::Hardware { .. }))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;

// Conversions between error types are automatic via `from` implementations
