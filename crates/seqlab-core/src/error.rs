//! The primary error type for the sequence controller.
//!
//! `SeqError` consolidates the taxonomy from spec §7: transport failures,
//! parameter coercion failures, sequence structure errors, and file I/O
//! errors all fold into one enum so step execution can log a full error and
//! either retry or skip without needing to match on five unrelated types.
//!
//! Nothing here is fatal except a process kill (§7 policy): the executor in
//! `seqlab-runtime` always catches a `SeqError`, logs it with context, and
//! advances or retries rather than propagating a panic.

use thiserror::Error;

/// Result alias used throughout the workspace.
pub type SeqResult<T> = std::result::Result<T, SeqError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SeqError {
    /// The transport did not respond before its configured timeout.
    #[error("transport timeout on {address}")]
    TransportTimeout { address: String },

    /// The transport returned a low-level I/O failure (port closed, etc).
    #[error("transport I/O error on {address}: {message}")]
    TransportIo { address: String, message: String },

    /// The bus itself signalled an error condition (SRQ, device error byte).
    #[error("bus error on {address}: {message}")]
    BusError { address: String, message: String },

    /// `open()` was called on an address already held by another handle.
    #[error("address {address} is unavailable (already open)")]
    Unavailable { address: String },

    /// A step referenced a parameter name absent from the instrument's model.
    #[error("unknown parameter {parameter:?} on instrument {instrument:?}")]
    BadParameter {
        instrument: String,
        parameter: String,
    },

    /// A value failed coercion: out of a discrete value/label set, or not a
    /// float for a continuous parameter.
    #[error("bad value for {instrument}--{parameter}: {reason}")]
    BadValue {
        instrument: String,
        parameter: String,
        reason: String,
    },

    /// A write was attempted on a read-only parameter.
    #[error("{instrument}--{parameter} is read-only")]
    ReadOnly {
        instrument: String,
        parameter: String,
    },

    /// A read was attempted on a write-only or action parameter.
    #[error("{instrument}--{parameter} is write-only")]
    WriteOnly {
        instrument: String,
        parameter: String,
    },

    /// A step referenced an instrument name with no active binding.
    #[error("instrument {name:?} is not bound")]
    InstrumentMissing { name: String },

    /// The sequence could not be repaired by `protectLoops` (e.g. a
    /// `LoopEnd` with no matching `Loop` anywhere in the sequence).
    #[error("unrepairable sequence structure: {reason}")]
    StructureError { reason: String },

    /// Cooperative abort: not a failure, an ordinary exit condition.
    #[error("run aborted")]
    AbortRequested,

    /// File writer I/O failure (open/write/close).
    #[error("file I/O error: {0}")]
    IoError(String),
}

impl SeqError {
    /// True for errors the spec says are retryable by the instrument layer
    /// (§4.2 parameter query algorithm: retry on Timeout or on a discrete
    /// value outside the declared set).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SeqError::TransportTimeout { .. } | SeqError::BusError { .. } | SeqError::TransportIo { .. }
        )
    }
}

impl From<std::io::Error> for SeqError {
    fn from(e: std::io::Error) -> Self {
        SeqError::IoError(e.to_string())
    }
}
