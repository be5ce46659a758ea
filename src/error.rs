//! Error types for the sleep-protocol-ble crate.

use thiserror::Error;

use crate::protocol::tags::ProtocolId;

/// Errors produced while routing a single notification frame.
///
/// These are terminal for the offending frame only. Accumulator state is left
/// untouched and the next frame is processed normally.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The frame is shorter than the header its tag requires.
    #[error("Frame too short: {len} bytes, need at least {required}")]
    FrameTooShort {
        /// Length of the received frame.
        len: usize,
        /// Minimum length for the frame's tag.
        required: usize,
    },

    /// The leading byte is not a known protocol tag.
    #[error("Unknown protocol tag: {tag:#04x}")]
    UnknownTag {
        /// The unrecognized tag byte.
        tag: u8,
    },
}

/// Errors produced by a single upload.
///
/// An upload error loses that one batch (the accumulator was already drained)
/// but never ends the session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    /// The request could not be delivered or the backend rejected it.
    #[error("Network failure for {protocol}: {reason}")]
    NetworkFailure {
        /// Protocol whose upload failed.
        protocol: ProtocolId,
        /// Description of the failure.
        reason: String,
    },

    /// A payload or response could not be decoded.
    #[error("Decode failure for {protocol}: {reason}")]
    DecodeFailure {
        /// Protocol whose data could not be decoded.
        protocol: ProtocolId,
        /// Description of what was malformed.
        reason: String,
    },

    /// The task running the upload panicked or was cancelled.
    #[error("Upload task for {protocol} failed: {reason}")]
    TaskFailed {
        /// Protocol whose upload task failed.
        protocol: ProtocolId,
        /// Description of the task failure.
        reason: String,
    },
}

impl UploadError {
    /// Protocol the failed upload belonged to.
    pub fn protocol(&self) -> ProtocolId {
        match self {
            Self::NetworkFailure { protocol, .. }
            | Self::DecodeFailure { protocol, .. }
            | Self::TaskFailed { protocol, .. } => *protocol,
        }
    }

    /// Whether a retry could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkFailure { .. })
    }
}

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// A frame could not be routed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// An upload failed.
    #[error(transparent)]
    Upload(#[from] UploadError),

    /// JSON (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Characteristic not found on the device.
    #[error("Characteristic not found: {uuid}")]
    CharacteristicNotFound {
        /// The UUID of the characteristic that was not found.
        uuid: String,
    },

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter {
        /// The name of the parameter.
        name: String,
        /// The invalid value that was provided.
        value: String,
    },

    /// No tokio runtime was available to run background uploads.
    #[error("No tokio runtime available: {0}")]
    NoRuntime(String),
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
