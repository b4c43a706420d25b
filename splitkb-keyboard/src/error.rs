//! Keyboard interface error types

use splitkb_transport::{Half, TransportError};
use thiserror::Error;

/// Errors from keyboard operations
#[derive(Error, Debug)]
pub enum KeyboardError {
    /// Transport layer error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Writes were rejected with the permission-denied signature. Both halves
    /// have been disconnected; the keyboard needs a power cycle or a
    /// bootloader reset before it accepts writes again.
    #[error(
        "USB stack stuck on {half} half: writes are rejected. \
         Unplug both halves (or reset into the bootloader) and reconnect"
    )]
    UsbStackStuck { half: Half },

    /// No open handle for the requested half
    #[error("{0} half is not connected")]
    NotConnected(Half),

    /// Invalid parameter value
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Device returned unexpected response
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl KeyboardError {
    pub fn is_usb_stack_stuck(&self) -> bool {
        matches!(self, KeyboardError::UsbStackStuck { .. })
    }
}
