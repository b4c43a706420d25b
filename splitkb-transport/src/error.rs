//! Transport error types

use thiserror::Error;

/// Errors that can occur during transport operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The chooser returned a product id that is known but not supported yet
    #[error("Unsupported device: PID 0x{pid:04X}")]
    UnsupportedDevice { pid: u16 },

    /// Pending request drained because its handle went away
    #[error("Connection closed")]
    ConnectionClosed,

    #[error("VIA command timeout (0x{cmd:02X}) after {timeout_ms}ms")]
    Timeout { cmd: u8, timeout_ms: u64 },

    /// `open()` on a handle that is already open (stale leftover)
    #[error("Device already open: {0}")]
    AlreadyOpen(String),

    #[error("Device not open")]
    NotOpen,

    /// A newer request for the same opcode replaced this one
    #[error("Request for 0x{cmd:02X} superseded by a newer request")]
    Superseded { cmd: u8 },

    #[error("HID error: {0}")]
    HidError(String),

    /// Output report rejected by the OS/firmware ("not allowed")
    #[error("HID permission denied: {0}")]
    HidPermissionDenied(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TransportError {
    /// True for the write-rejection signature of a wedged USB stack
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, TransportError::HidPermissionDenied(_))
    }
}

impl From<hidapi::HidError> for TransportError {
    fn from(e: hidapi::HidError) -> Self {
        let msg = e.to_string();
        if msg.contains("Permission denied") || msg.contains("EPERM") || msg.contains("EACCES")
        {
            TransportError::HidPermissionDenied(msg)
        } else {
            TransportError::HidError(msg)
        }
    }
}
