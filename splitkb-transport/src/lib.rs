//! Transport layer for split keyboard halves speaking the VIA protocol
//!
//! This crate provides:
//!
//! - the VIA wire codec (32-byte command packets, typed requests/responses)
//! - `ViaManager`, which correlates asynchronous input reports with the
//!   request that caused them (opcode-only, no transaction id on the wire)
//! - the `HidHandle` abstraction over one half's raw-HID connection, with a
//!   hidapi backend and a device chooser
//! - a virtual VIA keyboard behind the `mock` feature

pub mod command;
pub mod device_registry;
pub mod error;
pub mod manager;
pub mod protocol;
pub mod types;

mod discovery;
mod hid_raw;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use command::{
    Echo, GetKeyboardValue, GetKeycode, GetLayerCount, GetProtocolVersion, JumpToBootloader,
    KeyboardValueResponse, KeycodeResponse, LayerCountResponse, ParseError,
    ProtocolVersionResponse, ResetKeymap, ResetKeymapAck, SetKeyboardValue, SetKeyboardValueAck,
    SetKeycode, SetKeycodeAck, ViaCommand, ViaResponse,
};
pub use device_registry::{
    chooser_filters, half_for_pid, is_reserved_pid, PID_LEFT, PID_RESERVED, PID_RIGHT, VENDOR_ID,
};
pub use discovery::{DeviceChooser, HidChooser, ListedDevice};
pub use error::TransportError;
pub use hid_raw::HidRawHandle;
pub use manager::ViaManager;
pub use protocol::{Report, REPORT_SIZE, VIA_PROTOCOL_VERSION};
pub use types::{DeviceEvent, DeviceFilter, EventSink, HandleInfo, Half};

use async_trait::async_trait;
use std::sync::Arc;

/// One half's transport connection
///
/// Mirrors the lifecycle of a WebHID/hidraw device object: it can be handed
/// out already open (left over from an earlier session), opened and closed
/// repeatedly, and pushes its inbound traffic into an attached `EventSink`.
#[async_trait]
pub trait HidHandle: Send + Sync {
    /// Get device information
    fn info(&self) -> &HandleInfo;

    /// Whether the handle currently holds an open connection
    fn is_opened(&self) -> bool;

    /// Open the connection. Fails with `AlreadyOpen` if it is open already.
    async fn open(&self) -> Result<(), TransportError>;

    /// Close the connection and stop event delivery. Completes only once the
    /// underlying device has actually been released.
    async fn close(&self) -> Result<(), TransportError>;

    /// Transmit one output report
    ///
    /// # Arguments
    /// * `report_id` - HID report id (0 for raw HID)
    /// * `data` - Report payload (32 bytes for VIA)
    async fn send_report(&self, report_id: u8, data: &[u8]) -> Result<(), TransportError>;

    /// Route inbound reports and the disconnect notice to `sink`,
    /// replacing any previously attached sink
    fn attach(&self, sink: EventSink);
}

/// Type alias for a shared handle
pub type SharedHandle = Arc<dyn HidHandle>;
