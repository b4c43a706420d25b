//! Common types for transport layer

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::device_registry::{PID_LEFT, PID_RIGHT};
use crate::protocol::{Report, REPORT_SIZE};

/// One physical unit of the split keyboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Half {
    Left,
    Right,
}

impl Half {
    pub const ALL: [Half; 2] = [Half::Left, Half::Right];

    /// USB product id this half enumerates with
    pub fn product_id(self) -> u16 {
        match self {
            Half::Left => PID_LEFT,
            Half::Right => PID_RIGHT,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Half::Left => "left",
            Half::Right => "right",
        }
    }

    pub fn other(self) -> Half {
        match self {
            Half::Left => Half::Right,
            Half::Right => Half::Left,
        }
    }
}

impl fmt::Display for Half {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Half {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "left" | "l" => Ok(Half::Left),
            "right" | "r" => Ok(Half::Right),
            _ => Err(format!("unknown half: \"{s}\"")),
        }
    }
}

/// Device identification information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleInfo {
    /// USB Vendor ID
    pub vid: u16,
    /// USB Product ID
    pub pid: u16,
    /// Device path or identifier (backend-specific)
    pub device_path: String,
    /// Product name if available
    pub product_name: Option<String>,
}

/// Vendor/product pair accepted by a device chooser
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceFilter {
    pub vendor_id: u16,
    pub product_id: u16,
}

impl DeviceFilter {
    pub fn matches(&self, vid: u16, pid: u16) -> bool {
        self.vendor_id == vid && self.product_id == pid
    }
}

/// Inbound notification from an open handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// One input report (a VIA response frame)
    InputReport {
        half: Half,
        generation: u64,
        data: Report,
    },
    /// The device went away underneath us
    Disconnected { half: Half, generation: u64 },
}

impl DeviceEvent {
    pub fn half(&self) -> Half {
        match self {
            DeviceEvent::InputReport { half, .. } | DeviceEvent::Disconnected { half, .. } => {
                *half
            }
        }
    }

    pub fn generation(&self) -> u64 {
        match self {
            DeviceEvent::InputReport { generation, .. }
            | DeviceEvent::Disconnected { generation, .. } => *generation,
        }
    }
}

/// Where a handle delivers its inbound reports and disconnect notice.
///
/// Each sink is stamped with the half and registration generation it was
/// created for, so the receiver can drop events from superseded handles.
#[derive(Debug, Clone)]
pub struct EventSink {
    half: Half,
    generation: u64,
    tx: mpsc::UnboundedSender<DeviceEvent>,
}

impl EventSink {
    pub fn new(half: Half, generation: u64, tx: mpsc::UnboundedSender<DeviceEvent>) -> Self {
        Self {
            half,
            generation,
            tx,
        }
    }

    pub fn half(&self) -> Half {
        self.half
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Forward one input report. Short frames are zero-padded, long ones
    /// truncated to the report size. Returns false once the receiver is gone.
    pub fn input_report(&self, data: &[u8]) -> bool {
        let mut report = [0u8; REPORT_SIZE];
        let n = data.len().min(REPORT_SIZE);
        report[..n].copy_from_slice(&data[..n]);
        self.tx
            .send(DeviceEvent::InputReport {
                half: self.half,
                generation: self.generation,
                data: report,
            })
            .is_ok()
    }

    pub fn disconnected(&self) -> bool {
        self.tx
            .send(DeviceEvent::Disconnected {
                half: self.half,
                generation: self.generation,
            })
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_half_parse_and_display() {
        assert_eq!("left".parse::<Half>(), Ok(Half::Left));
        assert_eq!("R".parse::<Half>(), Ok(Half::Right));
        assert!("middle".parse::<Half>().is_err());
        assert_eq!(Half::Right.to_string(), "right");
        assert_eq!(Half::Left.other(), Half::Right);
    }

    #[test]
    fn test_sink_pads_short_frames() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(Half::Left, 7, tx);
        assert!(sink.input_report(&[0x04, 0x00, 0x01]));

        match rx.try_recv().unwrap() {
            DeviceEvent::InputReport {
                half,
                generation,
                data,
            } => {
                assert_eq!(half, Half::Left);
                assert_eq!(generation, 7);
                assert_eq!(&data[..3], &[0x04, 0x00, 0x01]);
                assert!(data[3..].iter().all(|&b| b == 0));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_sink_reports_closed_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(Half::Right, 1, tx);
        drop(rx);
        assert!(!sink.disconnected());
    }
}
