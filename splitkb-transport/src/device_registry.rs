//! Product identification for the two keyboard halves
//!
//! Each half enumerates as its own USB device. The product id is the only
//! thing that tells them apart before any VIA command is exchanged.

use crate::types::{DeviceFilter, Half};

/// Vendor ID shared by both halves (QMK prototype vendor)
pub const VENDOR_ID: u16 = 0xFEED;

/// Left half product id
pub const PID_LEFT: u16 = 0x6060;

/// Right half product id
pub const PID_RIGHT: u16 = 0x6061;

/// Reserved for a future numpad module. Listed in the chooser filters so it
/// can be recognized, then rejected.
pub const PID_RESERVED: u16 = 0x6062;

/// QMK raw HID usage page / usage (the VIA endpoint)
pub const RAW_HID_USAGE_PAGE: u16 = 0xFF60;
pub const RAW_HID_USAGE: u16 = 0x61;

/// Map a product id to the half it belongs to
#[inline]
pub fn half_for_pid(pid: u16) -> Option<Half> {
    match pid {
        PID_LEFT => Some(Half::Left),
        PID_RIGHT => Some(Half::Right),
        _ => None,
    }
}

#[inline]
pub fn is_reserved_pid(pid: u16) -> bool {
    pid == PID_RESERVED
}

/// Filters handed to the device chooser: both halves plus the reserved id
pub fn chooser_filters() -> Vec<DeviceFilter> {
    [PID_LEFT, PID_RIGHT, PID_RESERVED]
        .into_iter()
        .map(|product_id| DeviceFilter {
            vendor_id: VENDOR_ID,
            product_id,
        })
        .collect()
}
