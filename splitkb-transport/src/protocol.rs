//! VIA protocol constants and packet framing
//!
//! Every request and response is a fixed 32-byte raw HID report. Byte 0 is
//! the opcode (echoed in the response), the following bytes are
//! opcode-specific parameters packed big-endian, the rest is zero.

/// Raw HID report size used by QMK/VIA
pub const REPORT_SIZE: usize = 32;

/// One raw HID report
pub type Report = [u8; REPORT_SIZE];

/// VIA protocol version the firmware is expected to report
pub const VIA_PROTOCOL_VERSION: u16 = 0x0009;

/// Report ID used for output reports (raw HID has none)
pub const REPORT_ID: u8 = 0x00;

/// VIA command IDs
pub mod cmd {
    pub const GET_PROTOCOL_VERSION: u8 = 0x01;
    pub const GET_KEYBOARD_VALUE: u8 = 0x02;
    pub const SET_KEYBOARD_VALUE: u8 = 0x03;
    pub const DYNAMIC_KEYMAP_GET_KEYCODE: u8 = 0x04;
    pub const DYNAMIC_KEYMAP_SET_KEYCODE: u8 = 0x05;
    pub const DYNAMIC_KEYMAP_RESET: u8 = 0x0C;
    pub const BOOTLOADER_JUMP: u8 = 0x0D;
    pub const DYNAMIC_KEYMAP_GET_LAYER_COUNT: u8 = 0x11;

    /// Firmware reply for opcodes it does not implement
    pub const UNHANDLED: u8 = 0xFF;

    /// Get human-readable name for command byte
    pub fn name(cmd: u8) -> &'static str {
        match cmd {
            GET_PROTOCOL_VERSION => "GET_PROTOCOL_VERSION",
            GET_KEYBOARD_VALUE => "GET_KEYBOARD_VALUE",
            SET_KEYBOARD_VALUE => "SET_KEYBOARD_VALUE",
            DYNAMIC_KEYMAP_GET_KEYCODE => "DYNAMIC_KEYMAP_GET_KEYCODE",
            DYNAMIC_KEYMAP_SET_KEYCODE => "DYNAMIC_KEYMAP_SET_KEYCODE",
            DYNAMIC_KEYMAP_RESET => "DYNAMIC_KEYMAP_RESET",
            BOOTLOADER_JUMP => "BOOTLOADER_JUMP",
            DYNAMIC_KEYMAP_GET_LAYER_COUNT => "DYNAMIC_KEYMAP_GET_LAYER_COUNT",
            UNHANDLED => "UNHANDLED",
            _ => "UNKNOWN",
        }
    }
}

/// Keyboard value IDs for GET/SET_KEYBOARD_VALUE
pub mod keyboard_value {
    pub const UPTIME: u8 = 0x01;
    pub const LAYOUT_OPTIONS: u8 = 0x02;
    pub const SWITCH_MATRIX_STATE: u8 = 0x03;
    pub const FIRMWARE_VERSION: u8 = 0x04;
    pub const DEVICE_INDICATION: u8 = 0x05;
}

/// Timing constants
pub mod timing {
    /// Default deadline for a response to arrive
    pub const DEFAULT_TIMEOUT_MS: u64 = 1000;
    /// Pause between closing a stale handle and reopening it
    pub const STALE_REOPEN_DELAY_MS: u64 = 100;
    /// Read poll interval of the hidapi reader thread
    pub const READ_POLL_MS: i32 = 10;
}

/// Build a zero-filled packet: opcode at byte 0, params from byte 1.
///
/// Parameters that do not fit in the report are dropped.
pub fn build_packet(cmd: u8, params: &[u8]) -> Report {
    let mut packet = [0u8; REPORT_SIZE];
    packet[0] = cmd;
    let n = params.len().min(REPORT_SIZE - 1);
    packet[1..=n].copy_from_slice(&params[..n]);
    packet
}

/// Read a big-endian u16 at `offset`
#[inline]
pub fn read_u16_be(data: &[u8], offset: usize) -> Option<u16> {
    Some(u16::from_be_bytes([*data.get(offset)?, *data.get(offset + 1)?]))
}

/// Format the first bytes of a report for debug logs
pub fn hex_prefix(data: &[u8], n: usize) -> String {
    data.iter()
        .take(n)
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_packet_layout() {
        let p = build_packet(cmd::DYNAMIC_KEYMAP_SET_KEYCODE, &[1, 2, 3, 0x5C, 0x01]);
        assert_eq!(p.len(), REPORT_SIZE);
        assert_eq!(&p[..6], &[0x05, 1, 2, 3, 0x5C, 0x01]);
        assert!(p[6..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_build_packet_truncates_oversized_params() {
        let params = [0xAB; 40];
        let p = build_packet(cmd::SET_KEYBOARD_VALUE, &params);
        assert_eq!(p[0], cmd::SET_KEYBOARD_VALUE);
        assert!(p[1..].iter().all(|&b| b == 0xAB));
    }

    #[test]
    fn test_read_u16_be() {
        assert_eq!(read_u16_be(&[0x00, 0x00, 0x09], 1), Some(0x0009));
        assert_eq!(read_u16_be(&[0x04, 0, 0, 0, 0x5C, 0x10], 4), Some(0x5C10));
        assert_eq!(read_u16_be(&[0x01], 1), None);
    }

    #[test]
    fn test_command_names() {
        assert_eq!(cmd::name(0x04), "DYNAMIC_KEYMAP_GET_KEYCODE");
        assert_eq!(cmd::name(0x42), "UNKNOWN");
    }
}
