//! Type-safe VIA command builders and response parsers
//!
//! Requests know their opcode and how to pack their parameters; responses
//! know which opcode they echo and at which fixed offsets their fields live.

use std::fmt;

use crate::protocol::{self, cmd, read_u16_be, Report};

// =============================================================================
// Core Traits
// =============================================================================

/// A command that can be serialized to a VIA report
pub trait ViaCommand {
    /// Opcode (byte 0 of the request and of the expected response)
    const CMD: u8;

    /// Parameter bytes (excluding the opcode), big-endian where multi-byte
    fn to_data(&self) -> Vec<u8>;

    /// Build the complete 32-byte report
    fn build(&self) -> Report {
        protocol::build_packet(Self::CMD, &self.to_data())
    }
}

/// A response that can be parsed from a VIA report
pub trait ViaResponse: Sized {
    /// Expected command echo byte (for validation)
    const CMD_ECHO: u8;

    /// Minimum response length required
    const MIN_LEN: usize;

    /// Parse from response bytes (starting with command echo)
    fn from_data(data: &[u8]) -> Result<Self, ParseError>;

    /// Parse with validation
    fn parse(data: &[u8]) -> Result<Self, ParseError> {
        if data.len() < Self::MIN_LEN {
            return Err(ParseError::TooShort {
                expected: Self::MIN_LEN,
                got: data.len(),
            });
        }
        if data[0] != Self::CMD_ECHO {
            return Err(ParseError::CommandMismatch {
                expected: Self::CMD_ECHO,
                got: data[0],
            });
        }
        Self::from_data(data)
    }
}

/// Parse error for responses
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    TooShort { expected: usize, got: usize },
    CommandMismatch { expected: u8, got: u8 },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort { expected, got } => {
                write!(
                    f,
                    "Response too short: expected {} bytes, got {}",
                    expected, got
                )
            }
            Self::CommandMismatch { expected, got } => {
                write!(
                    f,
                    "Command mismatch: expected 0x{:02X}, got 0x{:02X}",
                    expected, got
                )
            }
        }
    }
}

impl std::error::Error for ParseError {}

// =============================================================================
// Requests
// =============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct GetProtocolVersion;

impl ViaCommand for GetProtocolVersion {
    const CMD: u8 = cmd::GET_PROTOCOL_VERSION;

    fn to_data(&self) -> Vec<u8> {
        Vec::new()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GetLayerCount;

impl ViaCommand for GetLayerCount {
    const CMD: u8 = cmd::DYNAMIC_KEYMAP_GET_LAYER_COUNT;

    fn to_data(&self) -> Vec<u8> {
        Vec::new()
    }
}

/// Read one keycode from the dynamic keymap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetKeycode {
    pub layer: u8,
    pub row: u8,
    pub col: u8,
}

impl ViaCommand for GetKeycode {
    const CMD: u8 = cmd::DYNAMIC_KEYMAP_GET_KEYCODE;

    fn to_data(&self) -> Vec<u8> {
        vec![self.layer, self.row, self.col]
    }
}

/// Write one keycode into the dynamic keymap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetKeycode {
    pub layer: u8,
    pub row: u8,
    pub col: u8,
    pub keycode: u16,
}

impl ViaCommand for SetKeycode {
    const CMD: u8 = cmd::DYNAMIC_KEYMAP_SET_KEYCODE;

    fn to_data(&self) -> Vec<u8> {
        let [hi, lo] = self.keycode.to_be_bytes();
        vec![self.layer, self.row, self.col, hi, lo]
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResetKeymap;

impl ViaCommand for ResetKeymap {
    const CMD: u8 = cmd::DYNAMIC_KEYMAP_RESET;

    fn to_data(&self) -> Vec<u8> {
        Vec::new()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JumpToBootloader;

impl ViaCommand for JumpToBootloader {
    const CMD: u8 = cmd::BOOTLOADER_JUMP;

    fn to_data(&self) -> Vec<u8> {
        Vec::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetKeyboardValue {
    pub id: u8,
}

impl ViaCommand for GetKeyboardValue {
    const CMD: u8 = cmd::GET_KEYBOARD_VALUE;

    fn to_data(&self) -> Vec<u8> {
        vec![self.id]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetKeyboardValue {
    pub id: u8,
    pub data: Vec<u8>,
}

impl ViaCommand for SetKeyboardValue {
    const CMD: u8 = cmd::SET_KEYBOARD_VALUE;

    fn to_data(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.data.len());
        out.push(self.id);
        out.extend_from_slice(&self.data);
        out
    }
}

// =============================================================================
// Responses
// =============================================================================

/// Protocol version (bytes 1-2, big-endian)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolVersionResponse {
    pub version: u16,
}

impl ViaResponse for ProtocolVersionResponse {
    const CMD_ECHO: u8 = cmd::GET_PROTOCOL_VERSION;
    const MIN_LEN: usize = 3;

    fn from_data(data: &[u8]) -> Result<Self, ParseError> {
        Ok(Self {
            version: read_u16_be(data, 1).unwrap_or(0),
        })
    }
}

/// Layer count (byte 1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerCountResponse {
    pub count: u8,
}

impl ViaResponse for LayerCountResponse {
    const CMD_ECHO: u8 = cmd::DYNAMIC_KEYMAP_GET_LAYER_COUNT;
    const MIN_LEN: usize = 2;

    fn from_data(data: &[u8]) -> Result<Self, ParseError> {
        Ok(Self { count: data[1] })
    }
}

/// Keycode read back: echoed position in bytes 1-3, keycode in bytes 4-5
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeycodeResponse {
    pub layer: u8,
    pub row: u8,
    pub col: u8,
    pub keycode: u16,
}

impl ViaResponse for KeycodeResponse {
    const CMD_ECHO: u8 = cmd::DYNAMIC_KEYMAP_GET_KEYCODE;
    const MIN_LEN: usize = 6;

    fn from_data(data: &[u8]) -> Result<Self, ParseError> {
        Ok(Self {
            layer: data[1],
            row: data[2],
            col: data[3],
            keycode: read_u16_be(data, 4).unwrap_or(0),
        })
    }
}

/// Keyboard value: id at byte 1, payload from byte 2
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyboardValueResponse {
    pub id: u8,
    pub data: Vec<u8>,
}

impl KeyboardValueResponse {
    /// Interpret the first four payload bytes as a big-endian u32
    pub fn as_u32(&self) -> u32 {
        let mut b = [0u8; 4];
        let n = self.data.len().min(4);
        b[..n].copy_from_slice(&self.data[..n]);
        u32::from_be_bytes(b)
    }
}

impl ViaResponse for KeyboardValueResponse {
    const CMD_ECHO: u8 = cmd::GET_KEYBOARD_VALUE;
    const MIN_LEN: usize = 2;

    fn from_data(data: &[u8]) -> Result<Self, ParseError> {
        Ok(Self {
            id: data[1],
            data: data[2..].to_vec(),
        })
    }
}

/// Plain acknowledgement: the firmware echoes the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Echo<const CMD: u8>;

impl<const CMD: u8> ViaResponse for Echo<CMD> {
    const CMD_ECHO: u8 = CMD;
    const MIN_LEN: usize = 1;

    fn from_data(_data: &[u8]) -> Result<Self, ParseError> {
        Ok(Self)
    }
}

pub type SetKeycodeAck = Echo<{ cmd::DYNAMIC_KEYMAP_SET_KEYCODE }>;
pub type ResetKeymapAck = Echo<{ cmd::DYNAMIC_KEYMAP_RESET }>;
pub type SetKeyboardValueAck = Echo<{ cmd::SET_KEYBOARD_VALUE }>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::REPORT_SIZE;

    #[test]
    fn test_set_keycode_packs_big_endian() {
        let p = SetKeycode {
            layer: 2,
            row: 3,
            col: 4,
            keycode: 0x5C21,
        }
        .build();
        assert_eq!(&p[..6], &[0x05, 2, 3, 4, 0x5C, 0x21]);
        assert_eq!(p.len(), REPORT_SIZE);
    }

    #[test]
    fn test_get_keycode_packet() {
        let p = GetKeycode {
            layer: 1,
            row: 0,
            col: 6,
        }
        .build();
        assert_eq!(&p[..4], &[0x04, 1, 0, 6]);
        assert!(p[4..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_parse_protocol_version() {
        let mut resp = [0u8; REPORT_SIZE];
        resp[0] = cmd::GET_PROTOCOL_VERSION;
        resp[1] = 0x00;
        resp[2] = 0x09;
        let v = ProtocolVersionResponse::parse(&resp).unwrap();
        assert_eq!(v.version, 0x0009);
    }

    #[test]
    fn test_parse_layer_count() {
        let mut resp = [0u8; REPORT_SIZE];
        resp[0] = cmd::DYNAMIC_KEYMAP_GET_LAYER_COUNT;
        resp[1] = 4;
        assert_eq!(LayerCountResponse::parse(&resp).unwrap().count, 4);
    }

    #[test]
    fn test_parse_keycode_offsets() {
        let mut resp = [0u8; REPORT_SIZE];
        resp[..6].copy_from_slice(&[0x04, 0, 2, 3, 0x00, 0x14]);
        let k = KeycodeResponse::parse(&resp).unwrap();
        assert_eq!((k.layer, k.row, k.col), (0, 2, 3));
        assert_eq!(k.keycode, 0x0014);
    }

    #[test]
    fn test_parse_rejects_wrong_echo() {
        let mut resp = [0u8; REPORT_SIZE];
        resp[0] = cmd::UNHANDLED;
        assert_eq!(
            KeycodeResponse::parse(&resp),
            Err(ParseError::CommandMismatch {
                expected: 0x04,
                got: 0xFF
            })
        );
    }

    #[test]
    fn test_parse_rejects_short_frame() {
        assert!(matches!(
            KeycodeResponse::parse(&[0x04, 0, 0]),
            Err(ParseError::TooShort { expected: 6, got: 3 })
        ));
    }

    #[test]
    fn test_keyboard_value_uptime() {
        let mut resp = [0u8; REPORT_SIZE];
        resp[..6].copy_from_slice(&[0x02, 0x01, 0x00, 0x01, 0x00, 0x10]);
        let v = KeyboardValueResponse::parse(&resp).unwrap();
        assert_eq!(v.id, 0x01);
        assert_eq!(v.as_u32(), 0x0001_0010);
    }

    #[test]
    fn test_set_keyboard_value_data() {
        let data = SetKeyboardValue {
            id: 0x05,
            data: vec![0x01],
        }
        .to_data();
        assert_eq!(data, vec![0x05, 0x01]);
    }

    #[test]
    fn test_echo_ack() {
        let resp = ResetKeymap.build();
        assert!(ResetKeymapAck::parse(&resp).is_ok());
        assert!(SetKeycodeAck::parse(&resp).is_err());
    }
}
