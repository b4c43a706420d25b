//! QMK keycode codec
//!
//! Converts between symbolic keycode strings (`"KC_A"`, `"MO(1)"`) and the
//! 16-bit values the firmware stores. Both directions are total:
//! - unknown values decode to a `0x%04X` literal
//! - unknown strings log a warning and encode to `KC_NO`

use std::fmt;
use std::str::FromStr;

use tracing::warn;

/// "No-op" keycode
pub const KC_NO: u16 = 0x0000;
/// Transparent keycode (falls through to the next active layer)
pub const KC_TRNS: u16 = 0x0001;

/// Highest layer addressable by a layer-switch keycode
pub const MAX_LAYER_OP_TARGET: u8 = 15;

/// Named keys that are not part of a contiguous run, canonical names only
const NAMED: &[(&str, u16)] = &[
    ("KC_ENT", 0x28),
    ("KC_ESC", 0x29),
    ("KC_BSPC", 0x2A),
    ("KC_TAB", 0x2B),
    ("KC_SPC", 0x2C),
    ("KC_MINS", 0x2D),
    ("KC_EQL", 0x2E),
    ("KC_LBRC", 0x2F),
    ("KC_RBRC", 0x30),
    ("KC_BSLS", 0x31),
    ("KC_NUHS", 0x32),
    ("KC_SCLN", 0x33),
    ("KC_QUOT", 0x34),
    ("KC_GRV", 0x35),
    ("KC_COMM", 0x36),
    ("KC_DOT", 0x37),
    ("KC_SLSH", 0x38),
    ("KC_CAPS", 0x39),
    ("KC_PSCR", 0x46),
    ("KC_SCRL", 0x47),
    ("KC_PAUS", 0x48),
    ("KC_INS", 0x49),
    ("KC_HOME", 0x4A),
    ("KC_PGUP", 0x4B),
    ("KC_DEL", 0x4C),
    ("KC_END", 0x4D),
    ("KC_PGDN", 0x4E),
    ("KC_RGHT", 0x4F),
    ("KC_LEFT", 0x50),
    ("KC_DOWN", 0x51),
    ("KC_UP", 0x52),
    ("KC_APP", 0x65),
    ("KC_LCTL", 0xE0),
    ("KC_LSFT", 0xE1),
    ("KC_LALT", 0xE2),
    ("KC_LGUI", 0xE3),
    ("KC_RCTL", 0xE4),
    ("KC_RSFT", 0xE5),
    ("KC_RALT", 0xE6),
    ("KC_RGUI", 0xE7),
];

/// Long-form spellings; accepted by `encode`, never produced by `decode`
const ALIASES: &[(&str, u16)] = &[
    ("XXXXXXX", KC_NO),
    ("______", KC_TRNS),
    ("_______", KC_TRNS),
    ("KC_ENTER", 0x28),
    ("KC_ESCAPE", 0x29),
    ("KC_BACKSPACE", 0x2A),
    ("KC_SPACE", 0x2C),
    ("KC_CAPSLOCK", 0x39),
    ("KC_PRINTSCREEN", 0x46),
    ("KC_SCROLLLOCK", 0x47),
    ("KC_PAUSE", 0x48),
    ("KC_INSERT", 0x49),
    ("KC_PAGEUP", 0x4B),
    ("KC_DELETE", 0x4C),
    ("KC_PAGEDOWN", 0x4E),
    ("KC_RIGHT", 0x4F),
    ("KC_LCTRL", 0xE0),
    ("KC_LSHIFT", 0xE1),
    ("KC_LWIN", 0xE3),
    ("KC_RCTRL", 0xE4),
    ("KC_RSHIFT", 0xE5),
    ("KC_RWIN", 0xE7),
    ("KC_MENU", 0x65),
];

/// Parameterized layer-switch operations (`MO(n)`, `TG(n)`, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerOp {
    /// Momentary
    Mo,
    /// Toggle
    Tg,
    /// Switch to
    To,
    /// Tap-toggle
    Tt,
    /// Set default layer
    Df,
    /// One-shot layer
    Osl,
}

impl LayerOp {
    pub const ALL: [LayerOp; 6] = [
        LayerOp::Mo,
        LayerOp::Tg,
        LayerOp::To,
        LayerOp::Tt,
        LayerOp::Df,
        LayerOp::Osl,
    ];

    /// Keycode for target layer 0; layer `n` encodes as `base + n`
    pub fn base(self) -> u16 {
        match self {
            LayerOp::Mo => 0x5C00,
            LayerOp::Tg => 0x5C10,
            LayerOp::To => 0x5C20,
            LayerOp::Tt => 0x5C30,
            LayerOp::Df => 0x5C40,
            LayerOp::Osl => 0x5C50,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            LayerOp::Mo => "MO",
            LayerOp::Tg => "TG",
            LayerOp::To => "TO",
            LayerOp::Tt => "TT",
            LayerOp::Df => "DF",
            LayerOp::Osl => "OSL",
        }
    }

    /// Keycode for this op targeting `layer`, if the layer is addressable
    pub fn keycode(self, layer: u8) -> Option<u16> {
        (layer <= MAX_LAYER_OP_TARGET).then(|| self.base() + u16::from(layer))
    }

    /// Split a keycode into op and target layer
    pub fn from_keycode(keycode: u16) -> Option<(LayerOp, u8)> {
        Self::ALL.into_iter().find_map(|op| {
            let offset = keycode.checked_sub(op.base())?;
            (offset <= u16::from(MAX_LAYER_OP_TARGET)).then_some((op, offset as u8))
        })
    }

    /// Parse `"OP(n)"`
    fn parse_call(s: &str) -> Option<(LayerOp, u8)> {
        let (name, rest) = s.split_once('(')?;
        let arg = rest.strip_suffix(')')?;
        if arg.is_empty() || !arg.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let op = name.parse().ok()?;
        Some((op, arg.parse().ok()?))
    }
}

impl fmt::Display for LayerOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LayerOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.name() == s)
            .ok_or_else(|| format!("unknown layer op: {s}"))
    }
}

/// Strict string → keycode lookup. `None` for anything unrecognized.
pub fn try_encode(s: &str) -> Option<u16> {
    let s = s.trim();
    if s == "KC_NO" {
        return Some(KC_NO);
    }
    if s == "KC_TRNS" {
        return Some(KC_TRNS);
    }
    if let Some((op, layer)) = LayerOp::parse_call(s) {
        return op.keycode(layer);
    }
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return u16::from_str_radix(hex, 16).ok();
    }
    if let Some(v) = NAMED.iter().chain(ALIASES).find(|(n, _)| *n == s).map(|&(_, v)| v) {
        return Some(v);
    }

    let suffix = s.strip_prefix("KC_")?;
    let mut chars = suffix.chars();
    match (chars.next(), chars.next()) {
        (Some(c @ 'A'..='Z'), None) => Some(0x04 + (c as u16 - 'A' as u16)),
        (Some('0'), None) => Some(0x27),
        (Some(c @ '1'..='9'), None) => Some(0x1E + (c as u16 - '1' as u16)),
        (Some('F'), Some(_)) => match suffix[1..].parse::<u16>() {
            Ok(n @ 1..=12) if !suffix[1..].starts_with('0') => Some(0x3A + n - 1),
            _ => None,
        },
        _ => None,
    }
}

/// String → keycode. Unrecognized strings log a warning and map to `KC_NO`.
pub fn encode(s: &str) -> u16 {
    try_encode(s).unwrap_or_else(|| {
        warn!("Unknown keycode: {}", s);
        KC_NO
    })
}

/// Keycode → canonical string. Never fails.
pub fn decode(keycode: u16) -> String {
    match keycode {
        KC_NO => return "KC_NO".into(),
        KC_TRNS => return "KC_TRNS".into(),
        0x04..=0x1D => return format!("KC_{}", char::from(b'A' + (keycode - 0x04) as u8)),
        0x1E..=0x26 => return format!("KC_{}", keycode - 0x1E + 1),
        0x27 => return "KC_0".into(),
        0x3A..=0x45 => return format!("KC_F{}", keycode - 0x3A + 1),
        _ => {}
    }
    if let Some((op, layer)) = LayerOp::from_keycode(keycode) {
        return format!("{op}({layer})");
    }
    NAMED
        .iter()
        .find(|&&(_, v)| v == keycode)
        .map(|&(name, _)| name.to_string())
        .unwrap_or_else(|| format!("0x{keycode:04X}"))
}

/// True for strings `decode` can produce or `encode` understands
pub fn is_known(s: &str) -> bool {
    try_encode(s).is_some()
}
