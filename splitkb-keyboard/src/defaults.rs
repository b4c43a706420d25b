//! Factory default keymaps (layer 0 as flashed)

use splitkb_transport::Half;

use crate::keycode;
use crate::matrix::{KeyPosition, KeyboardVariant};
use crate::LayerKeymap;

type Entry = (u8, u8, &'static str);

const MAIN_LEFT: &[Entry] = &[
    (0, 0, "KC_ESC"),
    (0, 1, "KC_F1"),
    (0, 2, "KC_F2"),
    (0, 3, "KC_F3"),
    (0, 4, "KC_F4"),
    (0, 5, "KC_F5"),
    (0, 6, "KC_F6"),
    (1, 0, "KC_GRV"),
    (1, 1, "KC_1"),
    (1, 2, "KC_2"),
    (1, 3, "KC_3"),
    (1, 4, "KC_4"),
    (1, 5, "KC_5"),
    (1, 6, "KC_6"),
    (2, 0, "KC_TAB"),
    (2, 1, "KC_Q"),
    (2, 2, "KC_W"),
    (2, 3, "KC_E"),
    (2, 4, "KC_R"),
    (2, 5, "KC_T"),
    (3, 0, "KC_CAPS"),
    (3, 1, "KC_A"),
    (3, 2, "KC_S"),
    (3, 3, "KC_D"),
    (3, 4, "KC_F"),
    (3, 5, "KC_G"),
    (4, 0, "KC_LSFT"),
    (4, 1, "KC_Z"),
    (4, 2, "KC_X"),
    (4, 3, "KC_C"),
    (4, 4, "KC_V"),
    (4, 5, "KC_B"),
    (5, 0, "KC_LCTL"),
    (5, 1, "KC_LGUI"),
    (5, 2, "KC_LALT"),
    (5, 4, "KC_SPC"),
    (5, 5, "KC_SPC"),
];

const MAIN_RIGHT: &[Entry] = &[
    (0, 0, "KC_F7"),
    (0, 1, "KC_F8"),
    (0, 2, "KC_F9"),
    (0, 3, "KC_F10"),
    (0, 4, "KC_F11"),
    (0, 5, "KC_F12"),
    (0, 6, "KC_PSCR"),
    (0, 8, "KC_DEL"),
    (1, 0, "KC_7"),
    (1, 1, "KC_8"),
    (1, 2, "KC_9"),
    (1, 3, "KC_0"),
    (1, 4, "KC_MINS"),
    (1, 5, "KC_EQL"),
    (1, 6, "KC_BSPC"),
    (1, 8, "KC_PGUP"),
    (2, 0, "KC_Y"),
    (2, 1, "KC_U"),
    (2, 2, "KC_I"),
    (2, 3, "KC_O"),
    (2, 4, "KC_P"),
    (2, 5, "KC_LBRC"),
    (2, 6, "KC_RBRC"),
    (2, 7, "KC_BSLS"),
    (2, 8, "KC_PGDN"),
    (3, 0, "KC_H"),
    (3, 1, "KC_J"),
    (3, 2, "KC_K"),
    (3, 3, "KC_L"),
    (3, 4, "KC_SCLN"),
    (3, 5, "KC_QUOT"),
    (3, 6, "KC_ENT"),
    (3, 8, "KC_HOME"),
    (4, 0, "KC_N"),
    (4, 1, "KC_M"),
    (4, 2, "KC_COMM"),
    (4, 3, "KC_DOT"),
    (4, 4, "KC_SLSH"),
    (4, 5, "KC_RSFT"),
    (4, 7, "KC_UP"),
    (5, 0, "KC_SPC"),
    (5, 3, "KC_RALT"),
    (5, 4, "KC_APP"),
    (5, 5, "KC_RCTL"),
    (5, 6, "KC_LEFT"),
    (5, 7, "KC_DOWN"),
    (5, 8, "KC_RGHT"),
];

// The protoboard only has a right-half test keymap
const PROTOBOARD_RIGHT: &[Entry] = &[
    (0, 0, "KC_Y"),
    (0, 1, "KC_U"),
    (0, 2, "KC_I"),
    (0, 3, "KC_O"),
    (0, 4, "KC_P"),
    (1, 0, "KC_G"),
    (1, 1, "KC_H"),
    (1, 2, "KC_J"),
    (1, 3, "KC_K"),
    (1, 4, "KC_L"),
    (2, 0, "KC_B"),
    (2, 1, "KC_N"),
    (2, 2, "KC_M"),
    (2, 3, "KC_COMM"),
    (2, 4, "KC_DOT"),
    (3, 0, "KC_ESC"),
    (3, 1, "KC_SPC"),
    (3, 2, "KC_RALT"),
    (3, 3, "KC_RCTL"),
    (3, 4, "KC_BSPC"),
];

fn table(variant: KeyboardVariant, half: Half) -> &'static [Entry] {
    match (variant, half) {
        (KeyboardVariant::Main, Half::Left) => MAIN_LEFT,
        (KeyboardVariant::Main, Half::Right) => MAIN_RIGHT,
        (KeyboardVariant::Protoboard, Half::Left) => &[],
        (KeyboardVariant::Protoboard, Half::Right) => PROTOBOARD_RIGHT,
    }
}

/// Factory layer-0 keymap of one half
pub fn default_keymap(variant: KeyboardVariant, half: Half) -> LayerKeymap {
    table(variant, half)
        .iter()
        .map(|&(row, col, kc)| (KeyPosition::new(half, row, col), kc.to_string()))
        .collect()
}

/// Factory layer 0 with both halves merged
pub fn default_layer0(variant: KeyboardVariant) -> LayerKeymap {
    Half::ALL
        .into_iter()
        .flat_map(|half| default_keymap(variant, half))
        .collect()
}

/// Factory keymap of one half as firmware `(layer, row, col) -> keycode` entries
pub fn default_firmware_entries(
    variant: KeyboardVariant,
    half: Half,
) -> Vec<((u8, u8, u8), u16)> {
    table(variant, half)
        .iter()
        .map(|&(row, col, kc)| ((0, row, col), keycode::encode(kc)))
        .collect()
}
