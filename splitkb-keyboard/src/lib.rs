//! Keymap synchronization for VIA split keyboards
//!
//! This crate sits on top of `splitkb-transport` and provides:
//! - the QMK keycode codec
//! - key positions, matrix dimensions and factory default keymaps
//! - connection tracking per half (`DeviceRegistry`, `ConnectionMonitor`)
//! - whole-layer keymap read/write against the firmware (`KeymapSync`)
//! - the locally persisted keymap (`KeymapStore`)

pub mod defaults;
pub mod error;
pub mod keycode;
pub mod keymap;
pub mod matrix;
pub mod registry;
pub mod session;
pub mod state;
pub mod store;

use std::collections::BTreeMap;

pub use error::KeyboardError;
pub use keycode::{LayerOp, KC_NO, KC_TRNS};
pub use keymap::KeymapSync;
pub use matrix::{KeyPosition, KeyboardVariant, MatrixDims};
pub use registry::{DeviceRegistry, RegistryNotice};
pub use session::{KeyboardSession, SessionOptions};
pub use state::{ConnectionMonitor, ConnectionState};
pub use store::{KeymapExport, KeymapStore};

// Re-exported so consumers need only this crate for the common types
pub use splitkb_transport::{Half, TransportError};

/// One layer: key position -> keycode string, sparse (unassigned keys absent)
pub type LayerKeymap = BTreeMap<KeyPosition, String>;
