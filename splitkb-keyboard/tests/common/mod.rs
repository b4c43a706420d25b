//! Shared fixtures: a session wired to virtual keyboard halves

#![allow(dead_code)]

use std::sync::Arc;

use splitkb_keyboard::defaults::default_firmware_entries;
use splitkb_keyboard::{Half, KeyboardSession, KeyboardVariant, SessionOptions};
use splitkb_transport::mock::{MockChooser, MockHandle};
use splitkb_transport::HidHandle;

pub struct Rig {
    pub session: Arc<KeyboardSession>,
    pub chooser: Arc<MockChooser>,
}

impl Rig {
    pub fn new() -> Self {
        Self::with_variant(KeyboardVariant::Main)
    }

    pub fn with_variant(variant: KeyboardVariant) -> Self {
        let chooser = Arc::new(MockChooser::new());
        let options = SessionOptions {
            variant,
            ..Default::default()
        };
        let session = Arc::new(KeyboardSession::new(chooser.clone(), options));
        Self { session, chooser }
    }

    /// Queue `handle` in the picker and connect it
    pub async fn connect(&self, handle: &Arc<MockHandle>) -> Half {
        self.chooser.push(handle.clone() as Arc<dyn HidHandle>);
        self.session
            .connect_hardware()
            .await
            .expect("connect failed")
            .expect("nothing selected")
    }
}

/// A half flashed with the factory keymap of the main board
pub fn factory_half(half: Half) -> Arc<MockHandle> {
    MockHandle::new(half)
        .with_keymap(default_firmware_entries(KeyboardVariant::Main, half))
        .shared()
}
