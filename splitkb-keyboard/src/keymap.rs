//! Keymap synchronization with the firmware
//!
//! Single-key and whole-layer reads/writes built on the correlator. Whole
//! layer loops are strictly sequential: every request completes before the
//! next one is sent.
//!
//! In demo mode nothing here touches the registry or the correlator; each
//! operation logs what it would have done and returns a fixed success value.

use std::sync::Arc;
use std::time::Duration;

use splitkb_transport::protocol::{cmd, keyboard_value, REPORT_SIZE, VIA_PROTOCOL_VERSION};
use splitkb_transport::{
    GetKeyboardValue, GetKeycode, GetLayerCount, GetProtocolVersion, Half, JumpToBootloader,
    KeyboardValueResponse, KeycodeResponse, LayerCountResponse, ProtocolVersionResponse,
    ResetKeymap, ResetKeymapAck, SetKeyboardValue, SetKeyboardValueAck, SetKeycode,
    SetKeycodeAck, TransportError, ViaCommand, ViaManager, ViaResponse,
};
use tracing::{debug, info};

use crate::error::KeyboardError;
use crate::keycode::{self, KC_NO};
use crate::matrix::{KeyPosition, KeyboardVariant, MatrixDims};
use crate::registry::DeviceRegistry;
use crate::LayerKeymap;

/// Layer count reported in demo mode
pub const DEMO_LAYER_COUNT: u8 = 4;

/// Keymap read/write engine for both halves
pub struct KeymapSync {
    registry: Arc<DeviceRegistry>,
    manager: Arc<ViaManager>,
    variant: KeyboardVariant,
    timeout: Duration,
}

impl KeymapSync {
    pub fn new(
        registry: Arc<DeviceRegistry>,
        manager: Arc<ViaManager>,
        variant: KeyboardVariant,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            manager,
            variant,
            timeout,
        }
    }

    pub fn variant(&self) -> KeyboardVariant {
        self.variant
    }

    pub fn dims(&self, half: Half) -> MatrixDims {
        self.variant.dims(half)
    }

    fn is_demo(&self) -> bool {
        self.registry.monitor().is_demo()
    }

    /// One request/response exchange with `half`.
    ///
    /// Every VIA command goes out as an output report, so a permission-denied
    /// rejection on any of them means the USB stack is wedged: both halves
    /// are disconnected before `UsbStackStuck` is returned.
    async fn round_trip<C, R>(&self, half: Half, command: &C) -> Result<R, KeyboardError>
    where
        C: ViaCommand + Sync,
        R: ViaResponse,
    {
        let handle = self.registry.handle(half)?;
        let result = self
            .manager
            .query::<C, R>(handle.as_ref(), command, self.timeout)
            .await;
        match result {
            Ok(resp) => Ok(resp),
            Err(e) => Err(self.escalate(half, e).await),
        }
    }

    async fn escalate(&self, half: Half, err: TransportError) -> KeyboardError {
        if err.is_permission_denied() {
            self.registry.report_usb_stack_stuck(half).await;
            KeyboardError::UsbStackStuck { half }
        } else {
            err.into()
        }
    }

    fn check_position(&self, half: Half, row: u8, col: u8) -> Result<(), KeyboardError> {
        let dims = self.dims(half);
        if dims.contains(row, col) {
            Ok(())
        } else {
            Err(KeyboardError::InvalidParameter(format!(
                "{half} matrix position {row},{col} outside {}x{}",
                dims.rows, dims.cols
            )))
        }
    }

    // === Device Info ===

    pub async fn get_protocol_version(&self, half: Half) -> Result<u16, KeyboardError> {
        if self.is_demo() {
            info!("[demo] get protocol version ({half})");
            return Ok(VIA_PROTOCOL_VERSION);
        }
        let resp: ProtocolVersionResponse = self.round_trip(half, &GetProtocolVersion).await?;
        Ok(resp.version)
    }

    pub async fn get_layer_count(&self, half: Half) -> Result<u8, KeyboardError> {
        if self.is_demo() {
            info!("[demo] get layer count ({half})");
            return Ok(DEMO_LAYER_COUNT);
        }
        let resp: LayerCountResponse = self.round_trip(half, &GetLayerCount).await?;
        Ok(resp.count)
    }

    /// Raw GET_KEYBOARD_VALUE payload (bytes after the value id)
    pub async fn get_keyboard_value(&self, half: Half, id: u8) -> Result<Vec<u8>, KeyboardError> {
        if self.is_demo() {
            info!("[demo] get keyboard value 0x{id:02X} ({half})");
            return Ok(vec![0; REPORT_SIZE - 2]);
        }
        let resp: KeyboardValueResponse = self.round_trip(half, &GetKeyboardValue { id }).await?;
        if resp.id != id {
            return Err(KeyboardError::UnexpectedResponse(format!(
                "keyboard value id 0x{:02X}, expected 0x{id:02X}",
                resp.id
            )));
        }
        Ok(resp.data)
    }

    pub async fn set_keyboard_value(
        &self,
        half: Half,
        id: u8,
        data: &[u8],
    ) -> Result<(), KeyboardError> {
        if self.is_demo() {
            info!("[demo] set keyboard value 0x{id:02X} = {data:02X?} ({half})");
            return Ok(());
        }
        let command = SetKeyboardValue {
            id,
            data: data.to_vec(),
        };
        let _: SetKeyboardValueAck = self.round_trip(half, &command).await?;
        Ok(())
    }

    /// Firmware uptime in milliseconds
    pub async fn get_uptime(&self, half: Half) -> Result<u32, KeyboardError> {
        if self.is_demo() {
            info!("[demo] get uptime ({half})");
            return Ok(0);
        }
        let resp: KeyboardValueResponse = self
            .round_trip(
                half,
                &GetKeyboardValue {
                    id: keyboard_value::UPTIME,
                },
            )
            .await?;
        Ok(resp.as_u32())
    }

    // === Keymap ===

    /// Read one keycode. Demo mode reads `KC_NO` everywhere.
    pub async fn read_keycode(
        &self,
        layer: u8,
        row: u8,
        col: u8,
        half: Half,
    ) -> Result<u16, KeyboardError> {
        if self.is_demo() {
            info!("[demo] read keycode L{layer} {half} {row},{col}");
            return Ok(KC_NO);
        }
        self.check_position(half, row, col)?;
        let resp: KeycodeResponse = self.round_trip(half, &GetKeycode { layer, row, col }).await?;
        if (resp.layer, resp.row, resp.col) != (layer, row, col) {
            return Err(KeyboardError::UnexpectedResponse(format!(
                "keycode for {},{},{} answered with {},{},{}",
                layer, row, col, resp.layer, resp.row, resp.col
            )));
        }
        Ok(resp.keycode)
    }

    pub async fn write_keycode(
        &self,
        layer: u8,
        row: u8,
        col: u8,
        keycode: u16,
        half: Half,
    ) -> Result<(), KeyboardError> {
        if self.is_demo() {
            info!(
                "[demo] write {} to L{layer} {half} {row},{col}",
                keycode::decode(keycode)
            );
            return Ok(());
        }
        self.check_position(half, row, col)?;
        let _: SetKeycodeAck = self
            .round_trip(
                half,
                &SetKeycode {
                    layer,
                    row,
                    col,
                    keycode,
                },
            )
            .await?;
        Ok(())
    }

    /// Read a whole layer of one half.
    ///
    /// Positions are read row-major, one at a time; `KC_NO` positions are
    /// left out. The first failure aborts the read, no partial map is returned.
    pub async fn read_layer_keymap(
        &self,
        layer: u8,
        half: Half,
    ) -> Result<LayerKeymap, KeyboardError> {
        if self.is_demo() {
            info!("[demo] read layer {layer} ({half})");
            return Ok(LayerKeymap::new());
        }

        let dims = self.dims(half);
        info!(
            "Reading layer {} from {} half ({} positions)",
            layer,
            half,
            dims.key_count()
        );

        let mut keymap = LayerKeymap::new();
        for (row, col) in dims.positions() {
            let kc = self.read_keycode(layer, row, col, half).await?;
            if kc != KC_NO {
                keymap.insert(KeyPosition::new(half, row, col), keycode::decode(kc));
            }
        }

        debug!("Layer {} ({}): {} assigned keys", layer, half, keymap.len());
        Ok(keymap)
    }

    /// Write every entry of `keymap` that belongs to `half`.
    ///
    /// Positions are validated before anything is sent. Returns the number
    /// of keys written.
    pub async fn write_layer_keymap(
        &self,
        layer: u8,
        keymap: &LayerKeymap,
        half: Half,
    ) -> Result<usize, KeyboardError> {
        let entries: Vec<(KeyPosition, u16)> = keymap
            .iter()
            .filter(|(pos, _)| pos.half == half)
            .map(|(pos, kc)| (*pos, keycode::encode(kc)))
            .collect();

        if self.is_demo() {
            info!("[demo] write {} keys to layer {layer} ({half})", entries.len());
            return Ok(entries.len());
        }

        for (pos, _) in &entries {
            self.check_position(half, pos.row, pos.col)?;
        }

        info!("Writing {} keys to layer {} on {} half", entries.len(), layer, half);
        for (pos, kc) in &entries {
            self.write_keycode(layer, pos.row, pos.col, *kc, half).await?;
        }
        Ok(entries.len())
    }

    /// Restore the firmware's dynamic keymap to its compiled-in default
    pub async fn reset_keymap(&self, half: Half) -> Result<(), KeyboardError> {
        if self.is_demo() {
            info!("[demo] reset keymap ({half})");
            return Ok(());
        }
        let _: ResetKeymapAck = self.round_trip(half, &ResetKeymap).await?;
        info!("Reset keymap on {} half", half);
        Ok(())
    }

    /// Jump to the bootloader. The device drops off the bus instead of
    /// answering, so a timeout or closed connection counts as success.
    pub async fn reboot_to_bootloader(&self, half: Half) -> Result<(), KeyboardError> {
        if self.is_demo() {
            info!("[demo] reboot to bootloader ({half})");
            return Ok(());
        }
        let handle = self.registry.handle(half)?;
        let result = self
            .manager
            .send_command(
                handle.as_ref(),
                &JumpToBootloader.build(),
                cmd::BOOTLOADER_JUMP,
                self.timeout,
            )
            .await;

        match result {
            Ok(_) => {}
            Err(TransportError::Timeout { .. }) | Err(TransportError::ConnectionClosed) => {
                debug!("No bootloader jump reply from {} half (expected)", half);
            }
            Err(e) => return Err(self.escalate(half, e).await),
        }
        info!("{} half rebooting into bootloader", half);
        Ok(())
    }
}
