//! Virtual VIA keyboard half
//!
//! `MockHandle` answers VIA requests the way the firmware does, through the
//! attached `EventSink`, and exposes knobs for the failure modes the
//! connection code has to survive: a silent device, a wedged USB stack
//! rejecting writes, a handle left open by an earlier session and a sudden
//! unplug.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::device_registry::VENDOR_ID;
use crate::discovery::DeviceChooser;
use crate::error::TransportError;
use crate::protocol::{cmd, keyboard_value, read_u16_be, Report, REPORT_SIZE, VIA_PROTOCOL_VERSION};
use crate::types::{DeviceFilter, EventSink, HandleInfo, Half};
use crate::{HidHandle, SharedHandle};

/// Layer count reported by the virtual firmware
pub const MOCK_LAYER_COUNT: u8 = 4;

type KeyAddr = (u8, u8, u8);

#[derive(Default)]
struct MockState {
    opened: bool,
    silent: bool,
    fail_writes: Option<TransportError>,
    fail_next_open: bool,
    layer_count: u8,
    keymap: HashMap<KeyAddr, u16>,
    defaults: HashMap<KeyAddr, u16>,
    values: HashMap<u8, Vec<u8>>,
    uptime_ms: u32,
    sent: Vec<Report>,
    open_count: usize,
    close_count: usize,
}

/// In-memory stand-in for one half's raw HID interface
pub struct MockHandle {
    info: HandleInfo,
    state: Mutex<MockState>,
    sink: Mutex<Option<EventSink>>,
}

impl MockHandle {
    /// A closed, responsive half with an empty keymap
    pub fn new(half: Half) -> Self {
        Self::with_pid(half.product_id())
    }

    /// A closed handle enumerating with an arbitrary product id
    pub fn with_pid(pid: u16) -> Self {
        Self {
            info: HandleInfo {
                vid: VENDOR_ID,
                pid,
                device_path: format!("mock:{pid:04x}"),
                product_name: Some("Virtual VIA keyboard".into()),
            },
            state: Mutex::new(MockState {
                layer_count: MOCK_LAYER_COUNT,
                ..Default::default()
            }),
            sink: Mutex::new(None),
        }
    }

    /// Seed the firmware keymap. The same entries are restored by
    /// `DYNAMIC_KEYMAP_RESET`.
    pub fn with_keymap<I>(self, entries: I) -> Self
    where
        I: IntoIterator<Item = ((u8, u8, u8), u16)>,
    {
        {
            let mut st = self.state.lock();
            st.defaults = entries.into_iter().collect();
            st.keymap = st.defaults.clone();
        }
        self
    }

    /// Start in the opened state, as a handle left over from a previous session
    pub fn already_opened(self) -> Self {
        self.state.lock().opened = true;
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Stop answering requests (writes still succeed)
    pub fn set_silent(&self, silent: bool) {
        self.state.lock().silent = silent;
    }

    /// Reject every write with `err` until cleared
    pub fn fail_writes_with(&self, err: Option<TransportError>) {
        self.state.lock().fail_writes = err;
    }

    /// Make the next `open()` report `AlreadyOpen` even though it succeeds,
    /// as the OS does when another process still holds the device
    pub fn fail_next_open(&self) {
        self.state.lock().fail_next_open = true;
    }

    pub fn set_uptime_ms(&self, uptime_ms: u32) {
        self.state.lock().uptime_ms = uptime_ms;
    }

    /// Simulate an unplug: the handle closes and the sink is notified
    pub fn fire_disconnect(&self) {
        self.state.lock().opened = false;
        if let Some(sink) = self.sink.lock().as_ref() {
            sink.disconnected();
        }
    }

    /// Every packet successfully written, oldest first
    pub fn sent_packets(&self) -> Vec<Report> {
        self.state.lock().sent.clone()
    }

    pub fn sent_opcodes(&self) -> Vec<u8> {
        self.state.lock().sent.iter().map(|p| p[0]).collect()
    }

    pub fn open_count(&self) -> usize {
        self.state.lock().open_count
    }

    pub fn close_count(&self) -> usize {
        self.state.lock().close_count
    }

    /// Current firmware keycode at an address (0 when never set)
    pub fn keycode_at(&self, layer: u8, row: u8, col: u8) -> u16 {
        self.state
            .lock()
            .keymap
            .get(&(layer, row, col))
            .copied()
            .unwrap_or(0)
    }

    /// Compute the firmware reply to one request, if any
    fn respond(st: &mut MockState, packet: &Report) -> Option<Report> {
        let mut out = *packet;
        match packet[0] {
            cmd::GET_PROTOCOL_VERSION => {
                out[1..3].copy_from_slice(&VIA_PROTOCOL_VERSION.to_be_bytes());
            }
            cmd::DYNAMIC_KEYMAP_GET_LAYER_COUNT => {
                out[1] = st.layer_count;
            }
            cmd::DYNAMIC_KEYMAP_GET_KEYCODE => {
                let addr = (packet[1], packet[2], packet[3]);
                let kc = st.keymap.get(&addr).copied().unwrap_or(0);
                out[4..6].copy_from_slice(&kc.to_be_bytes());
            }
            cmd::DYNAMIC_KEYMAP_SET_KEYCODE => {
                let addr = (packet[1], packet[2], packet[3]);
                let kc = read_u16_be(packet, 4).unwrap_or(0);
                st.keymap.insert(addr, kc);
            }
            cmd::DYNAMIC_KEYMAP_RESET => {
                st.keymap = st.defaults.clone();
            }
            cmd::BOOTLOADER_JUMP => {
                // The real device drops off the bus without answering
                return None;
            }
            cmd::GET_KEYBOARD_VALUE => match packet[1] {
                keyboard_value::UPTIME => {
                    out[2..6].copy_from_slice(&st.uptime_ms.to_be_bytes());
                }
                id => {
                    if let Some(v) = st.values.get(&id) {
                        let n = v.len().min(REPORT_SIZE - 2);
                        out[2..2 + n].copy_from_slice(&v[..n]);
                    }
                }
            },
            cmd::SET_KEYBOARD_VALUE => {
                st.values.insert(packet[1], packet[2..].to_vec());
            }
            _ => {
                out[0] = cmd::UNHANDLED;
            }
        }
        Some(out)
    }
}

#[async_trait]
impl HidHandle for MockHandle {
    fn info(&self) -> &HandleInfo {
        &self.info
    }

    fn is_opened(&self) -> bool {
        self.state.lock().opened
    }

    async fn open(&self) -> Result<(), TransportError> {
        let mut st = self.state.lock();
        if std::mem::take(&mut st.fail_next_open) {
            st.opened = true;
            return Err(TransportError::AlreadyOpen(self.info.device_path.clone()));
        }
        if st.opened {
            return Err(TransportError::AlreadyOpen(self.info.device_path.clone()));
        }
        st.opened = true;
        st.open_count += 1;
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        let mut st = self.state.lock();
        st.opened = false;
        st.close_count += 1;
        Ok(())
    }

    async fn send_report(&self, _report_id: u8, data: &[u8]) -> Result<(), TransportError> {
        let reply = {
            let mut st = self.state.lock();
            if !st.opened {
                return Err(TransportError::NotOpen);
            }
            if let Some(err) = st.fail_writes.clone() {
                return Err(err);
            }

            let mut packet = [0u8; REPORT_SIZE];
            let n = data.len().min(REPORT_SIZE);
            packet[..n].copy_from_slice(&data[..n]);
            st.sent.push(packet);

            if st.silent {
                None
            } else {
                Self::respond(&mut st, &packet)
            }
        };

        if let Some(reply) = reply {
            debug!("[mock {:04X}] reply 0x{:02X}", self.info.pid, reply[0]);
            if let Some(sink) = self.sink.lock().as_ref() {
                sink.input_report(&reply);
            }
        }
        Ok(())
    }

    fn attach(&self, sink: EventSink) {
        *self.sink.lock() = Some(sink);
    }
}

/// Chooser that hands out queued handles
///
/// Each request takes the first queued handle matching one of the filters;
/// with nothing matching it behaves like a cancelled picker.
#[derive(Default)]
pub struct MockChooser {
    queue: Mutex<VecDeque<SharedHandle>>,
    requests: AtomicUsize,
}

impl MockChooser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, handle: SharedHandle) {
        self.queue.lock().push_back(handle);
    }

    /// Number of times the picker was shown
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl DeviceChooser for MockChooser {
    async fn request_device(
        &self,
        filters: &[DeviceFilter],
    ) -> Result<Option<SharedHandle>, TransportError> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let mut queue = self.queue.lock();
        let found = queue.iter().position(|h| {
            let info = h.info();
            filters.iter().any(|f| f.matches(info.vid, info.pid))
        });
        Ok(found.and_then(|i| queue.remove(i)))
    }
}
