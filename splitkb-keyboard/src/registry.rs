//! Per-half handle ownership and connection lifecycle
//!
//! The registry is the only owner of open handles. Every path that drops a
//! handle (explicit disconnect, unplug, replacement, stuck USB stack) also
//! drains the correlator so no request outlives its connection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use splitkb_transport::device_registry::{chooser_filters, half_for_pid, is_reserved_pid};
use splitkb_transport::protocol::timing;
use splitkb_transport::{
    DeviceChooser, DeviceEvent, DeviceFilter, EventSink, Half, SharedHandle, TransportError,
    ViaManager, VENDOR_ID,
};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::error::KeyboardError;
use crate::state::ConnectionMonitor;

/// Broadcast channel capacity for notices
const NOTICE_CHANNEL_CAPACITY: usize = 16;

/// User-facing notices raised by connection faults
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryNotice {
    /// The half dropped off the bus; it has to be reconnected
    ReconnectRequired { half: Half },
    /// Writes to this half were rejected; both halves were disconnected
    UsbStackStuck { half: Half },
}

struct Slot {
    handle: SharedHandle,
    generation: u64,
}

/// Tracks the open handle of each half
pub struct DeviceRegistry {
    slots: Mutex<HashMap<Half, Slot>>,
    chooser: Arc<dyn DeviceChooser>,
    events: mpsc::UnboundedSender<DeviceEvent>,
    monitor: Arc<ConnectionMonitor>,
    manager: Arc<ViaManager>,
    notices: broadcast::Sender<RegistryNotice>,
    next_generation: AtomicU64,
}

impl DeviceRegistry {
    pub fn new(
        chooser: Arc<dyn DeviceChooser>,
        monitor: Arc<ConnectionMonitor>,
        manager: Arc<ViaManager>,
        events: mpsc::UnboundedSender<DeviceEvent>,
    ) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CHANNEL_CAPACITY);
        Self {
            slots: Mutex::new(HashMap::new()),
            chooser,
            events,
            monitor,
            manager,
            notices,
            next_generation: AtomicU64::new(1),
        }
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<RegistryNotice> {
        self.notices.subscribe()
    }

    pub fn monitor(&self) -> &Arc<ConnectionMonitor> {
        &self.monitor
    }

    /// Open handle for `half`
    pub fn handle(&self, half: Half) -> Result<SharedHandle, KeyboardError> {
        self.slots
            .lock()
            .get(&half)
            .map(|s| Arc::clone(&s.handle))
            .ok_or(KeyboardError::NotConnected(half))
    }

    pub fn is_connected(&self, half: Half) -> bool {
        self.slots.lock().contains_key(&half)
    }

    pub fn connected_halves(&self) -> Vec<Half> {
        Half::ALL
            .into_iter()
            .filter(|h| self.is_connected(*h))
            .collect()
    }

    /// Whether events stamped with `generation` come from the live handle
    pub fn is_current(&self, half: Half, generation: u64) -> bool {
        self.slots
            .lock()
            .get(&half)
            .is_some_and(|s| s.generation == generation)
    }

    /// Ask the chooser for any known half and connect it.
    ///
    /// Returns the connected half, or `None` if nothing was selected.
    pub async fn connect_hardware(&self) -> Result<Option<Half>, TransportError> {
        self.connect_with_filters(&chooser_filters()).await
    }

    /// Like `connect_hardware`, restricted to one half's product id
    pub async fn connect_half(&self, half: Half) -> Result<Option<Half>, TransportError> {
        let filter = DeviceFilter {
            vendor_id: VENDOR_ID,
            product_id: half.product_id(),
        };
        self.connect_with_filters(&[filter]).await
    }

    async fn connect_with_filters(
        &self,
        filters: &[DeviceFilter],
    ) -> Result<Option<Half>, TransportError> {
        let Some(handle) = self.chooser.request_device(filters).await? else {
            info!("No device selected");
            return Ok(None);
        };

        let pid = handle.info().pid;
        if is_reserved_pid(pid) {
            warn!("Selected device PID 0x{:04X} is reserved and not supported", pid);
            return Err(TransportError::UnsupportedDevice { pid });
        }
        let Some(half) = half_for_pid(pid) else {
            warn!("Selected device PID 0x{:04X} is not a keyboard half", pid);
            return Err(TransportError::UnsupportedDevice { pid });
        };

        // Replace whatever this half had before
        let previous = self.slots.lock().remove(&half);
        if let Some(prev) = previous {
            if Arc::ptr_eq(&prev.handle, &handle) {
                debug!("{} half re-selected the same handle", half);
            } else {
                info!("Closing previous {} half handle", half);
                if let Err(e) = prev.handle.close().await {
                    warn!("Failed to close previous {} handle (continuing): {}", half, e);
                }
            }
            self.manager.clear_pending();
        }

        if handle.is_opened() {
            warn!(
                "{} half handle is already open (stale from a previous session); reopening",
                half
            );
            if let Err(e) = handle.close().await {
                warn!("Closing stale {} handle failed: {}", half, e);
            }
            tokio::time::sleep(Duration::from_millis(timing::STALE_REOPEN_DELAY_MS)).await;
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        handle.attach(EventSink::new(half, generation, self.events.clone()));

        match handle.open().await {
            Ok(()) => {}
            Err(TransportError::AlreadyOpen(path)) => {
                warn!(
                    "{} half still reports already open ({}); trying to use it anyway",
                    half, path
                );
            }
            Err(e) => {
                warn!("Failed to open {} half: {}", half, e);
                self.monitor.set_half(half, false);
                return Err(e);
            }
        }

        // Demo mode ends only once real hardware is in hand
        if self.monitor.is_demo() {
            info!("Leaving demo mode for the {} half", half);
            self.exit_demo();
        }
        self.slots.lock().insert(half, Slot { handle, generation });
        self.monitor.set_half(half, true);
        info!("Connected {} half (PID 0x{:04X})", half, pid);
        Ok(Some(half))
    }

    /// Close both halves and clear all connection state.
    ///
    /// Closes are awaited one by one before any state is cleared.
    pub async fn disconnect(&self) {
        let slots: Vec<(Half, Slot)> = self.slots.lock().drain().collect();
        for (half, slot) in slots {
            match slot.handle.close().await {
                Ok(()) => debug!("Closed {} half", half),
                Err(e) => warn!("Error closing {} half: {}", half, e),
            }
        }
        self.manager.clear_pending();
        self.monitor.clear();
        info!("Disconnected");
    }

    /// The handle for `half` reported that the device went away
    pub async fn on_hardware_disconnect(&self, half: Half, generation: u64) {
        let removed = {
            let mut slots = self.slots.lock();
            if slots.get(&half).is_some_and(|s| s.generation == generation) {
                slots.remove(&half)
            } else {
                None
            }
        };
        let Some(slot) = removed else {
            debug!(
                "Ignoring disconnect from superseded {} handle (generation {})",
                half, generation
            );
            return;
        };

        warn!("{} half disconnected; reconnect required", half);
        if let Err(e) = slot.handle.close().await {
            debug!("Releasing unplugged {} handle: {}", half, e);
        }
        self.monitor.set_half(half, false);
        self.manager.clear_pending();
        let _ = self.notices.send(RegistryNotice::ReconnectRequired { half });
    }

    /// Writes to `half` hit the permission-denied signature: drop everything
    pub async fn report_usb_stack_stuck(&self, half: Half) {
        error!(
            "USB stack stuck on {} half: writes rejected. \
             Power-cycle both halves or reset into the bootloader, then reconnect",
            half
        );
        self.disconnect().await;
        let _ = self.notices.send(RegistryNotice::UsbStackStuck { half });
    }

    /// Switch to demo mode, closing any real handles first
    pub async fn enter_demo(&self) {
        let has_handles = !self.slots.lock().is_empty();
        if has_handles {
            self.disconnect().await;
        }
        self.monitor.set_demo(true);
        info!("Demo mode enabled");
    }

    pub fn exit_demo(&self) {
        self.monitor.set_demo(false);
        info!("Demo mode disabled");
    }
}
