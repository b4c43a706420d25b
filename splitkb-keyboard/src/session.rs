//! Session lifecycle: wiring of correlator, registry and event pump
//!
//! ```text
//!  handle ──DeviceEvent──► mpsc ──► event pump ──► ViaManager::handle_response
//!                                        └───────► DeviceRegistry::on_hardware_disconnect
//! ```

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use splitkb_transport::{DeviceChooser, DeviceEvent, Half, TransportError, ViaManager};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::keymap::KeymapSync;
use crate::matrix::KeyboardVariant;
use crate::registry::{DeviceRegistry, RegistryNotice};
use crate::state::{ConnectionMonitor, ConnectionState};

/// Session construction options
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub variant: KeyboardVariant,
    /// Per-command response deadline
    pub timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            variant: KeyboardVariant::default(),
            timeout: ViaManager::default_timeout(),
        }
    }
}

/// One connected-keyboard session
///
/// Owns all connection state. Must be created inside a tokio runtime, since
/// it spawns the event pump.
pub struct KeyboardSession {
    manager: Arc<ViaManager>,
    registry: Arc<DeviceRegistry>,
    sync: KeymapSync,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl KeyboardSession {
    pub fn new(chooser: Arc<dyn DeviceChooser>, options: SessionOptions) -> Self {
        let manager = Arc::new(ViaManager::new());
        let monitor = Arc::new(ConnectionMonitor::new());
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let registry = Arc::new(DeviceRegistry::new(
            chooser,
            monitor,
            Arc::clone(&manager),
            events_tx,
        ));
        let sync = KeymapSync::new(
            Arc::clone(&registry),
            Arc::clone(&manager),
            options.variant,
            options.timeout,
        );

        let pump = tokio::spawn(run_event_pump(
            events_rx,
            Arc::clone(&registry),
            Arc::clone(&manager),
        ));

        debug!(
            "Session started (variant {}, timeout {}ms)",
            options.variant,
            options.timeout.as_millis()
        );

        Self {
            manager,
            registry,
            sync,
            pump: Mutex::new(Some(pump)),
        }
    }

    pub fn keymap(&self) -> &KeymapSync {
        &self.sync
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    pub fn manager(&self) -> &Arc<ViaManager> {
        &self.manager
    }

    pub fn state(&self) -> ConnectionState {
        self.registry.monitor().current()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.registry.monitor().subscribe()
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<RegistryNotice> {
        self.registry.subscribe_notices()
    }

    pub async fn connect_hardware(&self) -> Result<Option<Half>, TransportError> {
        self.registry.connect_hardware().await
    }

    pub async fn connect_half(&self, half: Half) -> Result<Option<Half>, TransportError> {
        self.registry.connect_half(half).await
    }

    pub async fn disconnect(&self) {
        self.registry.disconnect().await;
    }

    pub async fn enter_demo(&self) {
        self.registry.enter_demo().await;
    }

    pub fn exit_demo(&self) {
        self.registry.exit_demo();
    }

    /// Close every handle and stop the event pump
    pub async fn shutdown(&self) {
        self.registry.disconnect().await;
        let pump = self.pump.lock().take();
        if let Some(pump) = pump {
            pump.abort();
        }
        info!("Session shut down");
    }
}

impl Drop for KeyboardSession {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.lock().take() {
            pump.abort();
        }
    }
}

/// Deliver every inbound event exactly once.
///
/// Reports from a superseded handle are dropped; a disconnect is only acted
/// on if it comes from the handle currently registered for that half.
async fn run_event_pump(
    mut rx: mpsc::UnboundedReceiver<DeviceEvent>,
    registry: Arc<DeviceRegistry>,
    manager: Arc<ViaManager>,
) {
    while let Some(event) = rx.recv().await {
        let (half, generation) = (event.half(), event.generation());
        match event {
            DeviceEvent::InputReport { data, .. } => {
                if registry.is_current(half, generation) {
                    manager.handle_response(&data);
                } else {
                    debug!(
                        "Dropping report from superseded {} handle (generation {})",
                        half, generation
                    );
                }
            }
            DeviceEvent::Disconnected { .. } => {
                registry.on_hardware_disconnect(half, generation).await;
            }
        }
    }
    debug!("Event pump exiting");
}
