//! Raw HID handle backed by hidapi
//!
//! One handle per keyboard half. Output reports go straight to the device;
//! input reports are pulled by a dedicated reader thread and pushed into the
//! attached `EventSink`.

use std::ffi::CString;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use async_trait::async_trait;
use hidapi::{HidApi, HidDevice};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::protocol::{hex_prefix, timing, REPORT_SIZE};
use crate::types::{EventSink, HandleInfo};
use crate::HidHandle;

type SharedDevice = Arc<Mutex<HidDevice>>;
type SharedSink = Arc<Mutex<Option<EventSink>>>;

struct ReaderThread {
    shutdown: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

/// Handle for the VIA raw HID interface (usage page 0xFF60) of one half
pub struct HidRawHandle {
    info: HandleInfo,
    device: Mutex<Option<SharedDevice>>,
    reader: Mutex<Option<ReaderThread>>,
    sink: SharedSink,
}

impl HidRawHandle {
    /// Create an unopened handle for the interface at `info.device_path`
    pub fn new(info: HandleInfo) -> Self {
        Self {
            info,
            device: Mutex::new(None),
            reader: Mutex::new(None),
            sink: Arc::new(Mutex::new(None)),
        }
    }

    fn open_blocking(path: &str) -> Result<HidDevice, TransportError> {
        let api = HidApi::new().map_err(|e| TransportError::HidError(e.to_string()))?;
        let c_path = CString::new(path)
            .map_err(|_| TransportError::Internal(format!("invalid device path: {path:?}")))?;
        Ok(api.open_path(&c_path)?)
    }

    fn spawn_reader(
        &self,
        device: SharedDevice,
        shutdown: Arc<AtomicBool>,
    ) -> Result<JoinHandle<()>, TransportError> {
        let sink = Arc::clone(&self.sink);
        let name = format!("via-reader-{:04x}", self.info.pid);
        std::thread::Builder::new()
            .name(name)
            .spawn(move || run_reader_loop(device, sink, shutdown))
            .map_err(|e| TransportError::Internal(format!("failed to spawn reader thread: {e}")))
    }
}

/// Poll the device for input reports until shutdown or a read error.
///
/// The device lock is only held for one short read so writes interleave.
/// A read error means the device went away: the sink is told once and the
/// loop exits.
fn run_reader_loop(device: SharedDevice, sink: SharedSink, shutdown: Arc<AtomicBool>) {
    debug!("Raw HID reader thread started");
    let mut buf = [0u8; REPORT_SIZE + 1];

    while !shutdown.load(Ordering::Relaxed) {
        let result = device.lock().read_timeout(&mut buf, timing::READ_POLL_MS);
        match result {
            Ok(len) if len > 0 => {
                debug!("Raw HID input ({} bytes): {}", len, hex_prefix(&buf[..len], 8));
                if let Some(sink) = sink.lock().as_ref() {
                    sink.input_report(&buf[..len]);
                }
            }
            Ok(_) => {}
            Err(e) => {
                if shutdown.load(Ordering::Relaxed) {
                    break;
                }
                warn!("Raw HID read failed, treating as disconnect: {}", e);
                if let Some(sink) = sink.lock().as_ref() {
                    sink.disconnected();
                }
                break;
            }
        }
    }

    debug!("Raw HID reader thread exiting");
}

#[async_trait]
impl HidHandle for HidRawHandle {
    fn info(&self) -> &HandleInfo {
        &self.info
    }

    fn is_opened(&self) -> bool {
        self.device.lock().is_some()
    }

    async fn open(&self) -> Result<(), TransportError> {
        if self.is_opened() {
            return Err(TransportError::AlreadyOpen(self.info.device_path.clone()));
        }

        let path = self.info.device_path.clone();
        let device = tokio::task::spawn_blocking(move || Self::open_blocking(&path))
            .await
            .map_err(|e| TransportError::Internal(format!("open task failed: {e}")))??;

        let device = Arc::new(Mutex::new(device));
        let shutdown = Arc::new(AtomicBool::new(false));
        let join = self.spawn_reader(Arc::clone(&device), Arc::clone(&shutdown))?;

        {
            let mut slot = self.device.lock();
            if slot.is_some() {
                // Lost a race with a concurrent open
                shutdown.store(true, Ordering::Relaxed);
                return Err(TransportError::AlreadyOpen(self.info.device_path.clone()));
            }
            *slot = Some(device);
        }
        *self.reader.lock() = Some(ReaderThread { shutdown, join });

        info!(
            "Opened raw HID {:04X}:{:04X} at {}",
            self.info.vid, self.info.pid, self.info.device_path
        );
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        let reader = self.reader.lock().take();
        if let Some(reader) = reader {
            reader.shutdown.store(true, Ordering::Relaxed);
            tokio::task::spawn_blocking(move || {
                if reader.join.join().is_err() {
                    warn!("Raw HID reader thread panicked");
                }
            })
            .await
            .map_err(|e| TransportError::Internal(format!("close task failed: {e}")))?;
        }

        // Dropping the last reference releases the OS handle
        if self.device.lock().take().is_some() {
            debug!(
                "Closed raw HID {:04X}:{:04X}",
                self.info.vid, self.info.pid
            );
        }
        Ok(())
    }

    async fn send_report(&self, report_id: u8, data: &[u8]) -> Result<(), TransportError> {
        let device = self.device.lock().clone().ok_or(TransportError::NotOpen)?;

        let mut buf = Vec::with_capacity(data.len() + 1);
        buf.push(report_id);
        buf.extend_from_slice(data);

        let written = device.lock().write(&buf)?;
        if written == 0 {
            return Err(TransportError::HidError("zero-length write".into()));
        }
        Ok(())
    }

    fn attach(&self, sink: EventSink) {
        debug!(
            "Attaching {} sink (generation {}) to {:04X}:{:04X}",
            sink.half(),
            sink.generation(),
            self.info.vid,
            self.info.pid
        );
        *self.sink.lock() = Some(sink);
    }
}

impl Drop for HidRawHandle {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.lock().take() {
            reader.shutdown.store(true, Ordering::Relaxed);
        }
    }
}
