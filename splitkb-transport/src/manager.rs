//! Request/response correlation
//!
//! VIA has no transaction id: a response is matched to its request only by
//! the echoed opcode in byte 0. `ViaManager` keeps one pending slot per
//! opcode and serializes same-opcode requests through a per-opcode queue,
//! so two callers can never share a slot.
//!
//! ```text
//!  send_command ──► [pending: opcode → oneshot] ──► HidHandle::send_report
//!                               ▲
//!  event pump ── handle_response┘  (one call per inbound frame)
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::command::{ParseError, ViaCommand, ViaResponse};
use crate::error::TransportError;
use crate::protocol::{cmd, hex_prefix, timing, Report, REPORT_ID, REPORT_SIZE};
use crate::HidHandle;

type Responder = oneshot::Sender<Result<Report, TransportError>>;

struct PendingRequest {
    id: u64,
    tx: Responder,
}

/// Releases a pending slot when its request goes away
struct SlotGuard<'a> {
    manager: &'a ViaManager,
    opcode: u8,
    id: u64,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.manager.remove_if(self.opcode, self.id);
    }
}

/// Correlates asynchronous input reports with outstanding requests
pub struct ViaManager {
    pending: Mutex<HashMap<u8, PendingRequest>>,
    queues: Mutex<HashMap<u8, Arc<tokio::sync::Mutex<()>>>>,
    next_id: AtomicU64,
}

impl Default for ViaManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ViaManager {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            queues: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Default response deadline
    pub fn default_timeout() -> Duration {
        Duration::from_millis(timing::DEFAULT_TIMEOUT_MS)
    }

    /// Send a packet and wait for the response echoing `expected`.
    ///
    /// Exactly one of: the matching response resolves the call; the deadline
    /// elapses (`Timeout`, slot removed); the transmit itself fails (error
    /// returned as-is, slot removed). A call waiting behind another request
    /// for the same opcode only starts its deadline once it is sent.
    pub async fn send_command(
        &self,
        handle: &dyn HidHandle,
        packet: &Report,
        expected: u8,
        timeout: Duration,
    ) -> Result<Report, TransportError> {
        let queue = self.queue_for(expected);
        let _turn = queue.lock().await;

        debug!(
            "[VIA] Sending {} (0x{:02X}), timeout {}ms: {}",
            cmd::name(expected),
            expected,
            timeout.as_millis(),
            hex_prefix(packet, 8)
        );

        let (id, rx) = self.register(expected);
        // Clears the slot if this future is dropped mid-wait
        let _slot = SlotGuard {
            manager: self,
            opcode: expected,
            id,
        };

        if let Err(e) = handle.send_report(REPORT_ID, packet).await {
            self.remove_if(expected, id);
            if e.is_permission_denied() {
                warn!(
                    "[VIA] Write permission denied for 0x{:02X} on {:04X}:{:04X}; \
                     another configurator may hold the device or the USB stack needs a reset",
                    expected,
                    handle.info().vid,
                    handle.info().pid
                );
            } else {
                warn!("[VIA] send_report failed for 0x{:02X}: {}", expected, e);
            }
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            // Responder dropped without an answer: treat as a closed connection
            Ok(Err(_)) => Err(TransportError::ConnectionClosed),
            Err(_) => {
                self.remove_if(expected, id);
                warn!(
                    "[VIA] TIMEOUT for 0x{:02X} after {}ms ({} still pending)",
                    expected,
                    timeout.as_millis(),
                    self.pending_count()
                );
                Err(TransportError::Timeout {
                    cmd: expected,
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Send a typed command and parse its typed response
    pub async fn query<C, R>(
        &self,
        handle: &dyn HidHandle,
        command: &C,
        timeout: Duration,
    ) -> Result<R, TransportError>
    where
        C: ViaCommand + Sync,
        R: ViaResponse,
    {
        let resp = self
            .send_command(handle, &command.build(), C::CMD, timeout)
            .await?;
        R::parse(&resp).map_err(|e| match e {
            ParseError::CommandMismatch { expected, got } => TransportError::Internal(format!(
                "response echo 0x{got:02X} does not match 0x{expected:02X}"
            )),
            other => TransportError::Internal(other.to_string()),
        })
    }

    /// Deliver one inbound frame. Returns true if it resolved a request.
    pub fn handle_response(&self, data: &[u8]) -> bool {
        let Some(&opcode) = data.first() else {
            debug!("[VIA] Dropping empty input report");
            return false;
        };

        let pending = self.pending.lock().remove(&opcode);
        match pending {
            Some(p) => {
                let mut report = [0u8; REPORT_SIZE];
                let n = data.len().min(REPORT_SIZE);
                report[..n].copy_from_slice(&data[..n]);
                debug!(
                    "[VIA] Response for 0x{:02X}: {}",
                    opcode,
                    hex_prefix(&report, 8)
                );
                // Receiver may have timed out in the same instant; nothing to do then
                let _ = p.tx.send(Ok(report));
                true
            }
            None => {
                let keys: Vec<String> = self
                    .pending
                    .lock()
                    .keys()
                    .map(|k| format!("0x{k:02X}"))
                    .collect();
                warn!(
                    "[VIA] No pending request for 0x{:02X} (pending: [{}])",
                    opcode,
                    keys.join(", ")
                );
                false
            }
        }
    }

    /// Reject every outstanding request with `ConnectionClosed`
    pub fn clear_pending(&self) {
        let drained: Vec<PendingRequest> = self.pending.lock().drain().map(|(_, p)| p).collect();
        if !drained.is_empty() {
            debug!("[VIA] Rejecting {} pending request(s)", drained.len());
        }
        for p in drained {
            let _ = p.tx.send(Err(TransportError::ConnectionClosed));
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn has_pending(&self, opcode: u8) -> bool {
        self.pending.lock().contains_key(&opcode)
    }

    fn queue_for(&self, opcode: u8) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(
            self.queues
                .lock()
                .entry(opcode)
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }

    /// Install a pending slot for `opcode`. A previous occupant is replaced
    /// (second wins) and rejected with `Superseded`.
    fn register(&self, opcode: u8) -> (u64, oneshot::Receiver<Result<Report, TransportError>>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        let previous = self.pending.lock().insert(opcode, PendingRequest { id, tx });
        if let Some(prev) = previous {
            warn!(
                "[VIA] Request for 0x{:02X} superseded an outstanding one",
                opcode
            );
            let _ = prev.tx.send(Err(TransportError::Superseded { cmd: opcode }));
        }
        (id, rx)
    }

    /// Remove the slot only if it still belongs to request `id`
    fn remove_if(&self, opcode: u8, id: u64) {
        let mut pending = self.pending.lock();
        if pending.get(&opcode).is_some_and(|p| p.id == id) {
            pending.remove(&opcode);
        }
    }
}
