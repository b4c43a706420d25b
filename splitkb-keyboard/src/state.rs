//! Process-wide connection summary

use serde::Serialize;
use splitkb_transport::Half;
use tokio::sync::watch;
use tracing::debug;

/// What the UI layer sees of the connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionState {
    /// Demo mode, or at least one half open
    pub connected: bool,
    pub demo_mode: bool,
    pub left_connected: bool,
    pub right_connected: bool,
}

impl ConnectionState {
    pub fn half_connected(&self, half: Half) -> bool {
        match half {
            Half::Left => self.left_connected,
            Half::Right => self.right_connected,
        }
    }

    fn derive(demo_mode: bool, left: bool, right: bool) -> Self {
        Self {
            connected: demo_mode || left || right,
            demo_mode,
            left_connected: left,
            right_connected: right,
        }
    }
}

/// Owner of the `ConnectionState`, observable through `watch` receivers
///
/// Every mutation recomputes `connected`, so it can never drift from the
/// per-half flags.
#[derive(Debug)]
pub struct ConnectionMonitor {
    tx: watch::Sender<ConnectionState>,
}

impl Default for ConnectionMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionMonitor {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ConnectionState::default());
        Self { tx }
    }

    pub fn current(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    pub fn is_demo(&self) -> bool {
        self.tx.borrow().demo_mode
    }

    pub fn set_half(&self, half: Half, connected: bool) {
        self.update(|s| match half {
            Half::Left => s.left_connected = connected,
            Half::Right => s.right_connected = connected,
        });
    }

    /// Demo mode excludes real handles: entering it clears both halves
    pub fn set_demo(&self, demo: bool) {
        self.update(|s| {
            s.demo_mode = demo;
            if demo {
                s.left_connected = false;
                s.right_connected = false;
            }
        });
    }

    pub fn clear(&self) {
        self.update(|s| *s = ConnectionState::default());
    }

    fn update(&self, f: impl FnOnce(&mut ConnectionState)) {
        self.tx.send_if_modified(|state| {
            let before = *state;
            f(state);
            *state = ConnectionState::derive(
                state.demo_mode,
                state.left_connected,
                state.right_connected,
            );
            if *state != before {
                debug!("Connection state: {:?}", state);
                true
            } else {
                false
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connected_follows_halves() {
        let monitor = ConnectionMonitor::new();
        assert!(!monitor.current().connected);

        monitor.set_half(Half::Right, true);
        let s = monitor.current();
        assert!(s.connected && s.right_connected && !s.left_connected);

        monitor.set_half(Half::Right, false);
        assert!(!monitor.current().connected);
    }

    #[test]
    fn test_demo_clears_halves() {
        let monitor = ConnectionMonitor::new();
        monitor.set_half(Half::Left, true);
        monitor.set_demo(true);
        let s = monitor.current();
        assert!(s.connected && s.demo_mode);
        assert!(!s.left_connected && !s.right_connected);

        monitor.set_demo(false);
        assert!(!monitor.current().connected);
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let monitor = ConnectionMonitor::new();
        let mut rx = monitor.subscribe();
        monitor.set_half(Half::Left, true);
        rx.changed().await.unwrap();
        assert!(rx.borrow().left_connected);
    }

    #[test]
    fn test_serializes_camel_case() {
        let json = serde_json::to_string(&ConnectionState::default()).unwrap();
        assert!(json.contains("demoMode"));
        assert!(json.contains("leftConnected"));
    }
}
