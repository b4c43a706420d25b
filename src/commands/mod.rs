//! Command handlers for the CLI application.
//!
//! This module organizes command handlers by category:
//! - `device`: Commands talking to the keyboard itself (list, info, reset, bootloader)
//! - `keymap`: Keycode and layer commands (get, set, read, write) and the
//!   local keymap (show, export, import, copy-layer, clear-layer)

pub mod device;
pub mod keymap;

use anyhow::{bail, Context};
use splitkb_keyboard::{Half, KeyboardError, KeyboardSession, KeymapStore, SessionOptions};
use splitkb_transport::HidChooser;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::AppConfig;

/// Result type for command handlers
pub type CommandResult = anyhow::Result<()>;

/// Start a session and connect whatever halves are plugged in.
///
/// In demo mode nothing is opened. Fails if no half could be connected.
pub async fn open_session(config: &AppConfig) -> anyhow::Result<KeyboardSession> {
    let session = KeyboardSession::new(
        Arc::new(HidChooser::new()),
        SessionOptions {
            variant: config.variant,
            timeout: config.timeout(),
        },
    );

    if config.demo {
        session.enter_demo().await;
        return Ok(session);
    }

    for half in Half::ALL {
        match session.connect_half(half).await {
            Ok(Some(connected)) => debug!("Connected {} half", connected),
            Ok(None) => debug!("No {} half found", half),
            Err(e) => warn!("Could not connect {} half: {}", half, e),
        }
    }

    if !session.state().connected {
        session.shutdown().await;
        bail!("No keyboard found (vendor 0xFEED, raw HID interface)");
    }
    Ok(session)
}

/// Open the local keymap for the configured variant
pub fn open_store(config: &AppConfig) -> anyhow::Result<KeymapStore> {
    KeymapStore::open(&config.keymap_dir, config.variant, config.max_layers)
        .with_context(|| format!("Failed to load keymap from {}", config.keymap_dir.display()))
}

/// Halves a command should act on: the requested one, or every connected one
pub fn target_halves(session: &KeyboardSession, half: Option<Half>) -> Vec<Half> {
    match half {
        Some(h) => vec![h],
        None => {
            let state = session.state();
            Half::ALL
                .into_iter()
                .filter(|h| state.demo_mode || state.half_connected(*h))
                .collect()
        }
    }
}

/// Run `f` against a freshly opened session, shutting it down afterwards
/// whether or not `f` succeeded.
pub async fn with_session<T, F, Fut>(config: &AppConfig, f: F) -> anyhow::Result<T>
where
    F: FnOnce(Arc<KeyboardSession>) -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<T>>,
{
    let session = Arc::new(open_session(config).await?);
    let result = f(Arc::clone(&session)).await;
    session.shutdown().await;
    if let Err(e) = &result {
        if e
            .downcast_ref::<KeyboardError>()
            .is_some_and(KeyboardError::is_usb_stack_stuck)
        {
            eprintln!("The keyboard's USB stack stopped accepting commands.");
            eprintln!("Unplug both halves, plug them back in, then retry.");
        }
    }
    result
}
