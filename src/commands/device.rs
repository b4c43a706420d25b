//! Device command handlers.

use super::{target_halves, with_session, CommandResult};
use crate::config::AppConfig;
use splitkb_keyboard::Half;
use splitkb_transport::{half_for_pid, HidChooser, VIA_PROTOCOL_VERSION};

/// List VIA interfaces on the bus
pub async fn list(config: &AppConfig) -> CommandResult {
    if config.demo {
        println!("Demo mode: simulated left and right halves");
        return Ok(());
    }

    let devices = HidChooser::new().list_devices().await?;
    if devices.is_empty() {
        println!("No VIA keyboard found");
        return Ok(());
    }

    println!("Found {} device(s):", devices.len());
    for dev in &devices {
        let half = half_for_pid(dev.info.pid).map_or("unsupported", Half::as_str);
        println!(
            "  {:04x}:{:04x} {:<12} {} ({})",
            dev.info.vid,
            dev.info.pid,
            half,
            dev.info.product_name.as_deref().unwrap_or("Unknown"),
            dev.info.device_path
        );
        if let Some(serial) = &dev.serial {
            println!("    serial: {serial}");
        }
    }
    Ok(())
}

/// Show protocol version, layer count and uptime per half
pub async fn info(config: &AppConfig) -> CommandResult {
    with_session(config, |session| async move {
        for half in target_halves(&session, None) {
            let sync = session.keymap();
            let version = sync.get_protocol_version(half).await?;
            let layers = sync.get_layer_count(half).await?;
            let uptime = sync.get_uptime(half).await?;

            println!("{half} half:");
            println!("  VIA protocol: 0x{version:04X}");
            if version != VIA_PROTOCOL_VERSION {
                println!(
                    "  Warning: expected protocol 0x{VIA_PROTOCOL_VERSION:04X}, some commands may not work"
                );
            }
            println!("  Layers:       {layers}");
            println!("  Uptime:       {:.1}s", f64::from(uptime) / 1000.0);
            println!("  Matrix:       {}", describe_dims(sync.dims(half)));
        }
        anyhow::Ok(())
    })
    .await
}

fn describe_dims(dims: splitkb_keyboard::MatrixDims) -> String {
    format!("{} rows x {} cols", dims.rows, dims.cols)
}

/// Reset the firmware keymap, optionally the local layer 0 too
pub async fn reset(config: &AppConfig, half: Option<Half>, local: bool) -> CommandResult {
    with_session(config, |session| async move {
        for h in target_halves(&session, half) {
            session.keymap().reset_keymap(h).await?;
            println!("Reset keymap on {h} half");
        }
        anyhow::Ok(())
    })
    .await?;

    if local {
        let mut store = super::open_store(config)?;
        store.reset_layer0();
        store.save()?;
        println!("Restored layer 0 of {}", store.path().display());
    }
    Ok(())
}

/// Reboot one half into its bootloader
pub async fn bootloader(config: &AppConfig, half: Half) -> CommandResult {
    with_session(config, |session| async move {
        println!("Rebooting {half} half into bootloader...");
        session.keymap().reboot_to_bootloader(half).await?;
        println!("Done; the half should now show up as a bootloader device");
        anyhow::Ok(())
    })
    .await
}
