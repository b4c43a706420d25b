//! Keymap command handlers.

use super::{open_store, target_halves, with_session, CommandResult};
use crate::config::AppConfig;
use anyhow::{anyhow, bail, Context};
use splitkb_keyboard::keycode;
use splitkb_keyboard::store::KeymapExport;
use splitkb_keyboard::{Half, KeyPosition, KeyboardVariant, LayerKeymap};
use std::path::Path;

fn parse_position(key: &str) -> anyhow::Result<KeyPosition> {
    key.parse::<KeyPosition>().map_err(|e| anyhow!(e))
}

/// Read one keycode
pub async fn get(config: &AppConfig, key: &str, layer: u8) -> CommandResult {
    let pos = parse_position(key)?;
    with_session(config, |session| async move {
        let kc = session
            .keymap()
            .read_keycode(layer, pos.row, pos.col, pos.half)
            .await?;
        println!("{pos} (layer {layer}): {} (0x{kc:04X})", keycode::decode(kc));
        anyhow::Ok(())
    })
    .await
}

/// Write one keycode, optionally recording it locally
pub async fn set(
    config: &AppConfig,
    key: &str,
    name: &str,
    layer: u8,
    save: bool,
) -> CommandResult {
    let pos = parse_position(key)?;
    let kc = keycode::try_encode(name).ok_or_else(|| anyhow!("unknown keycode: {name}"))?;
    let canonical = keycode::decode(kc);

    with_session(config, |session| async move {
        session
            .keymap()
            .write_keycode(layer, pos.row, pos.col, kc, pos.half)
            .await?;
        println!("{pos} (layer {layer}) set to {canonical}");
        anyhow::Ok(())
    })
    .await?;

    if save {
        let mut store = open_store(config)?;
        store.assign(usize::from(layer), pos, keycode::decode(kc))?;
        store.save()?;
    }
    Ok(())
}

/// Read a layer from the keyboard, optionally merging it into the store
pub async fn read(config: &AppConfig, layer: u8, half: Option<Half>, save: bool) -> CommandResult {
    let variant = config.variant;
    let keymaps = with_session(config, |session| async move {
        let mut keymaps = Vec::new();
        for h in target_halves(&session, half) {
            keymaps.push((h, session.keymap().read_layer_keymap(layer, h).await?));
        }
        anyhow::Ok(keymaps)
    })
    .await?;

    for (h, keymap) in &keymaps {
        println!("Layer {layer}, {h} half ({} assigned):", keymap.len());
        print!("{}", render_layer(variant, *h, keymap));
    }

    if save {
        let mut store = open_store(config)?;
        for (h, keymap) in &keymaps {
            store.merge_half(usize::from(layer), *h, keymap)?;
        }
        store.save()?;
        println!("Saved to {}", store.path().display());
    }
    Ok(())
}

/// Push a stored layer to the keyboard
pub async fn write(config: &AppConfig, layer: u8, half: Option<Half>) -> CommandResult {
    let store = open_store(config)?;
    let keymap = store
        .layer(usize::from(layer))
        .cloned()
        .ok_or_else(|| anyhow!("layer {layer} is not in the local keymap"))?;

    with_session(config, |session| async move {
        for h in target_halves(&session, half) {
            let written = session.keymap().write_layer_keymap(layer, &keymap, h).await?;
            println!("Wrote {written} keys to layer {layer} on {h} half");
        }
        anyhow::Ok(())
    })
    .await
}

/// Print a stored layer as a grid per half
pub fn show(config: &AppConfig, layer: usize) -> CommandResult {
    let store = open_store(config)?;
    let Some(keymap) = store.layer(layer) else {
        bail!(
            "layer {layer} out of range (0-{})",
            store.max_layers().saturating_sub(1)
        );
    };

    println!(
        "Layer {layer} of {} ({} assigned)",
        store.path().display(),
        store.assigned_count(layer)
    );
    for half in Half::ALL {
        println!("{half}:");
        print!("{}", render_layer(store.variant(), half, keymap));
    }
    Ok(())
}

/// Export the local keymap as a JSON document
pub fn export(config: &AppConfig, output: Option<&Path>) -> CommandResult {
    let store = open_store(config)?;
    let json = serde_json::to_string_pretty(&store.export())?;
    match output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Exported {} layers to {}", store.max_layers(), path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

/// Replace the local keymap with an exported document
pub fn import(config: &AppConfig, file: &Path) -> CommandResult {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let doc: KeymapExport = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a keymap export", file.display()))?;

    let mut store = open_store(config)?;
    let taken = store.import(&doc);
    store.save()?;
    println!(
        "Imported {taken} of {} layers into {}",
        doc.layers.len(),
        store.path().display()
    );
    Ok(())
}

pub fn copy_layer(config: &AppConfig, from: usize, to: usize) -> CommandResult {
    let mut store = open_store(config)?;
    store.copy_layer(from, to)?;
    store.save()?;
    println!("Copied layer {from} to layer {to}");
    Ok(())
}

pub fn clear_layer(config: &AppConfig, layer: usize) -> CommandResult {
    let mut store = open_store(config)?;
    store.clear_layer(layer)?;
    store.save()?;
    println!("Cleared layer {layer}");
    Ok(())
}

/// Grid of keycode names for one half, unassigned keys shown as `-`
fn render_layer(variant: KeyboardVariant, half: Half, keymap: &LayerKeymap) -> String {
    let dims = variant.dims(half);
    let cells: Vec<Vec<&str>> = (0..dims.rows)
        .map(|row| {
            (0..dims.cols)
                .map(|col| {
                    keymap
                        .get(&KeyPosition::new(half, row, col))
                        .map_or("-", String::as_str)
                })
                .collect()
        })
        .collect();
    let width = cells
        .iter()
        .flatten()
        .map(|c| c.len())
        .max()
        .unwrap_or(1);

    let mut out = String::new();
    for row in cells {
        let line: Vec<String> = row.iter().map(|c| format!("{c:<width$}")).collect();
        out.push_str("  ");
        out.push_str(line.join(" ").trim_end());
        out.push('\n');
    }
    out
}
