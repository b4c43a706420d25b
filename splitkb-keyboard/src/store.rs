//! Locally persisted keymap
//!
//! One JSON file per keyboard variant holding a flat array of layers, each a
//! `"half-row-col" -> keycode string` map. The array always has exactly
//! `max_layers` entries after loading.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::defaults;
use crate::error::KeyboardError;
use crate::matrix::{KeyPosition, KeyboardVariant};
use crate::LayerKeymap;

/// Default number of layers kept in the store
pub const DEFAULT_MAX_LAYERS: usize = 16;

/// Current export document version
pub const EXPORT_VERSION: u32 = 1;

/// Portable keymap document: `{version, layers: [{layer, keycodes}]}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeymapExport {
    pub version: u32,
    pub layers: Vec<ExportedLayer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedLayer {
    /// Signed so that out-of-range entries in foreign documents still parse
    pub layer: i64,
    pub keycodes: LayerKeymap,
}

/// Keys that don't parse as a position are dropped, not fatal
fn parse_layer((index, raw): (usize, BTreeMap<String, String>)) -> LayerKeymap {
    let mut layer = LayerKeymap::new();
    for (key, keycode) in raw {
        match key.parse::<KeyPosition>() {
            Ok(pos) => {
                layer.insert(pos, keycode);
            }
            Err(e) => warn!("Skipping stored key {:?} on layer {}: {}", key, index, e),
        }
    }
    layer
}

/// Per-variant keymap store
#[derive(Debug)]
pub struct KeymapStore {
    path: PathBuf,
    variant: KeyboardVariant,
    layers: Vec<LayerKeymap>,
}

impl KeymapStore {
    pub fn file_name(variant: KeyboardVariant) -> String {
        format!("keymap-{variant}.json")
    }

    /// Load the store for `variant` from `dir`.
    ///
    /// A missing file yields a fresh store with the factory layer 0. A file
    /// with the wrong number of layers is padded or truncated.
    pub fn open(
        dir: &Path,
        variant: KeyboardVariant,
        max_layers: usize,
    ) -> Result<Self, KeyboardError> {
        if max_layers == 0 {
            return Err(KeyboardError::InvalidParameter(
                "max_layers must be at least 1".into(),
            ));
        }
        let path = dir.join(Self::file_name(variant));

        let mut layers: Vec<LayerKeymap> = if path.exists() {
            let content = fs::read_to_string(&path)?;
            let raw: Vec<BTreeMap<String, String>> = serde_json::from_str(&content)?;
            debug!("Loaded {} layers from {}", raw.len(), path.display());
            raw.into_iter().enumerate().map(parse_layer).collect()
        } else {
            info!("No stored keymap at {}; using factory defaults", path.display());
            vec![defaults::default_layer0(variant)]
        };

        if layers.len() != max_layers {
            if path.exists() {
                warn!(
                    "Stored keymap has {} layers, expected {}; adjusting",
                    layers.len(),
                    max_layers
                );
            }
            layers.resize_with(max_layers, LayerKeymap::new);
        }

        Ok(Self {
            path,
            variant,
            layers,
        })
    }

    pub fn save(&self) -> Result<(), KeyboardError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.layers)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path)?;
        debug!("Saved keymap to {}", self.path.display());
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn variant(&self) -> KeyboardVariant {
        self.variant
    }

    pub fn max_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn layers(&self) -> &[LayerKeymap] {
        &self.layers
    }

    pub fn layer(&self, layer: usize) -> Option<&LayerKeymap> {
        self.layers.get(layer)
    }

    fn layer_mut(&mut self, layer: usize) -> Result<&mut LayerKeymap, KeyboardError> {
        let max = self.layers.len();
        self.layers.get_mut(layer).ok_or_else(|| {
            KeyboardError::InvalidParameter(format!("layer {layer} out of range (0-{})", max - 1))
        })
    }

    pub fn assign(
        &mut self,
        layer: usize,
        pos: KeyPosition,
        keycode: impl Into<String>,
    ) -> Result<(), KeyboardError> {
        self.layer_mut(layer)?.insert(pos, keycode.into());
        Ok(())
    }

    pub fn get(&self, layer: usize, pos: &KeyPosition) -> Option<&str> {
        self.layers.get(layer)?.get(pos).map(String::as_str)
    }

    /// Remove one assignment, returning the old keycode
    pub fn clear_key(
        &mut self,
        layer: usize,
        pos: &KeyPosition,
    ) -> Result<Option<String>, KeyboardError> {
        Ok(self.layer_mut(layer)?.remove(pos))
    }

    pub fn copy_layer(&mut self, from: usize, to: usize) -> Result<(), KeyboardError> {
        let source = self
            .layers
            .get(from)
            .cloned()
            .ok_or_else(|| KeyboardError::InvalidParameter(format!("layer {from} out of range")))?;
        *self.layer_mut(to)? = source;
        Ok(())
    }

    pub fn clear_layer(&mut self, layer: usize) -> Result<(), KeyboardError> {
        self.layer_mut(layer)?.clear();
        Ok(())
    }

    pub fn assigned_count(&self, layer: usize) -> usize {
        self.layers.get(layer).map_or(0, |l| l.len())
    }

    /// Replace one half's entries in `layer` with `keymap`'s entries for it
    pub fn merge_half(
        &mut self,
        layer: usize,
        half: splitkb_transport::Half,
        keymap: &LayerKeymap,
    ) -> Result<(), KeyboardError> {
        let target = self.layer_mut(layer)?;
        target.retain(|pos, _| pos.half != half);
        target.extend(
            keymap
                .iter()
                .filter(|(pos, _)| pos.half == half)
                .map(|(pos, kc)| (*pos, kc.clone())),
        );
        Ok(())
    }

    /// Restore layer 0 to the factory default of both halves
    pub fn reset_layer0(&mut self) {
        self.layers[0] = defaults::default_layer0(self.variant);
    }

    pub fn export(&self) -> KeymapExport {
        KeymapExport {
            version: EXPORT_VERSION,
            layers: self
                .layers
                .iter()
                .enumerate()
                .map(|(i, keycodes)| ExportedLayer {
                    layer: i as i64,
                    keycodes: keycodes.clone(),
                })
                .collect(),
        }
    }

    /// Replace every layer with the document's contents.
    ///
    /// Layers missing from the document come back empty; entries whose layer
    /// index is out of range are skipped. Returns the number of layers taken.
    pub fn import(&mut self, doc: &KeymapExport) -> usize {
        if doc.version != EXPORT_VERSION {
            warn!("Importing keymap document version {}", doc.version);
        }
        let max = self.layers.len();
        let mut layers = vec![LayerKeymap::new(); max];
        let mut taken = 0;
        for entry in &doc.layers {
            match usize::try_from(entry.layer) {
                Ok(i) if i < max => {
                    layers[i] = entry.keycodes.clone();
                    taken += 1;
                }
                _ => warn!("Skipping out-of-range layer {} in import", entry.layer),
            }
        }
        self.layers = layers;
        taken
    }
}
