//! Device discovery for the keyboard halves

use std::sync::Arc;

use async_trait::async_trait;
use hidapi::HidApi;
use tracing::{debug, info};

use crate::device_registry::{self, RAW_HID_USAGE, RAW_HID_USAGE_PAGE};
use crate::error::TransportError;
use crate::hid_raw::HidRawHandle;
use crate::types::{DeviceFilter, HandleInfo};
use crate::SharedHandle;

/// Picks one device out of the ones matching `filters`
///
/// Plays the role of the browser's device picker: returns `None` when the
/// user (or the environment) selected nothing.
#[async_trait]
pub trait DeviceChooser: Send + Sync {
    async fn request_device(
        &self,
        filters: &[DeviceFilter],
    ) -> Result<Option<SharedHandle>, TransportError>;
}

/// A VIA interface seen on the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedDevice {
    pub info: HandleInfo,
    pub serial: Option<String>,
}

/// hidapi-backed chooser
///
/// Only the raw HID interface (usage page 0xFF60, usage 0x61) is considered.
/// Without a preferred product id the first match in filter order wins.
#[derive(Debug, Default, Clone)]
pub struct HidChooser {
    preferred_pid: Option<u16>,
}

impl HidChooser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefer the device with this product id when several match
    pub fn with_product_id(pid: u16) -> Self {
        Self {
            preferred_pid: Some(pid),
        }
    }

    fn is_raw_hid_interface(device_info: &hidapi::DeviceInfo) -> bool {
        device_info.usage_page() == RAW_HID_USAGE_PAGE && device_info.usage() == RAW_HID_USAGE
    }

    fn scan(filters: &[DeviceFilter]) -> Result<Vec<ListedDevice>, TransportError> {
        let api = HidApi::new().map_err(|e| TransportError::HidError(e.to_string()))?;
        let mut devices = Vec::new();

        for device_info in api.device_list() {
            let vid = device_info.vendor_id();
            let pid = device_info.product_id();

            if !filters.iter().any(|f| f.matches(vid, pid)) {
                continue;
            }
            if !Self::is_raw_hid_interface(device_info) {
                continue;
            }

            let path = device_info.path().to_string_lossy().to_string();
            debug!("Found VIA interface: VID={:04X} PID={:04X} path={}", vid, pid, path);

            devices.push(ListedDevice {
                info: HandleInfo {
                    vid,
                    pid,
                    device_path: path,
                    product_name: device_info.product_string().map(|s| s.to_string()),
                },
                serial: device_info.serial_number().map(|s| s.to_string()),
            });
        }

        // Stable order: filter order first, then path
        devices.sort_by_key(|d| {
            let rank = filters
                .iter()
                .position(|f| f.matches(d.info.vid, d.info.pid))
                .unwrap_or(usize::MAX);
            (rank, d.info.device_path.clone())
        });

        Ok(devices)
    }

    /// List every VIA interface matching the known keyboard ids
    pub async fn list_devices(&self) -> Result<Vec<ListedDevice>, TransportError> {
        let filters = device_registry::chooser_filters();
        let devices = tokio::task::spawn_blocking(move || Self::scan(&filters))
            .await
            .map_err(|e| TransportError::Internal(format!("scan task failed: {e}")))??;
        info!("Found {} VIA interface(s)", devices.len());
        Ok(devices)
    }
}

#[async_trait]
impl DeviceChooser for HidChooser {
    async fn request_device(
        &self,
        filters: &[DeviceFilter],
    ) -> Result<Option<SharedHandle>, TransportError> {
        let owned = filters.to_vec();
        let devices = tokio::task::spawn_blocking(move || Self::scan(&owned))
            .await
            .map_err(|e| TransportError::Internal(format!("scan task failed: {e}")))??;

        let chosen = match self.preferred_pid {
            Some(pid) => devices.into_iter().find(|d| d.info.pid == pid),
            None => devices.into_iter().next(),
        };

        Ok(chosen.map(|d| {
            debug!(
                "Chose {:04X}:{:04X} ({})",
                d.info.vid,
                d.info.pid,
                d.info.product_name.as_deref().unwrap_or("unknown")
            );
            Arc::new(HidRawHandle::new(d.info)) as SharedHandle
        }))
    }
}
