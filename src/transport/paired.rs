//! Paired Bluetooth device listing
//!
//! Discovery and pairing belong to the platform stack; this only reads back
//! the devices the adapter already trusts so one can be picked by address.

use anyhow::Result;
use bluer::{Adapter, Address};
use tracing::debug;

/// A device the adapter is paired with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairedDevice {
    /// Bluetooth MAC address
    pub address: Address,
    /// Advertised name, if BlueZ knows one
    pub name: Option<String>,
    /// Whether BlueZ currently holds a connection to it
    pub connected: bool,
}

impl PairedDevice {
    /// Name to show for the device, falling back to its address
    pub fn label(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.address.to_string())
    }
}

/// Get the default Bluetooth adapter
pub async fn get_adapter() -> Result<Adapter> {
    let session = bluer::Session::new().await?;
    let adapter = session.default_adapter().await?;
    adapter.set_powered(true).await?;
    Ok(adapter)
}

/// List the paired devices of the default adapter
pub async fn paired_devices() -> Result<Vec<PairedDevice>> {
    let adapter = get_adapter().await?;
    list_paired_devices(&adapter).await
}

/// List the adapter's paired devices, named devices first then by label
pub async fn list_paired_devices(adapter: &Adapter) -> Result<Vec<PairedDevice>> {
    let mut devices = Vec::new();

    for address in adapter.device_addresses().await? {
        let device = adapter.device(address)?;
        if !device.is_paired().await.unwrap_or(false) {
            continue;
        }

        devices.push(PairedDevice {
            address,
            name: device.name().await.ok().flatten(),
            connected: device.is_connected().await.unwrap_or(false),
        });
    }

    debug!("[BT] {} paired devices", devices.len());
    sort_devices(&mut devices);
    Ok(devices)
}

fn sort_devices(devices: &mut [PairedDevice]) {
    devices.sort_by(|a, b| {
        b.name
            .is_some()
            .cmp(&a.name.is_some())
            .then_with(|| a.label().cmp(&b.label()))
    });
}
