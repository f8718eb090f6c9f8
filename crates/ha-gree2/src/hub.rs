//! Live device handles shared by the entities of each config entry

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};

use crate::device::{ClimateDevice, DeviceConnector, DeviceError, DeviceParams};
use crate::identity::normalize_mac;

/// Connected devices keyed by normalized hardware address
///
/// The climate platform connects the device; switches of the same entry
/// look it up by address.
pub struct DeviceHub {
    connector: Arc<dyn DeviceConnector>,
    devices: DashMap<String, Arc<dyn ClimateDevice>>,
    /// entry_id -> mac
    entries: DashMap<String, String>,
}

impl DeviceHub {
    pub fn new(connector: Arc<dyn DeviceConnector>) -> Self {
        Self {
            connector,
            devices: DashMap::new(),
            entries: DashMap::new(),
        }
    }

    /// Connect without keeping the device
    pub async fn probe(
        &self,
        params: &DeviceParams,
    ) -> Result<Arc<dyn ClimateDevice>, DeviceError> {
        self.connector.connect(params).await
    }

    /// Live device for the entry's address, connecting on first use
    pub async fn get_or_connect(
        &self,
        entry_id: &str,
        params: &DeviceParams,
    ) -> Result<Arc<dyn ClimateDevice>, DeviceError> {
        let mac = normalize_mac(&params.mac);

        let device = match self.get(&mac) {
            Some(device) => {
                debug!("Reusing connected device {}", mac);
                device
            }
            None => {
                let device = self.connector.connect(params).await?;
                info!("Connected to {} at {}:{}", mac, params.host, params.port);

                // A concurrent connect may have won; keep the first one
                let device = self.devices.entry(mac.clone()).or_insert(device);
                Arc::clone(device.value())
            }
        };

        self.entries.insert(entry_id.to_string(), mac);
        Ok(device)
    }

    pub fn get(&self, mac: &str) -> Option<Arc<dyn ClimateDevice>> {
        self.devices
            .get(&normalize_mac(mac))
            .map(|d| Arc::clone(d.value()))
    }

    pub fn contains(&self, mac: &str) -> bool {
        self.devices.contains_key(&normalize_mac(mac))
    }

    pub fn remove(&self, mac: &str) -> Option<Arc<dyn ClimateDevice>> {
        self.devices.remove(&normalize_mac(mac)).map(|(_, d)| d)
    }

    /// Forget the entry and drop its device
    pub fn remove_entry(&self, entry_id: &str) -> Option<Arc<dyn ClimateDevice>> {
        let (_, mac) = self.entries.remove(entry_id)?;
        debug!("Dropping device {} of entry {}", mac, entry_id);
        self.remove(&mac)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
