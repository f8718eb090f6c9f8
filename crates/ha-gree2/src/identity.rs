//! Device identity shared by the climate and switch entities

use ha_core::{DeviceInfo, EntityId, Platform};

use crate::error::GreeResult;
use crate::feature::Feature;
use crate::DOMAIN;

pub const MANUFACTURER: &str = "Gree";

/// Lowercase hardware address with the colons removed
pub fn normalize_mac(mac_addr: &str) -> String {
    mac_addr.replace(':', "").to_lowercase()
}

/// Display name and normalized hardware address of one air conditioner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    name: String,
    mac: String,
}

impl DeviceIdentity {
    /// An absent or empty name falls back to `Gree_<mac>`
    pub fn new(name: Option<&str>, mac_addr: &str) -> Self {
        let mac = normalize_mac(mac_addr);
        let name = match name {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("Gree_{mac}"),
        };
        Self { name, mac }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mac(&self) -> &str {
        &self.mac
    }

    /// `gree_<mac>`, shared by every entity of the device
    pub fn object_id_prefix(&self) -> String {
        format!("gree_{}", self.mac)
    }

    pub fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            identifiers: vec![(DOMAIN.to_string(), self.mac.clone())],
            name: Some(self.name.clone()),
            manufacturer: Some(MANUFACTURER.to_string()),
            model: Some(self.mac.clone()),
        }
    }

    pub fn climate_entity_id(&self) -> GreeResult<EntityId> {
        Ok(EntityId::for_platform(
            Platform::Climate,
            self.object_id_prefix(),
        )?)
    }

    pub fn switch_entity_id(&self, feature: Feature) -> GreeResult<EntityId> {
        Ok(EntityId::for_platform(
            Platform::Switch,
            format!("{}_{}", self.object_id_prefix(), feature),
        )?)
    }

    pub fn climate_unique_id(&self) -> String {
        format!("{}.{}", DOMAIN, self.object_id_prefix())
    }

    pub fn switch_unique_id(&self, feature: Feature) -> String {
        format!("{}.{}_{}", DOMAIN, self.object_id_prefix(), feature)
    }
}
