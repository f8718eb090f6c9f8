//! Switch platform
//!
//! One switch per selected feature flag. Switches do not own the device;
//! they look it up in the hub on every call so a reconnect is picked up.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use ha_config_entries::{ConfigEntry, EntityPlatform, HomeAssistant};
use ha_core::{DeviceInfo, Entity, EntityId, Platform, STATE_OFF, STATE_ON};
use tracing::{debug, info};

use crate::config::GreeConfig;
use crate::device::ClimateDevice;
use crate::error::{GreeError, GreeResult};
use crate::feature::Feature;
use crate::hub::DeviceHub;
use crate::identity::DeviceIdentity;
use crate::DOMAIN;

pub const DEVICE_CLASS: &str = "switch";

/// How often the host polls the feature switches
pub const SCAN_INTERVAL: Duration = Duration::from_secs(5);

pub struct GreeSwitch {
    identity: DeviceIdentity,
    feature: Feature,
    entity_id: EntityId,
    hub: Arc<DeviceHub>,
    platform: Weak<EntityPlatform>,
}

impl GreeSwitch {
    pub fn new(
        identity: DeviceIdentity,
        feature: Feature,
        hub: Arc<DeviceHub>,
        platform: Weak<EntityPlatform>,
    ) -> GreeResult<Self> {
        Ok(Self {
            entity_id: identity.switch_entity_id(feature)?,
            identity,
            feature,
            hub,
            platform,
        })
    }

    pub fn feature(&self) -> Feature {
        self.feature
    }

    fn device(&self) -> Option<Arc<dyn ClimateDevice>> {
        self.hub.get(self.identity.mac())
    }

    /// Cached device flag; off while the device is not connected
    pub fn is_on(&self) -> bool {
        self.device()
            .and_then(|device| device.option(self.feature.option_key()))
            == Some(1)
    }

    pub async fn turn_on(&self) -> GreeResult<()> {
        self.toggle(true).await
    }

    pub async fn turn_off(&self) -> GreeResult<()> {
        self.toggle(false).await
    }

    async fn toggle(&self, on: bool) -> GreeResult<()> {
        let device = self.device().ok_or_else(|| GreeError::DeviceNotReady {
            mac: self.identity.mac().to_string(),
        })?;

        device.sync_state(&self.feature.payload(on)).await?;
        debug!("{} switched {}", self.entity_id, if on { STATE_ON } else { STATE_OFF });

        if let Some(platform) = self.platform.upgrade() {
            platform.write_state(self);
        }
        Ok(())
    }
}

#[async_trait]
impl Entity for GreeSwitch {
    fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    fn unique_id(&self) -> Option<String> {
        Some(self.identity.switch_unique_id(self.feature))
    }

    fn name(&self) -> Option<String> {
        Some(self.feature.label().to_string())
    }

    fn has_entity_name(&self) -> bool {
        true
    }

    fn icon(&self) -> Option<String> {
        Some(self.feature.icon().to_string())
    }

    fn device_class(&self) -> Option<String> {
        Some(DEVICE_CLASS.to_string())
    }

    fn device_info(&self) -> Option<DeviceInfo> {
        Some(self.identity.device_info())
    }

    fn state(&self) -> String {
        let state = if self.is_on() { STATE_ON } else { STATE_OFF };
        state.to_string()
    }
}

/// Add one switch per selected feature
///
/// Needs the device connected by the climate platform.
pub async fn setup_entry(
    hass: &HomeAssistant,
    entry: &ConfigEntry,
    config: &GreeConfig,
    hub: &Arc<DeviceHub>,
) -> GreeResult<(Arc<EntityPlatform>, Vec<Arc<GreeSwitch>>)> {
    let identity = config.identity();
    let features = config.features();
    info!(
        "Adding Gree climate switch {:?} to hass...",
        features.iter().map(Feature::as_str).collect::<Vec<_>>()
    );

    if !hub.contains(identity.mac()) {
        return Err(GreeError::DeviceNotReady {
            mac: identity.mac().to_string(),
        });
    }

    let platform = Arc::new(
        EntityPlatform::new(hass.clone(), DOMAIN, Platform::Switch, &entry.entry_id)
            .with_scan_interval(SCAN_INTERVAL),
    );

    let switches = features
        .into_iter()
        .map(|feature| {
            GreeSwitch::new(
                identity.clone(),
                feature,
                Arc::clone(hub),
                Arc::downgrade(&platform),
            )
            .map(Arc::new)
        })
        .collect::<GreeResult<Vec<_>>>()?;

    let entities: Vec<Arc<dyn Entity>> = switches
        .iter()
        .map(|switch| Arc::clone(switch) as Arc<dyn Entity>)
        .collect();
    platform.add_entities(entities, true).await;

    Ok((platform, switches))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::fake::FakeConnector;
    use crate::device::DeviceParams;
    use crate::feature::FEATURES;
    use serde_json::json;
    use tempfile::TempDir;

    fn config(function: serde_json::Value) -> GreeConfig {
        serde_json::from_value(json!({
            "host": "192.168.1.20",
            "mac_addr": "AA:BB:CC:DD:EE:FF",
            "function": function,
        }))
        .unwrap()
    }

    async fn connected_hub(config: &GreeConfig) -> (Arc<FakeConnector>, Arc<DeviceHub>) {
        let connector = Arc::new(FakeConnector::default());
        let hub = Arc::new(DeviceHub::new(connector.clone()));
        hub.get_or_connect("entry1", &DeviceParams::from_config(config))
            .await
            .unwrap();
        (connector, hub)
    }

    #[tokio::test]
    async fn test_one_switch_per_feature() {
        let temp_dir = TempDir::new().unwrap();
        let hass = HomeAssistant::new(temp_dir.path());
        let config = config(json!(FEATURES.iter().map(Feature::as_str).collect::<Vec<_>>()));
        let (_connector, hub) = connected_hub(&config).await;
        let entry = ConfigEntry::new(DOMAIN, "Gree");

        let (platform, switches) = setup_entry(&hass, &entry, &config, &hub).await.unwrap();

        assert_eq!(switches.len(), 7);
        assert_eq!(platform.len(), 7);
        assert_eq!(platform.scan_interval(), Some(SCAN_INTERVAL));
        let unique_ids: std::collections::HashSet<_> =
            switches.iter().filter_map(|s| s.unique_id()).collect();
        assert_eq!(unique_ids.len(), 7);
        assert!(unique_ids.contains("gree2.gree_aabbccddeeff_eightdegheat"));

        let state = hass.states.get("switch.gree_aabbccddeeff_xfan").unwrap();
        assert_eq!(state.state, "off");
        assert_eq!(state.friendly_name(), "Gree_aabbccddeeff X-Fan");
        assert_eq!(
            state.attribute::<String>("icon").as_deref(),
            Some("mdi:tumble-dryer")
        );
        assert_eq!(
            state.attribute::<String>("device_class").as_deref(),
            Some("switch")
        );
    }

    #[tokio::test]
    async fn test_toggle_sends_payload_and_writes_state() {
        let temp_dir = TempDir::new().unwrap();
        let hass = HomeAssistant::new(temp_dir.path());
        let config = config(json!(["sleep"]));
        let (connector, hub) = connected_hub(&config).await;
        let entry = ConfigEntry::new(DOMAIN, "Gree");

        let (_platform, switches) = setup_entry(&hass, &entry, &config, &hub).await.unwrap();
        let sleep = &switches[0];
        let device = connector.device("aabbccddeeff").unwrap();

        sleep.turn_on().await.unwrap();
        assert!(sleep.is_on());
        assert_eq!(device.option("SlpMod"), Some(1));
        assert!(hass.states.is_state("switch.gree_aabbccddeeff_sleep", "on"));

        sleep.turn_off().await.unwrap();
        assert!(!sleep.is_on());
        assert_eq!(device.sent().len(), 2);
        assert!(hass.states.is_state("switch.gree_aabbccddeeff_sleep", "off"));
    }

    #[tokio::test]
    async fn test_missing_device() {
        let temp_dir = TempDir::new().unwrap();
        let hass = HomeAssistant::new(temp_dir.path());
        let config = config(json!(["lights"]));
        let hub = Arc::new(DeviceHub::new(Arc::new(FakeConnector::default())));
        let entry = ConfigEntry::new(DOMAIN, "Gree");

        let result = setup_entry(&hass, &entry, &config, &hub).await;
        assert!(matches!(result, Err(GreeError::DeviceNotReady { .. })));

        let switch = GreeSwitch::new(config.identity(), Feature::Lights, hub, Weak::new()).unwrap();
        assert!(!switch.is_on());
        assert!(matches!(
            switch.turn_on().await,
            Err(GreeError::DeviceNotReady { .. })
        ));
    }
}
