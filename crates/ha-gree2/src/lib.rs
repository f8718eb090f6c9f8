//! Gree air conditioner integration
//!
//! Onboards Gree units on the LAN through a config flow and exposes each
//! as one climate entity plus one switch per selected feature flag.
//!
//! # Key Types
//!
//! - [`Gree2`] - The integration registered with the host
//! - [`GreeConfig`] - Typed view of a config entry's data
//! - [`DeviceHub`] - Live device connections keyed by MAC
//! - [`GreeClimate`] / [`GreeSwitch`] - The entities
//! - [`GreeConfigFlow`] / [`GreeOptionsFlow`] - Onboarding and reconfiguration
//!
//! The wire protocol lives behind [`DeviceConnector`]; hosts plug in a
//! client for the Gree UDP protocol.

pub mod climate;
pub mod config;
pub mod config_flow;
pub mod device;
pub mod error;
pub mod feature;
pub mod hub;
pub mod identity;
pub mod modes;
pub mod switch;
pub mod validation;

use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use dashmap::DashMap;
use futures::FutureExt;
use ha_config_entries::{ConfigEntry, ConfigFlow, EntityPlatform, HomeAssistant, Integration};
use ha_core::Platform;
use tracing::{debug, info, warn};

pub use climate::GreeClimate;
pub use config::GreeConfig;
pub use config_flow::{GreeConfigFlow, GreeOptionsFlow};
pub use device::{ClimateDevice, DeviceConnector, DeviceError, DeviceParams, StateDelta};
pub use error::{GreeError, GreeResult};
pub use feature::Feature;
pub use hub::DeviceHub;
pub use identity::DeviceIdentity;
pub use modes::{FanMode, HvacMode, SwingMode};
pub use switch::GreeSwitch;

pub const DOMAIN: &str = "gree2";

/// Platforms each entry is forwarded to
pub const PLATFORMS: [Platform; 2] = [Platform::Climate, Platform::Switch];

/// Everything one loaded entry owns
struct EntryRuntime {
    mac: String,
    climate_platform: Arc<EntityPlatform>,
    switch_platform: Arc<EntityPlatform>,
    climate: Arc<GreeClimate>,
    switches: Vec<Arc<GreeSwitch>>,
}

/// The gree2 integration
pub struct Gree2 {
    hub: Arc<DeviceHub>,
    entries: DashMap<String, EntryRuntime>,
}

impl Gree2 {
    pub fn new(connector: Arc<dyn DeviceConnector>) -> Arc<Self> {
        Arc::new(Self {
            hub: Arc::new(DeviceHub::new(connector)),
            entries: DashMap::new(),
        })
    }

    /// Register with the host's config entries
    pub fn register(self: &Arc<Self>, hass: &HomeAssistant) {
        hass.config_entries
            .register_integration(Arc::clone(self) as Arc<dyn Integration>);
    }

    pub fn hub(&self) -> &Arc<DeviceHub> {
        &self.hub
    }

    pub fn climate(&self, entry_id: &str) -> Option<Arc<GreeClimate>> {
        self.entries.get(entry_id).map(|r| Arc::clone(&r.climate))
    }

    pub fn switches(&self, entry_id: &str) -> Vec<Arc<GreeSwitch>> {
        self.entries
            .get(entry_id)
            .map(|r| r.switches.clone())
            .unwrap_or_default()
    }

    pub fn switch(&self, entry_id: &str, feature: Feature) -> Option<Arc<GreeSwitch>> {
        self.switches(entry_id)
            .into_iter()
            .find(|s| s.feature() == feature)
    }

    /// One polling pass over an entry's entities
    ///
    /// The climate entity refreshes the shared device first so the switches
    /// write fresh state.
    pub async fn update_entry(&self, entry_id: &str) -> usize {
        let Some(platforms) = self.entries.get(entry_id).map(|r| {
            [
                Arc::clone(&r.climate_platform),
                Arc::clone(&r.switch_platform),
            ]
        }) else {
            return 0;
        };

        let mut updated = 0;
        for platform in platforms {
            updated += platform.update_entities().await;
        }
        updated
    }

    pub fn is_loaded(&self, entry_id: &str) -> bool {
        self.entries.contains_key(entry_id)
    }
}

#[async_trait]
impl Integration for Gree2 {
    fn domain(&self) -> &str {
        DOMAIN
    }

    async fn setup_entry(&self, hass: &HomeAssistant, entry: &ConfigEntry) -> anyhow::Result<()> {
        let config = GreeConfig::from_data(&entry.data).context("invalid gree2 entry data")?;
        let mac = config.identity().mac().to_string();

        let (climate_platform, climate) =
            climate::setup_entry(hass, entry, &config, &self.hub).await?;

        let (switch_platform, switches) =
            match switch::setup_entry(hass, entry, &config, &self.hub).await {
                Ok(switch) => switch,
                Err(err) => {
                    climate_platform.remove_entities();
                    self.hub.remove_entry(&entry.entry_id);
                    return Err(err.into());
                }
            };

        hass.config_entries.add_update_listener(
            &entry.entry_id,
            Arc::new(|hass: HomeAssistant, entry: ConfigEntry| {
                async move {
                    debug!("Options of {} changed, reloading", entry.title);
                    if let Err(err) = hass.config_entries.reload(&hass, &entry.entry_id).await {
                        warn!("Reload of entry {} failed: {}", entry.entry_id, err);
                    }
                }
                .boxed()
            }),
        );

        info!(
            "Set up {} with {} switches ({})",
            config.identity().name(),
            switches.len(),
            mac
        );
        self.entries.insert(
            entry.entry_id.clone(),
            EntryRuntime {
                mac,
                climate_platform,
                switch_platform,
                climate,
                switches,
            },
        );
        Ok(())
    }

    async fn unload_entry(
        &self,
        _hass: &HomeAssistant,
        entry: &ConfigEntry,
    ) -> anyhow::Result<bool> {
        let Some((_, runtime)) = self.entries.remove(&entry.entry_id) else {
            return Ok(true);
        };

        let removed =
            runtime.climate_platform.remove_entities() + runtime.switch_platform.remove_entities();
        self.hub.remove_entry(&entry.entry_id);
        debug!(
            "Unloaded {}: {} entities removed, device {} released",
            entry.entry_id, removed, runtime.mac
        );
        Ok(true)
    }

    fn config_flow(&self, _hass: &HomeAssistant) -> Option<Box<dyn ConfigFlow>> {
        Some(Box::new(GreeConfigFlow::new(Arc::clone(&self.hub))))
    }

    fn options_flow(
        &self,
        _hass: &HomeAssistant,
        entry: &ConfigEntry,
    ) -> Option<Box<dyn ConfigFlow>> {
        Some(Box::new(GreeOptionsFlow::new(
            Arc::clone(&self.hub),
            entry.clone(),
        )))
    }
}
