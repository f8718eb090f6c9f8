//! Climate platform
//!
//! One climate entity per config entry. Modes are narrowed to the user's
//! selection; swing is translated into the device's two swing flags.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use ha_config_entries::{attributes_from, ConfigEntry, EntityPlatform, HomeAssistant};
use ha_core::{DeviceInfo, Entity, EntityError, EntityId, Platform};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::GreeConfig;
use crate::device::{options, ClimateDevice, DeviceParams, StateDelta};
use crate::error::{GreeError, GreeResult};
use crate::hub::DeviceHub;
use crate::identity::DeviceIdentity;
use crate::modes::{enabled_fan_modes, enabled_hvac_modes, FanMode, HvacMode, SwingMode, SWING_MODES};
use crate::DOMAIN;

pub const CLIMATE_NAME: &str = "Air Conditioner";

/// How often the host polls the climate entity
pub const SCAN_INTERVAL: Duration = Duration::from_secs(5);

pub const MIN_TEMP: f64 = 16.0;
pub const MAX_TEMP: f64 = 30.0;

/// Climate entity of one air conditioner
pub struct GreeClimate {
    identity: DeviceIdentity,
    entity_id: EntityId,
    device: Arc<dyn ClimateDevice>,
    hvac_modes: Vec<HvacMode>,
    fan_modes: Vec<FanMode>,
    temp_step: f64,
    platform: Weak<EntityPlatform>,
}

impl GreeClimate {
    pub fn new(
        config: &GreeConfig,
        device: Arc<dyn ClimateDevice>,
        platform: Weak<EntityPlatform>,
    ) -> GreeResult<Self> {
        let identity = config.identity();
        info!("Initialize the device {}...", identity.name());

        Ok(Self {
            entity_id: identity.climate_entity_id()?,
            identity,
            device,
            hvac_modes: enabled_hvac_modes(&config.hvac_modes),
            fan_modes: enabled_fan_modes(&config.fan_modes),
            temp_step: config.temp_step,
            platform,
        })
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn hvac_modes(&self) -> &[HvacMode] {
        &self.hvac_modes
    }

    pub fn fan_modes(&self) -> &[FanMode] {
        &self.fan_modes
    }

    pub fn swing_modes(&self) -> &[SwingMode] {
        &SWING_MODES
    }

    pub fn hvac_mode(&self) -> HvacMode {
        self.device.hvac_mode()
    }

    pub fn fan_mode(&self) -> Option<FanMode> {
        self.device.fan_mode()
    }

    /// Current swing mode from the cached swing flags
    pub fn swing_mode(&self) -> SwingMode {
        SwingMode::from_flags(
            self.device.option(options::SWING_UP_DOWN) == Some(1),
            self.device.option(options::SWING_LEFT_RIGHT) == Some(1),
        )
    }

    pub fn target_temperature(&self) -> Option<f64> {
        self.device.target_temperature()
    }

    pub fn current_temperature(&self) -> Option<f64> {
        self.device.current_temperature()
    }

    fn is_powered_off(&self) -> bool {
        self.device.option(options::POWER) == Some(0)
    }

    /// Set swing; ignored while the unit is powered off
    pub async fn set_swing_mode(&self, mode: SwingMode) -> GreeResult<()> {
        info!("Set swing mode(): {}", mode);
        if self.is_powered_off() {
            warn!(
                "Ignoring swing mode {} for {}: unit is off",
                mode, self.entity_id
            );
            return Ok(());
        }

        let mut delta = StateDelta::new();
        delta.insert(options::SWING_UP_DOWN.to_string(), i64::from(mode.up_down()));
        delta.insert(
            options::SWING_LEFT_RIGHT.to_string(),
            i64::from(mode.left_right()),
        );
        debug!("SyncState with Swing={}", mode);
        self.device.sync_state(&delta).await?;
        self.write_state();
        Ok(())
    }

    pub async fn set_hvac_mode(&self, mode: HvacMode) -> GreeResult<()> {
        if !self.hvac_modes.contains(&mode) {
            return Err(GreeError::UnsupportedMode {
                kind: "hvac",
                mode: mode.to_string(),
            });
        }
        self.device.set_hvac_mode(mode).await?;
        self.write_state();
        Ok(())
    }

    pub async fn set_fan_mode(&self, mode: FanMode) -> GreeResult<()> {
        if !self.fan_modes.contains(&mode) {
            return Err(GreeError::UnsupportedMode {
                kind: "fan",
                mode: mode.to_string(),
            });
        }
        self.device.set_fan_mode(mode).await?;
        self.write_state();
        Ok(())
    }

    pub async fn set_temperature(&self, temperature: f64) -> GreeResult<()> {
        self.device.set_temperature(temperature).await?;
        self.write_state();
        Ok(())
    }

    fn write_state(&self) {
        match self.platform.upgrade() {
            Some(platform) => {
                platform.write_state(self);
            }
            None => debug!("{} is not added, skipping state write", self.entity_id),
        }
    }
}

fn names<T: ToString>(modes: &[T]) -> Value {
    json!(modes.iter().map(ToString::to_string).collect::<Vec<_>>())
}

#[async_trait]
impl Entity for GreeClimate {
    fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    fn unique_id(&self) -> Option<String> {
        Some(self.identity.climate_unique_id())
    }

    fn name(&self) -> Option<String> {
        Some(CLIMATE_NAME.to_string())
    }

    fn has_entity_name(&self) -> bool {
        true
    }

    fn device_info(&self) -> Option<DeviceInfo> {
        Some(self.identity.device_info())
    }

    fn state(&self) -> String {
        self.hvac_mode().to_string()
    }

    fn attributes(&self) -> HashMap<String, Value> {
        debug!("hvac_modes(): {:?}", self.hvac_modes);
        debug!("fan_list(): {:?}", self.fan_modes);
        attributes_from([
            ("hvac_modes", names(&self.hvac_modes)),
            ("fan_modes", names(&self.fan_modes)),
            ("swing_modes", names(self.swing_modes())),
            ("fan_mode", json!(self.fan_mode().map(|m| m.to_string()))),
            ("swing_mode", json!(self.swing_mode().to_string())),
            ("temperature", json!(self.target_temperature())),
            ("current_temperature", json!(self.current_temperature())),
            ("target_temp_step", json!(self.temp_step)),
            ("min_temp", json!(MIN_TEMP)),
            ("max_temp", json!(MAX_TEMP)),
        ])
    }

    async fn update(&self) -> Result<(), EntityError> {
        self.device
            .update()
            .await
            .map_err(|err| EntityError::Update {
                entity_id: self.entity_id.to_string(),
                reason: err.to_string(),
            })
    }
}

/// Connect the entry's device and add its climate entity
pub async fn setup_entry(
    hass: &HomeAssistant,
    entry: &ConfigEntry,
    config: &GreeConfig,
    hub: &DeviceHub,
) -> GreeResult<(Arc<EntityPlatform>, Arc<GreeClimate>)> {
    info!("Adding Gree climate device to hass...");

    let device = hub
        .get_or_connect(&entry.entry_id, &DeviceParams::from_config(config))
        .await?;

    let platform = Arc::new(
        EntityPlatform::new(hass.clone(), DOMAIN, Platform::Climate, &entry.entry_id)
            .with_scan_interval(SCAN_INTERVAL),
    );
    let climate = Arc::new(GreeClimate::new(config, device, Arc::downgrade(&platform))?);

    let entity: Arc<dyn Entity> = climate.clone();
    platform.add_entities(vec![entity], true).await;

    Ok((platform, climate))
}
