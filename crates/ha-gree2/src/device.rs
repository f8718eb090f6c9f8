//! Air conditioner device contract
//!
//! The LAN protocol (discovery, encryption, UDP polling) lives outside this
//! crate. The integration only talks to a connected device through
//! [`ClimateDevice`] and obtains one through a [`DeviceConnector`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use thiserror::Error;

use crate::config::GreeConfig;
use crate::identity::normalize_mac;
use crate::modes::{FanMode, HvacMode, SwingMode, FAN_MODES, HVAC_MODES, SWING_MODES};

/// Device option key -> raw value, sent in insertion order
pub type StateDelta = IndexMap<String, i64>;

/// Raw device option keys read by the integration
pub mod options {
    pub const POWER: &str = "Pow";
    pub const MODE: &str = "Mod";
    pub const TARGET_TEMPERATURE: &str = "SetTem";
    pub const FAN_SPEED: &str = "WdSpd";
    pub const SWING_UP_DOWN: &str = "SwUpDn";
    pub const SWING_LEFT_RIGHT: &str = "SwingLfRig";
}

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Device at {host}:{port} did not answer")]
    Unreachable { host: String, port: u16 },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Everything a connector needs to reach one device
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceParams {
    pub name: String,
    pub host: String,
    pub port: u16,
    /// Colon-less lowercase hardware address
    pub mac: String,
    pub timeout: Duration,
    pub temp_step: f64,
    pub temp_sensor: Option<String>,
    pub hvac_modes: Vec<HvacMode>,
    pub fan_modes: Vec<FanMode>,
    pub swing_modes: Vec<SwingMode>,
    pub encryption_key: Option<String>,
    pub uid: Option<i64>,
}

impl DeviceParams {
    /// Parameters for a configured device
    ///
    /// The device always receives the full canonical mode lists; narrowing
    /// to the user's selection happens in the climate entity.
    pub fn from_config(config: &GreeConfig) -> Self {
        Self {
            name: config.identity().name().to_string(),
            host: config.host.clone(),
            port: config.port,
            mac: normalize_mac(&config.mac_addr),
            timeout: config.timeout(),
            temp_step: config.temp_step,
            temp_sensor: config.temp_sensor.clone().filter(|s| !s.is_empty()),
            hvac_modes: HVAC_MODES.to_vec(),
            fan_modes: FAN_MODES.to_vec(),
            swing_modes: SWING_MODES.to_vec(),
            encryption_key: config.encryption_key.clone().filter(|k| !k.is_empty()),
            uid: config.uid,
        }
    }
}

/// A connected air conditioner
///
/// Implementations keep a cache of the last polled options; `sync_state`
/// pushes a delta to the device and updates that cache.
#[async_trait]
pub trait ClimateDevice: Send + Sync {
    /// Cached raw option value
    fn option(&self, key: &str) -> Option<i64>;

    async fn sync_state(&self, delta: &StateDelta) -> Result<(), DeviceError>;

    fn hvac_mode(&self) -> HvacMode;

    fn fan_mode(&self) -> Option<FanMode>;

    fn target_temperature(&self) -> Option<f64>;

    fn current_temperature(&self) -> Option<f64>;

    async fn set_hvac_mode(&self, mode: HvacMode) -> Result<(), DeviceError>;

    async fn set_fan_mode(&self, mode: FanMode) -> Result<(), DeviceError>;

    async fn set_temperature(&self, temperature: f64) -> Result<(), DeviceError>;

    /// Poll the device and refresh the cache
    async fn update(&self) -> Result<(), DeviceError>;
}

/// Creates connected devices
///
/// A successful `connect` doubles as the reachability probe of the
/// config flow.
#[async_trait]
pub trait DeviceConnector: Send + Sync {
    async fn connect(&self, params: &DeviceParams) -> Result<Arc<dyn ClimateDevice>, DeviceError>;
}
