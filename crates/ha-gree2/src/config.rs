//! Configuration stored in a gree2 config entry

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GreeResult;
use crate::feature::{Feature, DEFAULT_FEATURES};
use crate::identity::DeviceIdentity;
use crate::modes::{FanMode, HvacMode, DEFAULT_HVAC_MODES, FAN_MODES};

pub const DEFAULT_PORT: u16 = 7000;
pub const DEFAULT_TARGET_TEMP_STEP: f64 = 0.5;
pub const DEFAULT_TIMEOUT: u64 = 10;

/// Config entry data of one air conditioner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GreeConfig {
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    pub mac_addr: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default = "default_temp_step")]
    pub temp_step: f64,

    /// Sensor entity providing the room temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_sensor: Option<String>,

    /// Features exposed as switches
    #[serde(default = "default_function")]
    pub function: Vec<Feature>,

    #[serde(default = "default_hvac_modes")]
    pub hvac_modes: Vec<HvacMode>,

    #[serde(default = "default_fan_modes")]
    pub fan_modes: Vec<FanMode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<i64>,

    /// Seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_temp_step() -> f64 {
    DEFAULT_TARGET_TEMP_STEP
}

fn default_function() -> Vec<Feature> {
    DEFAULT_FEATURES.to_vec()
}

fn default_hvac_modes() -> Vec<HvacMode> {
    DEFAULT_HVAC_MODES.to_vec()
}

fn default_fan_modes() -> Vec<FanMode> {
    FAN_MODES.to_vec()
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT
}

impl GreeConfig {
    /// Parse config entry data
    pub fn from_data(data: &HashMap<String, Value>) -> GreeResult<Self> {
        let object: serde_json::Map<String, Value> = data
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(serde_json::from_value(Value::Object(object))?)
    }

    pub fn to_data(&self) -> GreeResult<HashMap<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map.into_iter().collect()),
            _ => Ok(HashMap::new()),
        }
    }

    pub fn identity(&self) -> DeviceIdentity {
        DeviceIdentity::new(self.name.as_deref(), &self.mac_addr)
    }

    /// Selected features without duplicates, first occurrence wins
    pub fn features(&self) -> Vec<Feature> {
        let mut features = Vec::with_capacity(self.function.len());
        for feature in &self.function {
            if !features.contains(feature) {
                features.push(*feature);
            }
        }
        features
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}
