//! Entity capability trait and device metadata

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::EntityId;

/// Entity platforms an integration can forward a config entry to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Climate,
    Sensor,
    Switch,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Climate => "climate",
            Platform::Sensor => "sensor",
            Platform::Switch => "switch",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Device metadata an entity hands to the device registry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// (domain, id) pairs identifying the physical device
    pub identifiers: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Errors raised by entity callbacks
#[derive(Debug, Error)]
pub enum EntityError {
    #[error("Entity {entity_id} update failed: {reason}")]
    Update { entity_id: String, reason: String },
}

/// The capability set every entity exposes to the host
///
/// Entities are shared behind `Arc<dyn Entity>`, so anything that changes
/// after creation uses interior mutability.
#[async_trait]
pub trait Entity: Send + Sync {
    fn entity_id(&self) -> &EntityId;

    /// Stable identifier used by the entity registry across restarts
    fn unique_id(&self) -> Option<String> {
        None
    }

    fn name(&self) -> Option<String> {
        None
    }

    /// When true the friendly name is prefixed with the device name
    fn has_entity_name(&self) -> bool {
        false
    }

    fn icon(&self) -> Option<String> {
        None
    }

    fn device_class(&self) -> Option<String> {
        None
    }

    fn device_info(&self) -> Option<DeviceInfo> {
        None
    }

    /// Current state value
    fn state(&self) -> String;

    /// Platform specific attributes (friendly_name/icon are added by the host)
    fn attributes(&self) -> HashMap<String, serde_json::Value> {
        HashMap::new()
    }

    /// Refresh cached data from the backing device
    async fn update(&self) -> Result<(), EntityError> {
        Ok(())
    }
}
