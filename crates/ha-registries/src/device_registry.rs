//! Device Registry
//!
//! Tracks physical devices announced by entities through their `DeviceInfo`,
//! indexed by identifier and by owning config entry.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ha_core::DeviceInfo;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::storage::{Storable, Storage, StorageResult};

/// Storage key for device registry
pub const STORAGE_KEY: &str = "core.device_registry";
/// Current storage version
pub const STORAGE_VERSION: u32 = 1;
/// Current minor version
pub const STORAGE_MINOR_VERSION: u32 = 1;

/// A device identifier (domain, id) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIdentifier(pub String, pub String);

impl DeviceIdentifier {
    pub fn new(domain: impl Into<String>, id: impl Into<String>) -> Self {
        Self(domain.into(), id.into())
    }

    pub fn domain(&self) -> &str {
        &self.0
    }

    pub fn id(&self) -> &str {
        &self.1
    }

    /// Create a key for indexing
    pub fn key(&self) -> String {
        format!("{}:{}", self.domain(), self.id())
    }
}

/// A registered device entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceEntry {
    /// Internal UUID
    pub id: String,

    /// Unique identifiers by domain (e.g., [["gree2", "aabbccddeeff"]])
    #[serde(default)]
    pub identifiers: Vec<DeviceIdentifier>,

    /// Associated config entries
    #[serde(default)]
    pub config_entries: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_by_user: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub modified_at: DateTime<Utc>,
}

impl DeviceEntry {
    /// Create a new device entry from announced device info
    pub fn from_info(config_entry_id: &str, info: &DeviceInfo) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            identifiers: info
                .identifiers
                .iter()
                .map(|(domain, id)| DeviceIdentifier::new(domain, id))
                .collect(),
            config_entries: vec![config_entry_id.to_string()],
            name: info.name.clone(),
            name_by_user: None,
            manufacturer: info.manufacturer.clone(),
            model: info.model.clone(),
            created_at: now,
            modified_at: now,
        }
    }

    /// Get display name (user name or device name)
    pub fn display_name(&self) -> &str {
        self.name_by_user
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or("")
    }
}

/// Device registry data for storage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceRegistryData {
    pub devices: Vec<DeviceEntry>,
}

impl Storable for DeviceRegistryData {
    const KEY: &'static str = STORAGE_KEY;
    const VERSION: u32 = STORAGE_VERSION;
    const MINOR_VERSION: u32 = STORAGE_MINOR_VERSION;
}

/// Device Registry
///
/// Entries are stored as `Arc<DeviceEntry>` to avoid cloning on reads.
pub struct DeviceRegistry {
    storage: Arc<Storage>,

    /// Primary index: device_id -> DeviceEntry
    by_id: DashMap<String, Arc<DeviceEntry>>,

    /// Index: identifier key -> device_id
    by_identifier: DashMap<String, String>,

    /// Index: config_entry_id -> set of device_ids
    by_config_entry_id: DashMap<String, HashSet<String>>,
}

impl DeviceRegistry {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            by_id: DashMap::new(),
            by_identifier: DashMap::new(),
            by_config_entry_id: DashMap::new(),
        }
    }

    /// Load from storage
    pub async fn load(&self) -> StorageResult<()> {
        if let Some(storage_file) = self.storage.load::<DeviceRegistryData>().await? {
            info!(
                "Loading {} devices from storage (v{}.{})",
                storage_file.data.devices.len(),
                storage_file.version,
                storage_file.minor_version
            );

            for entry in storage_file.data.devices {
                self.index_entry(Arc::new(entry));
            }
        }
        Ok(())
    }

    /// Save to storage
    pub async fn save(&self) -> StorageResult<()> {
        let mut devices: Vec<DeviceEntry> =
            self.by_id.iter().map(|r| (**r.value()).clone()).collect();
        devices.sort_by_key(|d| d.created_at);

        self.storage.save(&DeviceRegistryData { devices }).await?;
        debug!("Saved {} devices to storage", self.by_id.len());
        Ok(())
    }

    fn index_entry(&self, entry: Arc<DeviceEntry>) {
        let device_id = entry.id.clone();

        for identifier in &entry.identifiers {
            self.by_identifier
                .insert(identifier.key(), device_id.clone());
        }

        for config_entry_id in &entry.config_entries {
            self.by_config_entry_id
                .entry(config_entry_id.clone())
                .or_default()
                .insert(device_id.clone());
        }

        self.by_id.insert(device_id, entry);
    }

    fn unindex_entry(&self, entry: &DeviceEntry) {
        for identifier in &entry.identifiers {
            self.by_identifier.remove(&identifier.key());
        }

        for config_entry_id in &entry.config_entries {
            if let Some(mut ids) = self.by_config_entry_id.get_mut(config_entry_id) {
                ids.remove(&entry.id);
            }
        }

        self.by_id.remove(&entry.id);
    }

    pub fn get(&self, device_id: &str) -> Option<Arc<DeviceEntry>> {
        self.by_id.get(device_id).map(|r| Arc::clone(r.value()))
    }

    pub fn get_by_identifier(&self, domain: &str, id: &str) -> Option<Arc<DeviceEntry>> {
        let key = DeviceIdentifier::new(domain, id).key();
        self.by_identifier
            .get(&key)
            .and_then(|device_id| self.get(&device_id))
    }

    /// Get all devices for a config entry
    pub fn get_by_config_entry_id(&self, config_entry_id: &str) -> Vec<Arc<DeviceEntry>> {
        self.by_config_entry_id
            .get(config_entry_id)
            .map(|ids| ids.iter().filter_map(|id| self.get(id)).collect())
            .unwrap_or_default()
    }

    /// Get or create the device described by `info`
    ///
    /// An existing device (matched by any identifier) gets the config entry
    /// attached and its metadata refreshed from `info`.
    pub fn get_or_create(&self, config_entry_id: &str, info: &DeviceInfo) -> Arc<DeviceEntry> {
        let existing = info
            .identifiers
            .iter()
            .find_map(|(domain, id)| self.get_by_identifier(domain, id));

        let Some(existing) = existing else {
            let entry = Arc::new(DeviceEntry::from_info(config_entry_id, info));
            self.index_entry(Arc::clone(&entry));
            info!(
                "Registered device {} ({})",
                entry.display_name(),
                entry.id
            );
            return entry;
        };

        let mut updated = (*existing).clone();
        if !updated.config_entries.iter().any(|id| id == config_entry_id) {
            updated.config_entries.push(config_entry_id.to_string());
        }
        for (domain, id) in &info.identifiers {
            let identifier = DeviceIdentifier::new(domain, id);
            if !updated.identifiers.contains(&identifier) {
                updated.identifiers.push(identifier);
            }
        }
        if info.name.is_some() {
            updated.name = info.name.clone();
        }
        if info.manufacturer.is_some() {
            updated.manufacturer = info.manufacturer.clone();
        }
        if info.model.is_some() {
            updated.model = info.model.clone();
        }
        updated.modified_at = Utc::now();

        self.unindex_entry(&existing);
        let updated = Arc::new(updated);
        self.index_entry(Arc::clone(&updated));
        debug!("Updated existing device: {}", updated.id);
        updated
    }

    /// Remove a device
    pub fn remove(&self, device_id: &str) -> Option<Arc<DeviceEntry>> {
        let entry = self.get(device_id)?;
        self.unindex_entry(&entry);
        info!("Removed device: {}", device_id);
        Some(entry)
    }

    /// Detach a config entry from its devices
    ///
    /// Devices left without any config entry are removed.
    pub fn remove_config_entry(&self, config_entry_id: &str) {
        for device in self.get_by_config_entry_id(config_entry_id) {
            if device.config_entries.len() <= 1 {
                self.remove(&device.id);
                continue;
            }

            let mut updated = (*device).clone();
            updated.config_entries.retain(|id| id != config_entry_id);
            updated.modified_at = Utc::now();
            self.unindex_entry(&device);
            self.index_entry(Arc::new(updated));
        }
        self.by_config_entry_id.remove(config_entry_id);
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Arc<DeviceEntry>> + '_ {
        self.by_id.iter().map(|r| Arc::clone(r.value()))
    }
}
