//! Entity Registry
//!
//! Remembers every entity an integration has created, keyed by the
//! integration's unique_id, so the same entity keeps its entity_id across
//! reloads and restarts.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::storage::{Storable, Storage, StorageResult};

/// Storage key for entity registry
pub const STORAGE_KEY: &str = "core.entity_registry";
/// Current storage version
pub const STORAGE_VERSION: u32 = 1;
/// Current minor version
pub const STORAGE_MINOR_VERSION: u32 = 1;

/// A registered entity entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityEntry {
    /// Internal id
    pub id: String,
    /// Full entity ID (domain.object_id)
    pub entity_id: String,
    /// Integration domain that provides this entity
    pub platform: String,
    /// Platform-specific unique identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_entry_id: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub modified_at: DateTime<Utc>,
}

impl EntityEntry {
    pub fn new(
        entity_id: impl Into<String>,
        platform: impl Into<String>,
        unique_id: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ulid::Ulid::new().to_string().to_lowercase(),
            entity_id: entity_id.into(),
            platform: platform.into(),
            unique_id,
            device_id: None,
            config_entry_id: None,
            created_at: now,
            modified_at: now,
        }
    }
}

/// Entity registry data for storage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityRegistryData {
    pub entities: Vec<EntityEntry>,
}

impl Storable for EntityRegistryData {
    const KEY: &'static str = STORAGE_KEY;
    const VERSION: u32 = STORAGE_VERSION;
    const MINOR_VERSION: u32 = STORAGE_MINOR_VERSION;
}

fn unique_key(platform: &str, unique_id: &str) -> String {
    format!("{}:{}", platform, unique_id)
}

/// Entity Registry
///
/// The primary index is an `IndexMap` behind a `RwLock` so iteration follows
/// registration order.
pub struct EntityRegistry {
    storage: Arc<Storage>,

    /// Primary index: entity_id -> EntityEntry
    by_entity_id: RwLock<IndexMap<String, Arc<EntityEntry>>>,

    /// Index: "platform:unique_id" -> entity_id
    by_unique_id: DashMap<String, String>,

    /// Index: config_entry_id -> set of entity_ids
    by_config_entry_id: DashMap<String, HashSet<String>>,
}

impl EntityRegistry {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            by_entity_id: RwLock::new(IndexMap::new()),
            by_unique_id: DashMap::new(),
            by_config_entry_id: DashMap::new(),
        }
    }

    /// Load from storage
    pub async fn load(&self) -> StorageResult<()> {
        if let Some(storage_file) = self.storage.load::<EntityRegistryData>().await? {
            info!(
                "Loading {} entities from storage (v{}.{})",
                storage_file.data.entities.len(),
                storage_file.version,
                storage_file.minor_version
            );

            for entry in storage_file.data.entities {
                self.index_entry(Arc::new(entry));
            }
        }
        Ok(())
    }

    /// Save to storage
    pub async fn save(&self) -> StorageResult<()> {
        let entities: Vec<EntityEntry> = self.iter().iter().map(|e| (**e).clone()).collect();
        let count = entities.len();

        self.storage.save(&EntityRegistryData { entities }).await?;
        debug!("Saved {} entities to storage", count);
        Ok(())
    }

    fn index_entry(&self, entry: Arc<EntityEntry>) {
        let entity_id = entry.entity_id.clone();

        if let Some(ref unique_id) = entry.unique_id {
            self.by_unique_id
                .insert(unique_key(&entry.platform, unique_id), entity_id.clone());
        }

        if let Some(ref config_entry_id) = entry.config_entry_id {
            self.by_config_entry_id
                .entry(config_entry_id.clone())
                .or_default()
                .insert(entity_id.clone());
        }

        if let Ok(mut idx) = self.by_entity_id.write() {
            idx.insert(entity_id, entry);
        }
    }

    fn unindex_entry(&self, entry: &EntityEntry) {
        if let Some(ref unique_id) = entry.unique_id {
            self.by_unique_id
                .remove(&unique_key(&entry.platform, unique_id));
        }

        if let Some(ref config_entry_id) = entry.config_entry_id {
            if let Some(mut ids) = self.by_config_entry_id.get_mut(config_entry_id) {
                ids.remove(&entry.entity_id);
            }
        }

        if let Ok(mut idx) = self.by_entity_id.write() {
            idx.shift_remove(&entry.entity_id);
        }
    }

    pub fn get(&self, entity_id: &str) -> Option<Arc<EntityEntry>> {
        self.by_entity_id
            .read()
            .ok()
            .and_then(|idx| idx.get(entity_id).cloned())
    }

    /// Look up the entity_id registered for a platform's unique_id
    pub fn get_entity_id(&self, platform: &str, unique_id: &str) -> Option<String> {
        self.by_unique_id
            .get(&unique_key(platform, unique_id))
            .map(|r| r.value().clone())
    }

    /// Get all entities created for a config entry
    pub fn entities_for_config_entry(&self, config_entry_id: &str) -> Vec<Arc<EntityEntry>> {
        self.by_config_entry_id
            .get(config_entry_id)
            .map(|ids| ids.iter().filter_map(|id| self.get(id)).collect())
            .unwrap_or_default()
    }

    /// Get or create a registration
    ///
    /// When `(platform, unique_id)` is already registered the existing entry
    /// is returned with its config entry and device refreshed.
    pub fn get_or_create(
        &self,
        platform: &str,
        entity_id: &str,
        unique_id: Option<&str>,
        config_entry_id: Option<&str>,
        device_id: Option<&str>,
    ) -> Arc<EntityEntry> {
        let existing = unique_id
            .and_then(|uid| self.get_entity_id(platform, uid))
            .and_then(|id| self.get(&id));

        if let Some(existing) = existing {
            let unchanged = existing.config_entry_id.as_deref() == config_entry_id
                && existing.device_id.as_deref() == device_id;
            if unchanged {
                return existing;
            }
            let mut updated = (*existing).clone();
            updated.config_entry_id = config_entry_id.map(str::to_string);
            updated.device_id = device_id.map(str::to_string);
            updated.modified_at = Utc::now();
            self.unindex_entry(&existing);
            let updated = Arc::new(updated);
            self.index_entry(Arc::clone(&updated));
            return updated;
        }

        let mut entry = EntityEntry::new(entity_id, platform, unique_id.map(str::to_string));
        entry.config_entry_id = config_entry_id.map(str::to_string);
        entry.device_id = device_id.map(str::to_string);

        let entry = Arc::new(entry);
        self.index_entry(Arc::clone(&entry));
        debug!("Registered entity {} ({})", entity_id, platform);
        entry
    }

    pub fn remove(&self, entity_id: &str) -> Option<Arc<EntityEntry>> {
        let entry = self.get(entity_id)?;
        self.unindex_entry(&entry);
        info!("Removed entity: {}", entity_id);
        Some(entry)
    }

    /// Remove every registration created for a config entry
    pub fn remove_config_entry(&self, config_entry_id: &str) -> usize {
        let entries = self.entities_for_config_entry(config_entry_id);
        for entry in &entries {
            self.unindex_entry(entry);
        }
        self.by_config_entry_id.remove(config_entry_id);
        entries.len()
    }

    pub fn len(&self) -> usize {
        self.by_entity_id.read().map(|idx| idx.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all entries in registration order
    pub fn iter(&self) -> Vec<Arc<EntityEntry>> {
        self.by_entity_id
            .read()
            .map(|idx| idx.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_registry() -> (TempDir, EntityRegistry) {
        let temp_dir = TempDir::new().unwrap();
        let storage = Arc::new(Storage::new(temp_dir.path()));
        (temp_dir, EntityRegistry::new(storage))
    }

    #[test]
    fn test_get_or_create_by_unique_id() {
        let (_dir, registry) = create_registry();

        let first = registry.get_or_create(
            "gree2",
            "switch.gree_aabbccddeeff_lights",
            Some("gree2.gree_aabbccddeeff_lights"),
            Some("entry1"),
            Some("device1"),
        );
        let again = registry.get_or_create(
            "gree2",
            "switch.gree_aabbccddeeff_lights",
            Some("gree2.gree_aabbccddeeff_lights"),
            Some("entry1"),
            Some("device1"),
        );

        assert_eq!(first.id, again.id);
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry
                .get_entity_id("gree2", "gree2.gree_aabbccddeeff_lights")
                .as_deref(),
            Some("switch.gree_aabbccddeeff_lights")
        );
    }

    #[test]
    fn test_unique_id_scoped_by_platform() {
        let (_dir, registry) = create_registry();

        registry.get_or_create("gree2", "switch.a", Some("same"), None, None);
        registry.get_or_create("other", "switch.b", Some("same"), None, None);

        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_config_entry_index() {
        let (_dir, registry) = create_registry();

        registry.get_or_create("gree2", "climate.gree_a", Some("a"), Some("entry1"), None);
        registry.get_or_create("gree2", "switch.gree_a_air", Some("a_air"), Some("entry1"), None);
        registry.get_or_create("gree2", "climate.gree_b", Some("b"), Some("entry2"), None);

        assert_eq!(registry.entities_for_config_entry("entry1").len(), 2);
        assert_eq!(registry.remove_config_entry("entry1"), 2);
        assert_eq!(registry.len(), 1);
        assert!(registry.get("climate.gree_b").is_some());
    }

    #[test]
    fn test_reregister_moves_to_new_entry() {
        let (_dir, registry) = create_registry();
        registry.get_or_create("gree2", "switch.gree_a_sleep", Some("a_sleep"), Some("old"), None);

        let moved =
            registry.get_or_create("gree2", "switch.gree_a_sleep", Some("a_sleep"), Some("new"), None);
        assert_eq!(moved.config_entry_id.as_deref(), Some("new"));
        assert!(registry.entities_for_config_entry("old").is_empty());

        assert!(registry.remove("switch.gree_a_sleep").is_some());
        assert!(registry.remove("switch.gree_a_sleep").is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_save_and_load_keeps_order() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Arc::new(Storage::new(temp_dir.path()));

        {
            let registry = EntityRegistry::new(storage.clone());
            registry.get_or_create("gree2", "climate.gree_a", Some("a"), None, None);
            registry.get_or_create("gree2", "switch.gree_a_air", Some("a_air"), None, None);
            registry.save().await.unwrap();
        }

        let registry = EntityRegistry::new(storage);
        registry.load().await.unwrap();
        let ids: Vec<String> = registry.iter().iter().map(|e| e.entity_id.clone()).collect();
        assert_eq!(ids, vec!["climate.gree_a", "switch.gree_a_air"]);
    }
}
