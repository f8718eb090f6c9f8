//! Config Entries Manager
//!
//! Manages the lifecycle of configuration entries and dispatches setup and
//! unload to the registered integrations.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use futures::future::BoxFuture;
use ha_registries::{Storable, Storage, StorageResult};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::entry::{ConfigEntry, ConfigEntryState, ConfigEntryUpdate};
use crate::flow::ConfigFlow;
use crate::hass::HomeAssistant;
use crate::state_machine::InvalidTransition;

/// Storage key for config entries
pub const STORAGE_KEY: &str = "core.config_entries";
/// Current storage version
pub const STORAGE_VERSION: u32 = 1;
/// Current minor version
pub const STORAGE_MINOR_VERSION: u32 = 1;

/// Config entries errors
#[derive(Debug, Error)]
pub enum ConfigEntriesError {
    #[error("Entry not found: {0}")]
    NotFound(String),

    #[error("Entry already exists for domain {domain} with unique_id {unique_id}")]
    AlreadyExists { domain: String, unique_id: String },

    #[error("Cannot unload entry in state {0:?}")]
    CannotUnload(ConfigEntryState),

    #[error("Setup failed: {0}")]
    SetupFailed(String),

    #[error("Unload failed: {0}")]
    UnloadFailed(String),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error("Storage error: {0}")]
    Storage(#[from] ha_registries::StorageError),
}

pub type ConfigEntriesResult<T> = Result<T, ConfigEntriesError>;

/// Config entries data for storage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigEntriesData {
    /// All config entries
    pub entries: Vec<ConfigEntry>,
}

impl Storable for ConfigEntriesData {
    const KEY: &'static str = STORAGE_KEY;
    const VERSION: u32 = STORAGE_VERSION;
    const MINOR_VERSION: u32 = STORAGE_MINOR_VERSION;
}

/// Callback fired after an entry has been updated
pub type UpdateListener =
    Arc<dyn Fn(HomeAssistant, ConfigEntry) -> BoxFuture<'static, ()> + Send + Sync + 'static>;

/// An integration that owns config entries of one domain
#[async_trait]
pub trait Integration: Send + Sync {
    fn domain(&self) -> &str;

    /// Set up runtime objects and entities for an entry
    async fn setup_entry(&self, hass: &HomeAssistant, entry: &ConfigEntry) -> anyhow::Result<()>;

    /// Tear down everything `setup_entry` created; `false` means refused
    async fn unload_entry(&self, hass: &HomeAssistant, entry: &ConfigEntry)
        -> anyhow::Result<bool>;

    /// Flow used to create new entries
    fn config_flow(&self, _hass: &HomeAssistant) -> Option<Box<dyn ConfigFlow>> {
        None
    }

    /// Flow used to reconfigure an existing entry
    fn options_flow(
        &self,
        _hass: &HomeAssistant,
        _entry: &ConfigEntry,
    ) -> Option<Box<dyn ConfigFlow>> {
        None
    }
}

/// Config Entries Manager
///
/// Manages the lifecycle of configuration entries including:
/// - Loading/saving from storage
/// - Entry creation and removal
/// - State management
/// - Update listeners
pub struct ConfigEntries {
    /// Storage backend
    storage: Arc<Storage>,

    /// Primary index: entry_id -> ConfigEntry
    entries: DashMap<String, ConfigEntry>,

    /// Index: domain -> set of entry_ids
    by_domain: DashMap<String, HashSet<String>>,

    /// Index: (domain, unique_id) -> entry_id
    by_unique_id: DashMap<(String, String), String>,

    /// Setup lock to prevent concurrent setup/unload
    setup_lock: Mutex<()>,

    /// Integrations by domain
    integrations: DashMap<String, Arc<dyn Integration>>,

    /// Update listeners by entry_id
    update_listeners: DashMap<String, Vec<UpdateListener>>,
}

impl ConfigEntries {
    /// Create a new config entries manager
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            entries: DashMap::new(),
            by_domain: DashMap::new(),
            by_unique_id: DashMap::new(),
            setup_lock: Mutex::new(()),
            integrations: DashMap::new(),
            update_listeners: DashMap::new(),
        }
    }

    /// Load entries from storage
    pub async fn load(&self) -> StorageResult<()> {
        if let Some(storage_file) = self.storage.load::<ConfigEntriesData>().await? {
            info!(
                "Loading {} config entries from storage (v{}.{})",
                storage_file.data.entries.len(),
                storage_file.version,
                storage_file.minor_version
            );

            for entry in storage_file.data.entries {
                self.index_entry(&entry);
            }
        }
        Ok(())
    }

    /// Save entries to storage
    pub async fn save(&self) -> StorageResult<()> {
        let mut entries: Vec<ConfigEntry> =
            self.entries.iter().map(|r| r.value().clone()).collect();
        entries.sort_by_key(|e| e.created_at);

        self.storage.save(&ConfigEntriesData { entries }).await?;
        debug!("Saved {} config entries to storage", self.entries.len());
        Ok(())
    }

    fn index_entry(&self, entry: &ConfigEntry) {
        let entry_id = entry.entry_id.clone();

        self.entries.insert(entry_id.clone(), entry.clone());

        self.by_domain
            .entry(entry.domain.clone())
            .or_default()
            .insert(entry_id.clone());

        if let Some(ref unique_id) = entry.unique_id {
            self.by_unique_id
                .insert((entry.domain.clone(), unique_id.clone()), entry_id);
        }
    }

    fn unindex_entry(&self, entry: &ConfigEntry) {
        if let Some(mut ids) = self.by_domain.get_mut(&entry.domain) {
            ids.remove(&entry.entry_id);
        }

        if let Some(ref unique_id) = entry.unique_id {
            self.by_unique_id
                .remove(&(entry.domain.clone(), unique_id.clone()));
        }

        self.entries.remove(&entry.entry_id);
    }

    /// Get an entry by ID
    pub fn get(&self, entry_id: &str) -> Option<ConfigEntry> {
        self.entries.get(entry_id).map(|r| r.value().clone())
    }

    /// Get all entries for a domain
    pub fn get_by_domain(&self, domain: &str) -> Vec<ConfigEntry> {
        let mut entries: Vec<ConfigEntry> = self
            .by_domain
            .get(domain)
            .map(|ids| ids.iter().filter_map(|id| self.get(id)).collect())
            .unwrap_or_default();
        entries.sort_by_key(|e| e.created_at);
        entries
    }

    /// Get entry by unique_id
    pub fn get_by_unique_id(&self, domain: &str, unique_id: &str) -> Option<ConfigEntry> {
        self.by_unique_id
            .get(&(domain.to_string(), unique_id.to_string()))
            .and_then(|entry_id| self.get(&entry_id))
    }

    /// Add a new config entry
    pub async fn add(&self, entry: ConfigEntry) -> ConfigEntriesResult<ConfigEntry> {
        if let Some(ref unique_id) = entry.unique_id {
            if self.get_by_unique_id(&entry.domain, unique_id).is_some() {
                return Err(ConfigEntriesError::AlreadyExists {
                    domain: entry.domain.clone(),
                    unique_id: unique_id.clone(),
                });
            }
        }

        self.index_entry(&entry);
        self.save().await?;

        info!(
            "Added config entry: {} ({}) [{}]",
            entry.title, entry.domain, entry.entry_id
        );

        Ok(entry)
    }

    /// Update an existing entry, then notify its update listeners
    pub async fn update(
        &self,
        hass: &HomeAssistant,
        entry_id: &str,
        update: ConfigEntryUpdate,
    ) -> ConfigEntriesResult<ConfigEntry> {
        let entry = self
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

        if let Some(Some(ref unique_id)) = update.unique_id {
            let taken = self
                .get_by_unique_id(&entry.domain, unique_id)
                .is_some_and(|other| other.entry_id != entry.entry_id);
            if taken {
                return Err(ConfigEntriesError::AlreadyExists {
                    domain: entry.domain.clone(),
                    unique_id: unique_id.clone(),
                });
            }
        }

        self.unindex_entry(&entry);

        let mut updated = entry;
        if let Some(title) = update.title {
            updated.title = title;
        }
        if let Some(data) = update.data {
            updated.data = data;
        }
        if let Some(options) = update.options {
            updated.options = options;
        }
        if let Some(unique_id) = update.unique_id {
            updated.unique_id = unique_id;
        }
        updated.modified_at = Utc::now();

        self.index_entry(&updated);
        self.save().await?;
        debug!("Updated config entry: {}", entry_id);

        let listeners: Vec<UpdateListener> = self
            .update_listeners
            .get(entry_id)
            .map(|l| l.value().clone())
            .unwrap_or_default();
        for listener in listeners {
            listener(hass.clone(), updated.clone()).await;
        }

        Ok(self.get(entry_id).unwrap_or(updated))
    }

    /// Remove an entry, unloading it first when loaded
    pub async fn remove(
        &self,
        hass: &HomeAssistant,
        entry_id: &str,
    ) -> ConfigEntriesResult<ConfigEntry> {
        let entry = self
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

        if matches!(
            entry.state,
            ConfigEntryState::Loaded | ConfigEntryState::SetupError
        ) {
            self.unload(hass, entry_id).await?;
        }

        self.unindex_entry(&entry);
        self.update_listeners.remove(entry_id);
        self.save().await?;

        let removed = hass.registries.entities.remove_config_entry(entry_id);
        hass.registries.devices.remove_config_entry(entry_id);
        hass.registries.save_all().await?;

        info!(
            "Removed config entry: {} ({}) [{}], {} entities dropped",
            entry.title, entry.domain, entry_id, removed
        );

        Ok(entry)
    }

    /// Move an entry to a new lifecycle state
    pub fn set_state(
        &self,
        entry_id: &str,
        state: ConfigEntryState,
        reason: Option<String>,
    ) -> ConfigEntriesResult<()> {
        let mut entry = self
            .entries
            .get_mut(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;
        entry.try_set_state(state, reason)?;
        debug!("Entry {} state changed to {:?}", entry_id, state);
        Ok(())
    }

    /// Register the integration handling a domain
    pub fn register_integration(&self, integration: Arc<dyn Integration>) {
        let domain = integration.domain().to_string();
        self.integrations.insert(domain.clone(), integration);
        debug!("Registered integration for domain: {}", domain);
    }

    pub fn integration(&self, domain: &str) -> Option<Arc<dyn Integration>> {
        self.integrations.get(domain).map(|r| Arc::clone(r.value()))
    }

    /// Register a callback fired after `update`; dropped when the entry unloads
    pub fn add_update_listener(&self, entry_id: &str, listener: UpdateListener) {
        self.update_listeners
            .entry(entry_id.to_string())
            .or_default()
            .push(listener);
    }

    pub fn update_listener_count(&self, entry_id: &str) -> usize {
        self.update_listeners
            .get(entry_id)
            .map(|l| l.len())
            .unwrap_or(0)
    }

    /// Setup an entry (call integration's setup)
    pub async fn setup(&self, hass: &HomeAssistant, entry_id: &str) -> ConfigEntriesResult<()> {
        let _lock = self.setup_lock.lock().await;

        let entry = self
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

        self.set_state(entry_id, ConfigEntryState::SetupInProgress, None)?;

        let Some(integration) = self.integration(&entry.domain) else {
            self.set_state(entry_id, ConfigEntryState::Loaded, None)?;
            debug!(
                "No integration for domain {}, marking as loaded",
                entry.domain
            );
            return Ok(());
        };

        match integration.setup_entry(hass, &entry).await {
            Ok(()) => {
                self.set_state(entry_id, ConfigEntryState::Loaded, None)?;
                info!("Setup completed for entry: {} ({})", entry.title, entry_id);
                Ok(())
            }
            Err(err) => {
                let reason = format!("{err:#}");
                warn!("Setup failed for entry {}: {}", entry_id, reason);
                self.set_state(
                    entry_id,
                    ConfigEntryState::SetupError,
                    Some(reason.clone()),
                )?;
                Err(ConfigEntriesError::SetupFailed(reason))
            }
        }
    }

    /// Unload an entry
    pub async fn unload(&self, hass: &HomeAssistant, entry_id: &str) -> ConfigEntriesResult<()> {
        let _lock = self.setup_lock.lock().await;

        let entry = self
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

        match entry.state {
            ConfigEntryState::NotLoaded => return Ok(()),
            ConfigEntryState::Loaded | ConfigEntryState::SetupError => {}
            other => return Err(ConfigEntriesError::CannotUnload(other)),
        }

        self.set_state(entry_id, ConfigEntryState::UnloadInProgress, None)?;
        self.update_listeners.remove(entry_id);

        // A failed setup left nothing behind to tear down
        let result = match (entry.state, self.integration(&entry.domain)) {
            (ConfigEntryState::Loaded, Some(integration)) => {
                integration.unload_entry(hass, &entry).await
            }
            _ => Ok(true),
        };

        match result {
            Ok(true) => {
                self.set_state(entry_id, ConfigEntryState::NotLoaded, None)?;
                info!("Unloaded entry: {} ({})", entry.title, entry_id);
                Ok(())
            }
            Ok(false) => {
                let reason = "integration refused to unload".to_string();
                self.set_state(entry_id, ConfigEntryState::FailedUnload, Some(reason.clone()))?;
                Err(ConfigEntriesError::UnloadFailed(reason))
            }
            Err(err) => {
                let reason = format!("{err:#}");
                warn!("Unload failed for entry {}: {}", entry_id, reason);
                self.set_state(entry_id, ConfigEntryState::FailedUnload, Some(reason.clone()))?;
                Err(ConfigEntriesError::UnloadFailed(reason))
            }
        }
    }

    /// Reload an entry (unload + setup)
    pub async fn reload(&self, hass: &HomeAssistant, entry_id: &str) -> ConfigEntriesResult<()> {
        self.unload(hass, entry_id).await?;
        self.setup(hass, entry_id).await
    }

    /// Get all entry IDs
    pub fn entry_ids(&self) -> Vec<String> {
        self.entries.iter().map(|r| r.key().clone()).collect()
    }

    /// Get count of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Setup all entries that are not loaded yet
    pub async fn setup_all(&self, hass: &HomeAssistant) -> Vec<ConfigEntriesResult<()>> {
        let mut entries: Vec<ConfigEntry> = self
            .entries
            .iter()
            .filter(|r| r.value().state == ConfigEntryState::NotLoaded)
            .map(|r| r.value().clone())
            .collect();
        entries.sort_by_key(|e| e.created_at);

        let mut results = Vec::new();
        for entry in entries {
            results.push(self.setup(hass, &entry.entry_id).await);
        }

        results
    }
}
