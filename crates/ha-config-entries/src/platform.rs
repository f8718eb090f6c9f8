//! Entity platforms
//!
//! An [`EntityPlatform`] is created when an integration forwards a config
//! entry to one of its platforms (climate, switch, ...). It registers the
//! entities it is handed and writes their state to the state machine.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use ha_core::{Context, Entity, Platform, State};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::hass::HomeAssistant;

/// Entities of one platform for one config entry
pub struct EntityPlatform {
    hass: HomeAssistant,
    /// Integration domain that owns the entities
    domain: String,
    platform: Platform,
    config_entry_id: String,
    /// How often the host should call [`EntityPlatform::update_entities`]
    scan_interval: Option<Duration>,
    entities: DashMap<String, Arc<dyn Entity>>,
}

impl EntityPlatform {
    pub fn new(
        hass: HomeAssistant,
        domain: impl Into<String>,
        platform: Platform,
        config_entry_id: impl Into<String>,
    ) -> Self {
        Self {
            hass,
            domain: domain.into(),
            platform,
            config_entry_id: config_entry_id.into(),
            scan_interval: None,
            entities: DashMap::new(),
        }
    }

    pub fn with_scan_interval(mut self, interval: Duration) -> Self {
        self.scan_interval = Some(interval);
        self
    }

    /// Polling interval, None for push-only platforms
    pub fn scan_interval(&self) -> Option<Duration> {
        self.scan_interval
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn config_entry_id(&self) -> &str {
        &self.config_entry_id
    }

    /// Register entities and write their initial state
    ///
    /// With `update_before_add` each entity refreshes from its device first;
    /// a failed refresh is logged and the entity is added anyway.
    pub async fn add_entities(
        &self,
        entities: Vec<Arc<dyn Entity>>,
        update_before_add: bool,
    ) -> usize {
        let mut added = 0;

        for entity in entities {
            let entity_id = entity.entity_id().to_string();
            if self.entities.contains_key(&entity_id) {
                debug!("Entity {} already added, skipping", entity_id);
                continue;
            }

            if update_before_add {
                if let Err(err) = entity.update().await {
                    warn!("Update before add failed for {}: {}", entity_id, err);
                }
            }

            let device_id = entity.device_info().map(|info| {
                self.hass
                    .registries
                    .devices
                    .get_or_create(&self.config_entry_id, &info)
                    .id
                    .clone()
            });

            self.hass.registries.entities.get_or_create(
                &self.domain,
                &entity_id,
                entity.unique_id().as_deref(),
                Some(&self.config_entry_id),
                device_id.as_deref(),
            );

            self.write_state(entity.as_ref());
            self.entities.insert(entity_id, entity);
            added += 1;
        }

        if let Err(err) = self.hass.registries.save_all().await {
            warn!("Failed to persist registries: {}", err);
        }

        info!(
            "Added {} {} entities for config entry {}",
            added, self.platform, self.config_entry_id
        );
        added
    }

    /// Push an entity's current state to the state machine
    pub fn write_state(&self, entity: &dyn Entity) -> State {
        let mut attributes = entity.attributes();

        if let Some(name) = self.friendly_name(entity) {
            attributes.insert("friendly_name".to_string(), json!(name));
        }
        if let Some(icon) = entity.icon() {
            attributes.insert("icon".to_string(), json!(icon));
        }
        if let Some(device_class) = entity.device_class() {
            attributes.insert("device_class".to_string(), json!(device_class));
        }

        self.hass.states.set(
            entity.entity_id().clone(),
            entity.state(),
            attributes,
            Context::new(),
        )
    }

    /// Refresh every entity and write its state
    ///
    /// One polling pass; the host schedules it every `scan_interval`.
    /// Entities whose refresh fails keep their last state.
    pub async fn update_entities(&self) -> usize {
        let mut updated = 0;
        for entity in self.entities() {
            match entity.update().await {
                Ok(()) => {
                    self.write_state(entity.as_ref());
                    updated += 1;
                }
                Err(err) => warn!("Update failed for {}: {}", entity.entity_id(), err),
            }
        }
        debug!(
            "Updated {} {} entities for config entry {}",
            updated, self.platform, self.config_entry_id
        );
        updated
    }

    /// Remove the states of every entity added by this platform
    ///
    /// Registry entries are kept so the same ids come back after a reload.
    pub fn remove_entities(&self) -> usize {
        let ids: Vec<String> = self.entities.iter().map(|r| r.key().clone()).collect();
        for entity_id in &ids {
            if let Some((_, entity)) = self.entities.remove(entity_id) {
                self.hass
                    .states
                    .remove(entity.entity_id(), Context::new());
            }
        }
        debug!(
            "Removed {} {} entities for config entry {}",
            ids.len(),
            self.platform,
            self.config_entry_id
        );
        ids.len()
    }

    /// Entities currently owned, sorted by entity id
    pub fn entities(&self) -> Vec<Arc<dyn Entity>> {
        let mut entities: Vec<(String, Arc<dyn Entity>)> = self
            .entities
            .iter()
            .map(|r| (r.key().clone(), Arc::clone(r.value())))
            .collect();
        entities.sort_by(|a, b| a.0.cmp(&b.0));
        entities.into_iter().map(|(_, e)| e).collect()
    }

    pub fn get(&self, entity_id: &str) -> Option<Arc<dyn Entity>> {
        self.entities.get(entity_id).map(|r| Arc::clone(r.value()))
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    fn friendly_name(&self, entity: &dyn Entity) -> Option<String> {
        let name = entity.name();
        if !entity.has_entity_name() {
            return name;
        }
        let device_name = entity
            .device_info()
            .and_then(|info| info.name)
            .filter(|n| !n.is_empty());
        match (device_name, name) {
            (Some(device), Some(name)) => Some(format!("{device} {name}")),
            (Some(device), None) => Some(device),
            (None, name) => name,
        }
    }
}

/// Attributes helper for entities built from optional values
pub fn attributes_from<I>(pairs: I) -> HashMap<String, serde_json::Value>
where
    I: IntoIterator<Item = (&'static str, serde_json::Value)>,
{
    pairs
        .into_iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}
