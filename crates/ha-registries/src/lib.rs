//! Registries
//!
//! This crate provides persistent registries for tracking:
//! - Entities (EntityRegistry)
//! - Devices (DeviceRegistry)
//!
//! Both registries use JSON persistence in the `.storage/` directory
//! with versioning.

pub mod storage;

pub mod device_registry;
pub mod entity_registry;

// Re-export main types
pub use storage::{Storable, Storage, StorageError, StorageFile, StorageResult};

pub use entity_registry::{EntityEntry, EntityRegistry, EntityRegistryData};

pub use device_registry::{DeviceEntry, DeviceIdentifier, DeviceRegistry, DeviceRegistryData};

use std::sync::Arc;

/// All registries bundled together
pub struct Registries {
    pub storage: Arc<Storage>,
    pub entities: EntityRegistry,
    pub devices: DeviceRegistry,
}

impl Registries {
    /// Create new registries with the given config directory
    pub fn new(config_dir: impl AsRef<std::path::Path>) -> Self {
        Self::with_storage(Arc::new(Storage::new(config_dir)))
    }

    /// Create new registries sharing an existing storage backend
    pub fn with_storage(storage: Arc<Storage>) -> Self {
        Self {
            entities: EntityRegistry::new(storage.clone()),
            devices: DeviceRegistry::new(storage.clone()),
            storage,
        }
    }

    /// Load all registries from storage
    pub async fn load_all(&self) -> StorageResult<()> {
        self.entities.load().await?;
        self.devices.load().await?;
        Ok(())
    }

    /// Save all registries to storage
    pub async fn save_all(&self) -> StorageResult<()> {
        self.entities.save().await?;
        self.devices.save().await?;
        Ok(())
    }
}
