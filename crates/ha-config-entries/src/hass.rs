//! Host handle passed to integrations

use std::path::Path;
use std::sync::Arc;

use ha_registries::{Registries, Storage, StorageResult};
use ha_state_machine::StateMachine;
use tracing::info;

use crate::flow::FlowManager;
use crate::manager::{ConfigEntries, ConfigEntriesResult};

/// Shared host services
///
/// Cloning is cheap; every clone points at the same state machine,
/// registries, config entries and flows.
#[derive(Clone)]
pub struct HomeAssistant {
    pub states: Arc<StateMachine>,
    pub registries: Arc<Registries>,
    pub config_entries: Arc<ConfigEntries>,
    pub flows: Arc<FlowManager>,
}

impl HomeAssistant {
    /// Create a host rooted at `config_dir` (storage lives in `.storage/`)
    pub fn new(config_dir: impl AsRef<Path>) -> Self {
        let storage = Arc::new(Storage::new(config_dir));
        Self {
            states: Arc::new(StateMachine::new()),
            registries: Arc::new(Registries::with_storage(storage.clone())),
            config_entries: Arc::new(ConfigEntries::new(storage)),
            flows: Arc::new(FlowManager::new()),
        }
    }

    /// Load registries and config entries from storage
    pub async fn load(&self) -> StorageResult<()> {
        self.registries.load_all().await?;
        self.config_entries.load().await?;
        info!(
            "Loaded {} config entries, {} devices, {} entities",
            self.config_entries.len(),
            self.registries.devices.len(),
            self.registries.entities.len()
        );
        Ok(())
    }

    /// Set up every stored entry whose integration is registered
    pub async fn start(&self) -> Vec<ConfigEntriesResult<()>> {
        self.config_entries.setup_all(self).await
    }
}
