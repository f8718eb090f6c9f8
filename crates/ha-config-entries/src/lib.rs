//! Config Entries
//!
//! This crate provides the configuration entry system of the host.
//! Config entries represent individual integration instances and manage
//! their lifecycle (setup, unload, reload).
//!
//! # Key Types
//!
//! - [`ConfigEntry`] - A single integration configuration
//! - [`ConfigEntryState`] - Lifecycle state of an entry
//! - [`ConfigEntries`] - Manager for all config entries
//! - [`Integration`] - Per-domain setup/unload and flow factory
//! - [`FlowManager`] - In-progress config and options flows
//! - [`EntityPlatform`] - Entities an entry forwarded to one platform
//! - [`HomeAssistant`] - Handle bundling the host services
//!
//! # Storage
//!
//! Config entries are persisted in `.storage/core.config_entries` with
//! version tracking.

pub mod entry;
pub mod flow;
pub mod hass;
pub mod manager;
pub mod platform;
pub mod state_machine;

// Re-export main types
pub use entry::{ConfigEntry, ConfigEntrySource, ConfigEntryState, ConfigEntryUpdate};

pub use flow::{
    validate_input, ConfigFlow, FieldType, FlowError, FlowInput, FlowManager, FlowManagerResult,
    FlowResponse, FlowResult, FlowSummary, FormField, ERROR_INVALID, ERROR_REQUIRED,
};

pub use hass::HomeAssistant;

pub use manager::{
    ConfigEntries, ConfigEntriesData, ConfigEntriesError, ConfigEntriesResult, Integration,
    UpdateListener, STORAGE_KEY, STORAGE_MINOR_VERSION, STORAGE_VERSION,
};

pub use platform::{attributes_from, EntityPlatform};

pub use state_machine::InvalidTransition;
