//! Core types for the home-automation host
//!
//! This crate provides the fundamental types shared by the host crates and
//! the integrations built on them: EntityId, State, Context, DeviceInfo and
//! the Entity capability trait.

mod context;
mod entity;
mod entity_id;
mod state;

pub use context::Context;
pub use entity::{DeviceInfo, Entity, EntityError, Platform};
pub use entity_id::{EntityId, EntityIdError};
pub use state::State;

pub const STATE_ON: &str = "on";
pub const STATE_OFF: &str = "off";

/// Standard event payloads
pub mod events {
    use super::*;

    /// Broadcast by the state machine on every write and removal
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    pub struct StateChangedData {
        pub entity_id: EntityId,
        pub old_state: Option<State>,
        pub new_state: Option<State>,
    }
}
