//! State machine with domain indexing
//!
//! Tracks the current state of every entity written by an entity platform,
//! keeps a per-domain index (used e.g. to list sensors in config flow forms)
//! and broadcasts a [`StateChangedData`] for every write or removal.

use dashmap::DashMap;
use ha_core::events::StateChangedData;
use ha_core::{Context, EntityId, State};
use std::collections::HashMap;
use tokio::sync::broadcast;
use tracing::{debug, instrument, trace};

/// Default channel capacity for state change subscriptions
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// The state machine tracks all entity states
pub struct StateMachine {
    /// All entity states keyed by entity_id string
    states: DashMap<String, State>,
    /// Index of entity_ids by domain
    domain_index: DashMap<String, Vec<String>>,
    /// State change notifications
    changes: broadcast::Sender<StateChangedData>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a state machine whose change channel holds `capacity` events
    pub fn with_capacity(capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(capacity);
        Self {
            states: DashMap::new(),
            domain_index: DashMap::new(),
            changes,
        }
    }

    /// Subscribe to state changes
    pub fn subscribe(&self) -> broadcast::Receiver<StateChangedData> {
        self.changes.subscribe()
    }

    /// Set the state of an entity
    ///
    /// `last_changed` is only bumped when the state value actually changed.
    #[instrument(skip(self, state, attributes, context), fields(entity_id = %entity_id))]
    pub fn set(
        &self,
        entity_id: EntityId,
        state: impl Into<String>,
        attributes: HashMap<String, serde_json::Value>,
        context: Context,
    ) -> State {
        let entity_id_str = entity_id.to_string();
        let domain = entity_id.domain().to_string();

        let old_state = self.states.get(&entity_id_str).map(|s| s.clone());

        let new_state = match &old_state {
            Some(existing) => existing.with_update(state, attributes, context),
            None => State::new(entity_id.clone(), state, attributes, context),
        };

        debug!(
            state = %new_state.state,
            changed = old_state.as_ref().map(|s| s.state != new_state.state).unwrap_or(true),
            "Setting entity state"
        );

        self.states.insert(entity_id_str.clone(), new_state.clone());

        if old_state.is_none() {
            self.domain_index
                .entry(domain)
                .or_default()
                .push(entity_id_str);
        }

        // No receivers is not an error
        let _ = self.changes.send(StateChangedData {
            entity_id,
            old_state,
            new_state: Some(new_state.clone()),
        });

        new_state
    }

    /// Get the current state of an entity
    pub fn get(&self, entity_id: &str) -> Option<State> {
        self.states.get(entity_id).map(|s| s.clone())
    }

    /// Get the state value, or None if the entity doesn't exist
    pub fn get_state(&self, entity_id: &str) -> Option<String> {
        self.states.get(entity_id).map(|s| s.state.clone())
    }

    pub fn is_state(&self, entity_id: &str, state: &str) -> bool {
        self.get_state(entity_id).as_deref() == Some(state)
    }

    /// Get all entity IDs for a domain, in insertion order
    pub fn entity_ids(&self, domain: &str) -> Vec<String> {
        self.domain_index
            .get(domain)
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    /// Get all states for a domain
    pub fn domain_states(&self, domain: &str) -> Vec<State> {
        self.entity_ids(domain)
            .iter()
            .filter_map(|id| self.get(id))
            .collect()
    }

    pub fn all(&self) -> Vec<State> {
        self.states.iter().map(|r| r.value().clone()).collect()
    }

    /// Remove an entity's state
    #[instrument(skip(self, context), fields(entity_id = %entity_id))]
    pub fn remove(&self, entity_id: &EntityId, context: Context) -> Option<State> {
        let entity_id_str = entity_id.to_string();

        let old_state = self.states.remove(&entity_id_str).map(|(_, s)| s);

        if let Some(ref state) = old_state {
            trace!("Removing entity state");

            if let Some(mut ids) = self.domain_index.get_mut(entity_id.domain()) {
                ids.retain(|id| id != &entity_id_str);
            }

            let _ = self.changes.send(StateChangedData {
                entity_id: entity_id.clone(),
                old_state: Some(State {
                    context,
                    ..state.clone()
                }),
                new_state: None,
            });
        }

        old_state
    }

    pub fn entity_count(&self) -> usize {
        self.states.len()
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
