//! State registry: the frozen table of (state, trigger, handler) bindings

use super::{Handler, State, Trigger};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Invalid trigger pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("An invalid-state handler is already registered")]
    InvalidHandlerAlreadySet,
}

/// One (state, trigger, handler) association
#[derive(Clone)]
pub struct StateBinding {
    state: State,
    trigger: Trigger,
    handler: Arc<dyn Handler>,
    order: usize,
}

impl StateBinding {
    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn trigger(&self) -> &Trigger {
        &self.trigger
    }

    pub fn handler(&self) -> &Arc<dyn Handler> {
        &self.handler
    }

    /// Registration order within its state, starting at 0
    pub fn order(&self) -> usize {
        self.order
    }
}

impl std::fmt::Debug for StateBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateBinding")
            .field("state", &self.state)
            .field("trigger", &self.trigger)
            .field("order", &self.order)
            .finish_non_exhaustive()
    }
}

/// All bindings of a bot, grouped per state in registration order.
///
/// Built mutably at startup, then frozen behind an `Arc` and shared by every
/// dispatch. Nothing mutates it after the server starts.
#[derive(Default)]
pub struct StateRegistry {
    states: HashMap<State, Vec<StateBinding>>,
    invalid_handler: Option<Arc<dyn Handler>>,
    initial_state: Option<State>,
}

impl StateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handler` to `state` under `trigger`.
    ///
    /// Bindings of a state are evaluated in the order they were registered.
    /// The first state ever registered becomes the initial state unless
    /// [`set_initial_state`](Self::set_initial_state) overrides it.
    pub fn register(
        &mut self,
        state: impl Into<State>,
        trigger: impl Into<Trigger>,
        handler: impl Handler + 'static,
    ) -> &mut Self {
        let state = state.into();
        if self.initial_state.is_none() {
            self.initial_state = Some(state.clone());
        }
        let bindings = self.states.entry(state.clone()).or_default();
        let order = bindings.len();
        bindings.push(StateBinding {
            state,
            trigger: trigger.into(),
            handler: Arc::new(handler),
            order,
        });
        self
    }

    /// Handler run when no binding of the current state matches
    pub fn register_invalid_handler(
        &mut self,
        handler: impl Handler + 'static,
    ) -> Result<&mut Self, RegistryError> {
        if self.invalid_handler.is_some() {
            return Err(RegistryError::InvalidHandlerAlreadySet);
        }
        self.invalid_handler = Some(Arc::new(handler));
        Ok(self)
    }

    pub fn set_initial_state(&mut self, state: impl Into<State>) -> &mut Self {
        self.initial_state = Some(state.into());
        self
    }

    /// State assigned to identities seen for the first time
    pub fn initial_state(&self) -> Option<&State> {
        self.initial_state.as_ref()
    }

    /// Bindings of `state` in registration order; empty for unknown states
    pub fn bindings_for(&self, state: &State) -> &[StateBinding] {
        self.states.get(state).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn invalid_handler(&self) -> Option<&Arc<dyn Handler>> {
        self.invalid_handler.as_ref()
    }

    pub fn states(&self) -> impl Iterator<Item = &State> {
        self.states.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

impl std::fmt::Debug for StateRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateRegistry")
            .field("states", &self.states)
            .field("initial_state", &self.initial_state)
            .field("has_invalid_handler", &self.invalid_handler.is_some())
            .finish()
    }
}
