//! Transition table for the route engine
//!
//! Every reaction of the engine is data: for a (state, message) pair the
//! table holds an ordered list of guarded transitions, and the first one
//! whose guards pass fires. Messages with no entry for the current state
//! fall back to the wildcard entries, which apply in any state.
//!
//! States also carry enter actions that run whenever the engine moves into
//! them.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::message::{Focus, RouteMessage};
use super::route::AudioRoute;
use super::state::RouteState;

/// Key for looking up transitions in the route table
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RouteKey {
    pub state: RouteState,
    pub message: RouteMessage,
}

/// Conditions checked before a transition fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouteGuard {
    RouteAvailable(AudioRoute),
    UserLeftBluetooth(bool),
    WasOnSpeaker(bool),
}

/// Actions executed, in order, when a transition fires or a state is entered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouteAction {
    // Availability
    AddRoute(AudioRoute),
    RemoveRoute(AudioRoute),
    AddEarpieceIfSupported,

    // Follow-up messages, handled before anything already queued
    SendInternal(RouteMessage),
    SendBaseline { user: bool },

    // Snapshots
    /// Recompute the snapshot; dispatch it only in active states
    RefreshState,
    /// Recompute the snapshot without dispatching
    UpdateInternalState,
    /// Dispatch a snapshot for the state's own route
    PublishRoute,
    /// Force a resend of the last dispatched snapshot
    ResendState,

    // Hardware
    SetSpeakerphone(bool),
    SetBluetoothAudio(bool),

    // Hidden state
    SetUserLeftBluetooth(bool),
    SetWasOnSpeaker(bool),
    SetMute(bool),
    ToggleMute,
    /// Reset from hardware status and drop to a quiescent state
    Reinitialize,

    Info(String),
    Warn(String),
    Error(String),
}

/// A guarded reaction to a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTransition {
    /// Conditions that must be true for this transition
    pub guards: Vec<RouteGuard>,

    /// Actions to execute
    pub actions: Vec<RouteAction>,

    /// Next state (if changing)
    pub next_state: Option<RouteState>,
}

impl RouteTransition {
    pub fn new(actions: Vec<RouteAction>) -> Self {
        Self {
            guards: Vec::new(),
            actions,
            next_state: None,
        }
    }

    /// Message is consumed without any effect
    pub fn ignore() -> Self {
        Self::new(Vec::new())
    }

    pub fn when(mut self, guard: RouteGuard) -> Self {
        self.guards.push(guard);
        self
    }

    pub fn to(mut self, state: RouteState) -> Self {
        self.next_state = Some(state);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    transitions: HashMap<RouteKey, Vec<RouteTransition>>,
    /// Transitions that apply to any state without its own entry
    wildcard_transitions: HashMap<RouteMessage, Vec<RouteTransition>>,
    enter_actions: HashMap<RouteState, Vec<RouteAction>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: RouteKey, transition: RouteTransition) {
        self.transitions.entry(key).or_default().push(transition);
    }

    pub fn insert_wildcard(&mut self, message: RouteMessage, transition: RouteTransition) {
        self.wildcard_transitions
            .entry(message)
            .or_default()
            .push(transition);
    }

    pub fn insert_enter(&mut self, state: RouteState, actions: Vec<RouteAction>) {
        self.enter_actions.entry(state).or_default().extend(actions);
    }

    /// Exact entry for the state, else the wildcard entry for the message
    pub fn get(&self, state: RouteState, message: RouteMessage) -> Option<&[RouteTransition]> {
        let key = RouteKey { state, message };
        if let Some(transitions) = self.transitions.get(&key) {
            return Some(transitions);
        }
        self.wildcard_transitions
            .get(&message)
            .map(|transitions| transitions.as_slice())
    }

    pub fn enter_actions(&self, state: RouteState) -> &[RouteAction] {
        self.enter_actions
            .get(&state)
            .map(|actions| actions.as_slice())
            .unwrap_or(&[])
    }

    pub fn has_transition(&self, state: RouteState, message: RouteMessage) -> bool {
        self.get(state, message).is_some()
    }

    pub fn transition_count(&self) -> usize {
        self.transitions.values().map(Vec::len).sum::<usize>()
            + self.wildcard_transitions.values().map(Vec::len).sum::<usize>()
    }

    /// Collect all states referenced in this table
    pub fn collect_used_states(&self) -> HashSet<RouteState> {
        let mut states = HashSet::new();
        for (key, transitions) in &self.transitions {
            states.insert(key.state);
            states.extend(transitions.iter().filter_map(|t| t.next_state));
        }
        for transitions in self.wildcard_transitions.values() {
            states.extend(transitions.iter().filter_map(|t| t.next_state));
        }
        states
    }

    /// Every reachable state must have enter actions and react to focus changes
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        for state in self.collect_used_states() {
            if !self.enter_actions.contains_key(&state) {
                errors.push(format!("State {} has no enter actions", state));
            }
            for focus in [Focus::HasFocus, Focus::NoFocus] {
                if !self.has_transition(state, RouteMessage::SwitchFocus(focus)) {
                    errors.push(format!("State {} does not handle {:?}", state, focus));
                }
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Incrementally assembles a [`RouteTable`]
#[derive(Debug, Default)]
pub struct RouteTableBuilder {
    table: RouteTable,
}

impl RouteTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_transition(
        &mut self,
        state: RouteState,
        message: RouteMessage,
        transition: RouteTransition,
    ) -> &mut Self {
        self.table.insert(RouteKey { state, message }, transition);
        self
    }

    pub fn add_wildcard(&mut self, message: RouteMessage, transition: RouteTransition) -> &mut Self {
        self.table.insert_wildcard(message, transition);
        self
    }

    pub fn on_enter(&mut self, state: RouteState, actions: Vec<RouteAction>) -> &mut Self {
        self.table.insert_enter(state, actions);
        self
    }

    pub fn build(self) -> RouteTable {
        self.table
    }
}
