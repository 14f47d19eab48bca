//! Audio route engine
//!
//! Runs the route table against a message queue. External messages are
//! appended; messages the engine sends itself go to the front, so the
//! reaction to one external message finishes before the next one starts.
//! Snapshot dispatches are collected and handed back from
//! [`AudioRouteEngine::process_pending`].

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::hardware::AudioHardware;
use super::message::RouteMessage;
use super::route::{AudioRoute, RouteMask};
use super::state::{AudioStateChange, AudioStateSnapshot, RouteState};
use super::table::{RouteAction, RouteGuard, RouteTable};
use super::DEFAULT_ROUTE_TABLE;

pub struct AudioRouteEngine {
    table: Arc<RouteTable>,
    hardware: Arc<dyn AudioHardware>,
    earpiece_supported: bool,

    state: RouteState,
    available: RouteMask,
    muted: bool,
    was_on_speaker: bool,
    user_left_bluetooth: bool,

    /// Latest computed snapshot, dispatched or not
    current: AudioStateSnapshot,
    /// Last snapshot actually dispatched
    last_known: AudioStateSnapshot,

    queue: VecDeque<RouteMessage>,
    dispatched: Vec<AudioStateChange>,
}

impl std::fmt::Debug for AudioRouteEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioRouteEngine")
            .field("state", &self.state)
            .field("available", &self.available)
            .field("muted", &self.muted)
            .field("was_on_speaker", &self.was_on_speaker)
            .field("user_left_bluetooth", &self.user_left_bluetooth)
            .field("pending", &self.queue.len())
            .finish()
    }
}

impl AudioRouteEngine {
    /// Engine with the default table, initialized from hardware status
    pub fn new(hardware: Arc<dyn AudioHardware>, earpiece_supported: bool) -> Self {
        Self::with_table(Arc::clone(&DEFAULT_ROUTE_TABLE), hardware, earpiece_supported)
    }

    pub fn with_table(
        table: Arc<RouteTable>,
        hardware: Arc<dyn AudioHardware>,
        earpiece_supported: bool,
    ) -> Self {
        let placeholder = AudioStateSnapshot::new(false, AudioRoute::Speaker, RouteMask::SPEAKER);
        let mut engine = Self {
            table,
            hardware,
            earpiece_supported,
            state: RouteState::QuiescentSpeaker,
            available: RouteMask::SPEAKER,
            muted: false,
            was_on_speaker: false,
            user_left_bluetooth: false,
            current: placeholder,
            last_known: placeholder,
            queue: VecDeque::new(),
            dispatched: Vec::new(),
        };
        let initial = engine.initial_audio_state();
        engine.initialize(initial);
        engine
    }

    /// Reset to a known snapshot without dispatching it
    pub fn initialize(&mut self, initial: AudioStateSnapshot) {
        self.current = initial;
        self.last_known = initial;
        self.available = initial.supported;
        self.muted = initial.muted;
        self.was_on_speaker = false;
        self.user_left_bluetooth = false;
        self.state = RouteState::quiescent(initial.route);
        self.queue.clear();
        self.dispatched.clear();
        info!("Audio route engine initialized in {} with {}", self.state, initial);
    }

    pub fn state(&self) -> RouteState {
        self.state
    }

    pub fn current_audio_state(&self) -> AudioStateSnapshot {
        self.current
    }

    pub fn last_dispatched(&self) -> AudioStateSnapshot {
        self.last_known
    }

    pub fn available_routes(&self) -> RouteMask {
        self.available
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn was_on_speaker(&self) -> bool {
        self.was_on_speaker
    }

    pub fn has_user_left_bluetooth(&self) -> bool {
        self.user_left_bluetooth
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Queue an external message
    pub fn send(&mut self, message: RouteMessage) {
        self.queue.push_back(message);
    }

    /// Handle every queued message, returning the snapshots dispatched
    pub fn process_pending(&mut self) -> Vec<AudioStateChange> {
        while let Some(message) = self.queue.pop_front() {
            self.handle(message);
        }
        std::mem::take(&mut self.dispatched)
    }

    fn handle(&mut self, message: RouteMessage) {
        let table = Arc::clone(&self.table);
        let Some(transitions) = table.get(self.state, message) else {
            error!("Unexpected message {:?} in state {}", message, self.state);
            return;
        };
        let Some(transition) = transitions
            .iter()
            .find(|t| t.guards.iter().all(|g| self.guard_passes(g)))
        else {
            debug!("No transition of {:?} applies in state {}", message, self.state);
            return;
        };

        debug!("Processing {:?} in state {}", message, self.state);
        for action in &transition.actions {
            self.execute(action);
        }
        if let Some(next) = transition.next_state {
            self.transition_to(next);
        }
    }

    fn guard_passes(&self, guard: &RouteGuard) -> bool {
        match guard {
            RouteGuard::RouteAvailable(route) => self.available.has(*route),
            RouteGuard::UserLeftBluetooth(expected) => self.user_left_bluetooth == *expected,
            RouteGuard::WasOnSpeaker(expected) => self.was_on_speaker == *expected,
        }
    }

    fn transition_to(&mut self, next: RouteState) {
        if next == self.state {
            return;
        }
        info!("Audio route {} -> {}", self.state, next);
        self.state = next;
        let table = Arc::clone(&self.table);
        for action in table.enter_actions(next) {
            self.execute(action);
        }
    }

    fn execute(&mut self, action: &RouteAction) {
        match action {
            RouteAction::AddRoute(route) => self.available.insert(route.mask()),
            RouteAction::RemoveRoute(route) => self.available.remove(route.mask()),
            RouteAction::AddEarpieceIfSupported => {
                if self.earpiece_supported {
                    self.available.insert(RouteMask::EARPIECE);
                }
            }
            RouteAction::SendInternal(message) => self.queue.push_front(*message),
            RouteAction::SendBaseline { user } => {
                let message = self.baseline_route_message(*user);
                self.queue.push_front(message);
            }
            RouteAction::RefreshState => {
                self.update_internal_state();
                if self.state.is_active() {
                    self.publish(self.current, false);
                }
            }
            RouteAction::UpdateInternalState => self.update_internal_state(),
            RouteAction::PublishRoute => {
                let snapshot = AudioStateSnapshot::new(self.muted, self.state.route(), self.available);
                self.publish(snapshot, false);
            }
            RouteAction::ResendState => self.publish(self.last_known, true),
            RouteAction::SetSpeakerphone(on) => self.set_speakerphone_on(*on),
            RouteAction::SetBluetoothAudio(on) => self.set_bluetooth_on(*on),
            RouteAction::SetUserLeftBluetooth(left) => self.user_left_bluetooth = *left,
            RouteAction::SetWasOnSpeaker(was) => self.was_on_speaker = *was,
            RouteAction::SetMute(muted) => {
                self.set_mute_on(*muted);
                let snapshot = AudioStateSnapshot::new(self.muted, self.current.route, self.available);
                self.publish(snapshot, false);
                self.update_internal_state();
            }
            RouteAction::ToggleMute => {
                let message = if self.muted {
                    RouteMessage::MuteOff
                } else {
                    RouteMessage::MuteOn
                };
                self.queue.push_front(message);
            }
            RouteAction::Reinitialize => self.reinitialize(),
            RouteAction::Info(message) => info!("{}: {}", self.state, message),
            RouteAction::Warn(message) => warn!("{}: {}", self.state, message),
            RouteAction::Error(message) => error!("{}: {}", self.state, message),
        }
    }

    fn update_internal_state(&mut self) {
        self.current = AudioStateSnapshot::new(self.muted, self.state.route(), self.available);
    }

    /// Dispatch unless nothing changed since the last dispatch
    fn publish(&mut self, snapshot: AudioStateSnapshot, force: bool) {
        if !force && snapshot == self.last_known {
            return;
        }
        debug!("Audio state {} -> {}", self.last_known, snapshot);
        self.dispatched.push(AudioStateChange {
            old: self.last_known,
            new: snapshot,
        });
        self.last_known = snapshot;
    }

    fn set_speakerphone_on(&self, on: bool) {
        if self.hardware.is_speakerphone_on() != on {
            info!("Turning speakerphone {}", if on { "on" } else { "off" });
            self.hardware.set_speakerphone_on(on);
        }
    }

    fn set_bluetooth_on(&self, on: bool) {
        if !self.hardware.is_bluetooth_available() {
            return;
        }
        if self.hardware.is_bluetooth_audio_connected_or_pending() != on {
            info!("{} bluetooth audio", if on { "Connecting" } else { "Disconnecting" });
            self.hardware.set_bluetooth_audio_on(on);
        }
    }

    fn set_mute_on(&mut self, muted: bool) {
        self.muted = muted;
        if muted != self.hardware.is_microphone_mute() && self.state.is_active() {
            info!("Changing microphone mute to {}", muted);
            self.hardware.set_microphone_mute(muted);
        }
    }

    fn baseline_route_message(&self, user: bool) -> RouteMessage {
        let pick = |auto: RouteMessage, by_user: RouteMessage| if user { by_user } else { auto };
        if self.available.has(AudioRoute::Earpiece) {
            pick(RouteMessage::SwitchEarpiece, RouteMessage::UserSwitchEarpiece)
        } else if self.available.has(AudioRoute::WiredHeadset) {
            pick(RouteMessage::SwitchHeadset, RouteMessage::UserSwitchHeadset)
        } else if !self.earpiece_supported {
            pick(RouteMessage::SwitchSpeaker, RouteMessage::UserSwitchSpeaker)
        } else {
            error!("Neither headset nor earpiece available on a device with an earpiece, defaulting to earpiece");
            pick(RouteMessage::SwitchEarpiece, RouteMessage::UserSwitchEarpiece)
        }
    }

    fn supported_routes(&self) -> RouteMask {
        let mut mask = RouteMask::SPEAKER;
        if self.hardware.is_wired_headset_plugged() {
            mask.insert(RouteMask::WIRED_HEADSET);
        } else if self.earpiece_supported {
            mask.insert(RouteMask::EARPIECE);
        }
        if self.hardware.is_bluetooth_available() {
            mask.insert(RouteMask::BLUETOOTH);
        }
        mask
    }

    /// Snapshot derived from hardware status
    pub fn initial_audio_state(&self) -> AudioStateSnapshot {
        let supported = self.supported_routes();
        let route = [AudioRoute::Bluetooth, AudioRoute::WiredHeadset, AudioRoute::Earpiece]
            .into_iter()
            .find(|r| supported.has(*r))
            .unwrap_or(AudioRoute::Speaker);
        AudioStateSnapshot::new(false, route, supported)
    }

    fn reinitialize(&mut self) {
        let initial = self.initial_audio_state();
        self.available = initial.supported;
        self.set_mute_on(initial.muted);
        self.was_on_speaker = false;
        self.user_left_bluetooth = false;
        self.transition_to(RouteState::quiescent(initial.route));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::hardware::{HardwareCall, SimulatedAudioHardware};
    use crate::audio::message::Focus;

    fn engine() -> (AudioRouteEngine, Arc<SimulatedAudioHardware>) {
        let hw = Arc::new(SimulatedAudioHardware::new());
        let engine = AudioRouteEngine::new(hw.clone(), true);
        (engine, hw)
    }

    #[test]
    fn test_initial_state_has_no_dispatch() {
        let (mut engine, _) = engine();
        assert_eq!(engine.state(), RouteState::QuiescentEarpiece);
        assert_eq!(engine.available_routes(), RouteMask::SPEAKER | RouteMask::EARPIECE);
        assert!(engine.process_pending().is_empty());
    }

    #[test]
    fn test_focus_activates_and_dispatches_once() {
        let (mut engine, _) = engine();
        engine.send(RouteMessage::SwitchFocus(Focus::HasFocus));
        let changes = engine.process_pending();
        assert_eq!(engine.state(), RouteState::ActiveEarpiece);
        // same snapshot as the initial one, nothing to dispatch
        assert!(changes.is_empty());

        engine.send(RouteMessage::UpdateSystemAudioRoute);
        assert_eq!(engine.process_pending().len(), 1);
    }

    #[test]
    fn test_internal_messages_jump_the_queue() {
        let (mut engine, _) = engine();
        engine.send(RouteMessage::SwitchFocus(Focus::HasFocus));
        engine.send(RouteMessage::ConnectWiredHeadset);
        engine.send(RouteMessage::UserSwitchSpeaker);
        engine.process_pending();
        // headset switch ran before the user's speaker request
        assert_eq!(engine.state(), RouteState::ActiveSpeaker);
        assert!(engine.was_on_speaker());
    }

    #[test]
    fn test_mute_skips_hardware_when_quiescent() {
        let (mut engine, hw) = engine();
        engine.send(RouteMessage::MuteOn);
        let changes = engine.process_pending();
        assert!(engine.is_muted());
        assert_eq!(changes.len(), 1);
        assert!(hw.calls().is_empty());

        engine.send(RouteMessage::SwitchFocus(Focus::HasFocus));
        engine.send(RouteMessage::ToggleMute);
        engine.process_pending();
        assert!(!engine.is_muted());
        // hardware already matched, nothing toggled
        assert!(hw.calls().is_empty());

        engine.send(RouteMessage::MuteOn);
        engine.process_pending();
        assert_eq!(hw.calls(), vec![HardwareCall::MicrophoneMute(true)]);
    }

    #[test]
    fn test_losing_focus_reinitializes() {
        let (mut engine, hw) = engine();
        engine.send(RouteMessage::SwitchFocus(Focus::HasFocus));
        engine.send(RouteMessage::UserSwitchSpeaker);
        engine.send(RouteMessage::MuteOn);
        engine.process_pending();
        assert_eq!(engine.state(), RouteState::ActiveSpeaker);
        assert!(hw.is_microphone_mute());

        engine.send(RouteMessage::SwitchFocus(Focus::NoFocus));
        engine.process_pending();
        assert_eq!(engine.state(), RouteState::QuiescentEarpiece);
        assert!(!engine.is_muted());
        assert!(!hw.is_microphone_mute());
        assert!(!engine.was_on_speaker());
    }

    #[test]
    fn test_user_switch_in_quiescent_is_ignored() {
        let (mut engine, _) = engine();
        engine.send(RouteMessage::UserSwitchSpeaker);
        engine.process_pending();
        assert_eq!(engine.state(), RouteState::QuiescentEarpiece);
    }
}
