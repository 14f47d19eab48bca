//! Multi-call arbitration
//!
//! The [`CallRegistry`] owns every [`CallRecord`] and the audio route
//! engine. It decides which calls may be live, held, ringing or dialing at
//! once, places and fails over connection attempts, applies incoming-call
//! filter verdicts, runs post-dial DTMF and fans changes out to subscribers.
//!
//! The registry is synchronous. Every operation mutates local state and
//! queues [`Effect`]s (provider commands, subscriber events, tone commands,
//! timer requests) which the caller drains with
//! [`CallRegistry::take_effects`] and executes. Inside the service this all
//! happens on one task, so no two operations ever interleave.
//!
//! Operations are grouped by concern:
//!
//! - `selection`: foreground choice and state queries
//! - `admission`: room-making for outgoing calls and `can_add_call`
//! - `outgoing` / `incoming`: call setup and connection attempts
//! - `conference`, `dtmf`, `commands`: user actions
//! - `provider_events`: callbacks from providers

mod admission;
mod commands;
mod conference;
mod dtmf;
mod incoming;
mod outgoing;
mod provider_events;
pub mod selection;

pub use commands::MediaButton;
pub use selection::{select_foreground, FOREGROUND_TIERS};

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::accounts::{AccountDirectory, PhoneAccount};
use crate::audio::{AudioHardware, AudioRoute, AudioRouteEngine, Focus, HardwareEvent, RouteMessage};
use crate::call::{
    AbortOutcome, CallDirection, CallEvent, CallRecord, CallSnapshot, CallState, CallTable,
    DisconnectCause, DisconnectCode, DisconnectOutcome, StateChange,
};
use crate::config::TelecomConfig;
use crate::error::{TelecomError, TelecomResult};
use crate::events::TelecomEvent;
use crate::provider::{ProviderCommand, ToneCommand};
use crate::timer::{TimerKey, TimerRequest};
use crate::types::{AccountHandle, Address, CallId, ProviderId, SCHEME_TEL};

/// Outbound work produced by a registry operation
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Broadcast to subscribers
    Notify(TelecomEvent),
    /// Send to the provider that owns the call
    Provider {
        provider: ProviderId,
        command: ProviderCommand,
    },
    /// Local DTMF playback
    Tone { call_id: CallId, command: ToneCommand },
    Timer(TimerRequest),
    /// Run the incoming-call filter and report back with a verdict
    FilterRequested(CallSnapshot),
}

pub struct CallRegistry {
    config: TelecomConfig,
    calls: CallTable,
    accounts: AccountDirectory,
    audio: AudioRouteEngine,

    /// Calls the user asked to hang up, in request order
    locally_disconnecting: Vec<CallId>,
    /// Cancelled outgoing calls waiting out the reuse window
    pending_disconnect: Vec<CallId>,
    /// Calls whose post-dial playback stopped at a wait character
    dtmf_suspended: HashSet<CallId>,
    /// Timers this registry asked for and has not seen fire or cancelled
    timers: HashSet<TimerKey>,

    foreground: Option<CallId>,
    can_add_call: bool,
    has_focus: bool,
    speaker_requested: bool,

    effects: Vec<Effect>,
}

impl std::fmt::Debug for CallRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallRegistry")
            .field("calls", &self.calls.len())
            .field("tracked", &self.calls.tracked_ids())
            .field("foreground", &self.foreground)
            .field("can_add_call", &self.can_add_call)
            .field("has_focus", &self.has_focus)
            .field("audio", &self.audio)
            .finish()
    }
}

impl CallRegistry {
    pub fn new(config: TelecomConfig, hardware: Arc<dyn AudioHardware>) -> Self {
        let audio = AudioRouteEngine::new(hardware, config.audio.earpiece_supported);
        Self {
            config,
            calls: CallTable::new(),
            accounts: AccountDirectory::new(),
            audio,
            locally_disconnecting: Vec::new(),
            pending_disconnect: Vec::new(),
            dtmf_suspended: HashSet::new(),
            timers: HashSet::new(),
            foreground: None,
            can_add_call: true,
            has_focus: false,
            speaker_requested: false,
            effects: Vec::new(),
        }
    }

    pub fn config(&self) -> &TelecomConfig {
        &self.config
    }

    pub fn accounts(&self) -> &AccountDirectory {
        &self.accounts
    }

    pub fn audio(&self) -> &AudioRouteEngine {
        &self.audio
    }

    /// Record by id, tracked or not
    pub fn call(&self, call_id: &CallId) -> Option<&CallRecord> {
        self.calls.get(call_id)
    }

    /// Drain the effects queued by earlier operations
    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    pub fn register_account(&mut self, account: PhoneAccount) {
        self.accounts.register(account);
    }

    pub fn unregister_account(&mut self, handle: &AccountHandle) -> TelecomResult<PhoneAccount> {
        self.accounts
            .unregister(handle)
            .ok_or_else(|| TelecomError::AccountNotFound {
                account: handle.clone(),
            })
    }

    pub fn set_default_account(&mut self, scheme: &str, handle: AccountHandle) -> TelecomResult<()> {
        self.accounts.set_default_for_scheme(scheme, handle)
    }

    /// Accessory plugged or unplugged
    pub fn on_hardware_event(&mut self, event: HardwareEvent) {
        debug!("Hardware event {:?}", event);
        self.audio.send(event.into());
        self.settle();
    }

    /// A timer armed by this registry expired
    pub fn on_timer_fired(&mut self, key: TimerKey) {
        if !self.timers.remove(&key) {
            debug!("Ignoring timer {:?} this registry no longer expects", key);
            return;
        }
        match key {
            TimerKey::DtmfToneStop(call_id) => self.on_dtmf_timer(&call_id),
            TimerKey::NewOutgoingCallCancel(call_id) => {
                if let Some(pos) = self.pending_disconnect.iter().position(|c| c == &call_id) {
                    self.pending_disconnect.remove(pos);
                    info!("Reuse window for call {} closed, disconnecting", call_id);
                    self.disconnect_record(&call_id, false);
                }
            }
            TimerKey::ConnectionAttempt(call_id) => self.on_connection_attempt_timeout(&call_id),
        }
        self.settle();
    }

    // Effect helpers

    pub(crate) fn notify(&mut self, event: TelecomEvent) {
        self.effects.push(Effect::Notify(event));
    }

    fn send_to(&mut self, provider: ProviderId, command: ProviderCommand) {
        debug!("-> {} {} for call {}", provider, command.name(), command.call_id());
        self.effects.push(Effect::Provider { provider, command });
    }

    /// Send to the provider bound to the command's call
    fn send(&mut self, command: Option<ProviderCommand>) {
        let Some(command) = command else {
            return;
        };
        match self.calls.get(command.call_id()).and_then(|c| c.provider()).cloned() {
            Some(provider) => self.send_to(provider, command),
            None => warn!(
                "No provider bound to call {}, dropping {}",
                command.call_id(),
                command.name()
            ),
        }
    }

    fn tone(&mut self, call_id: &CallId, command: ToneCommand) {
        self.effects.push(Effect::Tone {
            call_id: call_id.clone(),
            command,
        });
    }

    fn schedule_timer(&mut self, key: TimerKey, delay: Duration) {
        self.timers.insert(key.clone());
        self.effects.push(Effect::Timer(TimerRequest::Schedule { key, delay }));
    }

    fn cancel_timer(&mut self, key: TimerKey) {
        if self.timers.remove(&key) {
            self.effects.push(Effect::Timer(TimerRequest::Cancel { key }));
        }
    }

    fn require_tracked(&self, call_id: &CallId) -> TelecomResult<()> {
        if self.calls.is_tracked(call_id) {
            Ok(())
        } else {
            Err(TelecomError::call_not_found(call_id))
        }
    }

    fn is_emergency_address(&self, address: &Address) -> bool {
        if address.scheme() != SCHEME_TEL {
            return false;
        }
        let number = address.normalized_number();
        self.config
            .emergency_numbers
            .iter()
            .any(|n| Address::tel(n.as_str()).normalized_number() == number)
    }

    /// Speaker is turned on automatically for video calls when nothing
    /// else can carry the audio
    fn is_speakerphone_auto_enabled(&self, video: crate::call::VideoState) -> bool {
        let available = self.audio.available_routes();
        video.is_video()
            && !available.has(AudioRoute::WiredHeadset)
            && !available.has(AudioRoute::Bluetooth)
            && self.config.audio.speaker_for_video_calls
    }

    // Call bookkeeping

    /// Start broadcasting a call
    fn track_call(&mut self, call_id: &CallId) {
        // changes made before tracking are folded into the CallAdded snapshot
        self.flush_call_events();
        if self.calls.track(call_id) {
            if let Some(call) = self.calls.get(call_id) {
                info!("Tracking call {} ({})", call_id, call.state());
                let snapshot = call.snapshot();
                self.notify(TelecomEvent::CallAdded { call: snapshot });
            }
        }
    }

    /// Forget a call entirely
    fn remove_call(&mut self, call_id: &CallId) {
        self.flush_call_events();
        let was_tracked = self.calls.is_tracked(call_id);
        self.pending_disconnect.retain(|c| c != call_id);
        self.dtmf_suspended.remove(call_id);
        for key in [
            TimerKey::DtmfToneStop(call_id.clone()),
            TimerKey::NewOutgoingCallCancel(call_id.clone()),
            TimerKey::ConnectionAttempt(call_id.clone()),
        ] {
            self.cancel_timer(key);
        }

        if let Some(mut call) = self.calls.remove(call_id) {
            call.clear_provider();
            debug!("Removed call {} (tracked: {})", call_id, was_tracked);
            if was_tracked {
                self.notify(TelecomEvent::CallRemoved {
                    call: call.snapshot(),
                });
            }
        }
    }

    /// Remove a call; if the user hung it up, resume the held call that is
    /// now in the foreground
    fn mark_call_as_removed(&mut self, call_id: &CallId) {
        self.remove_call(call_id);
        let Some(pos) = self.locally_disconnecting.iter().position(|c| c == call_id) else {
            return;
        };
        self.locally_disconnecting.remove(pos);

        let foreground = select_foreground(self.calls.top_level(), self.foreground.as_ref());
        if let Some(foreground) = foreground {
            let command = self
                .calls
                .get_mut(&foreground)
                .filter(|c| c.state() == CallState::OnHold)
                .and_then(|c| c.unhold());
            if command.is_some() {
                info!("Resuming held call {} after local hangup", foreground);
            }
            self.send(command);
        }
    }

    /// Apply a state change, turning an intercepted disconnect into the next
    /// connection attempt
    fn set_call_state(&mut self, call_id: &CallId, state: CallState) {
        match self.calls.set_state(call_id, state) {
            Ok(StateChange::Changed { old, new }) => {
                info!("Call {} {} -> {}", call_id, old, new);
            }
            Ok(StateChange::Unchanged) => {}
            Ok(StateChange::RetryWithNextCandidate) => {
                if let Some(call) = self.calls.get_mut(call_id) {
                    call.clear_provider();
                }
                self.attempt_next_candidate(call_id);
            }
            Err(e) => warn!("Failed to set state of call {}: {}", call_id, e),
        }
    }

    fn disconnect_record(&mut self, call_id: &CallId, via_interceptor: bool) {
        let outcome = match self.calls.get_mut(call_id) {
            Some(call) => call.disconnect(via_interceptor),
            None => return,
        };
        match outcome {
            DisconnectOutcome::Send(command) => self.send(Some(command)),
            DisconnectOutcome::Abort(abort) => self.handle_abort(call_id, abort),
            DisconnectOutcome::Nothing => {}
        }
    }

    fn handle_abort(&mut self, call_id: &CallId, outcome: AbortOutcome) {
        match outcome {
            AbortOutcome::CancelAttempt(command) => {
                let provider = self
                    .calls
                    .get(call_id)
                    .and_then(|c| c.attempts())
                    .and_then(|a| a.current())
                    .map(|account| account.provider.clone());
                if let (Some(provider), Some(command)) = (provider, command) {
                    self.send_to(provider, command);
                }
                info!("Cancelled in-flight connection attempt for call {}", call_id);
                self.fail_connection(call_id, DisconnectCause::new(DisconnectCode::Local));
            }
            AbortOutcome::OfferCancellation => self.claim_cancellation(call_id),
            AbortOutcome::FailCanceled => {
                self.fail_connection(call_id, DisconnectCause::new(DisconnectCode::Canceled));
            }
            AbortOutcome::NotAbortable => {}
        }
    }

    /// Hold a cancelled outgoing call for a short while in case the same
    /// number is dialed again
    fn claim_cancellation(&mut self, call_id: &CallId) {
        if let Some(call) = self.calls.get_mut(call_id) {
            call.set_locally_disconnecting(false);
        }
        self.locally_disconnecting.retain(|c| c != call_id);
        if !self.pending_disconnect.contains(call_id) {
            self.pending_disconnect.push(call_id.clone());
        }
        info!("Call {} cancelled before placement, holding it for reuse", call_id);
        let delay = self.config.timeouts.new_outgoing_call_cancel();
        self.schedule_timer(TimerKey::NewOutgoingCallCancel(call_id.clone()), delay);
    }

    /// Connection could not be established with any candidate
    fn fail_connection(&mut self, call_id: &CallId, cause: DisconnectCause) {
        let direction = match self.calls.get_mut(call_id) {
            Some(call) => {
                call.set_disconnect_cause(cause.clone());
                call.direction()
            }
            None => return,
        };
        self.cancel_timer(TimerKey::ConnectionAttempt(call_id.clone()));
        info!("Connection for call {} failed: {}", call_id, cause);
        self.set_call_state(call_id, CallState::Disconnected);

        match direction {
            CallDirection::Outgoing => self.mark_call_as_removed(call_id),
            _ => {
                if !self.calls.is_tracked(call_id) {
                    self.remove_call(call_id);
                }
            }
        }
    }

    // Change propagation

    fn flush_call_events(&mut self) {
        for (call_id, event) in self.calls.take_events() {
            if let CallEvent::StateChanged { new, .. } = &event {
                if matches!(new, CallState::Dialing | CallState::Active) {
                    self.maybe_move_to_speaker(&call_id);
                }
            }
            if !self.calls.is_tracked(&call_id) {
                continue;
            }
            if let Some(event) = self.translate(&call_id, event) {
                self.notify(event);
            }
        }
    }

    fn maybe_move_to_speaker(&mut self, call_id: &CallId) {
        if let Some(call) = self.calls.get_mut(call_id) {
            if call.start_with_speakerphone() {
                call.set_start_with_speakerphone(false);
                info!("Call {} starts on speaker", call_id);
                self.speaker_requested = true;
            }
        }
    }

    fn translate(&self, call_id: &CallId, event: CallEvent) -> Option<TelecomEvent> {
        let call_id = call_id.clone();
        let event = match event {
            CallEvent::StateChanged { old, new } => TelecomEvent::CallStateChanged { call_id, old, new },
            CallEvent::CapabilitiesChanged { new, .. } => TelecomEvent::CapabilitiesChanged {
                call_id,
                capabilities: new,
            },
            CallEvent::PropertiesChanged { new, .. } => TelecomEvent::PropertiesChanged {
                call_id,
                properties: new,
            },
            CallEvent::ExternalCallChanged { is_external } => {
                TelecomEvent::ExternalCallChanged { call_id, is_external }
            }
            CallEvent::ParentChanged { .. } | CallEvent::ChildrenChanged => {
                let call = self.calls.get(&call_id)?;
                TelecomEvent::ConferenceChanged {
                    parent: call.parent().cloned(),
                    children: call.children().to_vec(),
                    call_id,
                }
            }
            CallEvent::HandleChanged { address } => TelecomEvent::HandleChanged { call_id, address },
            CallEvent::ExtrasChanged { source } | CallEvent::ExtrasRemoved { source, .. } => {
                let extras = self.calls.get(&call_id)?.extras().clone();
                TelecomEvent::ExtrasChanged {
                    call_id,
                    source,
                    extras,
                }
            }
            CallEvent::VideoStateChanged { new, .. } => TelecomEvent::VideoStateChanged {
                call_id,
                video_state: new,
            },
            CallEvent::RingbackRequested { requested } => {
                TelecomEvent::RingbackRequested { call_id, requested }
            }
            CallEvent::VoipAudioModeChanged { is_voip } => {
                TelecomEvent::VoipAudioModeChanged { call_id, is_voip }
            }
            CallEvent::PostDialWait { remaining } => TelecomEvent::PostDialWait { call_id, remaining },
            CallEvent::ConnectionEvent { name } => TelecomEvent::ConnectionEvent { call_id, name },
        };
        Some(event)
    }

    /// Broadcast pending call changes, then recompute everything derived
    /// from the call set and run the audio engine
    fn settle(&mut self) {
        self.flush_call_events();
        self.update_foreground();
        self.update_can_add_call();
        self.update_focus();

        if std::mem::take(&mut self.speaker_requested) {
            self.audio.send(RouteMessage::UserSwitchSpeaker);
        }

        for change in self.audio.process_pending() {
            self.notify(TelecomEvent::AudioStateChanged {
                old: change.old,
                new: change.new,
            });
            if let Some(foreground) = self.foreground.clone() {
                self.send(Some(ProviderCommand::AudioStateChanged {
                    call_id: foreground,
                    state: change.new,
                }));
            }
        }
    }

    fn update_foreground(&mut self) {
        let selected = select_foreground(self.calls.top_level(), self.foreground.as_ref());
        if selected != self.foreground {
            let old = std::mem::replace(&mut self.foreground, selected.clone());
            debug!("Foreground call {:?} -> {:?}", old, selected);
            self.notify(TelecomEvent::ForegroundCallChanged { old, new: selected });
        }
    }

    fn update_can_add_call(&mut self) {
        let can_add_call = self.compute_can_add_call();
        if can_add_call != self.can_add_call {
            self.can_add_call = can_add_call;
            debug!("can_add_call -> {}", can_add_call);
            self.notify(TelecomEvent::CanAddCallChanged { can_add_call });
        }
    }

    fn update_focus(&mut self) {
        let needs_focus = self.calls.tracked().any(|c| {
            !c.is_external()
                && matches!(
                    c.state(),
                    CallState::Dialing | CallState::Ringing | CallState::Active | CallState::OnHold
                )
        });
        if needs_focus != self.has_focus {
            self.has_focus = needs_focus;
            let focus = if needs_focus { Focus::HasFocus } else { Focus::NoFocus };
            debug!("Audio focus -> {:?}", focus);
            self.audio.send(RouteMessage::SwitchFocus(focus));
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::audio::SimulatedAudioHardware;
    use crate::call::Capabilities;
    use crate::provider::ConnectionInfo;

    pub fn registry() -> (CallRegistry, Arc<SimulatedAudioHardware>) {
        let hardware = Arc::new(SimulatedAudioHardware::new());
        let mut registry = CallRegistry::new(TelecomConfig::default(), hardware.clone());
        registry.register_account(PhoneAccount::new(sim()));
        (registry, hardware)
    }

    pub fn sim() -> AccountHandle {
        AccountHandle::new("telephony", "sim1")
    }

    pub fn provider_commands(effects: &[Effect]) -> Vec<ProviderCommand> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Provider { command, .. } => Some(command.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn events(effects: &[Effect]) -> Vec<TelecomEvent> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Notify(event) => Some(event.clone()),
                _ => None,
            })
            .collect()
    }

    /// Place an outgoing call on `sim1` and drive it to `state`
    pub fn outgoing_in_state(registry: &mut CallRegistry, number: &str, state: CallState) -> CallId {
        let id = registry
            .start_outgoing_call(Address::tel(number), Some(sim()), crate::call::VideoState::AUDIO_ONLY)
            .unwrap();
        registry
            .place_outgoing_call(&id, false, crate::call::VideoState::AUDIO_ONLY)
            .unwrap();
        let info = ConnectionInfo {
            capabilities: Capabilities::HOLD | Capabilities::SUPPORT_HOLD,
            ..Default::default()
        };
        registry
            .on_provider_event(crate::provider::ProviderEvent::ConnectionCreated {
                call_id: id.clone(),
                info,
            })
            .unwrap();
        match state {
            CallState::Active => registry
                .on_provider_event(crate::provider::ProviderEvent::SetActive { call_id: id.clone() })
                .unwrap(),
            CallState::OnHold => {
                registry
                    .on_provider_event(crate::provider::ProviderEvent::SetActive { call_id: id.clone() })
                    .unwrap();
                registry
                    .on_provider_event(crate::provider::ProviderEvent::SetOnHold { call_id: id.clone() })
                    .unwrap();
            }
            _ => {}
        }
        registry.take_effects();
        id
    }
}
