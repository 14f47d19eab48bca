//! Per-call state machine
//!
//! A [`CallRecord`] owns everything that is local to one call: its state,
//! the capability and property masks reported by the provider, video state,
//! conference links and timestamps. It knows nothing about other calls or
//! about audio routing.
//!
//! Mutations never notify anyone directly. Each one that changes something
//! queues a [`CallEvent`] which the registry drains with
//! [`CallRecord::take_events`]. Operations that need the provider return the
//! [`ProviderCommand`] to send instead of sending it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::attempts::ConnectionAttempts;
use super::flags::{Capabilities, Properties, VideoState};
use super::state::{CallDirection, CallState, DisconnectCause, DisconnectCode};
use crate::error::{TelecomError, TelecomResult};
use crate::provider::{Extras, ProviderCommand};
use crate::types::{AccountHandle, Address, CallId, ProviderId};

/// Which side changed a call's extras
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtrasSource {
    /// Reported by the provider; not echoed back
    Provider,
    /// Set by an in-call UI; forwarded to the provider
    InCall,
}

/// Something about a call changed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CallEvent {
    StateChanged { old: CallState, new: CallState },
    CapabilitiesChanged { old: Capabilities, new: Capabilities },
    PropertiesChanged { old: Properties, new: Properties },
    ExternalCallChanged { is_external: bool },
    ParentChanged { old: Option<CallId>, new: Option<CallId> },
    ChildrenChanged,
    HandleChanged { address: Option<Address> },
    ExtrasChanged { source: ExtrasSource },
    ExtrasRemoved { source: ExtrasSource, keys: Vec<String> },
    VideoStateChanged { old: VideoState, new: VideoState },
    RingbackRequested { requested: bool },
    VoipAudioModeChanged { is_voip: bool },
    PostDialWait { remaining: String },
    ConnectionEvent { name: String },
}

/// Result of [`CallRecord::set_state`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateChange {
    Unchanged,
    Changed { old: CallState, new: CallState },
    /// The disconnect was swallowed; the caller must try the next candidate
    RetryWithNextCandidate,
}

/// Result of [`CallRecord::abort`]
#[derive(Debug, Clone, PartialEq)]
pub enum AbortOutcome {
    /// An attempt was in flight; send the command and fail the call with Local
    CancelAttempt(Option<ProviderCommand>),
    /// Aborted through the outgoing interceptor; someone may claim the call
    OfferCancellation,
    /// Fail the call with Canceled
    FailCanceled,
    /// Past the point where abort applies
    NotAbortable,
}

/// Result of [`CallRecord::disconnect`]
#[derive(Debug, Clone, PartialEq)]
pub enum DisconnectOutcome {
    Abort(AbortOutcome),
    Send(ProviderCommand),
    Nothing,
}

/// Read-only view of a call, as handed to subscribers and the call log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSnapshot {
    pub call_id: CallId,
    pub state: CallState,
    pub direction: CallDirection,
    pub address: Option<Address>,
    pub account: Option<AccountHandle>,
    pub provider: Option<ProviderId>,
    pub capabilities: Capabilities,
    pub properties: Properties,
    pub video_state: VideoState,
    pub video_state_history: VideoState,
    pub disconnect_cause: DisconnectCause,
    pub is_conference: bool,
    pub is_emergency: bool,
    pub parent: Option<CallId>,
    pub children: Vec<CallId>,
    pub conference_level_active_child: Option<CallId>,
    pub created_at: DateTime<Utc>,
    pub connected_at: Option<DateTime<Utc>>,
    pub disconnected_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct CallRecord {
    id: CallId,
    direction: CallDirection,
    state: CallState,
    address: Option<Address>,
    is_conference: bool,
    is_emergency: bool,

    target_account: Option<AccountHandle>,
    account_supports_video: bool,
    provider: Option<ProviderId>,
    attempts: Option<ConnectionAttempts>,

    capabilities: Capabilities,
    properties: Properties,
    video_state: VideoState,
    video_state_history: VideoState,
    disconnect_cause: DisconnectCause,
    extras: Extras,

    parent: Option<CallId>,
    children: Vec<CallId>,
    conference_level_active_child: Option<CallId>,
    was_conference_previously_merged: bool,

    created_at: DateTime<Utc>,
    connected_at: Option<DateTime<Utc>>,
    disconnected_at: Option<DateTime<Utc>>,

    start_with_speakerphone: bool,
    locally_disconnecting: bool,
    ringback_requested: bool,
    is_voip_audio_mode: bool,
    interception_complete: bool,

    events: Vec<CallEvent>,
}

impl CallRecord {
    pub fn new(id: CallId, direction: CallDirection, address: Option<Address>) -> Self {
        Self {
            id,
            direction,
            state: CallState::New,
            address,
            is_conference: false,
            is_emergency: false,
            target_account: None,
            account_supports_video: true,
            provider: None,
            attempts: None,
            capabilities: Capabilities::empty(),
            properties: Properties::empty(),
            video_state: VideoState::AUDIO_ONLY,
            video_state_history: VideoState::AUDIO_ONLY,
            disconnect_cause: DisconnectCause::default(),
            extras: Extras::new(),
            parent: None,
            children: Vec::new(),
            conference_level_active_child: None,
            was_conference_previously_merged: false,
            created_at: Utc::now(),
            connected_at: None,
            disconnected_at: None,
            start_with_speakerphone: false,
            locally_disconnecting: false,
            ringback_requested: false,
            is_voip_audio_mode: false,
            interception_complete: false,
            events: Vec::new(),
        }
    }

    /// Conference record created on behalf of a provider
    pub fn new_conference(id: CallId, provider: ProviderId) -> Self {
        let mut call = Self::new(id, CallDirection::Undefined, None);
        call.is_conference = true;
        call.provider = Some(provider);
        call
    }

    pub fn with_emergency(mut self, is_emergency: bool) -> Self {
        self.is_emergency = is_emergency;
        self
    }

    // Accessors

    pub fn id(&self) -> &CallId {
        &self.id
    }

    pub fn direction(&self) -> CallDirection {
        self.direction
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn address(&self) -> Option<&Address> {
        self.address.as_ref()
    }

    pub fn is_conference(&self) -> bool {
        self.is_conference
    }

    pub fn is_emergency(&self) -> bool {
        self.is_emergency
    }

    pub fn target_account(&self) -> Option<&AccountHandle> {
        self.target_account.as_ref()
    }

    pub fn provider(&self) -> Option<&ProviderId> {
        self.provider.as_ref()
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn properties(&self) -> Properties {
        self.properties
    }

    pub fn video_state(&self) -> VideoState {
        self.video_state
    }

    pub fn video_state_history(&self) -> VideoState {
        self.video_state_history
    }

    pub fn disconnect_cause(&self) -> &DisconnectCause {
        &self.disconnect_cause
    }

    pub fn extras(&self) -> &Extras {
        &self.extras
    }

    pub fn parent(&self) -> Option<&CallId> {
        self.parent.as_ref()
    }

    pub fn children(&self) -> &[CallId] {
        &self.children
    }

    pub fn conference_level_active_child(&self) -> Option<&CallId> {
        self.conference_level_active_child.as_ref()
    }

    pub fn was_conference_previously_merged(&self) -> bool {
        self.was_conference_previously_merged
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn connected_at(&self) -> Option<DateTime<Utc>> {
        self.connected_at
    }

    pub fn disconnected_at(&self) -> Option<DateTime<Utc>> {
        self.disconnected_at
    }

    pub fn start_with_speakerphone(&self) -> bool {
        self.start_with_speakerphone
    }

    pub fn is_locally_disconnecting(&self) -> bool {
        self.locally_disconnecting
    }

    pub fn ringback_requested(&self) -> bool {
        self.ringback_requested
    }

    pub fn is_voip_audio_mode(&self) -> bool {
        self.is_voip_audio_mode
    }

    pub fn is_interception_complete(&self) -> bool {
        self.interception_complete
    }

    pub fn attempts(&self) -> Option<&ConnectionAttempts> {
        self.attempts.as_ref()
    }

    pub fn attempts_mut(&mut self) -> Option<&mut ConnectionAttempts> {
        self.attempts.as_mut()
    }

    pub fn is_alive(&self) -> bool {
        self.state.is_alive()
    }

    pub fn is_external(&self) -> bool {
        self.properties.contains(Properties::IS_EXTERNAL_CALL)
    }

    pub fn is_video_call(&self) -> bool {
        self.video_state.is_video()
    }

    pub fn can(&self, capability: Capabilities) -> bool {
        self.capabilities.contains(capability)
    }

    /// Outgoing and not yet past dialing
    pub fn is_being_placed(&self) -> bool {
        self.direction == CallDirection::Outgoing
            && matches!(
                self.state,
                CallState::New | CallState::Connecting | CallState::SelectAccount | CallState::Dialing
            )
    }

    /// Drain queued change notifications
    pub fn take_events(&mut self) -> Vec<CallEvent> {
        std::mem::take(&mut self.events)
    }

    fn push(&mut self, event: CallEvent) {
        self.events.push(event);
    }

    // State machine

    /// Move the call to `new`
    ///
    /// Any transition is accepted. Callers must detach the call from its
    /// parent before moving it to Disconnected; `CallTable::set_state` does so.
    pub fn set_state(&mut self, new: CallState) -> StateChange {
        if new == self.state {
            return StateChange::Unchanged;
        }

        if new == CallState::Disconnected && self.should_continue_processing_after_disconnect() {
            info!(
                "Call {} disconnected while being placed ({}), trying next candidate",
                self.id, self.disconnect_cause
            );
            return StateChange::RetryWithNextCandidate;
        }

        let old = self.state;
        debug!("Call {} state {} -> {}", self.id, old, new);
        self.state = new;

        match new {
            CallState::Active | CallState::OnHold => {
                if self.connected_at.is_none() {
                    self.connected_at = Some(Utc::now());
                }
                self.video_state_history |= self.video_state;
                self.disconnected_at = None;
            }
            CallState::Disconnected => {
                self.disconnected_at = Some(Utc::now());
                self.locally_disconnecting = false;
                if self.parent.is_some() {
                    warn!("Call {} disconnected while still attached to a conference", self.id);
                }
                if self.disconnect_cause.code == DisconnectCode::Missed {
                    self.video_state_history |= self.video_state;
                }
            }
            _ => {}
        }

        self.push(CallEvent::StateChanged { old, new });
        StateChange::Changed { old, new }
    }

    /// A disconnect while still being placed is turned into a retry when
    /// another candidate remains and the failure was an error or timeout.
    pub fn should_continue_processing_after_disconnect(&self) -> bool {
        if !self.is_being_placed() {
            return false;
        }
        let Some(attempts) = &self.attempts else {
            return false;
        };
        attempts.is_complete()
            && attempts.has_more_candidates()
            && (self.disconnect_cause.code == DisconnectCode::Error || attempts.is_timed_out())
    }

    pub fn set_disconnect_cause(&mut self, cause: DisconnectCause) {
        self.disconnect_cause = cause;
    }

    pub fn set_connection_attempts(&mut self, attempts: ConnectionAttempts) {
        self.attempts = Some(attempts);
    }

    pub fn set_target_account(&mut self, account: Option<AccountHandle>, supports_video: bool) {
        self.target_account = account;
        self.account_supports_video = supports_video;
        // re-clamp under the new account
        let caps = self.capabilities;
        self.set_connection_capabilities(caps, false);
    }

    pub fn bind_provider(&mut self, provider: ProviderId) {
        self.provider = Some(provider);
    }

    pub fn clear_provider(&mut self) {
        self.provider = None;
    }

    pub fn set_conference(&mut self, is_conference: bool) {
        self.is_conference = is_conference;
    }

    pub fn set_start_with_speakerphone(&mut self, on: bool) {
        self.start_with_speakerphone = on;
    }

    pub fn set_locally_disconnecting(&mut self, on: bool) {
        self.locally_disconnecting = on;
    }

    pub fn set_interception_complete(&mut self) {
        self.interception_complete = true;
    }

    // Attributes reported by the provider

    /// Store provider capabilities, stripping video bits when the account
    /// cannot do video
    pub fn set_connection_capabilities(&mut self, capabilities: Capabilities, force: bool) {
        let capabilities = if self.account_supports_video {
            capabilities
        } else {
            capabilities.without(Capabilities::VIDEO)
        };
        if force || capabilities != self.capabilities {
            let old = self.capabilities;
            self.capabilities = capabilities;
            self.push(CallEvent::CapabilitiesChanged { old, new: capabilities });
        }
    }

    pub fn set_connection_properties(&mut self, properties: Properties) {
        if properties == self.properties {
            return;
        }
        let old = self.properties;
        self.properties = properties;
        self.push(CallEvent::PropertiesChanged { old, new: properties });

        let was_external = old.contains(Properties::IS_EXTERNAL_CALL);
        let is_external = properties.contains(Properties::IS_EXTERNAL_CALL);
        if was_external != is_external {
            debug!("Call {} external flag now {}", self.id, is_external);
            self.push(CallEvent::ExternalCallChanged { is_external });
        }
    }

    pub fn set_video_state(&mut self, video_state: VideoState) {
        let video_state = if self.account_supports_video {
            video_state
        } else {
            VideoState::AUDIO_ONLY
        };
        if matches!(self.state, CallState::Active | CallState::Disconnected) {
            self.video_state_history |= video_state;
        }
        let old = self.video_state;
        self.video_state = video_state;
        if old != video_state {
            self.push(CallEvent::VideoStateChanged { old, new: video_state });
        }
    }

    pub fn set_address(&mut self, address: Option<Address>) {
        if address != self.address {
            self.address = address.clone();
            self.push(CallEvent::HandleChanged { address });
        }
    }

    pub fn set_ringback_requested(&mut self, requested: bool) {
        self.ringback_requested = requested;
        self.push(CallEvent::RingbackRequested { requested });
    }

    pub fn set_voip_audio_mode(&mut self, is_voip: bool) {
        self.is_voip_audio_mode = is_voip;
        self.push(CallEvent::VoipAudioModeChanged { is_voip });
    }

    pub fn on_post_dial_wait(&mut self, remaining: String) {
        self.push(CallEvent::PostDialWait { remaining });
    }

    pub fn on_connection_event(&mut self, name: impl Into<String>) {
        self.push(CallEvent::ConnectionEvent { name: name.into() });
    }

    // Extras

    pub fn put_extras(&mut self, source: ExtrasSource, extras: Extras) -> Option<ProviderCommand> {
        if extras.is_empty() {
            return None;
        }
        self.extras.extend(extras.clone());
        self.push(CallEvent::ExtrasChanged { source });
        match source {
            ExtrasSource::InCall => self.provider_command(ProviderCommand::PutExtras {
                call_id: self.id.clone(),
                extras,
            }),
            ExtrasSource::Provider => None,
        }
    }

    pub fn remove_extras(&mut self, source: ExtrasSource, keys: Vec<String>) -> Option<ProviderCommand> {
        if keys.is_empty() {
            return None;
        }
        for key in &keys {
            self.extras.remove(key);
        }
        self.push(CallEvent::ExtrasRemoved {
            source,
            keys: keys.clone(),
        });
        match source {
            ExtrasSource::InCall => self.provider_command(ProviderCommand::RemoveExtras {
                call_id: self.id.clone(),
                keys,
            }),
            ExtrasSource::Provider => None,
        }
    }

    // Conference links; kept consistent by CallTable

    pub(crate) fn set_parent_link(&mut self, parent: Option<CallId>) {
        let old = std::mem::replace(&mut self.parent, parent.clone());
        self.push(CallEvent::ParentChanged { old, new: parent });
    }

    pub(crate) fn add_child_link(&mut self, child: CallId) {
        if !self.children.contains(&child) {
            self.conference_level_active_child = Some(child.clone());
            self.children.push(child);
            self.push(CallEvent::ChildrenChanged);
        }
    }

    pub(crate) fn remove_child_link(&mut self, child: &CallId) {
        let before = self.children.len();
        self.children.retain(|c| c != child);
        if self.children.len() != before {
            self.push(CallEvent::ChildrenChanged);
        }
    }

    // User actions

    pub fn answer(&mut self, video_state: VideoState) -> Option<ProviderCommand> {
        if self.state != CallState::Ringing {
            debug!("Ignoring answer for call {} in state {}", self.id, self.state);
            return None;
        }
        self.provider_command(ProviderCommand::Answer {
            call_id: self.id.clone(),
            video_state,
        })
    }

    pub fn reject(&mut self, with_message: bool, text: Option<String>) -> Option<ProviderCommand> {
        if self.state != CallState::Ringing {
            debug!("Ignoring reject for call {} in state {}", self.id, self.state);
            return None;
        }
        self.video_state_history |= self.video_state;
        self.provider_command(ProviderCommand::Reject {
            call_id: self.id.clone(),
            with_message,
            text,
        })
    }

    pub fn hold(&mut self) -> Option<ProviderCommand> {
        if self.state != CallState::Active {
            return None;
        }
        self.provider_command(ProviderCommand::Hold {
            call_id: self.id.clone(),
        })
    }

    pub fn unhold(&mut self) -> Option<ProviderCommand> {
        if self.state != CallState::OnHold {
            return None;
        }
        self.provider_command(ProviderCommand::Unhold {
            call_id: self.id.clone(),
        })
    }

    pub fn disconnect(&mut self, via_interceptor: bool) -> DisconnectOutcome {
        self.locally_disconnecting = true;
        if self.state.is_pre_connection() {
            return DisconnectOutcome::Abort(self.abort(via_interceptor));
        }
        if self.state.is_terminal() {
            return DisconnectOutcome::Nothing;
        }
        match self.provider_command(ProviderCommand::Disconnect {
            call_id: self.id.clone(),
        }) {
            Some(command) => DisconnectOutcome::Send(command),
            None => DisconnectOutcome::Nothing,
        }
    }

    pub fn abort(&mut self, via_interceptor: bool) -> AbortOutcome {
        if let Some(attempts) = self.attempts.as_mut() {
            if attempts.is_in_flight() {
                attempts.abort();
                let command = attempts.current().is_some().then(|| ProviderCommand::Abort {
                    call_id: self.id.clone(),
                });
                return AbortOutcome::CancelAttempt(command);
            }
        }
        if self.state.is_pre_connection() {
            if via_interceptor && self.locally_disconnecting {
                return AbortOutcome::OfferCancellation;
            }
            return AbortOutcome::FailCanceled;
        }
        debug!("Cannot abort call {} in state {}", self.id, self.state);
        AbortOutcome::NotAbortable
    }

    pub fn swap_conference(&mut self) -> TelecomResult<ProviderCommand> {
        if !self.can(Capabilities::SWAP_CONFERENCE) {
            return Err(self.missing("SWAP_CONFERENCE"));
        }
        let command = self.require_provider(ProviderCommand::SwapConference {
            call_id: self.id.clone(),
        })?;
        self.conference_level_active_child = match self.children.as_slice() {
            [first, second] => {
                if self.conference_level_active_child.as_ref() == Some(first) {
                    Some(second.clone())
                } else {
                    Some(first.clone())
                }
            }
            _ => None,
        };
        Ok(command)
    }

    pub fn merge_conference(&mut self) -> TelecomResult<ProviderCommand> {
        if !self.can(Capabilities::MERGE_CONFERENCE) {
            return Err(self.missing("MERGE_CONFERENCE"));
        }
        let command = self.require_provider(ProviderCommand::MergeConference {
            call_id: self.id.clone(),
        })?;
        self.was_conference_previously_merged = true;
        Ok(command)
    }

    pub fn pull_external_call(&mut self) -> TelecomResult<ProviderCommand> {
        if !self.is_external() {
            return Err(TelecomError::invalid_state(format!(
                "call {} is not an external call",
                self.id
            )));
        }
        if !self.can(Capabilities::CAN_PULL_CALL) {
            return Err(self.missing("CAN_PULL_CALL"));
        }
        self.require_provider(ProviderCommand::PullExternalCall {
            call_id: self.id.clone(),
        })
    }

    pub fn play_dtmf_tone(&self, digit: char) -> Option<ProviderCommand> {
        self.provider_command(ProviderCommand::PlayDtmfTone {
            call_id: self.id.clone(),
            digit,
        })
    }

    pub fn stop_dtmf_tone(&self) -> Option<ProviderCommand> {
        self.provider_command(ProviderCommand::StopDtmfTone {
            call_id: self.id.clone(),
        })
    }

    pub fn post_dial_continue(&self, proceed: bool) -> Option<ProviderCommand> {
        self.provider_command(ProviderCommand::PostDialContinue {
            call_id: self.id.clone(),
            proceed,
        })
    }

    pub fn snapshot(&self) -> CallSnapshot {
        CallSnapshot {
            call_id: self.id.clone(),
            state: self.state,
            direction: self.direction,
            address: self.address.clone(),
            account: self.target_account.clone(),
            provider: self.provider.clone(),
            capabilities: self.capabilities,
            properties: self.properties,
            video_state: self.video_state,
            video_state_history: self.video_state_history,
            disconnect_cause: self.disconnect_cause.clone(),
            is_conference: self.is_conference,
            is_emergency: self.is_emergency,
            parent: self.parent.clone(),
            children: self.children.clone(),
            conference_level_active_child: self.conference_level_active_child.clone(),
            created_at: self.created_at,
            connected_at: self.connected_at,
            disconnected_at: self.disconnected_at,
        }
    }

    fn provider_command(&self, command: ProviderCommand) -> Option<ProviderCommand> {
        if self.provider.is_none() {
            warn!("Call {} has no provider, dropping {}", self.id, command.name());
            return None;
        }
        Some(command)
    }

    fn require_provider(&self, command: ProviderCommand) -> TelecomResult<ProviderCommand> {
        if self.provider.is_none() {
            return Err(TelecomError::invalid_state(format!(
                "call {} has no provider for {}",
                self.id,
                command.name()
            )));
        }
        Ok(command)
    }

    fn missing(&self, capability: &'static str) -> TelecomError {
        TelecomError::CapabilityMissing {
            call_id: self.id.clone(),
            capability,
        }
    }
}
