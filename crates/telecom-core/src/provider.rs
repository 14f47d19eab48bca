//! Provider-facing contract
//!
//! A provider is the backend that owns a call's signaling. The core talks to
//! providers through [`ProviderGateway`] by sending [`ProviderCommand`]s, and
//! providers report back with [`ProviderEvent`]s queued on the service.
//!
//! Both directions are fire-and-forget: a command never returns a result to
//! the registry, any outcome arrives later as a new event.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::audio::AudioStateSnapshot;
use crate::call::{CallSnapshot, CallState, Capabilities, DisconnectCause, Properties, VideoState};
use crate::error::TelecomResult;
use crate::types::{AccountHandle, Address, CallId, ProviderId};

/// Free-form per-call key/value data exchanged with providers
pub type Extras = HashMap<String, serde_json::Value>;

/// Request sent from the core to a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProviderCommand {
    /// Establish a connection for a call through an account
    CreateConnection {
        call_id: CallId,
        account: AccountHandle,
        address: Option<Address>,
        video_state: VideoState,
        is_incoming: bool,
        is_unknown: bool,
        is_emergency: bool,
    },
    /// Cancel an in-flight connection attempt
    Abort { call_id: CallId },
    Answer { call_id: CallId, video_state: VideoState },
    Reject {
        call_id: CallId,
        with_message: bool,
        text: Option<String>,
    },
    Disconnect { call_id: CallId },
    Hold { call_id: CallId },
    Unhold { call_id: CallId },
    /// Join two calls into a conference
    Conference { call_id: CallId, other: CallId },
    SplitFromConference { call_id: CallId },
    MergeConference { call_id: CallId },
    SwapConference { call_id: CallId },
    PlayDtmfTone { call_id: CallId, digit: char },
    StopDtmfTone { call_id: CallId },
    PostDialContinue { call_id: CallId, proceed: bool },
    PullExternalCall { call_id: CallId },
    PutExtras { call_id: CallId, extras: Extras },
    RemoveExtras { call_id: CallId, keys: Vec<String> },
    /// Audio route or mute changed while the call was in the foreground
    AudioStateChanged {
        call_id: CallId,
        state: AudioStateSnapshot,
    },
}

impl ProviderCommand {
    pub fn call_id(&self) -> &CallId {
        match self {
            ProviderCommand::CreateConnection { call_id, .. }
            | ProviderCommand::Abort { call_id }
            | ProviderCommand::Answer { call_id, .. }
            | ProviderCommand::Reject { call_id, .. }
            | ProviderCommand::Disconnect { call_id }
            | ProviderCommand::Hold { call_id }
            | ProviderCommand::Unhold { call_id }
            | ProviderCommand::Conference { call_id, .. }
            | ProviderCommand::SplitFromConference { call_id }
            | ProviderCommand::MergeConference { call_id }
            | ProviderCommand::SwapConference { call_id }
            | ProviderCommand::PlayDtmfTone { call_id, .. }
            | ProviderCommand::StopDtmfTone { call_id }
            | ProviderCommand::PostDialContinue { call_id, .. }
            | ProviderCommand::PullExternalCall { call_id }
            | ProviderCommand::PutExtras { call_id, .. }
            | ProviderCommand::RemoveExtras { call_id, .. }
            | ProviderCommand::AudioStateChanged { call_id, .. } => call_id,
        }
    }

    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            ProviderCommand::CreateConnection { .. } => "create_connection",
            ProviderCommand::Abort { .. } => "abort",
            ProviderCommand::Answer { .. } => "answer",
            ProviderCommand::Reject { .. } => "reject",
            ProviderCommand::Disconnect { .. } => "disconnect",
            ProviderCommand::Hold { .. } => "hold",
            ProviderCommand::Unhold { .. } => "unhold",
            ProviderCommand::Conference { .. } => "conference",
            ProviderCommand::SplitFromConference { .. } => "split_from_conference",
            ProviderCommand::MergeConference { .. } => "merge_conference",
            ProviderCommand::SwapConference { .. } => "swap_conference",
            ProviderCommand::PlayDtmfTone { .. } => "play_dtmf_tone",
            ProviderCommand::StopDtmfTone { .. } => "stop_dtmf_tone",
            ProviderCommand::PostDialContinue { .. } => "post_dial_continue",
            ProviderCommand::PullExternalCall { .. } => "pull_external_call",
            ProviderCommand::PutExtras { .. } => "put_extras",
            ProviderCommand::RemoveExtras { .. } => "remove_extras",
            ProviderCommand::AudioStateChanged { .. } => "audio_state_changed",
        }
    }
}

/// Attributes a provider reports when a connection is created
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// Initial state of the connection; `None` leaves the record's state alone
    pub state: Option<CallState>,
    pub capabilities: Capabilities,
    pub properties: Properties,
    pub video_state: VideoState,
    pub address: Option<Address>,
    pub extras: Extras,
    pub ringback_requested: bool,
    pub is_voip_audio_mode: bool,
    /// Conference the connection already belongs to
    pub parent: Option<CallId>,
}

/// Callback sent from a provider to the core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProviderEvent {
    ConnectionCreated { call_id: CallId, info: ConnectionInfo },
    ConnectionFailed { call_id: CallId, cause: DisconnectCause },
    SetActive { call_id: CallId },
    SetRinging { call_id: CallId },
    SetDialing { call_id: CallId },
    SetOnHold { call_id: CallId },
    SetDisconnected { call_id: CallId, cause: DisconnectCause },
    /// Provider has released the call
    Removed { call_id: CallId },
    SetCapabilities { call_id: CallId, capabilities: Capabilities },
    SetProperties { call_id: CallId, properties: Properties },
    SetVideoState { call_id: CallId, video_state: VideoState },
    PutExtras { call_id: CallId, extras: Extras },
    RemoveExtras { call_id: CallId, keys: Vec<String> },
    SetAddress { call_id: CallId, address: Option<Address> },
    SetRingbackRequested { call_id: CallId, requested: bool },
    SetVoipAudioMode { call_id: CallId, is_voip: bool },
    SetParent { call_id: CallId, parent: Option<CallId> },
    /// Provider created a conference that the core did not request
    ConferenceCreated {
        call_id: CallId,
        provider: ProviderId,
        account: Option<AccountHandle>,
        info: ConnectionInfo,
    },
    OnPostDialChar { call_id: CallId, c: char },
    OnPostDialWait { call_id: CallId, remaining: String },
    /// Remote side asked to change the video state of a call
    SessionModifyRequest { call_id: CallId, video_state: VideoState },
    /// Provider process went away
    ProviderDied { provider: ProviderId },
}

impl ProviderEvent {
    /// Call the event concerns, if it concerns a single call
    pub fn call_id(&self) -> Option<&CallId> {
        match self {
            ProviderEvent::ProviderDied { .. } => None,
            ProviderEvent::ConnectionCreated { call_id, .. }
            | ProviderEvent::ConnectionFailed { call_id, .. }
            | ProviderEvent::SetActive { call_id }
            | ProviderEvent::SetRinging { call_id }
            | ProviderEvent::SetDialing { call_id }
            | ProviderEvent::SetOnHold { call_id }
            | ProviderEvent::SetDisconnected { call_id, .. }
            | ProviderEvent::Removed { call_id }
            | ProviderEvent::SetCapabilities { call_id, .. }
            | ProviderEvent::SetProperties { call_id, .. }
            | ProviderEvent::SetVideoState { call_id, .. }
            | ProviderEvent::PutExtras { call_id, .. }
            | ProviderEvent::RemoveExtras { call_id, .. }
            | ProviderEvent::SetAddress { call_id, .. }
            | ProviderEvent::SetRingbackRequested { call_id, .. }
            | ProviderEvent::SetVoipAudioMode { call_id, .. }
            | ProviderEvent::SetParent { call_id, .. }
            | ProviderEvent::ConferenceCreated { call_id, .. }
            | ProviderEvent::OnPostDialChar { call_id, .. }
            | ProviderEvent::OnPostDialWait { call_id, .. }
            | ProviderEvent::SessionModifyRequest { call_id, .. } => Some(call_id),
        }
    }
}

/// Transport to the provider processes
///
/// Implementations route a command to whichever provider owns the call. The
/// service never waits on a reply; errors are logged and dropped.
#[async_trait]
pub trait ProviderGateway: Send + Sync {
    async fn send(&self, provider: &ProviderId, command: ProviderCommand) -> TelecomResult<()>;
}

/// Local DTMF playback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToneCommand {
    Play(char),
    Stop,
}

#[async_trait]
pub trait TonePlayer: Send + Sync {
    async fn apply(&self, call_id: &CallId, command: ToneCommand);
}

/// Outcome of the incoming-call filtering pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterVerdict {
    pub allow: bool,
    pub reject: bool,
    pub add_to_log: bool,
    pub show_notification: bool,
}

impl FilterVerdict {
    pub fn allow() -> Self {
        Self {
            allow: true,
            reject: false,
            add_to_log: true,
            show_notification: true,
        }
    }

    /// Block the call, tell the provider to reject it and log it silently
    pub fn block() -> Self {
        Self {
            allow: false,
            reject: true,
            add_to_log: true,
            show_notification: false,
        }
    }
}

/// Screens new incoming calls before they are shown
///
/// The service runs the filter off the registry task and feeds the verdict
/// back with [`crate::service::TelecomHandle::filter_verdict`]. Without a
/// filter every call is allowed.
#[async_trait]
pub trait CallFilter: Send + Sync {
    async fn filter(&self, call: &CallSnapshot) -> FilterVerdict;
}

/// How a call ended up in the call log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallDisposition {
    Incoming,
    Outgoing,
    Missed,
    Rejected,
    Blocked,
}
