//! Call states, directions and disconnect causes

use serde::{Deserialize, Serialize};

/// Lifecycle state of a call
///
/// Providers are allowed to move a call between any two states; the record
/// never rejects a transition.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum CallState {
    /// Created, not yet handed to a provider
    New,
    /// Outgoing call waiting for a provider to accept it
    Connecting,
    /// Outgoing call waiting for the user to pick an account
    SelectAccount,
    /// Outgoing call is dialing the remote party
    Dialing,
    /// Incoming call is alerting
    Ringing,
    /// Call is connected and holds the line
    Active,
    /// Call is connected but held
    OnHold,
    /// Disconnect requested, waiting for provider confirmation
    Disconnecting,
    /// Call has ended
    Disconnected,
    /// Call was aborted before a provider ever accepted it
    Aborted,
}

/// States that occupy the single live slot
pub const LIVE_CALL_STATES: &[CallState] = &[
    CallState::Connecting,
    CallState::SelectAccount,
    CallState::Dialing,
    CallState::Active,
];

/// States of an outgoing call that is still being set up
pub const OUTGOING_CALL_STATES: &[CallState] = &[
    CallState::Connecting,
    CallState::SelectAccount,
    CallState::Dialing,
];

impl CallState {
    /// Counted against the live-call limit
    pub fn is_live(&self) -> bool {
        LIVE_CALL_STATES.contains(self)
    }

    /// Counted against the outgoing-call limit
    pub fn is_outgoing_setup(&self) -> bool {
        OUTGOING_CALL_STATES.contains(self)
    }

    /// Anything past NEW/RINGING that has not yet ended
    pub fn is_alive(&self) -> bool {
        !matches!(
            self,
            CallState::New | CallState::Ringing | CallState::Disconnected | CallState::Aborted
        )
    }

    /// Not yet handed off to or accepted by a provider
    pub fn is_pre_connection(&self) -> bool {
        matches!(
            self,
            CallState::New | CallState::SelectAccount | CallState::Connecting
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Disconnected | CallState::Aborted)
    }
}

impl std::fmt::Display for CallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CallState::New => "NEW",
            CallState::Connecting => "CONNECTING",
            CallState::SelectAccount => "SELECT_ACCOUNT",
            CallState::Dialing => "DIALING",
            CallState::Ringing => "RINGING",
            CallState::Active => "ACTIVE",
            CallState::OnHold => "ON_HOLD",
            CallState::Disconnecting => "DISCONNECTING",
            CallState::Disconnected => "DISCONNECTED",
            CallState::Aborted => "ABORTED",
        };
        f.write_str(s)
    }
}

/// Who originated the call
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum CallDirection {
    /// Conference records created by a provider
    Undefined,
    Outgoing,
    Incoming,
    /// Existing provider call attached after the fact
    Unknown,
}

/// Category of a disconnect
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum DisconnectCode {
    Unknown,
    /// Provider or establishment failure; eligible for failover
    Error,
    /// Disconnected by the local user
    Local,
    /// Disconnected by the remote party
    Remote,
    /// Cancelled before connecting
    Canceled,
    /// Incoming call was never answered
    Missed,
    /// Incoming call was rejected by the user
    Rejected,
    Busy,
    Restricted,
    Other,
    ConnectionManagerNotSupported,
    AnsweredElsewhere,
    CallPulled,
}

/// Why a call ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectCause {
    pub code: DisconnectCode,
    pub reason: Option<String>,
}

impl DisconnectCause {
    pub fn new(code: DisconnectCode) -> Self {
        Self { code, reason: None }
    }

    pub fn with_reason(code: DisconnectCode, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: Some(reason.into()),
        }
    }
}

impl Default for DisconnectCause {
    fn default() -> Self {
        Self::new(DisconnectCode::Unknown)
    }
}

impl std::fmt::Display for DisconnectCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.reason {
            Some(reason) => write!(f, "{:?} ({})", self.code, reason),
            None => write!(f, "{:?}", self.code),
        }
    }
}
