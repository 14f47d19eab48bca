//! Per-call state and the table that holds every call

pub mod attempts;
pub mod flags;
pub mod record;
pub mod state;
pub mod table;

pub use attempts::ConnectionAttempts;
pub use flags::{Capabilities, Properties, VideoState};
pub use record::{
    AbortOutcome, CallEvent, CallRecord, CallSnapshot, DisconnectOutcome, ExtrasSource, StateChange,
};
pub use state::{
    CallDirection, CallState, DisconnectCause, DisconnectCode, LIVE_CALL_STATES, OUTGOING_CALL_STATES,
};
pub use table::CallTable;
