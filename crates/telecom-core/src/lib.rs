//! # rvoip-telecom-core
//!
//! Call lifecycle core for the rvoip stack. It tracks every call a device is
//! involved in, decides which of them may be live at once, and routes call
//! audio.
//!
//! The crate has three parts:
//!
//! - [`call`]: one [`CallRecord`] per call, a flat state machine with
//!   capability and property bitmasks, conference links and the
//!   connection-attempt list used for failover.
//! - [`registry`]: the [`CallRegistry`], which owns every record. It
//!   handles admission control, foreground selection, call reuse and
//!   filter verdicts. It also runs post-dial DTMF and turns every change
//!   into a [`TelecomEvent`].
//! - [`audio`]: the [`AudioRouteEngine`], a table-driven state machine over
//!   eight route states (earpiece, headset, bluetooth, speaker, each active
//!   or quiescent).
//!
//! [`service::TelecomService`] runs all three on one tokio task. Providers
//! (the backends that own call signaling) are reached through a
//! [`ProviderGateway`] and report back with [`ProviderEvent`]s.
//!
//! ## Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use rvoip_telecom_core::prelude::*;
//!
//! let hardware = Arc::new(SimulatedAudioHardware::new());
//! let mut registry = CallRegistry::new(TelecomConfig::default(), hardware);
//! let sim = AccountHandle::new("telephony", "sim1");
//! registry.register_account(PhoneAccount::new(sim.clone()));
//!
//! let call = registry
//!     .start_outgoing_call(Address::tel("5550100"), Some(sim), VideoState::AUDIO_ONLY)
//!     .unwrap();
//! assert_eq!(registry.outgoing_call(), Some(call));
//! assert!(!registry.can_add_call());
//! ```

pub mod accounts;
pub mod audio;
pub mod call;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod provider;
pub mod registry;
pub mod service;
pub mod timer;
pub mod types;

pub use accounts::{AccountDirectory, PhoneAccount};
pub use audio::{AudioHardware, AudioRoute, AudioRouteEngine, AudioStateSnapshot, HardwareEvent, RouteState};
pub use call::{
    CallDirection, CallRecord, CallSnapshot, CallState, Capabilities, DisconnectCause, DisconnectCode,
    Properties, VideoState,
};
pub use config::TelecomConfig;
pub use error::{TelecomError, TelecomResult};
pub use events::{EventEmitter, EventFilter, EventSubscription, TelecomEvent, TelecomEventHandler};
pub use provider::{
    CallDisposition, CallFilter, ConnectionInfo, FilterVerdict, ProviderCommand, ProviderEvent,
    ProviderGateway, ToneCommand, TonePlayer,
};
pub use registry::{CallRegistry, Effect, MediaButton};
pub use service::{TelecomHandle, TelecomService, TelecomServiceBuilder};
pub use types::{AccountHandle, Address, CallId, ProviderId};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export of common types
pub mod prelude {
    pub use crate::{
        AccountHandle, Address, AudioRoute, CallFilter, CallId, CallRegistry, CallSnapshot, CallState,
        Capabilities, DisconnectCause, DisconnectCode, EventSubscription, FilterVerdict, MediaButton,
        PhoneAccount, ProviderCommand, ProviderEvent, ProviderGateway, ProviderId, TelecomConfig,
        TelecomError, TelecomEvent, TelecomEventHandler, TelecomHandle, TelecomResult,
        TelecomServiceBuilder, VideoState,
    };
    pub use crate::audio::SimulatedAudioHardware;
}
