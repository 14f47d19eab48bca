//! Route states and the audio snapshot published to the rest of the system

use serde::{Deserialize, Serialize};

use super::route::{AudioRoute, RouteMask};

/// One of the eight route states
///
/// Active states hold audio focus and drive the hardware. Quiescent states
/// only remember which route to use once focus is regained.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum RouteState {
    ActiveEarpiece,
    ActiveBluetooth,
    ActiveHeadset,
    ActiveSpeaker,
    QuiescentEarpiece,
    QuiescentBluetooth,
    QuiescentHeadset,
    QuiescentSpeaker,
}

impl RouteState {
    pub const ALL: [RouteState; 8] = [
        RouteState::ActiveEarpiece,
        RouteState::ActiveBluetooth,
        RouteState::ActiveHeadset,
        RouteState::ActiveSpeaker,
        RouteState::QuiescentEarpiece,
        RouteState::QuiescentBluetooth,
        RouteState::QuiescentHeadset,
        RouteState::QuiescentSpeaker,
    ];

    pub fn active(route: AudioRoute) -> Self {
        match route {
            AudioRoute::Earpiece => RouteState::ActiveEarpiece,
            AudioRoute::Bluetooth => RouteState::ActiveBluetooth,
            AudioRoute::WiredHeadset => RouteState::ActiveHeadset,
            AudioRoute::Speaker => RouteState::ActiveSpeaker,
        }
    }

    pub fn quiescent(route: AudioRoute) -> Self {
        match route {
            AudioRoute::Earpiece => RouteState::QuiescentEarpiece,
            AudioRoute::Bluetooth => RouteState::QuiescentBluetooth,
            AudioRoute::WiredHeadset => RouteState::QuiescentHeadset,
            AudioRoute::Speaker => RouteState::QuiescentSpeaker,
        }
    }

    pub fn route(&self) -> AudioRoute {
        match self {
            RouteState::ActiveEarpiece | RouteState::QuiescentEarpiece => AudioRoute::Earpiece,
            RouteState::ActiveBluetooth | RouteState::QuiescentBluetooth => AudioRoute::Bluetooth,
            RouteState::ActiveHeadset | RouteState::QuiescentHeadset => AudioRoute::WiredHeadset,
            RouteState::ActiveSpeaker | RouteState::QuiescentSpeaker => AudioRoute::Speaker,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self,
            RouteState::ActiveEarpiece
                | RouteState::ActiveBluetooth
                | RouteState::ActiveHeadset
                | RouteState::ActiveSpeaker
        )
    }
}

impl std::fmt::Display for RouteState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Audio state as seen by providers and subscribers
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct AudioStateSnapshot {
    pub muted: bool,
    pub route: AudioRoute,
    pub supported: RouteMask,
}

impl AudioStateSnapshot {
    pub fn new(muted: bool, route: AudioRoute, supported: RouteMask) -> Self {
        Self {
            muted,
            route,
            supported,
        }
    }
}

impl std::fmt::Display for AudioStateSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[muted={} route={} supported={:?}]",
            self.muted,
            self.route,
            self.supported.routes()
        )
    }
}

/// A snapshot that was dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioStateChange {
    pub old: AudioStateSnapshot,
    pub new: AudioStateSnapshot,
}
