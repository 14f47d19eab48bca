//! Audio routes and the set of routes currently available

use serde::{Deserialize, Serialize};

use crate::call::flags::bitmask;

/// Where call audio is rendered
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum AudioRoute {
    Earpiece,
    Bluetooth,
    WiredHeadset,
    Speaker,
}

impl AudioRoute {
    pub const ALL: [AudioRoute; 4] = [
        AudioRoute::Earpiece,
        AudioRoute::Bluetooth,
        AudioRoute::WiredHeadset,
        AudioRoute::Speaker,
    ];

    pub fn mask(&self) -> RouteMask {
        match self {
            AudioRoute::Earpiece => RouteMask::EARPIECE,
            AudioRoute::Bluetooth => RouteMask::BLUETOOTH,
            AudioRoute::WiredHeadset => RouteMask::WIRED_HEADSET,
            AudioRoute::Speaker => RouteMask::SPEAKER,
        }
    }
}

impl std::fmt::Display for AudioRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AudioRoute::Earpiece => "EARPIECE",
            AudioRoute::Bluetooth => "BLUETOOTH",
            AudioRoute::WiredHeadset => "WIRED_HEADSET",
            AudioRoute::Speaker => "SPEAKER",
        };
        f.write_str(s)
    }
}

bitmask! {
    /// Routes that can currently be selected
    RouteMask {
        EARPIECE = 1 << 0,
        BLUETOOTH = 1 << 1,
        WIRED_HEADSET = 1 << 2,
        SPEAKER = 1 << 3,
    }
}

impl RouteMask {
    pub fn has(&self, route: AudioRoute) -> bool {
        self.contains(route.mask())
    }

    pub fn routes(&self) -> Vec<AudioRoute> {
        AudioRoute::ALL.into_iter().filter(|r| self.has(*r)).collect()
    }
}
