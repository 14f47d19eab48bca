//! Capability, property and video-state bitmasks

macro_rules! bitmask {
    (
        $(#[$meta:meta])*
        $name:ident { $( $(#[$fmeta:meta])* $flag:ident = $bit:expr, )* }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, Hash, Eq, PartialEq, ::serde::Serialize, ::serde::Deserialize)]
        pub struct $name(pub u32);

        impl $name {
            $( $(#[$fmeta])* pub const $flag: $name = $name($bit); )*

            pub const fn empty() -> Self {
                Self(0)
            }

            pub const fn bits(&self) -> u32 {
                self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0 == 0
            }

            /// All bits of `other` are set
            pub fn contains(&self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            /// Any bit of `other` is set
            pub fn intersects(&self, other: Self) -> bool {
                self.0 & other.0 != 0
            }

            pub fn insert(&mut self, other: Self) {
                self.0 |= other.0;
            }

            pub fn remove(&mut self, other: Self) {
                self.0 &= !other.0;
            }

            pub fn without(self, other: Self) -> Self {
                Self(self.0 & !other.0)
            }
        }

        impl std::ops::BitOr for $name {
            type Output = Self;
            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }

        impl std::ops::BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: Self) {
                self.0 |= rhs.0;
            }
        }
    };
}

pub(crate) use bitmask;

bitmask! {
    /// What a provider allows the user to do with a call
    Capabilities {
        /// Call can be put on hold right now
        HOLD = 1 << 0,
        /// Call supports hold in general
        SUPPORT_HOLD = 1 << 1,
        /// Conference children can be merged
        MERGE_CONFERENCE = 1 << 2,
        /// Conference children can be swapped
        SWAP_CONFERENCE = 1 << 3,
        RESPOND_VIA_TEXT = 1 << 5,
        MUTE = 1 << 6,
        MANAGE_CONFERENCE = 1 << 7,
        SUPPORTS_VT_LOCAL_RX = 1 << 8,
        SUPPORTS_VT_LOCAL_TX = 1 << 9,
        SUPPORTS_VT_REMOTE_RX = 1 << 10,
        SUPPORTS_VT_REMOTE_TX = 1 << 11,
        SEPARATE_FROM_CONFERENCE = 1 << 12,
        DISCONNECT_FROM_CONFERENCE = 1 << 13,
        /// External call can be pulled to this device
        CAN_PULL_CALL = 1 << 23,
    }
}

impl Capabilities {
    /// Every video-related capability bit
    pub const VIDEO: Capabilities = Capabilities(
        Self::SUPPORTS_VT_LOCAL_RX.0
            | Self::SUPPORTS_VT_LOCAL_TX.0
            | Self::SUPPORTS_VT_REMOTE_RX.0
            | Self::SUPPORTS_VT_REMOTE_TX.0,
    );
}

bitmask! {
    /// Facts about a call that are not user actions
    Properties {
        CONFERENCE = 1 << 0,
        GENERIC_CONFERENCE = 1 << 1,
        EMERGENCY_CALLBACK_MODE = 1 << 2,
        WIFI = 1 << 3,
        HIGH_DEF_AUDIO = 1 << 4,
        /// Call lives on another device and is only mirrored here
        IS_EXTERNAL_CALL = 1 << 5,
    }
}

bitmask! {
    /// Video direction bits of a call
    VideoState {
        TX_ENABLED = 1 << 0,
        RX_ENABLED = 1 << 1,
        PAUSED = 1 << 2,
    }
}

impl VideoState {
    pub const AUDIO_ONLY: VideoState = VideoState(0);
    pub const BIDIRECTIONAL: VideoState = VideoState(Self::TX_ENABLED.0 | Self::RX_ENABLED.0);

    /// Transmitting or receiving video
    pub fn is_video(&self) -> bool {
        self.intersects(Self::BIDIRECTIONAL)
    }
}
