//! Messages understood by the route engine

use serde::{Deserialize, Serialize};

/// Whether any call currently needs audio
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum Focus {
    HasFocus,
    NoFocus,
}

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum RouteMessage {
    // Connectivity changes
    ConnectWiredHeadset,
    DisconnectWiredHeadset,
    ConnectBluetooth,
    DisconnectBluetooth,
    ConnectDock,
    DisconnectDock,

    // Automatic switches
    SwitchEarpiece,
    SwitchBluetooth,
    SwitchHeadset,
    SwitchSpeaker,
    SwitchBaselineRoute,

    // Switches requested by the user
    UserSwitchEarpiece,
    UserSwitchBluetooth,
    UserSwitchHeadset,
    UserSwitchSpeaker,
    UserSwitchBaselineRoute,

    /// Bluetooth stack reports audio link went away
    BtAudioDisconnected,

    /// Resend the last dispatched snapshot
    UpdateSystemAudioRoute,

    MuteOn,
    MuteOff,
    ToggleMute,

    SwitchFocus(Focus),
}

impl RouteMessage {
    pub fn is_user_switch(&self) -> bool {
        matches!(
            self,
            RouteMessage::UserSwitchEarpiece
                | RouteMessage::UserSwitchBluetooth
                | RouteMessage::UserSwitchHeadset
                | RouteMessage::UserSwitchSpeaker
                | RouteMessage::UserSwitchBaselineRoute
        )
    }
}

/// Accessory connectivity reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HardwareEvent {
    WiredHeadset { plugged: bool },
    Bluetooth { connected: bool },
    Dock { connected: bool },
    BluetoothAudioDisconnected,
}

impl From<HardwareEvent> for RouteMessage {
    fn from(event: HardwareEvent) -> Self {
        match event {
            HardwareEvent::WiredHeadset { plugged: true } => RouteMessage::ConnectWiredHeadset,
            HardwareEvent::WiredHeadset { plugged: false } => RouteMessage::DisconnectWiredHeadset,
            HardwareEvent::Bluetooth { connected: true } => RouteMessage::ConnectBluetooth,
            HardwareEvent::Bluetooth { connected: false } => RouteMessage::DisconnectBluetooth,
            HardwareEvent::Dock { connected: true } => RouteMessage::ConnectDock,
            HardwareEvent::Dock { connected: false } => RouteMessage::DisconnectDock,
            HardwareEvent::BluetoothAudioDisconnected => RouteMessage::BtAudioDisconnected,
        }
    }
}
