//! Hardware toggles and status queries used by the route engine

use parking_lot::Mutex;

/// Platform audio controls
///
/// Status is read synchronously while a message is handled, so
/// implementations should answer from cached state.
pub trait AudioHardware: Send + Sync {
    fn set_speakerphone_on(&self, on: bool);
    fn set_bluetooth_audio_on(&self, on: bool);
    fn set_microphone_mute(&self, muted: bool);

    fn is_speakerphone_on(&self) -> bool;
    fn is_microphone_mute(&self) -> bool;
    fn is_wired_headset_plugged(&self) -> bool;
    fn is_bluetooth_available(&self) -> bool;
    fn is_bluetooth_audio_connected_or_pending(&self) -> bool;
}

/// Hardware call recorded by [`SimulatedAudioHardware`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareCall {
    Speakerphone(bool),
    BluetoothAudio(bool),
    MicrophoneMute(bool),
}

#[derive(Debug, Default)]
struct SimulatedState {
    speakerphone_on: bool,
    microphone_mute: bool,
    headset_plugged: bool,
    bluetooth_available: bool,
    bluetooth_audio_on: bool,
    calls: Vec<HardwareCall>,
}

/// In-memory hardware that applies toggles to itself and records them
///
/// Used when no platform backend is wired in, and by tests.
#[derive(Debug, Default)]
pub struct SimulatedAudioHardware {
    state: Mutex<SimulatedState>,
}

impl SimulatedAudioHardware {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_headset_plugged(&self, plugged: bool) {
        self.state.lock().headset_plugged = plugged;
    }

    pub fn set_bluetooth_available(&self, available: bool) {
        let mut state = self.state.lock();
        state.bluetooth_available = available;
        if !available {
            state.bluetooth_audio_on = false;
        }
    }

    /// Toggles applied so far, oldest first
    pub fn calls(&self) -> Vec<HardwareCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }
}

impl AudioHardware for SimulatedAudioHardware {
    fn set_speakerphone_on(&self, on: bool) {
        let mut state = self.state.lock();
        state.speakerphone_on = on;
        state.calls.push(HardwareCall::Speakerphone(on));
    }

    fn set_bluetooth_audio_on(&self, on: bool) {
        let mut state = self.state.lock();
        state.bluetooth_audio_on = on;
        state.calls.push(HardwareCall::BluetoothAudio(on));
    }

    fn set_microphone_mute(&self, muted: bool) {
        let mut state = self.state.lock();
        state.microphone_mute = muted;
        state.calls.push(HardwareCall::MicrophoneMute(muted));
    }

    fn is_speakerphone_on(&self) -> bool {
        self.state.lock().speakerphone_on
    }

    fn is_microphone_mute(&self) -> bool {
        self.state.lock().microphone_mute
    }

    fn is_wired_headset_plugged(&self) -> bool {
        self.state.lock().headset_plugged
    }

    fn is_bluetooth_available(&self) -> bool {
        self.state.lock().bluetooth_available
    }

    fn is_bluetooth_audio_connected_or_pending(&self) -> bool {
        self.state.lock().bluetooth_audio_on
    }
}
