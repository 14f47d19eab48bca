//! Route engine behaviour across accessories and user switches

use std::sync::Arc;

use rvoip_telecom_core::audio::{
    AudioRoute, AudioRouteEngine, Focus, HardwareCall, RouteMessage, RouteState, SimulatedAudioHardware,
    DEFAULT_ROUTE_TABLE,
};

fn active_engine(earpiece: bool) -> (AudioRouteEngine, Arc<SimulatedAudioHardware>) {
    let hw = Arc::new(SimulatedAudioHardware::new());
    let mut engine = AudioRouteEngine::new(hw.clone(), earpiece);
    engine.send(RouteMessage::SwitchFocus(Focus::HasFocus));
    engine.process_pending();
    (engine, hw)
}

fn run(engine: &mut AudioRouteEngine, messages: &[RouteMessage]) -> usize {
    for message in messages {
        engine.send(*message);
    }
    engine.process_pending().len()
}

#[test]
fn test_every_state_handles_connectivity() {
    let connectivity = [
        RouteMessage::ConnectWiredHeadset,
        RouteMessage::DisconnectWiredHeadset,
        RouteMessage::ConnectBluetooth,
        RouteMessage::DisconnectBluetooth,
        RouteMessage::ConnectDock,
        RouteMessage::DisconnectDock,
        RouteMessage::BtAudioDisconnected,
        RouteMessage::SwitchBaselineRoute,
        RouteMessage::SwitchFocus(Focus::HasFocus),
        RouteMessage::SwitchFocus(Focus::NoFocus),
    ];
    for state in RouteState::ALL {
        for message in connectivity {
            assert!(
                DEFAULT_ROUTE_TABLE.has_transition(state, message),
                "{} has no entry for {:?}",
                state,
                message
            );
        }
    }
}

#[test]
fn test_headset_round_trip_returns_to_earpiece() {
    let (mut engine, _hw) = active_engine(true);
    assert_eq!(engine.state(), RouteState::ActiveEarpiece);

    assert_eq!(run(&mut engine, &[RouteMessage::ConnectWiredHeadset]), 1);
    assert_eq!(engine.state(), RouteState::ActiveHeadset);
    assert!(!engine.available_routes().has(AudioRoute::Earpiece));

    assert_eq!(run(&mut engine, &[RouteMessage::DisconnectWiredHeadset]), 1);
    assert_eq!(engine.state(), RouteState::ActiveEarpiece);
    assert_eq!(engine.last_dispatched().route, AudioRoute::Earpiece);
}

#[test]
fn test_unplugging_headset_restores_speaker() {
    let (mut engine, hw) = active_engine(true);
    run(&mut engine, &[RouteMessage::UserSwitchSpeaker]);
    assert_eq!(engine.state(), RouteState::ActiveSpeaker);
    assert_eq!(hw.calls(), vec![HardwareCall::Speakerphone(true)]);

    run(&mut engine, &[RouteMessage::ConnectWiredHeadset]);
    assert_eq!(engine.state(), RouteState::ActiveHeadset);
    assert!(engine.was_on_speaker());

    run(&mut engine, &[RouteMessage::DisconnectWiredHeadset]);
    assert_eq!(engine.state(), RouteState::ActiveSpeaker);
}

#[test]
fn test_user_leaving_speaker_forgets_it() {
    let (mut engine, _hw) = active_engine(true);
    run(&mut engine, &[RouteMessage::UserSwitchSpeaker, RouteMessage::UserSwitchEarpiece]);
    assert!(!engine.was_on_speaker());

    run(&mut engine, &[RouteMessage::ConnectWiredHeadset, RouteMessage::DisconnectWiredHeadset]);
    assert_eq!(engine.state(), RouteState::ActiveEarpiece);
}

#[test]
fn test_dock_moves_earpiece_to_speaker_and_back() {
    let (mut engine, _hw) = active_engine(true);
    run(&mut engine, &[RouteMessage::ConnectDock]);
    assert_eq!(engine.state(), RouteState::ActiveSpeaker);
    run(&mut engine, &[RouteMessage::DisconnectDock]);
    assert_eq!(engine.state(), RouteState::ActiveEarpiece);
}

#[test]
fn test_bluetooth_link_drop_falls_back_to_baseline() {
    let (mut engine, hw) = active_engine(true);
    hw.set_bluetooth_available(true);
    run(&mut engine, &[RouteMessage::ConnectBluetooth]);
    assert_eq!(engine.state(), RouteState::ActiveBluetooth);

    run(&mut engine, &[RouteMessage::BtAudioDisconnected]);
    assert_eq!(engine.state(), RouteState::ActiveEarpiece);
    // device is still paired, only the audio link went away
    assert!(engine.available_routes().has(AudioRoute::Bluetooth));
    assert!(!engine.has_user_left_bluetooth());
}

#[test]
fn test_bluetooth_switch_ignored_when_unavailable() {
    let (mut engine, _hw) = active_engine(true);
    assert_eq!(run(&mut engine, &[RouteMessage::UserSwitchBluetooth]), 0);
    assert_eq!(engine.state(), RouteState::ActiveEarpiece);
}

#[test]
fn test_device_without_earpiece_uses_speaker_baseline() {
    let hw = Arc::new(SimulatedAudioHardware::new());
    let mut engine = AudioRouteEngine::new(hw, false);
    assert_eq!(engine.state(), RouteState::QuiescentSpeaker);

    run(&mut engine, &[RouteMessage::ConnectWiredHeadset]);
    assert_eq!(engine.state(), RouteState::QuiescentHeadset);
    run(&mut engine, &[RouteMessage::DisconnectWiredHeadset]);
    assert_eq!(engine.state(), RouteState::QuiescentSpeaker);
    assert!(!engine.available_routes().has(AudioRoute::Earpiece));
}

#[test]
fn test_update_system_route_resends_snapshot() {
    let (mut engine, _hw) = active_engine(true);
    let before = engine.last_dispatched();
    assert_eq!(run(&mut engine, &[RouteMessage::UpdateSystemAudioRoute]), 1);
    assert_eq!(engine.last_dispatched(), before);
}

#[test]
fn test_quiescent_state_tracks_accessories_without_dispatch() {
    let hw = Arc::new(SimulatedAudioHardware::new());
    let mut engine = AudioRouteEngine::new(hw.clone(), true);
    assert_eq!(run(&mut engine, &[RouteMessage::ConnectWiredHeadset]), 0);
    assert_eq!(engine.state(), RouteState::QuiescentHeadset);
    assert!(hw.calls().is_empty());

    run(&mut engine, &[RouteMessage::SwitchFocus(Focus::HasFocus)]);
    assert_eq!(engine.state(), RouteState::ActiveHeadset);
}
