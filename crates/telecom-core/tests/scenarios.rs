//! End-to-end call flows driven through the registry's public API

use std::sync::Arc;

use pretty_assertions::assert_eq;
use rvoip_telecom_core::audio::{HardwareCall, RouteState, SimulatedAudioHardware};
use rvoip_telecom_core::{
    AccountHandle, Address, AudioRoute, CallId, CallRegistry, CallState, Capabilities, ConnectionInfo,
    Effect, HardwareEvent, PhoneAccount, ProviderCommand, ProviderEvent, ProviderId, TelecomConfig,
    TelecomEvent, VideoState,
};

fn sim(id: &str) -> AccountHandle {
    AccountHandle::new("telephony", id)
}

fn setup() -> (CallRegistry, Arc<SimulatedAudioHardware>) {
    let hardware = Arc::new(SimulatedAudioHardware::new());
    let mut registry = CallRegistry::new(TelecomConfig::default(), hardware.clone());
    registry.register_account(PhoneAccount::new(sim("sim1")));
    registry.register_account(PhoneAccount::new(sim("sim2")));
    (registry, hardware)
}

/// Dial `number` on `account`, let the provider accept it and report it active
fn active_call(registry: &mut CallRegistry, number: &str, account: AccountHandle) -> CallId {
    let id = registry
        .start_outgoing_call(Address::tel(number), Some(account), VideoState::AUDIO_ONLY)
        .unwrap();
    registry
        .place_outgoing_call(&id, false, VideoState::AUDIO_ONLY)
        .unwrap();
    registry
        .on_provider_event(ProviderEvent::ConnectionCreated {
            call_id: id.clone(),
            info: ConnectionInfo {
                capabilities: Capabilities::HOLD | Capabilities::SUPPORT_HOLD,
                ..Default::default()
            },
        })
        .unwrap();
    registry
        .on_provider_event(ProviderEvent::SetActive { call_id: id.clone() })
        .unwrap();
    registry.take_effects();
    id
}

fn provider_commands(effects: &[Effect]) -> Vec<ProviderCommand> {
    effects
        .iter()
        .filter_map(|e| match e {
            Effect::Provider { command, .. } => Some(command.clone()),
            _ => None,
        })
        .collect()
}

fn audio_changes(effects: &[Effect]) -> Vec<TelecomEvent> {
    effects
        .iter()
        .filter_map(|e| match e {
            Effect::Notify(event @ TelecomEvent::AudioStateChanged { .. }) => Some(event.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn test_second_call_on_other_account_holds_the_first() {
    let (mut registry, _hw) = setup();
    let first = active_call(&mut registry, "5550100", sim("sim1"));

    let second = registry
        .start_outgoing_call(Address::tel("5550101"), Some(sim("sim2")), VideoState::AUDIO_ONLY)
        .unwrap();
    let commands = provider_commands(&registry.take_effects());
    assert_eq!(commands, vec![ProviderCommand::Hold { call_id: first.clone() }]);

    registry
        .on_provider_event(ProviderEvent::SetOnHold { call_id: first.clone() })
        .unwrap();
    assert_eq!(registry.call(&first).unwrap().state(), CallState::OnHold);
    assert_eq!(registry.call(&second).unwrap().state(), CallState::Connecting);
    assert_eq!(registry.held_call(), Some(first));
    assert_eq!(registry.outgoing_call(), Some(second.clone()));
    assert_eq!(registry.foreground_call(), Some(&second));
}

#[test]
fn test_call_without_account_holds_live_call_once_one_is_picked() {
    let (mut registry, _hw) = setup();
    let first = active_call(&mut registry, "5550100", sim("sim1"));

    let second = registry
        .start_outgoing_call(Address::tel("5550101"), None, VideoState::AUDIO_ONLY)
        .unwrap();
    assert_eq!(registry.call(&second).unwrap().state(), CallState::SelectAccount);
    registry
        .place_outgoing_call(&second, false, VideoState::AUDIO_ONLY)
        .unwrap();
    // nothing to decide until the account is known
    assert!(provider_commands(&registry.take_effects()).is_empty());
    assert_eq!(registry.call(&first).unwrap().state(), CallState::Active);

    registry
        .phone_account_selected(&second, sim("sim2"), false)
        .unwrap();
    let commands = provider_commands(&registry.take_effects());
    assert_eq!(commands[0], ProviderCommand::Hold { call_id: first.clone() });
    assert!(commands.iter().any(|c| matches!(
        c,
        ProviderCommand::CreateConnection { call_id, account, .. } if call_id == &second && account == &sim("sim2")
    )));

    registry
        .on_provider_event(ProviderEvent::SetOnHold { call_id: first.clone() })
        .unwrap();
    assert_eq!(registry.call(&first).unwrap().state(), CallState::OnHold);
    assert_eq!(registry.call(&second).unwrap().state(), CallState::Connecting);
    assert_eq!(registry.held_call(), Some(first));
    assert_eq!(registry.outgoing_call(), Some(second.clone()));
    assert_eq!(registry.foreground_call(), Some(&second));
}

#[test]
fn test_emergency_call_preempts_live_call() {
    let (mut registry, _hw) = setup();
    let live = active_call(&mut registry, "5550100", sim("sim1"));

    let sos = registry
        .start_outgoing_call(Address::tel("911"), None, VideoState::AUDIO_ONLY)
        .unwrap();
    let commands = provider_commands(&registry.take_effects());
    assert_eq!(commands, vec![ProviderCommand::Disconnect { call_id: live.clone() }]);
    assert!(registry.has_emergency_call());
    assert!(!registry.can_add_call());

    registry
        .place_outgoing_call(&sos, false, VideoState::AUDIO_ONLY)
        .unwrap();
    let commands = provider_commands(&registry.take_effects());
    assert!(commands.iter().any(|c| matches!(
        c,
        ProviderCommand::CreateConnection { call_id, is_emergency: true, .. } if call_id == &sos
    )));
}

#[test]
fn test_bluetooth_arrival_moves_active_audio() {
    let (mut registry, hw) = setup();
    assert_eq!(registry.audio().state(), RouteState::QuiescentEarpiece);

    active_call(&mut registry, "5550100", sim("sim1"));
    assert_eq!(registry.audio().state(), RouteState::ActiveEarpiece);
    hw.clear_calls();

    hw.set_bluetooth_available(true);
    registry.on_hardware_event(HardwareEvent::Bluetooth { connected: true });
    let effects = registry.take_effects();

    assert_eq!(registry.audio().state(), RouteState::ActiveBluetooth);
    let changes = audio_changes(&effects);
    assert_eq!(changes.len(), 1);
    match &changes[0] {
        TelecomEvent::AudioStateChanged { old, new } => {
            assert_eq!(old.route, AudioRoute::Earpiece);
            assert_eq!(new.route, AudioRoute::Bluetooth);
            assert!(new.supported.has(AudioRoute::Bluetooth));
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(hw.calls(), vec![HardwareCall::BluetoothAudio(true)]);
    assert!(provider_commands(&effects)
        .iter()
        .any(|c| matches!(c, ProviderCommand::AudioStateChanged { state, .. } if state.route == AudioRoute::Bluetooth)));
}

#[test]
fn test_leaving_bluetooth_by_hand_sticks_until_calls_end() {
    let (mut registry, hw) = setup();
    hw.set_bluetooth_available(true);
    registry.on_hardware_event(HardwareEvent::Bluetooth { connected: true });
    assert_eq!(registry.audio().state(), RouteState::QuiescentBluetooth);

    let call = active_call(&mut registry, "5550100", sim("sim1"));
    assert_eq!(registry.audio().state(), RouteState::ActiveBluetooth);

    registry.set_audio_route(AudioRoute::Earpiece);
    assert_eq!(registry.audio().state(), RouteState::ActiveEarpiece);
    assert!(registry.audio().has_user_left_bluetooth());

    // headset drops and comes back: audio stays where the user put it
    hw.set_bluetooth_available(false);
    registry.on_hardware_event(HardwareEvent::Bluetooth { connected: false });
    hw.set_bluetooth_available(true);
    registry.on_hardware_event(HardwareEvent::Bluetooth { connected: true });
    assert_eq!(registry.audio().state(), RouteState::ActiveEarpiece);
    assert!(registry.audio().available_routes().has(AudioRoute::Bluetooth));

    // once the last call is gone the preference is forgotten
    registry.disconnect_call(&call).unwrap();
    registry
        .on_provider_event(ProviderEvent::SetDisconnected {
            call_id: call.clone(),
            cause: rvoip_telecom_core::DisconnectCause::new(rvoip_telecom_core::DisconnectCode::Local),
        })
        .unwrap();
    registry
        .on_provider_event(ProviderEvent::Removed { call_id: call })
        .unwrap();
    assert!(!registry.audio().state().is_active());
    assert!(!registry.audio().has_user_left_bluetooth());
}

#[test]
fn test_speaker_chosen_over_bluetooth_survives_reconnect() {
    let (mut registry, hw) = setup();
    hw.set_bluetooth_available(true);
    registry.on_hardware_event(HardwareEvent::Bluetooth { connected: true });
    active_call(&mut registry, "5550100", sim("sim1"));
    assert_eq!(registry.audio().state(), RouteState::ActiveBluetooth);

    registry.set_audio_route(AudioRoute::Speaker);
    assert_eq!(registry.audio().state(), RouteState::ActiveSpeaker);
    assert!(registry.audio().has_user_left_bluetooth());
    assert!(registry.audio().was_on_speaker());

    hw.set_bluetooth_available(false);
    registry.on_hardware_event(HardwareEvent::Bluetooth { connected: false });
    assert_eq!(registry.audio().state(), RouteState::ActiveSpeaker);
    assert!(!registry.audio().available_routes().has(AudioRoute::Bluetooth));

    hw.set_bluetooth_available(true);
    registry.on_hardware_event(HardwareEvent::Bluetooth { connected: true });
    assert_eq!(registry.audio().state(), RouteState::ActiveSpeaker);
    assert!(registry.audio().available_routes().has(AudioRoute::Bluetooth));
    assert_eq!(registry.audio().last_dispatched().route, AudioRoute::Speaker);
}

#[test]
fn test_swap_alternates_between_two_children() {
    let (mut registry, _hw) = setup();
    let a = active_call(&mut registry, "5550100", sim("sim1"));
    registry
        .on_provider_event(ProviderEvent::SetOnHold { call_id: a.clone() })
        .unwrap();
    let b = active_call(&mut registry, "5550101", sim("sim1"));

    let conf = CallId::from("conf-1");
    registry
        .on_provider_event(ProviderEvent::ConferenceCreated {
            call_id: conf.clone(),
            provider: ProviderId::from("telephony"),
            account: Some(sim("sim1")),
            info: ConnectionInfo {
                capabilities: Capabilities::SWAP_CONFERENCE,
                ..Default::default()
            },
        })
        .unwrap();
    for child in [&a, &b] {
        registry
            .on_provider_event(ProviderEvent::SetParent {
                call_id: child.clone(),
                parent: Some(conf.clone()),
            })
            .unwrap();
    }
    registry.take_effects();

    let mut seen = Vec::new();
    for _ in 0..3 {
        registry.swap_conference(&conf).unwrap();
        let active = registry
            .call(&conf)
            .unwrap()
            .conference_level_active_child()
            .cloned()
            .unwrap();
        seen.push(active);
    }
    assert!(seen[0] == a || seen[0] == b);
    assert_ne!(seen[0], seen[1]);
    assert_eq!(seen[0], seen[2]);

    let swaps = provider_commands(&registry.take_effects())
        .into_iter()
        .filter(|c| matches!(c, ProviderCommand::SwapConference { .. }))
        .count();
    assert_eq!(swaps, 3);
}

#[test]
fn test_swap_without_capability_is_refused() {
    let (mut registry, _hw) = setup();
    let call = active_call(&mut registry, "5550100", sim("sim1"));
    assert!(registry.swap_conference(&call).is_err());
    assert!(provider_commands(&registry.take_effects()).is_empty());
}
