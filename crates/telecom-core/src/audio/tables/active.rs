use crate::audio::message::{Focus, RouteMessage};
use crate::audio::route::AudioRoute;
use crate::audio::state::RouteState;
use crate::audio::table::{RouteAction, RouteGuard, RouteTableBuilder, RouteTransition};

/// Switch messages for a target route: (automatic, user)
pub(super) fn switch_messages(target: AudioRoute) -> (RouteMessage, RouteMessage) {
    match target {
        AudioRoute::Earpiece => (RouteMessage::SwitchEarpiece, RouteMessage::UserSwitchEarpiece),
        AudioRoute::Bluetooth => (RouteMessage::SwitchBluetooth, RouteMessage::UserSwitchBluetooth),
        AudioRoute::WiredHeadset => (RouteMessage::SwitchHeadset, RouteMessage::UserSwitchHeadset),
        AudioRoute::Speaker => (RouteMessage::SwitchSpeaker, RouteMessage::UserSwitchSpeaker),
    }
}

/// Move to `next` if `target` is available, otherwise warn and stay
pub(super) fn guarded_switch(
    target: AudioRoute,
    next: RouteState,
    pre: Vec<RouteAction>,
) -> Vec<RouteTransition> {
    if target == AudioRoute::Speaker {
        return vec![RouteTransition::new(pre).to(next)];
    }
    let mut unavailable = pre.clone();
    unavailable.push(RouteAction::Warn(format!(
        "ignoring switch to {}, not available",
        target
    )));
    vec![
        RouteTransition::new(pre)
            .when(RouteGuard::RouteAvailable(target))
            .to(next),
        RouteTransition::new(unavailable),
    ]
}

pub fn add_active_transitions(builder: &mut RouteTableBuilder) {
    for route in AudioRoute::ALL {
        let state = RouteState::active(route);

        let mut enter = Vec::new();
        if route == AudioRoute::Speaker {
            enter.push(RouteAction::SetWasOnSpeaker(true));
        }
        enter.extend([
            RouteAction::SetSpeakerphone(route == AudioRoute::Speaker),
            RouteAction::SetBluetoothAudio(route == AudioRoute::Bluetooth),
            RouteAction::PublishRoute,
            RouteAction::UpdateInternalState,
        ]);
        builder.on_enter(state, enter);

        for target in AudioRoute::ALL {
            let (auto, user) = switch_messages(target);
            if target == route {
                builder.add_transition(state, auto, RouteTransition::ignore());
                builder.add_transition(state, user, RouteTransition::ignore());
                continue;
            }

            // Leaving bluetooth or speaker by hand is remembered
            let user_pre = match route {
                AudioRoute::Bluetooth => vec![RouteAction::SetUserLeftBluetooth(true)],
                AudioRoute::Speaker => vec![RouteAction::SetWasOnSpeaker(false)],
                _ => Vec::new(),
            };
            let next = RouteState::active(target);
            for transition in guarded_switch(target, next, Vec::new()) {
                builder.add_transition(state, auto, transition);
            }
            for transition in guarded_switch(target, next, user_pre) {
                builder.add_transition(state, user, transition);
            }
        }

        builder.add_transition(
            state,
            RouteMessage::SwitchFocus(Focus::NoFocus),
            RouteTransition::new(vec![RouteAction::Reinitialize]),
        );
        builder.add_transition(
            state,
            RouteMessage::SwitchFocus(Focus::HasFocus),
            RouteTransition::ignore(),
        );
    }

    builder.add_transition(
        RouteState::ActiveBluetooth,
        RouteMessage::BtAudioDisconnected,
        RouteTransition::new(vec![RouteAction::SendInternal(RouteMessage::SwitchBaselineRoute)]),
    );
}
