use crate::audio::message::RouteMessage;
use crate::audio::route::AudioRoute;
use crate::audio::state::RouteState;
use crate::audio::table::{RouteAction, RouteGuard, RouteTableBuilder, RouteTransition};

/// Connectivity and baseline handling shared by the active and quiescent
/// state of each route
///
/// Availability is updated first, then the route reacts.
pub fn add_common_transitions(builder: &mut RouteTableBuilder) {
    for state in RouteState::ALL {
        let route = state.route();

        // Headset plugged in
        let mut actions = vec![
            RouteAction::RemoveRoute(AudioRoute::Earpiece),
            RouteAction::AddRoute(AudioRoute::WiredHeadset),
        ];
        if route == AudioRoute::WiredHeadset {
            actions.extend([
                RouteAction::Error("wired headset connected while already on headset".into()),
                RouteAction::AddRoute(AudioRoute::WiredHeadset),
                RouteAction::RefreshState,
            ]);
        } else {
            actions.push(RouteAction::SendInternal(RouteMessage::SwitchHeadset));
        }
        builder.add_transition(state, RouteMessage::ConnectWiredHeadset, RouteTransition::new(actions));

        // Headset unplugged
        let mut actions = vec![
            RouteAction::RemoveRoute(AudioRoute::WiredHeadset),
            RouteAction::AddEarpieceIfSupported,
        ];
        match route {
            AudioRoute::Earpiece => {
                actions.extend([
                    RouteAction::Error("wired headset disconnected while on earpiece".into()),
                    RouteAction::RefreshState,
                ]);
                builder.add_transition(state, RouteMessage::DisconnectWiredHeadset, RouteTransition::new(actions));
            }
            AudioRoute::WiredHeadset => {
                let mut to_speaker = actions.clone();
                to_speaker.push(RouteAction::SendInternal(RouteMessage::SwitchSpeaker));
                builder.add_transition(
                    state,
                    RouteMessage::DisconnectWiredHeadset,
                    RouteTransition::new(to_speaker).when(RouteGuard::WasOnSpeaker(true)),
                );
                actions.push(RouteAction::SendInternal(RouteMessage::SwitchBaselineRoute));
                builder.add_transition(state, RouteMessage::DisconnectWiredHeadset, RouteTransition::new(actions));
            }
            AudioRoute::Bluetooth | AudioRoute::Speaker => {
                actions.push(RouteAction::RefreshState);
                builder.add_transition(state, RouteMessage::DisconnectWiredHeadset, RouteTransition::new(actions));
            }
        }

        // Bluetooth device connected
        if route == AudioRoute::Bluetooth {
            builder.add_transition(
                state,
                RouteMessage::ConnectBluetooth,
                RouteTransition::new(vec![RouteAction::AddRoute(AudioRoute::Bluetooth)]),
            );
        } else {
            builder.add_transition(
                state,
                RouteMessage::ConnectBluetooth,
                RouteTransition::new(vec![
                    RouteAction::AddRoute(AudioRoute::Bluetooth),
                    RouteAction::SendInternal(RouteMessage::SwitchBluetooth),
                ])
                .when(RouteGuard::UserLeftBluetooth(false)),
            );
            builder.add_transition(
                state,
                RouteMessage::ConnectBluetooth,
                RouteTransition::new(vec![
                    RouteAction::AddRoute(AudioRoute::Bluetooth),
                    RouteAction::Info(format!(
                        "not switching to bluetooth from {}, user left it explicitly",
                        route
                    )),
                    RouteAction::RefreshState,
                ]),
            );
        }

        // Bluetooth device gone
        let mut actions = vec![RouteAction::RemoveRoute(AudioRoute::Bluetooth)];
        if route == AudioRoute::Bluetooth {
            actions.extend([
                RouteAction::SendInternal(RouteMessage::SwitchBaselineRoute),
                RouteAction::SetWasOnSpeaker(false),
            ]);
        } else {
            actions.push(RouteAction::RefreshState);
        }
        builder.add_transition(state, RouteMessage::DisconnectBluetooth, RouteTransition::new(actions));

        // Dock
        let (dock_on, dock_off) = match route {
            AudioRoute::Earpiece => (
                RouteTransition::new(vec![RouteAction::SendInternal(RouteMessage::SwitchSpeaker)]),
                RouteTransition::ignore(),
            ),
            AudioRoute::Speaker => (
                RouteTransition::ignore(),
                RouteTransition::new(vec![RouteAction::SendInternal(RouteMessage::SwitchBaselineRoute)]),
            ),
            AudioRoute::Bluetooth | AudioRoute::WiredHeadset => {
                (RouteTransition::ignore(), RouteTransition::ignore())
            }
        };
        builder.add_transition(state, RouteMessage::ConnectDock, dock_on);
        builder.add_transition(state, RouteMessage::DisconnectDock, dock_off);

        // BT audio link drop is only meaningful while actively on bluetooth
        if route != AudioRoute::Bluetooth {
            builder.add_transition(state, RouteMessage::BtAudioDisconnected, RouteTransition::ignore());
        }

        builder.add_transition(
            state,
            RouteMessage::SwitchBaselineRoute,
            RouteTransition::new(vec![RouteAction::SendBaseline { user: false }]),
        );
        builder.add_transition(
            state,
            RouteMessage::UserSwitchBaselineRoute,
            RouteTransition::new(vec![RouteAction::SendBaseline { user: true }]),
        );
    }
}

/// Messages handled the same way in every state
pub fn add_wildcard_transitions(builder: &mut RouteTableBuilder) {
    builder.add_wildcard(
        RouteMessage::MuteOn,
        RouteTransition::new(vec![RouteAction::SetMute(true)]),
    );
    builder.add_wildcard(
        RouteMessage::MuteOff,
        RouteTransition::new(vec![RouteAction::SetMute(false)]),
    );
    builder.add_wildcard(
        RouteMessage::ToggleMute,
        RouteTransition::new(vec![RouteAction::ToggleMute]),
    );
    builder.add_wildcard(
        RouteMessage::UpdateSystemAudioRoute,
        RouteTransition::new(vec![RouteAction::ResendState]),
    );
}
