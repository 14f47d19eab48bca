use super::active::{guarded_switch, switch_messages};
use crate::audio::message::{Focus, RouteMessage};
use crate::audio::route::AudioRoute;
use crate::audio::state::RouteState;
use crate::audio::table::{RouteAction, RouteTableBuilder, RouteTransition};

/// Quiescent states follow automatic switches only. User switches have no
/// entry and end up logged as unexpected.
pub fn add_quiescent_transitions(builder: &mut RouteTableBuilder) {
    for route in AudioRoute::ALL {
        let state = RouteState::quiescent(route);

        builder.on_enter(
            state,
            vec![
                RouteAction::SetUserLeftBluetooth(false),
                RouteAction::UpdateInternalState,
            ],
        );

        for target in AudioRoute::ALL {
            let (auto, _) = switch_messages(target);
            if target == route {
                builder.add_transition(state, auto, RouteTransition::ignore());
                continue;
            }
            for transition in guarded_switch(target, RouteState::quiescent(target), Vec::new()) {
                builder.add_transition(state, auto, transition);
            }
        }

        builder.add_transition(
            state,
            RouteMessage::SwitchFocus(Focus::HasFocus),
            RouteTransition::ignore().to(RouteState::active(route)),
        );
        builder.add_transition(
            state,
            RouteMessage::SwitchFocus(Focus::NoFocus),
            RouteTransition::ignore(),
        );
    }

    builder.add_transition(
        RouteState::QuiescentBluetooth,
        RouteMessage::BtAudioDisconnected,
        RouteTransition::ignore(),
    );
}
