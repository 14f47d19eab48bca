//! User commands: answer, reject, hold, hang up, audio and extras

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::audio::{AudioRoute, RouteMessage};
use crate::call::{Capabilities, CallState, ExtrasSource, VideoState};
use crate::error::{TelecomError, TelecomResult};
use crate::events::TelecomEvent;
use crate::provider::Extras;
use crate::types::CallId;

use super::{select_foreground, CallRegistry};

/// Headset media button press
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaButton {
    ShortPress,
    LongPress,
}

impl CallRegistry {
    pub fn answer_call(&mut self, call_id: &CallId, video_state: VideoState) -> TelecomResult<()> {
        self.require_tracked(call_id)?;
        let state = self.calls.require(call_id)?.state();
        if state != CallState::Ringing {
            debug!("Ignoring answer for call {} in state {}", call_id, state);
            return Ok(());
        }

        // the ringing call usually is the foreground; look at what it displaces
        let displaced = select_foreground(
            self.calls.top_level().filter(|c| c.id() != call_id),
            self.foreground.as_ref(),
        );
        if let Some(foreground) = displaced {
            self.make_way_for_answer(call_id, &foreground);
        }

        self.notify(TelecomEvent::IncomingCallAnswered {
            call_id: call_id.clone(),
        });
        let command = self
            .calls
            .get_mut(call_id)
            .and_then(|c| c.answer(video_state));
        self.send(command);

        if self.is_speakerphone_auto_enabled(video_state) {
            if let Some(call) = self.calls.get_mut(call_id) {
                call.set_start_with_speakerphone(true);
            }
        }
        self.settle();
        Ok(())
    }

    /// Hold or hang up the foreground call before answering another one
    fn make_way_for_answer(&mut self, call_id: &CallId, foreground: &CallId) {
        let Some(current) = self.calls.get(foreground) else {
            return;
        };
        match current.state() {
            CallState::Active => {}
            CallState::Dialing => {
                // a call still dialing cannot be parked
                info!("Abandoning dialing call {} to answer {}", foreground, call_id);
                self.disconnect_record(foreground, false);
                return;
            }
            _ => return,
        }
        let can_hold = current.can(Capabilities::HOLD);
        let same_provider = current.provider() == self.calls.get(call_id).and_then(|c| c.provider());

        if !can_hold {
            if !same_provider {
                info!("Foreground call {} cannot hold, disconnecting it", foreground);
                self.disconnect_record(foreground, false);
            }
            return;
        }

        if let Some(held) = self.first_call_with_state(None, &[CallState::OnHold]) {
            info!("Disconnecting held call {} to answer {}", held, call_id);
            self.disconnect_record(&held, false);
        }
        info!("Holding foreground call {} to answer {}", foreground, call_id);
        let command = self.calls.get_mut(foreground).and_then(|c| c.hold());
        self.send(command);
    }

    pub fn reject_call(&mut self, call_id: &CallId, with_message: bool, text: Option<String>) -> TelecomResult<()> {
        self.require_tracked(call_id)?;
        self.notify(TelecomEvent::IncomingCallRejected {
            call_id: call_id.clone(),
            with_message,
            text: text.clone(),
        });
        let command = self
            .calls
            .get_mut(call_id)
            .and_then(|c| c.reject(with_message, text));
        self.send(command);
        self.settle();
        Ok(())
    }

    pub fn hold_call(&mut self, call_id: &CallId) -> TelecomResult<()> {
        self.require_tracked(call_id)?;
        let command = self.calls.get_mut(call_id).and_then(|c| c.hold());
        self.send(command);
        self.settle();
        Ok(())
    }

    /// Resume a held call, holding every other call first
    pub fn unhold_call(&mut self, call_id: &CallId) -> TelecomResult<()> {
        self.require_tracked(call_id)?;
        if self.calls.require(call_id)?.state() == CallState::OnHold {
            // resuming must not leave a second live call behind
            let blocker = self.calls.top_level().find(|c| {
                c.id() != call_id
                    && c.state().is_live()
                    && !(c.state() == CallState::Active && c.can(Capabilities::HOLD))
            });
            if let Some(blocker) = blocker {
                return Err(TelecomError::invalid_state(format!(
                    "call {} is {} and cannot be held",
                    blocker.id(),
                    blocker.state()
                )));
            }
        }
        let others: Vec<CallId> = self
            .calls
            .top_level()
            .filter(|c| c.id() != call_id && c.is_alive())
            .map(|c| c.id().clone())
            .collect();
        for other in others {
            let command = self.calls.get_mut(&other).and_then(|c| c.hold());
            self.send(command);
        }
        let command = self.calls.get_mut(call_id).and_then(|c| c.unhold());
        self.send(command);
        self.settle();
        Ok(())
    }

    pub fn disconnect_call(&mut self, call_id: &CallId) -> TelecomResult<()> {
        self.require_tracked(call_id)?;
        if !self.locally_disconnecting.contains(call_id) {
            self.locally_disconnecting.push(call_id.clone());
        }
        info!("User disconnecting call {}", call_id);
        self.disconnect_record(call_id, false);
        self.settle();
        Ok(())
    }

    pub fn disconnect_all_calls(&mut self) {
        let ids: Vec<CallId> = self.calls.tracked_ids().to_vec();
        info!("Disconnecting all {} calls", ids.len());
        for call_id in ids {
            if !self.locally_disconnecting.contains(&call_id) {
                self.locally_disconnecting.push(call_id.clone());
            }
            self.disconnect_record(&call_id, false);
        }
        self.settle();
    }

    pub fn mute(&mut self, muted: bool) {
        let message = if muted {
            RouteMessage::MuteOn
        } else {
            RouteMessage::MuteOff
        };
        self.audio.send(message);
        self.settle();
    }

    pub fn toggle_mute(&mut self) {
        self.audio.send(RouteMessage::ToggleMute);
        self.settle();
    }

    pub fn set_audio_route(&mut self, route: AudioRoute) {
        let message = match route {
            AudioRoute::Earpiece => RouteMessage::UserSwitchEarpiece,
            AudioRoute::Bluetooth => RouteMessage::UserSwitchBluetooth,
            AudioRoute::WiredHeadset => RouteMessage::UserSwitchHeadset,
            AudioRoute::Speaker => RouteMessage::UserSwitchSpeaker,
        };
        debug!("User asked for route {}", route);
        self.audio.send(message);
        self.settle();
    }

    pub fn pull_external_call(&mut self, call_id: &CallId) -> TelecomResult<()> {
        self.require_tracked(call_id)?;
        let command = self.calls.require_mut(call_id)?.pull_external_call()?;
        info!("Pulling external call {}", call_id);
        self.send(Some(command));
        self.settle();
        Ok(())
    }

    /// Extras set from the in-call UI; forwarded to the provider
    pub fn put_extras(&mut self, call_id: &CallId, extras: Extras) -> TelecomResult<()> {
        self.require_tracked(call_id)?;
        let command = self
            .calls
            .require_mut(call_id)?
            .put_extras(ExtrasSource::InCall, extras);
        self.send(command);
        self.settle();
        Ok(())
    }

    pub fn remove_extras(&mut self, call_id: &CallId, keys: Vec<String>) -> TelecomResult<()> {
        self.require_tracked(call_id)?;
        let command = self
            .calls
            .require_mut(call_id)?
            .remove_extras(ExtrasSource::InCall, keys);
        self.send(command);
        self.settle();
        Ok(())
    }

    /// Returns whether the press was consumed
    pub fn on_media_button(&mut self, button: MediaButton) -> bool {
        if !self.has_any_calls() {
            return false;
        }
        let handled = match button {
            MediaButton::ShortPress => {
                match self.ringing_call() {
                    Some(ringing) => {
                        info!("Media button answers {}", ringing);
                        let command = self.calls.get_mut(&ringing).and_then(|c| {
                            let video_state = c.video_state();
                            c.answer(video_state)
                        });
                        self.send(command);
                    }
                    None => self.audio.send(RouteMessage::ToggleMute),
                }
                true
            }
            MediaButton::LongPress => {
                let states = [
                    CallState::Ringing,
                    CallState::Dialing,
                    CallState::Active,
                    CallState::OnHold,
                ];
                match self.first_call_with_state(None, &states) {
                    Some(call_id) => {
                        info!("Media button hangs up {}", call_id);
                        self.disconnect_record(&call_id, false);
                        true
                    }
                    None => false,
                }
            }
        };
        self.settle();
        handled
    }
}
