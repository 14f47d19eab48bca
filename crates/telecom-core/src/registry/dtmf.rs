//! Post-dial and in-call DTMF

use tracing::{debug, info, warn};

use crate::error::TelecomResult;
use crate::provider::ToneCommand;
use crate::timer::TimerKey;
use crate::types::{is_twelve_key, CallId, DTMF_PAUSE, DTMF_WAIT};

use super::CallRegistry;

impl CallRegistry {
    /// The provider is about to dial `c` after the call connected
    pub(super) fn on_post_dial_char(&mut self, call_id: &CallId, c: char) {
        let stop_key = TimerKey::DtmfToneStop(call_id.clone());
        if is_twelve_key(c) {
            if self.dtmf_suspended.contains(call_id) {
                debug!("Post-dial playback for {} is waiting, skipping {:?}", call_id, c);
                return;
            }
            self.cancel_timer(stop_key.clone());
            self.tone(call_id, ToneCommand::Play(c));
            let delay = self.config.timeouts.dtmf_tone_delay();
            self.schedule_timer(stop_key, delay);
        } else if c == '\0' || c == DTMF_WAIT || c == DTMF_PAUSE {
            self.cancel_timer(stop_key);
            self.tone(call_id, ToneCommand::Stop);
            if c == DTMF_WAIT {
                debug!("Post-dial playback for {} waits for the user", call_id);
                self.dtmf_suspended.insert(call_id.clone());
            }
        } else {
            warn!("Ignoring unexpected post-dial character {:?} for call {}", c, call_id);
        }
    }

    pub(super) fn on_dtmf_timer(&mut self, call_id: &CallId) {
        self.tone(call_id, ToneCommand::Stop);
    }

    /// User answered a post-dial wait prompt
    pub fn post_dial_continue(&mut self, call_id: &CallId, proceed: bool) -> TelecomResult<()> {
        self.require_tracked(call_id)?;
        self.dtmf_suspended.remove(call_id);
        info!("Post-dial continue for {} (proceed: {})", call_id, proceed);
        let command = self.calls.require(call_id)?.post_dial_continue(proceed);
        self.send(command);
        self.settle();
        Ok(())
    }

    /// User pressed a key on the in-call dialpad
    pub fn play_dtmf_tone(&mut self, call_id: &CallId, digit: char) -> TelecomResult<()> {
        self.require_tracked(call_id)?;
        let command = self.calls.require(call_id)?.play_dtmf_tone(digit);
        self.send(command);
        self.tone(call_id, ToneCommand::Play(digit));
        self.settle();
        Ok(())
    }

    pub fn stop_dtmf_tone(&mut self, call_id: &CallId) -> TelecomResult<()> {
        self.require_tracked(call_id)?;
        let command = self.calls.require(call_id)?.stop_dtmf_tone();
        self.send(command);
        self.tone(call_id, ToneCommand::Stop);
        self.settle();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::super::test_support::*;
    use super::super::Effect;
    use super::*;
    use crate::call::CallState;
    use crate::provider::{ProviderCommand, ProviderEvent};
    use crate::timer::TimerRequest;

    fn tones(effects: &[Effect]) -> Vec<ToneCommand> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Tone { command, .. } => Some(*command),
                _ => None,
            })
            .collect()
    }

    fn post_dial(registry: &mut CallRegistry, id: &CallId, c: char) {
        registry
            .on_provider_event(ProviderEvent::OnPostDialChar { call_id: id.clone(), c })
            .unwrap();
    }

    #[test]
    fn test_digit_plays_and_schedules_stop() {
        let (mut registry, _hw) = registry();
        let id = outgoing_in_state(&mut registry, "5550100", CallState::Active);
        post_dial(&mut registry, &id, '5');
        let effects = registry.take_effects();
        assert_eq!(tones(&effects), vec![ToneCommand::Play('5')]);
        assert!(effects.contains(&Effect::Timer(TimerRequest::Schedule {
            key: TimerKey::DtmfToneStop(id.clone()),
            delay: Duration::from_millis(300),
        })));

        registry.on_timer_fired(TimerKey::DtmfToneStop(id.clone()));
        assert_eq!(tones(&registry.take_effects()), vec![ToneCommand::Stop]);
    }

    #[test]
    fn test_next_digit_restarts_timer() {
        let (mut registry, _hw) = registry();
        let id = outgoing_in_state(&mut registry, "5550100", CallState::Active);
        post_dial(&mut registry, &id, '1');
        post_dial(&mut registry, &id, '2');
        let effects = registry.take_effects();
        assert!(effects.contains(&Effect::Timer(TimerRequest::Cancel {
            key: TimerKey::DtmfToneStop(id.clone()),
        })));
        assert_eq!(tones(&effects), vec![ToneCommand::Play('1'), ToneCommand::Play('2')]);
    }

    #[test]
    fn test_wait_suspends_until_continue() {
        let (mut registry, _hw) = registry();
        let id = outgoing_in_state(&mut registry, "5550100", CallState::Active);
        post_dial(&mut registry, &id, DTMF_WAIT);
        post_dial(&mut registry, &id, '9');
        assert_eq!(tones(&registry.take_effects()), vec![ToneCommand::Stop]);

        registry.post_dial_continue(&id, true).unwrap();
        let effects = registry.take_effects();
        assert!(provider_commands(&effects).contains(&ProviderCommand::PostDialContinue {
            call_id: id.clone(),
            proceed: true,
        }));
        post_dial(&mut registry, &id, '9');
        assert_eq!(tones(&registry.take_effects()), vec![ToneCommand::Play('9')]);
    }

    #[test]
    fn test_pause_stops_without_suspending() {
        let (mut registry, _hw) = registry();
        let id = outgoing_in_state(&mut registry, "5550100", CallState::Active);
        post_dial(&mut registry, &id, DTMF_PAUSE);
        post_dial(&mut registry, &id, 'x');
        post_dial(&mut registry, &id, '#');
        assert_eq!(
            tones(&registry.take_effects()),
            vec![ToneCommand::Stop, ToneCommand::Play('#')]
        );
    }

    #[test]
    fn test_dialpad_tone_forwarded_and_played() {
        let (mut registry, _hw) = registry();
        let id = outgoing_in_state(&mut registry, "5550100", CallState::Active);
        registry.play_dtmf_tone(&id, '7').unwrap();
        let effects = registry.take_effects();
        assert_eq!(
            provider_commands(&effects),
            vec![ProviderCommand::PlayDtmfTone { call_id: id.clone(), digit: '7' }]
        );
        assert_eq!(tones(&effects), vec![ToneCommand::Play('7')]);
    }
}
