//! Callbacks reported by providers

use tracing::{debug, info, warn};

use crate::call::{CallState, DisconnectCause, DisconnectCode, ExtrasSource};
use crate::error::{TelecomError, TelecomResult};
use crate::events::TelecomEvent;
use crate::provider::ProviderEvent;
use crate::types::{CallId, ProviderId};

use super::CallRegistry;

impl CallRegistry {
    /// Apply one provider callback
    ///
    /// Events for calls the registry does not know are logged and reported
    /// as [`TelecomError::CallNotFound`].
    pub fn on_provider_event(&mut self, event: ProviderEvent) -> TelecomResult<()> {
        if let Some(call_id) = event.call_id() {
            let creates = matches!(event, ProviderEvent::ConferenceCreated { .. });
            if !creates && !self.calls.contains(call_id) {
                debug!("Provider event for unknown call {}: {:?}", call_id, event);
                return Err(TelecomError::call_not_found(call_id));
            }
        }

        let result = self.apply_provider_event(event);
        self.settle();
        result
    }

    fn apply_provider_event(&mut self, event: ProviderEvent) -> TelecomResult<()> {
        match event {
            ProviderEvent::ConnectionCreated { call_id, info } => self.on_connection_created(&call_id, info),
            ProviderEvent::ConnectionFailed { call_id, cause } => self.on_connection_failed(&call_id, cause),
            ProviderEvent::SetActive { call_id } => self.set_call_state(&call_id, CallState::Active),
            ProviderEvent::SetRinging { call_id } => self.set_call_state(&call_id, CallState::Ringing),
            ProviderEvent::SetDialing { call_id } => self.set_call_state(&call_id, CallState::Dialing),
            ProviderEvent::SetOnHold { call_id } => self.set_call_state(&call_id, CallState::OnHold),
            ProviderEvent::SetDisconnected { call_id, cause } => {
                info!("Provider disconnected call {}: {}", call_id, cause);
                if let Some(call) = self.calls.get_mut(&call_id) {
                    call.set_disconnect_cause(cause);
                }
                self.set_call_state(&call_id, CallState::Disconnected);
            }
            ProviderEvent::Removed { call_id } => {
                debug!("Provider released call {}", call_id);
                self.mark_call_as_removed(&call_id);
            }
            ProviderEvent::SetCapabilities { call_id, capabilities } => {
                self.calls
                    .require_mut(&call_id)?
                    .set_connection_capabilities(capabilities, false);
            }
            ProviderEvent::SetProperties { call_id, properties } => {
                self.calls.require_mut(&call_id)?.set_connection_properties(properties);
            }
            ProviderEvent::SetVideoState { call_id, video_state } => {
                self.calls.require_mut(&call_id)?.set_video_state(video_state);
            }
            ProviderEvent::PutExtras { call_id, extras } => {
                self.calls
                    .require_mut(&call_id)?
                    .put_extras(ExtrasSource::Provider, extras);
            }
            ProviderEvent::RemoveExtras { call_id, keys } => {
                self.calls
                    .require_mut(&call_id)?
                    .remove_extras(ExtrasSource::Provider, keys);
            }
            ProviderEvent::SetAddress { call_id, address } => {
                self.calls.require_mut(&call_id)?.set_address(address);
            }
            ProviderEvent::SetRingbackRequested { call_id, requested } => {
                self.calls.require_mut(&call_id)?.set_ringback_requested(requested);
            }
            ProviderEvent::SetVoipAudioMode { call_id, is_voip } => {
                self.calls.require_mut(&call_id)?.set_voip_audio_mode(is_voip);
            }
            ProviderEvent::SetParent { call_id, parent } => self.reparent(&call_id, parent)?,
            ProviderEvent::ConferenceCreated {
                call_id,
                provider,
                account,
                info,
            } => self.on_conference_created(call_id, provider, account, info),
            ProviderEvent::OnPostDialChar { call_id, c } => self.on_post_dial_char(&call_id, c),
            ProviderEvent::OnPostDialWait { call_id, remaining } => {
                self.calls.require_mut(&call_id)?.on_post_dial_wait(remaining);
            }
            ProviderEvent::SessionModifyRequest { call_id, video_state } => {
                if self.calls.is_tracked(&call_id) {
                    self.notify(TelecomEvent::SessionModifyRequest { call_id, video_state });
                }
            }
            ProviderEvent::ProviderDied { provider } => self.handle_provider_death(&provider),
        }
        Ok(())
    }

    /// Fail every call bound to or being placed through `provider`
    fn handle_provider_death(&mut self, provider: &ProviderId) {
        let bound: Vec<CallId> = self
            .calls
            .iter()
            .filter(|c| c.provider() == Some(provider))
            .map(|c| c.id().clone())
            .collect();
        let attempting: Vec<CallId> = self
            .calls
            .iter()
            .filter(|c| c.provider().is_none())
            .filter(|c| {
                c.attempts()
                    .filter(|a| a.is_in_flight())
                    .and_then(|a| a.current())
                    .map(|account| &account.provider == provider)
                    .unwrap_or(false)
            })
            .map(|c| c.id().clone())
            .collect();
        warn!(
            "Provider {} died with {} calls and {} attempts in flight",
            provider,
            bound.len(),
            attempting.len()
        );

        for call_id in attempting {
            self.on_connection_failed(
                &call_id,
                DisconnectCause::with_reason(DisconnectCode::Error, "provider died"),
            );
        }

        for call_id in bound {
            let Some(call) = self.calls.get_mut(&call_id) else {
                continue;
            };
            if let Some(attempts) = call.attempts_mut() {
                attempts.abort();
            }
            if call.state() != CallState::Disconnected {
                call.set_disconnect_cause(DisconnectCause::with_reason(
                    DisconnectCode::Error,
                    "provider died",
                ));
                self.set_call_state(&call_id, CallState::Disconnected);
            }
            self.mark_call_as_removed(&call_id);
        }
    }
}
