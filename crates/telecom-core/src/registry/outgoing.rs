//! Outgoing call setup and connection attempts
//!
//! An outgoing call goes through three steps driven by the UI:
//! [`CallRegistry::start_outgoing_call`] creates (or reuses) the record and
//! makes room for it, the outgoing interceptor then either cancels it with
//! [`CallRegistry::cancel_outgoing_call`] or releases it with
//! [`CallRegistry::place_outgoing_call`], and if the user had to pick an
//! account, [`CallRegistry::phone_account_selected`] finishes the job.
//!
//! Connection attempts are shared with incoming and unknown calls: each
//! candidate account gets a `CreateConnection` in turn until one succeeds.

use tracing::{debug, info, warn};

use crate::call::{
    CallDirection, CallRecord, CallState, ConnectionAttempts, DisconnectCause, DisconnectCode,
    VideoState,
};
use crate::error::{TelecomError, TelecomResult};
use crate::events::TelecomEvent;
use crate::provider::{ConnectionInfo, ProviderCommand};
use crate::timer::TimerKey;
use crate::types::{AccountHandle, Address, CallId, SCHEME_TEL};

use super::{CallRegistry, Effect};

impl CallRegistry {
    /// Create an outgoing call to `address`
    ///
    /// Returns the id of the new or reused call. The call is not handed to a
    /// provider until [`CallRegistry::place_outgoing_call`].
    pub fn start_outgoing_call(
        &mut self,
        address: Address,
        account: Option<AccountHandle>,
        video_state: VideoState,
    ) -> TelecomResult<CallId> {
        let is_emergency = self.is_emergency_address(&address);
        let reused = self.reuse_outgoing_call(&address);
        let is_reused = reused.is_some();

        let call_id = match reused {
            Some(call_id) => call_id,
            None => {
                let call_id = CallId::new();
                let call = CallRecord::new(call_id.clone(), CallDirection::Outgoing, Some(address.clone()))
                    .with_emergency(is_emergency);
                self.calls.insert(call);
                call_id
            }
        };

        let mut video_state = video_state;
        if is_emergency && video_state.is_video() {
            let supported = account
                .as_ref()
                .map(|a| self.accounts.supports_emergency_video(a))
                .unwrap_or(true);
            if !supported {
                info!("Emergency call {} downgraded to audio only", call_id);
                video_state = VideoState::AUDIO_ONLY;
            }
        }

        let candidates = self.accounts.call_capable_accounts(address.scheme());
        let mut account = account.filter(|a| {
            let known = candidates.contains(a);
            if !known {
                warn!("Requested account {} cannot place {} calls", a, address.scheme());
            }
            known
        });
        if account.is_none() && !is_emergency {
            account = match candidates.as_slice() {
                [only] => Some(only.clone()),
                [] => None,
                _ => self
                    .accounts
                    .default_for_scheme(address.scheme())
                    .filter(|d| candidates.contains(d))
                    .cloned(),
            };
        }

        let supports_video = account
            .as_ref()
            .map(|a| self.accounts.supports_video(a))
            .unwrap_or(true);
        if let Some(call) = self.calls.get_mut(&call_id) {
            call.set_target_account(account.clone(), supports_video);
            call.set_video_state(video_state);
        }

        let in_call_mmi = address.is_potential_in_call_mmi_code();
        if !in_call_mmi
            && !is_reused
            && !self.make_room_for_outgoing_call(&call_id, account.as_ref(), is_emergency)
        {
            info!("No room for outgoing call to {}", address);
            if self.calls.is_tracked(&call_id) {
                self.disconnect_record(&call_id, false);
            } else {
                self.remove_call(&call_id);
            }
            self.settle();
            return Err(TelecomError::admission_denied(format!(
                "no room for a call to {}",
                address
            )));
        }

        let needs_account_selection = account.is_none() && candidates.len() > 1 && !is_emergency;
        let state = if needs_account_selection {
            CallState::SelectAccount
        } else {
            CallState::Connecting
        };
        self.set_call_state(&call_id, state);

        let is_mmi = address.is_potential_mmi_code() || in_call_mmi;
        if is_mmi && !needs_account_selection {
            debug!("Not tracking potential MMI code {}", address);
        } else {
            self.track_call(&call_id);
        }

        info!(
            "Started outgoing call {} to {} (emergency: {}, reused: {})",
            call_id, address, is_emergency, is_reused
        );
        self.settle();
        Ok(call_id)
    }

    /// Take a cancelled call to the same address out of the pending set,
    /// disconnecting every other pending call
    fn reuse_outgoing_call(&mut self, address: &Address) -> Option<CallId> {
        let pending = std::mem::take(&mut self.pending_disconnect);
        let mut reused = None;
        for call_id in pending {
            let matches = reused.is_none()
                && self
                    .calls
                    .get(&call_id)
                    .and_then(|c| c.address())
                    .map(|a| a.matches(address))
                    .unwrap_or(false);
            if matches {
                info!("Reusing cancelled call {} for {}", call_id, address);
                self.cancel_timer(TimerKey::NewOutgoingCallCancel(call_id.clone()));
                reused = Some(call_id);
            } else {
                info!("Not reusing call {}, disconnecting", call_id);
                self.cancel_timer(TimerKey::NewOutgoingCallCancel(call_id.clone()));
                self.disconnect_record(&call_id, false);
            }
        }
        reused
    }

    /// The outgoing interceptor released the call
    pub fn place_outgoing_call(
        &mut self,
        call_id: &CallId,
        speakerphone: bool,
        video_state: VideoState,
    ) -> TelecomResult<()> {
        let auto_speaker = self.is_speakerphone_auto_enabled(video_state);
        let call = self.calls.require_mut(call_id)?;
        call.set_interception_complete();
        call.set_start_with_speakerphone(speakerphone || auto_speaker);
        call.set_video_state(video_state);
        let is_emergency = call.is_emergency();
        if is_emergency {
            // any emergency-capable account will do
            call.set_target_account(None, true);
        }
        let account = call.target_account().cloned();
        let awaiting_admission = call.state() == CallState::SelectAccount;
        let scheme = call
            .address()
            .map(|a| a.scheme().to_string())
            .unwrap_or_else(|| SCHEME_TEL.to_string());

        if is_emergency {
            self.start_connection_attempts(call_id);
        } else if let Some(account) = account {
            if awaiting_admission {
                // picked while the interceptor still held the call
                self.admit_selected_account(call_id, &account);
            } else {
                self.start_connection_attempts(call_id);
            }
        } else if self.accounts.call_capable_accounts(&scheme).is_empty() {
            warn!("No registered accounts can place call {}", call_id);
            if let Some(call) = self.calls.get_mut(call_id) {
                call.set_disconnect_cause(DisconnectCause::with_reason(
                    DisconnectCode::Canceled,
                    "No registered accounts",
                ));
            }
            self.set_call_state(call_id, CallState::Disconnected);
            self.mark_call_as_removed(call_id);
        } else {
            debug!("Call {} waits for an account to be selected", call_id);
        }
        self.settle();
        Ok(())
    }

    /// The outgoing interceptor cancelled the call before it was placed
    pub fn cancel_outgoing_call(&mut self, call_id: &CallId) -> TelecomResult<()> {
        self.calls.require(call_id)?;
        self.disconnect_record(call_id, true);
        self.settle();
        Ok(())
    }

    /// The user picked an account for a call in SelectAccount
    pub fn phone_account_selected(
        &mut self,
        call_id: &CallId,
        account: AccountHandle,
        set_default: bool,
    ) -> TelecomResult<()> {
        self.require_tracked(call_id)?;
        if !self.accounts.contains(&account) {
            return Err(TelecomError::AccountNotFound { account });
        }
        let state = self.calls.require(call_id)?.state();
        if state != CallState::SelectAccount {
            return Err(TelecomError::invalid_state(format!(
                "call {} is {}, not waiting for an account",
                call_id, state
            )));
        }
        let supports_video = self.accounts.supports_video(&account);
        let call = self.calls.require_mut(call_id)?;
        call.set_target_account(Some(account.clone()), supports_video);
        let scheme = call
            .address()
            .map(|a| a.scheme().to_string())
            .unwrap_or_else(|| SCHEME_TEL.to_string());
        if !call.is_interception_complete() {
            debug!("Account selected for {} before interception finished", call_id);
            self.settle();
            return Ok(());
        }

        self.admit_selected_account(call_id, &account);
        if set_default {
            self.accounts.set_default_for_scheme(&scheme, account)?;
        }
        self.settle();
        Ok(())
    }

    /// Admission for a call that waited in SelectAccount, now that its
    /// account is known
    fn admit_selected_account(&mut self, call_id: &CallId, account: &AccountHandle) {
        if self.make_room_for_outgoing_call(call_id, Some(account), false) {
            self.set_call_state(call_id, CallState::Connecting);
            self.start_connection_attempts(call_id);
        } else {
            info!("No room for call {} on {}", call_id, account);
            self.disconnect_record(call_id, false);
        }
    }

    // Connection attempts

    /// Build the candidate list and try the first candidate
    pub(super) fn start_connection_attempts(&mut self, call_id: &CallId) {
        let Some(call) = self.calls.get(call_id) else {
            return;
        };
        let scheme = call
            .address()
            .map(|a| a.scheme().to_string())
            .unwrap_or_else(|| SCHEME_TEL.to_string());

        let mut candidates: Vec<AccountHandle> = call.target_account().cloned().into_iter().collect();
        if call.direction() == CallDirection::Outgoing {
            if call.is_emergency() {
                candidates.extend(self.accounts.emergency_accounts(&scheme));
            } else {
                candidates.extend(self.accounts.call_capable_accounts(&scheme));
            }
        }
        debug!("Call {} candidates {:?}", call_id, candidates);

        if let Some(call) = self.calls.get_mut(call_id) {
            call.set_connection_attempts(ConnectionAttempts::new(candidates));
        }
        self.attempt_next_candidate(call_id);
    }

    /// Hand the call to the next untried candidate, or fail it when none are
    /// left
    pub(super) fn attempt_next_candidate(&mut self, call_id: &CallId) {
        let Some(call) = self.calls.get_mut(call_id) else {
            return;
        };
        let Some(attempts) = call.attempts_mut() else {
            warn!("Call {} has no connection attempts", call_id);
            return;
        };

        match attempts.start_next() {
            Some(account) => {
                let attempt = attempts.attempted();
                let supports_video = self.accounts.supports_video(&account);
                call.set_target_account(Some(account.clone()), supports_video);
                call.clear_provider();
                let command = ProviderCommand::CreateConnection {
                    call_id: call_id.clone(),
                    account: account.clone(),
                    address: call.address().cloned(),
                    video_state: call.video_state(),
                    is_incoming: call.direction() == CallDirection::Incoming,
                    is_unknown: call.direction() == CallDirection::Unknown,
                    is_emergency: call.is_emergency(),
                };
                info!("Connection attempt {} for call {} via {}", attempt, call_id, account);
                self.send_to(account.provider.clone(), command);
                if let Some(timeout) = self.config.timeouts.connection_attempt_timeout() {
                    self.schedule_timer(TimerKey::ConnectionAttempt(call_id.clone()), timeout);
                }
            }
            None => {
                let cause = attempts.terminal_cause();
                warn!("No candidates left for call {}", call_id);
                self.fail_connection(call_id, cause);
            }
        }
    }

    pub(super) fn on_connection_failed(&mut self, call_id: &CallId, cause: DisconnectCause) {
        let in_flight = self
            .calls
            .get_mut(call_id)
            .and_then(|c| c.attempts_mut())
            .filter(|a| a.is_in_flight())
            .map(|a| a.fail(cause.clone()))
            .is_some();
        if !in_flight {
            debug!("Ignoring connection failure for call {} with no attempt in flight", call_id);
            return;
        }
        info!("Connection attempt for call {} failed: {}", call_id, cause);
        self.cancel_timer(TimerKey::ConnectionAttempt(call_id.clone()));
        self.attempt_next_candidate(call_id);
    }

    pub(super) fn on_connection_attempt_timeout(&mut self, call_id: &CallId) {
        let Some(attempts) = self
            .calls
            .get_mut(call_id)
            .and_then(|c| c.attempts_mut())
            .filter(|a| a.is_in_flight())
        else {
            return;
        };
        attempts.mark_timed_out();
        attempts.fail(DisconnectCause::with_reason(
            DisconnectCode::Error,
            "connection attempt timed out",
        ));
        let provider = attempts.current().map(|a| a.provider.clone());
        warn!("Connection attempt for call {} timed out", call_id);
        if let Some(provider) = provider {
            self.send_to(provider, ProviderCommand::Abort {
                call_id: call_id.clone(),
            });
        }
        self.attempt_next_candidate(call_id);
    }

    pub(super) fn on_connection_created(&mut self, call_id: &CallId, info: ConnectionInfo) {
        let Some(call) = self.calls.get_mut(call_id) else {
            return;
        };
        let Some(attempts) = call.attempts_mut().filter(|a| a.is_in_flight()) else {
            debug!("Ignoring late connection for call {}", call_id);
            return;
        };
        attempts.complete();
        let account = attempts.current().cloned();
        if let Some(account) = &account {
            call.bind_provider(account.provider.clone());
        }
        let direction = call.direction();
        self.cancel_timer(TimerKey::ConnectionAttempt(call_id.clone()));
        self.apply_connection_info(call_id, &info);

        match direction {
            CallDirection::Incoming => {
                if let Some(call) = self.calls.get(call_id) {
                    debug!("Incoming call {} connected, filtering", call_id);
                    let snapshot = call.snapshot();
                    self.effects.push(Effect::FilterRequested(snapshot));
                }
            }
            CallDirection::Outgoing => {
                if let Some(state) = info.state {
                    self.set_call_state(call_id, state);
                }
                self.track_call(call_id);
                if let Some(provider) = self.calls.get(call_id).and_then(|c| c.provider()).cloned() {
                    self.notify(TelecomEvent::ConnectionServiceChanged {
                        call_id: call_id.clone(),
                        provider: Some(provider),
                    });
                }
                self.set_call_state(call_id, CallState::Dialing);
            }
            CallDirection::Unknown | CallDirection::Undefined => {
                self.set_call_state(call_id, info.state.unwrap_or(CallState::Active));
                self.track_call(call_id);
            }
        }
    }

    /// Copy what the provider reported about a connection onto its record
    pub(super) fn apply_connection_info(&mut self, call_id: &CallId, info: &ConnectionInfo) {
        if let Some(call) = self.calls.get_mut(call_id) {
            call.set_connection_capabilities(info.capabilities, false);
            call.set_connection_properties(info.properties);
            call.set_video_state(info.video_state);
            if info.address.is_some() {
                call.set_address(info.address.clone());
            }
            call.put_extras(crate::call::ExtrasSource::Provider, info.extras.clone());
            if info.ringback_requested {
                call.set_ringback_requested(true);
            }
            if info.is_voip_audio_mode {
                call.set_voip_audio_mode(true);
            }
        }
        if let Some(parent) = &info.parent {
            if let Err(e) = self.reparent(call_id, Some(parent.clone())) {
                warn!("Call {} could not join conference {}: {}", call_id, parent, e);
            }
        }
    }
}
