//! Incoming and unknown calls, and the filter verdict that admits them

use tracing::{debug, info};

use crate::call::{CallDirection, CallRecord, CallState, ConnectionAttempts};
use crate::error::{TelecomError, TelecomResult};
use crate::events::TelecomEvent;
use crate::provider::{CallDisposition, FilterVerdict};
use crate::types::{AccountHandle, Address, CallId};

use super::CallRegistry;

impl CallRegistry {
    /// A provider announced a new incoming call on `account`
    pub fn process_incoming_call(
        &mut self,
        account: AccountHandle,
        address: Option<Address>,
    ) -> TelecomResult<CallId> {
        self.new_inbound_call(account, address, CallDirection::Incoming)
    }

    /// A provider found a call the core did not know about
    pub fn add_new_unknown_call(
        &mut self,
        account: AccountHandle,
        address: Option<Address>,
    ) -> TelecomResult<CallId> {
        self.new_inbound_call(account, address, CallDirection::Unknown)
    }

    fn new_inbound_call(
        &mut self,
        account: AccountHandle,
        address: Option<Address>,
        direction: CallDirection,
    ) -> TelecomResult<CallId> {
        if !self.accounts.contains(&account) {
            return Err(TelecomError::AccountNotFound { account });
        }
        let call_id = CallId::new();
        let mut call = CallRecord::new(call_id.clone(), direction, address);
        call.set_target_account(Some(account.clone()), self.accounts.supports_video(&account));
        call.set_connection_attempts(ConnectionAttempts::new(vec![account.clone()]));
        self.calls.insert(call);

        info!("New {:?} call {} on {}", direction, call_id, account);
        self.attempt_next_candidate(&call_id);
        self.settle();
        Ok(call_id)
    }

    /// Apply the incoming-call filter's verdict
    pub fn on_filter_verdict(&mut self, call_id: &CallId, verdict: FilterVerdict) -> TelecomResult<()> {
        let state = self.calls.require(call_id)?.state();
        info!("Filter verdict for call {}: {:?}", call_id, verdict);

        if !matches!(state, CallState::Disconnected | CallState::Disconnecting) {
            self.set_call_state(call_id, CallState::Ringing);
        }

        if verdict.allow {
            if self.has_maximum_ringing_calls(Some(call_id)) || self.has_maximum_dialing_calls(Some(call_id)) {
                info!("Rejecting call {}, ringing or dialing slot is full", call_id);
                self.reject_and_log(call_id);
            } else {
                self.track_call(call_id);
            }
        } else {
            // a blocked call is never tracked; its record stays in the table,
            // Ringing and invisible, until the provider reports it Removed
            if verdict.reject {
                let command = self
                    .calls
                    .get_mut(call_id)
                    .and_then(|c| c.reject(false, None));
                self.send(command);
            }
            if let Some(call) = self.calls.get(call_id).map(|c| c.snapshot()) {
                if verdict.add_to_log {
                    self.notify(TelecomEvent::LogRequested {
                        call,
                        disposition: CallDisposition::Missed,
                        notify: verdict.show_notification,
                    });
                } else if verdict.show_notification {
                    self.notify(TelecomEvent::MissedCallNotification { call });
                } else {
                    debug!("Call {} dropped without a trace", call_id);
                }
            }
        }
        self.settle();
        Ok(())
    }

    /// Reject a call the user never saw and log it as missed
    fn reject_and_log(&mut self, call_id: &CallId) {
        let command = self
            .calls
            .get_mut(call_id)
            .and_then(|c| c.reject(false, None));
        self.send(command);
        if let Some(call) = self.calls.get(call_id).map(|c| c.snapshot()) {
            self.notify(TelecomEvent::LogRequested {
                call,
                disposition: CallDisposition::Missed,
                notify: true,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::Effect;
    use super::*;
    use crate::provider::{ConnectionInfo, ProviderCommand, ProviderEvent};

    fn connected_incoming(registry: &mut CallRegistry) -> CallId {
        let id = registry
            .process_incoming_call(sim(), Some(Address::tel("5550123")))
            .unwrap();
        registry
            .on_provider_event(ProviderEvent::ConnectionCreated {
                call_id: id.clone(),
                info: ConnectionInfo::default(),
            })
            .unwrap();
        id
    }

    #[test]
    fn test_unknown_account_refused() {
        let (mut registry, _hw) = registry();
        let err = registry
            .process_incoming_call(AccountHandle::new("nobody", "x"), None)
            .unwrap_err();
        assert!(matches!(err, TelecomError::AccountNotFound { .. }));
    }

    #[test]
    fn test_connected_incoming_goes_to_filter() {
        let (mut registry, _hw) = registry();
        let id = connected_incoming(&mut registry);
        let effects = registry.take_effects();
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::FilterRequested(call) if call.call_id == id)));
        assert!(registry.snapshot(&id).is_none());
    }

    #[test]
    fn test_allowed_call_rings_and_is_tracked() {
        let (mut registry, _hw) = registry();
        let id = connected_incoming(&mut registry);
        registry.on_filter_verdict(&id, FilterVerdict::allow()).unwrap();
        assert_eq!(registry.ringing_call(), Some(id.clone()));
        assert_eq!(registry.foreground_call(), Some(&id));
    }

    #[test]
    fn test_second_ringing_call_rejected_and_logged() {
        let (mut registry, _hw) = registry();
        let first = connected_incoming(&mut registry);
        registry.on_filter_verdict(&first, FilterVerdict::allow()).unwrap();
        let second = connected_incoming(&mut registry);
        registry.take_effects();

        registry.on_filter_verdict(&second, FilterVerdict::allow()).unwrap();
        let effects = registry.take_effects();
        assert!(provider_commands(&effects).contains(&ProviderCommand::Reject {
            call_id: second.clone(),
            with_message: false,
            text: None,
        }));
        assert!(events(&effects).iter().any(|e| matches!(
            e,
            TelecomEvent::LogRequested { call, disposition: CallDisposition::Missed, notify: true }
                if call.call_id == second
        )));
        assert!(registry.snapshot(&second).is_none());
    }

    #[test]
    fn test_blocked_call_logged_silently() {
        let (mut registry, _hw) = registry();
        let id = connected_incoming(&mut registry);
        registry.take_effects();
        registry.on_filter_verdict(&id, FilterVerdict::block()).unwrap();
        let effects = registry.take_effects();
        assert_eq!(provider_commands(&effects).len(), 1);
        assert!(events(&effects).iter().any(|e| matches!(
            e,
            TelecomEvent::LogRequested { notify: false, .. }
        )));
    }

    #[test]
    fn test_blocked_call_kept_untracked_until_removed() {
        let (mut registry, _hw) = registry();
        let id = connected_incoming(&mut registry);
        let verdict = FilterVerdict {
            reject: false,
            ..FilterVerdict::block()
        };
        registry.on_filter_verdict(&id, verdict).unwrap();
        registry.take_effects();

        assert_eq!(registry.call(&id).map(|c| c.state()), Some(CallState::Ringing));
        assert!(registry.snapshot(&id).is_none());
        assert!(registry.calls().is_empty());
        assert_eq!(registry.ringing_call(), None);

        registry
            .on_provider_event(ProviderEvent::Removed { call_id: id.clone() })
            .unwrap();
        assert!(registry.call(&id).is_none());
        assert!(!events(&registry.take_effects())
            .iter()
            .any(|e| matches!(e, TelecomEvent::CallRemoved { .. })));
    }

    #[test]
    fn test_unknown_call_tracked_active() {
        let (mut registry, _hw) = registry();
        let id = registry.add_new_unknown_call(sim(), None).unwrap();
        registry
            .on_provider_event(ProviderEvent::ConnectionCreated {
                call_id: id.clone(),
                info: ConnectionInfo::default(),
            })
            .unwrap();
        assert_eq!(registry.active_call(), Some(id));
    }

    #[test]
    fn test_failed_incoming_dropped() {
        let (mut registry, _hw) = registry();
        let id = registry.process_incoming_call(sim(), None).unwrap();
        registry
            .on_provider_event(ProviderEvent::ConnectionFailed {
                call_id: id.clone(),
                cause: crate::call::DisconnectCause::new(crate::call::DisconnectCode::Error),
            })
            .unwrap();
        assert!(registry.call(&id).is_none());
        assert!(!events(&registry.take_effects())
            .iter()
            .any(|e| matches!(e, TelecomEvent::CallRemoved { .. })));
    }
}
