//! Conference commands and membership changes

use tracing::{info, warn};

use crate::call::{CallRecord, CallState};
use crate::error::{TelecomError, TelecomResult};
use crate::provider::{ConnectionInfo, ProviderCommand};
use crate::types::{AccountHandle, CallId, ProviderId};

use super::CallRegistry;

impl CallRegistry {
    /// Ask the provider of `call_id` to conference it with `other`
    pub fn conference(&mut self, call_id: &CallId, other: &CallId) -> TelecomResult<()> {
        self.require_tracked(call_id)?;
        self.require_tracked(other)?;
        info!("Conferencing call {} with {}", call_id, other);
        self.send(Some(ProviderCommand::Conference {
            call_id: call_id.clone(),
            other: other.clone(),
        }));
        self.settle();
        Ok(())
    }

    pub fn split_from_conference(&mut self, call_id: &CallId) -> TelecomResult<()> {
        self.require_tracked(call_id)?;
        let call = self.calls.require(call_id)?;
        let Some(parent) = call.parent() else {
            return Err(TelecomError::invalid_state(format!(
                "call {} is not part of a conference",
                call_id
            )));
        };
        info!("Splitting call {} from conference {}", call_id, parent);
        self.send(Some(ProviderCommand::SplitFromConference {
            call_id: call_id.clone(),
        }));
        self.settle();
        Ok(())
    }

    pub fn merge_conference(&mut self, call_id: &CallId) -> TelecomResult<()> {
        self.require_tracked(call_id)?;
        let command = self.calls.require_mut(call_id)?.merge_conference()?;
        self.send(Some(command));
        self.settle();
        Ok(())
    }

    pub fn swap_conference(&mut self, call_id: &CallId) -> TelecomResult<()> {
        self.require_tracked(call_id)?;
        let call = self.calls.require_mut(call_id)?;
        let command = call.swap_conference()?;
        info!(
            "Swapped conference {}, active child now {:?}",
            call_id,
            call.conference_level_active_child()
        );
        self.send(Some(command));
        self.settle();
        Ok(())
    }

    /// Move a call into or out of a conference as the provider reports it
    ///
    /// A move straight between two conferences detaches from the old one
    /// first.
    pub(super) fn reparent(&mut self, call_id: &CallId, parent: Option<CallId>) -> TelecomResult<()> {
        let old = self.calls.require(call_id)?.parent().cloned();
        if old.is_some() && parent.is_some() && old != parent {
            self.calls.set_parent(call_id, None)?;
        }
        self.calls.set_parent(call_id, parent)?;
        Ok(())
    }

    /// A provider created a conference on its own
    pub(super) fn on_conference_created(
        &mut self,
        call_id: CallId,
        provider: ProviderId,
        account: Option<AccountHandle>,
        info: ConnectionInfo,
    ) {
        if self.calls.contains(&call_id) {
            warn!("Provider {} created conference {} twice", provider, call_id);
            return;
        }
        let supports_video = account
            .as_ref()
            .map(|a| self.accounts.supports_video(a))
            .unwrap_or(true);
        let mut call = CallRecord::new_conference(call_id.clone(), provider.clone());
        call.set_target_account(account, supports_video);
        self.calls.insert(call);

        self.set_call_state(&call_id, info.state.unwrap_or(CallState::Active));
        self.apply_connection_info(&call_id, &info);
        info!("Provider {} created conference {}", provider, call_id);
        self.track_call(&call_id);
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::call::{Capabilities, VideoState};
    use crate::events::TelecomEvent;
    use crate::provider::ProviderEvent;
    use crate::types::Address;

    fn conference_of_two(registry: &mut CallRegistry) -> (CallId, CallId, CallId) {
        let a = outgoing_in_state(registry, "5550100", CallState::OnHold);
        let b = outgoing_in_state(registry, "5550101", CallState::Active);
        let conf = CallId::from("conf-1");
        registry
            .on_provider_event(ProviderEvent::ConferenceCreated {
                call_id: conf.clone(),
                provider: ProviderId::from("telephony"),
                account: Some(sim()),
                info: ConnectionInfo {
                    capabilities: Capabilities::SWAP_CONFERENCE | Capabilities::MERGE_CONFERENCE,
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
        (conf, a, b)
    }

    #[test]
    fn test_conference_created_is_tracked_and_foreground() {
        let (mut registry, _hw) = registry();
        let (conf, a, b) = conference_of_two(&mut registry);
        let snapshot = registry.snapshot(&conf).unwrap();
        assert!(snapshot.is_conference);
        assert_eq!(snapshot.children, vec![a.clone(), b.clone()]);
        assert_eq!(registry.foreground_call(), Some(&conf));
        assert_eq!(registry.snapshot(&a).unwrap().parent, Some(conf));
    }

    #[test]
    fn test_swap_toggles_active_child() {
        let (mut registry, _hw) = registry();
        let (conf, a, b) = conference_of_two(&mut registry);
        assert_eq!(
            registry.call(&conf).unwrap().conference_level_active_child(),
            Some(&b)
        );
        registry.swap_conference(&conf).unwrap();
        assert_eq!(
            registry.call(&conf).unwrap().conference_level_active_child(),
            Some(&a)
        );
        let commands = provider_commands(&registry.take_effects());
        assert_eq!(commands, vec![ProviderCommand::SwapConference { call_id: conf }]);
    }

    #[test]
    fn test_split_requires_parent() {
        let (mut registry, _hw) = registry();
        let (conf, a, _b) = conference_of_two(&mut registry);
        assert!(matches!(
            registry.split_from_conference(&conf),
            Err(TelecomError::InvalidState { .. })
        ));
        registry.split_from_conference(&a).unwrap();
        let commands = provider_commands(&registry.take_effects());
        assert_eq!(commands, vec![ProviderCommand::SplitFromConference { call_id: a }]);
    }

    #[test]
    fn test_moving_between_conferences_detaches_first() {
        let (mut registry, _hw) = registry();
        let (conf, a, _b) = conference_of_two(&mut registry);
        let other = CallId::from("conf-2");
        registry
            .on_provider_event(ProviderEvent::ConferenceCreated {
                call_id: other.clone(),
                provider: ProviderId::from("telephony"),
                account: None,
                info: ConnectionInfo::default(),
            })
            .unwrap();
        registry
            .on_provider_event(ProviderEvent::SetParent {
                call_id: a.clone(),
                parent: Some(other.clone()),
            })
            .unwrap();
        assert!(!registry.call(&conf).unwrap().children().contains(&a));
        assert_eq!(registry.call(&other).unwrap().children(), &[a.clone()]);

        let effects = registry.take_effects();
        assert!(events(&effects).iter().any(|e| matches!(
            e,
            TelecomEvent::ConferenceChanged { call_id, parent: Some(p), .. } if call_id == &a && p == &other
        )));
    }

    #[test]
    fn test_conference_requires_tracked_calls() {
        let (mut registry, _hw) = registry();
        let a = outgoing_in_state(&mut registry, "5550100", CallState::Active);
        let untracked = registry
            .start_outgoing_call(Address::tel("*#31#"), None, VideoState::AUDIO_ONLY)
            .unwrap();
        assert!(registry.conference(&a, &untracked).is_err());
    }
}
