//! Foreground selection and call-set queries

use crate::call::{CallRecord, CallSnapshot, CallState, LIVE_CALL_STATES, OUTGOING_CALL_STATES};
use crate::types::CallId;

use super::CallRegistry;

/// Foreground priority, highest first. A tier is only considered when no
/// call sits in an earlier one.
pub const FOREGROUND_TIERS: &[&[CallState]] = &[
    &[CallState::Ringing],
    &[CallState::Dialing, CallState::Connecting],
    &[CallState::Active],
    &[CallState::OnHold],
];

/// Pick the foreground among top-level calls
///
/// Within the winning tier the current foreground is kept if it is there,
/// otherwise the most recently added call wins. Pure: nothing is cached.
pub fn select_foreground<'a, I>(calls: I, current: Option<&CallId>) -> Option<CallId>
where
    I: IntoIterator<Item = &'a CallRecord>,
{
    let calls: Vec<&CallRecord> = calls.into_iter().collect();
    for tier in FOREGROUND_TIERS {
        let candidates: Vec<&CallRecord> = calls
            .iter()
            .copied()
            .filter(|c| tier.contains(&c.state()))
            .collect();
        let Some(last) = candidates.last() else {
            continue;
        };
        if let Some(current) = current {
            if candidates.iter().any(|c| c.id() == current) {
                return Some(current.clone());
            }
        }
        return Some(last.id().clone());
    }
    None
}

impl CallRegistry {
    /// First top-level call in one of `states`
    ///
    /// States are tried in the order given. For each, the foreground call
    /// wins over the others. `skip` is never returned.
    pub(super) fn first_call_with_state(&self, skip: Option<&CallId>, states: &[CallState]) -> Option<CallId> {
        let foreground = self
            .foreground
            .as_ref()
            .filter(|id| self.calls.is_tracked(id))
            .and_then(|id| self.calls.get(id))
            .filter(|c| c.parent().is_none() && Some(c.id()) != skip);

        for state in states {
            if let Some(call) = foreground.filter(|c| c.state() == *state) {
                return Some(call.id().clone());
            }
            if let Some(call) = self
                .calls
                .top_level()
                .find(|c| c.state() == *state && Some(c.id()) != skip)
            {
                return Some(call.id().clone());
            }
        }
        None
    }

    /// Top-level calls in one of `states`, not counting `except`
    pub(super) fn count_calls_with_state(&self, except: Option<&CallId>, states: &[CallState]) -> usize {
        self.calls
            .top_level()
            .filter(|c| Some(c.id()) != except && states.contains(&c.state()))
            .count()
    }

    pub(super) fn has_maximum_calls(&self, except: Option<&CallId>, states: &[CallState], limit: usize) -> bool {
        self.count_calls_with_state(except, states) >= limit
    }

    pub(super) fn has_maximum_live_calls(&self, except: Option<&CallId>) -> bool {
        self.has_maximum_calls(except, LIVE_CALL_STATES, self.config.limits.max_live_calls)
    }

    pub(super) fn has_maximum_held_calls(&self, except: Option<&CallId>) -> bool {
        self.has_maximum_calls(except, &[CallState::OnHold], self.config.limits.max_held_calls)
    }

    pub(super) fn has_maximum_outgoing_calls(&self, except: Option<&CallId>) -> bool {
        self.has_maximum_calls(except, OUTGOING_CALL_STATES, self.config.limits.max_outgoing_calls)
    }

    pub(super) fn has_maximum_ringing_calls(&self, except: Option<&CallId>) -> bool {
        self.has_maximum_calls(except, &[CallState::Ringing], self.config.limits.max_ringing_calls)
    }

    pub(super) fn has_maximum_dialing_calls(&self, except: Option<&CallId>) -> bool {
        self.has_maximum_calls(except, &[CallState::Dialing], self.config.limits.max_dialing_calls)
    }

    // Queries

    pub fn foreground_call(&self) -> Option<&CallId> {
        self.foreground.as_ref()
    }

    pub fn can_add_call(&self) -> bool {
        self.can_add_call
    }

    pub fn ringing_call(&self) -> Option<CallId> {
        self.first_call_with_state(None, &[CallState::Ringing])
    }

    pub fn active_call(&self) -> Option<CallId> {
        self.first_call_with_state(None, &[CallState::Active])
    }

    pub fn dialing_call(&self) -> Option<CallId> {
        self.first_call_with_state(None, &[CallState::Dialing])
    }

    pub fn held_call(&self) -> Option<CallId> {
        self.first_call_with_state(None, &[CallState::OnHold])
    }

    /// Call still being set up
    pub fn outgoing_call(&self) -> Option<CallId> {
        self.first_call_with_state(None, OUTGOING_CALL_STATES)
    }

    pub fn num_held_calls(&self) -> usize {
        self.calls
            .tracked()
            .filter(|c| c.parent().is_none() && c.state() == CallState::OnHold)
            .count()
    }

    pub fn has_emergency_call(&self) -> bool {
        self.calls.tracked().any(|c| c.is_emergency())
    }

    /// Any tracked call other than external ones
    pub fn has_any_calls(&self) -> bool {
        self.calls.tracked().any(|c| !c.is_external())
    }

    pub fn has_active_or_holding_call(&self) -> bool {
        self.first_call_with_state(None, &[CallState::Active, CallState::OnHold])
            .is_some()
    }

    pub fn has_ringing_call(&self) -> bool {
        self.ringing_call().is_some()
    }

    pub fn has_video_call(&self) -> bool {
        self.calls.tracked().any(|c| c.is_video_call())
    }

    pub fn snapshot(&self, call_id: &CallId) -> Option<CallSnapshot> {
        self.calls
            .get(call_id)
            .filter(|_| self.calls.is_tracked(call_id))
            .map(|c| c.snapshot())
    }

    /// Snapshots of every tracked call, in the order they were added
    pub fn calls(&self) -> Vec<CallSnapshot> {
        self.calls.tracked().map(|c| c.snapshot()).collect()
    }

    pub fn tracked_call_count(&self) -> usize {
        self.calls.tracked_ids().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::CallDirection;

    fn call(id: &str, state: CallState) -> CallRecord {
        let mut call = CallRecord::new(CallId::from(id), CallDirection::Outgoing, None);
        call.set_state(state);
        call
    }

    #[test]
    fn test_tiers_in_priority_order() {
        let held = call("held", CallState::OnHold);
        let active = call("active", CallState::Active);
        let ringing = call("ringing", CallState::Ringing);

        assert_eq!(
            select_foreground([&held, &active, &ringing], None),
            Some(CallId::from("ringing"))
        );
        assert_eq!(select_foreground([&held, &active], None), Some(CallId::from("active")));
        assert_eq!(select_foreground([&held], None), Some(CallId::from("held")));
        assert_eq!(select_foreground(std::iter::empty::<&CallRecord>(), None), None);
    }

    #[test]
    fn test_connecting_shares_dialing_tier() {
        let connecting = call("connecting", CallState::Connecting);
        let active = call("active", CallState::Active);
        assert_eq!(
            select_foreground([&active, &connecting], None),
            Some(CallId::from("connecting"))
        );
    }

    #[test]
    fn test_current_kept_within_tier() {
        let first = call("first", CallState::OnHold);
        let second = call("second", CallState::OnHold);
        assert_eq!(select_foreground([&first, &second], None), Some(CallId::from("second")));
        assert_eq!(
            select_foreground([&first, &second], Some(&CallId::from("first"))),
            Some(CallId::from("first"))
        );
    }

    #[test]
    fn test_new_and_ended_calls_never_foreground() {
        let new = call("new", CallState::New);
        let gone = call("gone", CallState::Disconnected);
        let select = call("select", CallState::SelectAccount);
        assert_eq!(select_foreground([&new, &gone, &select], None), None);
    }
}
