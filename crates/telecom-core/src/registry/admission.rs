//! Admission control for outgoing calls

use tracing::{debug, info};

use crate::call::{Capabilities, CallState, LIVE_CALL_STATES, OUTGOING_CALL_STATES};
use crate::types::{AccountHandle, CallId};

use super::CallRegistry;

impl CallRegistry {
    /// Free a slot for `call_id`, holding or hanging up other calls as
    /// needed. Returns whether the call may proceed.
    pub(super) fn make_room_for_outgoing_call(
        &mut self,
        call_id: &CallId,
        account: Option<&AccountHandle>,
        is_emergency: bool,
    ) -> bool {
        // the candidate may already sit in SelectAccount; it never competes
        // with itself for a slot
        let candidate = Some(call_id);
        if !self.has_maximum_live_calls(candidate) {
            return true;
        }
        let Some(live) = self.first_call_with_state(candidate, LIVE_CALL_STATES) else {
            return true;
        };

        if self.has_maximum_outgoing_calls(candidate) {
            let Some(outgoing) = self.first_call_with_state(candidate, OUTGOING_CALL_STATES) else {
                return true;
            };
            let (outgoing_emergency, outgoing_state) = match self.calls.get(&outgoing) {
                Some(call) => (call.is_emergency(), call.state()),
                None => return true,
            };
            if is_emergency && !outgoing_emergency {
                info!("Emergency call {} preempts outgoing call {}", call_id, outgoing);
                self.disconnect_record(&outgoing, false);
                return true;
            }
            if outgoing_state == CallState::SelectAccount {
                info!("Dropping call {} still waiting for an account", outgoing);
                self.disconnect_record(&outgoing, false);
                return true;
            }
            info!("Outgoing slot taken by {}, denying {}", outgoing, call_id);
            return false;
        }

        if self.has_maximum_held_calls(candidate) {
            if is_emergency {
                info!("Emergency call {} disconnects live call {}", call_id, live);
                self.disconnect_record(&live, false);
                return true;
            }
            info!("Held slot full, denying {}", call_id);
            return false;
        }

        let live_account = self.live_call_account(&live);
        if live_account.as_ref() == account {
            debug!("Call {} shares an account with live call {}", call_id, live);
            return true;
        }
        if is_emergency {
            info!("Emergency call {} disconnects live call {}", call_id, live);
            self.disconnect_record(&live, false);
            return true;
        }
        if account.is_none() {
            // decided again once an account is selected
            return true;
        }

        let can_hold = self
            .calls
            .get(&live)
            .map(|c| c.can(Capabilities::HOLD))
            .unwrap_or(false);
        if can_hold {
            info!("Holding live call {} to make room for {}", live, call_id);
            let command = self.calls.get_mut(&live).and_then(|c| c.hold());
            self.send(command);
            return true;
        }

        info!("Live call {} cannot hold, denying {}", live, call_id);
        false
    }

    /// Account of the live call, or of its first child that has one when the
    /// live call is a conference
    fn live_call_account(&self, live: &CallId) -> Option<AccountHandle> {
        let call = self.calls.get(live)?;
        if let Some(account) = call.target_account() {
            return Some(account.clone());
        }
        if !call.is_conference() {
            return None;
        }
        call.children()
            .iter()
            .filter_map(|child| self.calls.get(child))
            .find_map(|child| child.target_account().cloned())
    }

    pub(super) fn compute_can_add_call(&self) -> bool {
        if self.first_call_with_state(None, OUTGOING_CALL_STATES).is_some() {
            return false;
        }
        let mut top_level = 0;
        for call in self.calls.tracked() {
            if call.is_emergency() {
                return false;
            }
            if call.parent().is_none() {
                top_level += 1;
            }
            if top_level >= self.config.limits.max_top_level_calls {
                return false;
            }
        }
        true
    }
}
