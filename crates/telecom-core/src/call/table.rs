//! Storage for call records and their conference links
//!
//! The table owns every record the registry knows about, tracked or not.
//! Parent/child links are only changed here so both sides always agree.

use std::collections::HashMap;

use tracing::{debug, warn};

use super::record::{CallEvent, CallRecord, StateChange};
use super::state::CallState;
use crate::error::{TelecomError, TelecomResult};
use crate::types::CallId;

#[derive(Debug, Default)]
pub struct CallTable {
    calls: HashMap<CallId, CallRecord>,
    /// Insertion order of all records
    order: Vec<CallId>,
    /// Tracked subset, in the order calls were tracked
    tracked: Vec<CallId>,
}

impl CallTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, call: CallRecord) {
        let id = call.id().clone();
        if self.calls.insert(id.clone(), call).is_none() {
            self.order.push(id);
        }
    }

    pub fn get(&self, id: &CallId) -> Option<&CallRecord> {
        self.calls.get(id)
    }

    pub fn get_mut(&mut self, id: &CallId) -> Option<&mut CallRecord> {
        self.calls.get_mut(id)
    }

    pub fn require(&self, id: &CallId) -> TelecomResult<&CallRecord> {
        self.calls.get(id).ok_or_else(|| TelecomError::call_not_found(id))
    }

    pub fn require_mut(&mut self, id: &CallId) -> TelecomResult<&mut CallRecord> {
        self.calls.get_mut(id).ok_or_else(|| TelecomError::call_not_found(id))
    }

    pub fn contains(&self, id: &CallId) -> bool {
        self.calls.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// All records in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &CallRecord> {
        self.order.iter().filter_map(|id| self.calls.get(id))
    }

    /// Drop a record, detaching it from its parent and its children
    pub fn remove(&mut self, id: &CallId) -> Option<CallRecord> {
        if !self.calls.contains_key(id) {
            return None;
        }
        if let Err(e) = self.set_parent(id, None) {
            debug!("Detaching {} from its parent: {}", id, e);
        }
        let children: Vec<CallId> = self
            .calls
            .get(id)
            .map(|c| c.children().to_vec())
            .unwrap_or_default();
        for child in children {
            if let Err(e) = self.set_parent(&child, None) {
                debug!("Detaching child {} of {}: {}", child, id, e);
            }
        }
        self.order.retain(|c| c != id);
        self.tracked.retain(|c| c != id);
        self.calls.remove(id)
    }

    // Tracked set

    /// Returns false if the call was already tracked or does not exist
    pub fn track(&mut self, id: &CallId) -> bool {
        if !self.calls.contains_key(id) || self.tracked.contains(id) {
            return false;
        }
        self.tracked.push(id.clone());
        true
    }

    pub fn untrack(&mut self, id: &CallId) -> bool {
        let before = self.tracked.len();
        self.tracked.retain(|c| c != id);
        self.tracked.len() != before
    }

    pub fn is_tracked(&self, id: &CallId) -> bool {
        self.tracked.contains(id)
    }

    pub fn tracked_ids(&self) -> &[CallId] {
        &self.tracked
    }

    pub fn tracked(&self) -> impl Iterator<Item = &CallRecord> {
        self.tracked.iter().filter_map(|id| self.calls.get(id))
    }

    /// Tracked calls that are not conference children
    pub fn top_level(&self) -> impl Iterator<Item = &CallRecord> {
        self.tracked().filter(|c| c.parent().is_none())
    }

    // Conference links

    /// Whether `ancestor` appears on the parent chain of `id`
    pub fn is_ancestor(&self, ancestor: &CallId, id: &CallId) -> bool {
        let mut cursor = self.calls.get(id).and_then(|c| c.parent().cloned());
        let mut hops = 0;
        while let Some(current) = cursor {
            if &current == ancestor {
                return true;
            }
            hops += 1;
            if hops > self.calls.len() {
                warn!("Parent chain of call {} does not terminate", id);
                return true;
            }
            cursor = self.calls.get(&current).and_then(|c| c.parent().cloned());
        }
        false
    }

    /// Attach `child` to `parent`, or detach it with `None`
    ///
    /// Returns whether anything changed. Moving a child straight from one
    /// parent to another is refused; detach it first.
    pub fn set_parent(&mut self, child: &CallId, parent: Option<CallId>) -> TelecomResult<bool> {
        let old = self.require(child)?.parent().cloned();
        if old == parent {
            return Ok(false);
        }
        if let Some(new_parent) = &parent {
            if new_parent == child {
                return Err(TelecomError::invalid_state(format!(
                    "call {} cannot be its own parent",
                    child
                )));
            }
            if !self.calls.contains_key(new_parent) {
                return Err(TelecomError::call_not_found(new_parent));
            }
            if self.is_ancestor(child, new_parent) {
                return Err(TelecomError::invalid_state(format!(
                    "call {} is an ancestor of {}",
                    child, new_parent
                )));
            }
            if old.is_some() {
                return Err(TelecomError::invalid_state(format!(
                    "call {} already has a parent",
                    child
                )));
            }
        }

        if let Some(old_parent) = &old {
            if let Some(record) = self.calls.get_mut(old_parent) {
                record.remove_child_link(child);
            }
        }
        if let Some(new_parent) = &parent {
            if let Some(record) = self.calls.get_mut(new_parent) {
                record.add_child_link(child.clone());
            }
        }
        if let Some(record) = self.calls.get_mut(child) {
            record.set_parent_link(parent.clone());
        }
        debug!("Call {} parent {:?} -> {:?}", child, old, parent);
        Ok(true)
    }

    /// Change a call's state, detaching it from its conference first when it
    /// is about to disconnect
    pub fn set_state(&mut self, id: &CallId, state: CallState) -> TelecomResult<StateChange> {
        let record = self.require(id)?;
        let detach = state == CallState::Disconnected
            && record.state() != CallState::Disconnected
            && record.parent().is_some()
            && !record.should_continue_processing_after_disconnect();
        if detach {
            self.set_parent(id, None)?;
        }
        Ok(self.require_mut(id)?.set_state(state))
    }

    /// Drain queued events from every record, in insertion order
    pub fn take_events(&mut self) -> Vec<(CallId, CallEvent)> {
        let mut out = Vec::new();
        for id in &self.order {
            if let Some(call) = self.calls.get_mut(id) {
                out.extend(call.take_events().into_iter().map(|e| (id.clone(), e)));
            }
        }
        out
    }
}
