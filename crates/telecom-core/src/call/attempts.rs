//! Ordered provider candidates for establishing a call
//!
//! A call is handed to one account at a time. When that attempt fails, or
//! the call disconnects with an error while it is still being placed, the
//! registry moves on to the next candidate until the list is exhausted.

use std::collections::VecDeque;

use super::state::{DisconnectCause, DisconnectCode};
use crate::types::AccountHandle;

#[derive(Debug, Clone)]
pub struct ConnectionAttempts {
    remaining: VecDeque<AccountHandle>,
    current: Option<AccountHandle>,
    in_flight: bool,
    timed_out: bool,
    last_failure: Option<DisconnectCause>,
    attempted: usize,
}

impl ConnectionAttempts {
    pub fn new(candidates: Vec<AccountHandle>) -> Self {
        let mut remaining: VecDeque<AccountHandle> = VecDeque::with_capacity(candidates.len());
        for candidate in candidates {
            if !remaining.contains(&candidate) {
                remaining.push_back(candidate);
            }
        }
        Self {
            remaining,
            current: None,
            in_flight: false,
            timed_out: false,
            last_failure: None,
            attempted: 0,
        }
    }

    /// Take the next untried candidate and mark it in flight
    pub fn start_next(&mut self) -> Option<AccountHandle> {
        let next = self.remaining.pop_front()?;
        self.current = Some(next.clone());
        self.in_flight = true;
        self.timed_out = false;
        self.attempted += 1;
        Some(next)
    }

    /// Provider accepted the current candidate
    pub fn complete(&mut self) {
        self.in_flight = false;
    }

    /// Provider rejected the current candidate
    pub fn fail(&mut self, cause: DisconnectCause) {
        self.in_flight = false;
        self.last_failure = Some(cause);
    }

    /// Stop the in-flight attempt; no further candidates are tried
    pub fn abort(&mut self) {
        self.in_flight = false;
        self.remaining.clear();
    }

    pub fn mark_timed_out(&mut self) {
        self.timed_out = true;
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn is_complete(&self) -> bool {
        !self.in_flight
    }

    pub fn has_more_candidates(&self) -> bool {
        !self.remaining.is_empty()
    }

    pub fn is_timed_out(&self) -> bool {
        self.timed_out
    }

    pub fn current(&self) -> Option<&AccountHandle> {
        self.current.as_ref()
    }

    pub fn attempted(&self) -> usize {
        self.attempted
    }

    /// Cause to report once every candidate has failed
    pub fn terminal_cause(&self) -> DisconnectCause {
        self.last_failure
            .clone()
            .unwrap_or_else(|| DisconnectCause::new(DisconnectCode::Error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(id: &str) -> AccountHandle {
        AccountHandle::new("prov", id)
    }

    #[test]
    fn test_candidates_are_tried_in_order_once() {
        let mut attempts = ConnectionAttempts::new(vec![account("a"), account("b"), account("a")]);
        assert_eq!(attempts.start_next(), Some(account("a")));
        assert!(attempts.is_in_flight());
        attempts.fail(DisconnectCause::new(DisconnectCode::Busy));
        assert_eq!(attempts.start_next(), Some(account("b")));
        attempts.fail(DisconnectCause::new(DisconnectCode::Error));
        assert_eq!(attempts.start_next(), None);
        assert_eq!(attempts.attempted(), 2);
        assert_eq!(attempts.terminal_cause().code, DisconnectCode::Error);
    }

    #[test]
    fn test_abort_drops_remaining() {
        let mut attempts = ConnectionAttempts::new(vec![account("a"), account("b")]);
        attempts.start_next();
        attempts.abort();
        assert!(!attempts.has_more_candidates());
        assert!(attempts.is_complete());
    }
}
