//! Cancellable deferred events
//!
//! Each armed timer is a tokio task that sleeps and then queues
//! `ServiceCommand::TimerFired` back onto the service inbox. Re-arming or
//! cancelling a key aborts the task. A generation number guards against a
//! firing that was already queued when the timer was cancelled.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::service::ServiceCommand;
use crate::types::CallId;

/// What a timer is for
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum TimerKey {
    /// Stop the local post-dial tone
    DtmfToneStop(CallId),
    /// Reuse window for a cancelled outgoing call has closed
    NewOutgoingCallCancel(CallId),
    /// Provider did not answer a connection attempt in time
    ConnectionAttempt(CallId),
}

impl TimerKey {
    pub fn call_id(&self) -> &CallId {
        match self {
            TimerKey::DtmfToneStop(id)
            | TimerKey::NewOutgoingCallCancel(id)
            | TimerKey::ConnectionAttempt(id) => id,
        }
    }
}

/// Timer request produced by the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerRequest {
    Schedule { key: TimerKey, delay: Duration },
    Cancel { key: TimerKey },
}

struct ArmedTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

pub struct TimerManager {
    tx: mpsc::Sender<ServiceCommand>,
    timers: HashMap<TimerKey, ArmedTimer>,
    next_generation: u64,
}

impl TimerManager {
    pub fn new(tx: mpsc::Sender<ServiceCommand>) -> Self {
        Self {
            tx,
            timers: HashMap::new(),
            next_generation: 0,
        }
    }

    pub fn apply(&mut self, request: TimerRequest) {
        match request {
            TimerRequest::Schedule { key, delay } => self.schedule(key, delay),
            TimerRequest::Cancel { key } => {
                self.cancel(&key);
            }
        }
    }

    /// Arm `key`, replacing any timer already armed for it
    pub fn schedule(&mut self, key: TimerKey, delay: Duration) {
        self.cancel(&key);
        self.next_generation += 1;
        let generation = self.next_generation;
        let tx = self.tx.clone();
        let fired = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if tx
                .send(ServiceCommand::TimerFired {
                    key: fired,
                    generation,
                })
                .await
                .is_err()
            {
                trace!("Service stopped before timer fired");
            }
        });
        debug!("Armed timer {:?} for {:?}", key, delay);
        self.timers.insert(key, ArmedTimer { generation, handle });
    }

    pub fn cancel(&mut self, key: &TimerKey) -> bool {
        match self.timers.remove(key) {
            Some(timer) => {
                timer.handle.abort();
                debug!("Cancelled timer {:?}", key);
                true
            }
            None => false,
        }
    }

    /// Accept a firing if it belongs to the timer currently armed for `key`
    pub fn take_fired(&mut self, key: &TimerKey, generation: u64) -> bool {
        match self.timers.get(key) {
            Some(timer) if timer.generation == generation => {
                self.timers.remove(key);
                true
            }
            _ => {
                debug!("Dropping stale firing of {:?}", key);
                false
            }
        }
    }

    pub fn is_armed(&self, key: &TimerKey) -> bool {
        self.timers.contains_key(key)
    }

    pub fn armed_count(&self) -> usize {
        self.timers.len()
    }

    pub fn cancel_all(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.handle.abort();
        }
    }
}

impl Drop for TimerManager {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_once() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut timers = TimerManager::new(tx);
        let key = TimerKey::DtmfToneStop(CallId::from("c"));
        timers.schedule(key.clone(), Duration::from_millis(300));

        match rx.recv().await {
            Some(ServiceCommand::TimerFired { key: fired, generation }) => {
                assert_eq!(fired, key);
                assert!(timers.take_fired(&fired, generation));
                assert!(!timers.is_armed(&key));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_invalidates_old_generation() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut timers = TimerManager::new(tx);
        let key = TimerKey::NewOutgoingCallCancel(CallId::from("c"));
        timers.schedule(key.clone(), Duration::from_millis(400));
        timers.schedule(key.clone(), Duration::from_millis(400));
        assert_eq!(timers.armed_count(), 1);
        assert!(!timers.take_fired(&key, 1));

        if let Some(ServiceCommand::TimerFired { generation, .. }) = rx.recv().await {
            assert_eq!(generation, 2);
        } else {
            panic!("timer did not fire");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_firing() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut timers = TimerManager::new(tx);
        let key = TimerKey::ConnectionAttempt(CallId::from("c"));
        timers.schedule(key.clone(), Duration::from_millis(100));
        assert!(timers.cancel(&key));
        tokio::time::advance(Duration::from_millis(200)).await;
        assert!(rx.try_recv().is_err());
    }
}
