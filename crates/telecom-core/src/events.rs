//! Subscriber notifications
//!
//! Every change the registry admits is broadcast as a [`TelecomEvent`].
//! Subscribers register an [`EventSubscription`] (a handler plus an
//! [`EventFilter`]) with the [`EventEmitter`], which delivers each event to
//! every matching subscription.
//!
//! Subscribers only observe. Anything they want to change goes back through
//! the service's command API.
//!
//! # Examples
//!
//! ```rust
//! use rvoip_telecom_core::events::{EventEmitter, EventSubscription, TelecomEvent, TelecomEventHandler};
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! struct LoggingHandler;
//!
//! #[async_trait]
//! impl TelecomEventHandler for LoggingHandler {
//!     async fn on_event(&self, event: TelecomEvent) {
//!         println!("{:?}", event);
//!     }
//! }
//!
//! let emitter = EventEmitter::new();
//! let id = emitter.subscribe(EventSubscription::all_events(Arc::new(LoggingHandler)));
//! assert_eq!(emitter.subscription_count(), 1);
//! assert!(emitter.unsubscribe(id));
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::audio::AudioStateSnapshot;
use crate::call::{Capabilities, CallSnapshot, CallState, ExtrasSource, Properties, VideoState};
use crate::provider::{CallDisposition, Extras};
use crate::types::{Address, CallId, ProviderId};

/// Event priority levels for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventPriority {
    /// Attribute updates
    Low,
    /// State and audio changes
    Normal,
    /// Calls appearing, disappearing or being answered
    High,
    /// Calls that need the user right now
    Critical,
}

/// Notification broadcast to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TelecomEvent {
    CallAdded { call: CallSnapshot },
    CallRemoved { call: CallSnapshot },
    CallStateChanged {
        call_id: CallId,
        old: CallState,
        new: CallState,
    },
    /// Parent or children of a call changed
    ConferenceChanged {
        call_id: CallId,
        parent: Option<CallId>,
        children: Vec<CallId>,
    },
    AudioStateChanged {
        old: AudioStateSnapshot,
        new: AudioStateSnapshot,
    },
    CapabilitiesChanged {
        call_id: CallId,
        capabilities: Capabilities,
    },
    PropertiesChanged {
        call_id: CallId,
        properties: Properties,
    },
    ExternalCallChanged { call_id: CallId, is_external: bool },
    VideoStateChanged {
        call_id: CallId,
        video_state: VideoState,
    },
    ExtrasChanged {
        call_id: CallId,
        source: ExtrasSource,
        extras: Extras,
    },
    HandleChanged {
        call_id: CallId,
        address: Option<Address>,
    },
    RingbackRequested { call_id: CallId, requested: bool },
    VoipAudioModeChanged { call_id: CallId, is_voip: bool },
    PostDialWait { call_id: CallId, remaining: String },
    ConnectionEvent { call_id: CallId, name: String },
    CanAddCallChanged { can_add_call: bool },
    ForegroundCallChanged {
        old: Option<CallId>,
        new: Option<CallId>,
    },
    IncomingCallAnswered { call_id: CallId },
    IncomingCallRejected {
        call_id: CallId,
        with_message: bool,
        text: Option<String>,
    },
    ConnectionServiceChanged {
        call_id: CallId,
        provider: Option<ProviderId>,
    },
    SessionModifyRequest {
        call_id: CallId,
        video_state: VideoState,
    },
    /// Ask the call log to record a call
    LogRequested {
        call: CallSnapshot,
        disposition: CallDisposition,
        notify: bool,
    },
    /// Ask the notification surface to show a missed call
    MissedCallNotification { call: CallSnapshot },
}

impl TelecomEvent {
    pub fn priority(&self) -> EventPriority {
        match self {
            TelecomEvent::CallStateChanged {
                new: CallState::Ringing,
                ..
            } => EventPriority::Critical,
            TelecomEvent::CallAdded { .. }
            | TelecomEvent::CallRemoved { .. }
            | TelecomEvent::IncomingCallAnswered { .. }
            | TelecomEvent::IncomingCallRejected { .. }
            | TelecomEvent::MissedCallNotification { .. } => EventPriority::High,
            TelecomEvent::CallStateChanged { .. }
            | TelecomEvent::ConferenceChanged { .. }
            | TelecomEvent::AudioStateChanged { .. }
            | TelecomEvent::ForegroundCallChanged { .. }
            | TelecomEvent::CanAddCallChanged { .. }
            | TelecomEvent::PostDialWait { .. }
            | TelecomEvent::SessionModifyRequest { .. }
            | TelecomEvent::LogRequested { .. } => EventPriority::Normal,
            _ => EventPriority::Low,
        }
    }

    /// The call this event concerns, if any
    pub fn call_id(&self) -> Option<&CallId> {
        match self {
            TelecomEvent::CallAdded { call }
            | TelecomEvent::CallRemoved { call }
            | TelecomEvent::LogRequested { call, .. }
            | TelecomEvent::MissedCallNotification { call } => Some(&call.call_id),
            TelecomEvent::CallStateChanged { call_id, .. }
            | TelecomEvent::ConferenceChanged { call_id, .. }
            | TelecomEvent::CapabilitiesChanged { call_id, .. }
            | TelecomEvent::PropertiesChanged { call_id, .. }
            | TelecomEvent::ExternalCallChanged { call_id, .. }
            | TelecomEvent::VideoStateChanged { call_id, .. }
            | TelecomEvent::ExtrasChanged { call_id, .. }
            | TelecomEvent::HandleChanged { call_id, .. }
            | TelecomEvent::RingbackRequested { call_id, .. }
            | TelecomEvent::VoipAudioModeChanged { call_id, .. }
            | TelecomEvent::PostDialWait { call_id, .. }
            | TelecomEvent::ConnectionEvent { call_id, .. }
            | TelecomEvent::IncomingCallAnswered { call_id }
            | TelecomEvent::IncomingCallRejected { call_id, .. }
            | TelecomEvent::ConnectionServiceChanged { call_id, .. }
            | TelecomEvent::SessionModifyRequest { call_id, .. } => Some(call_id),
            TelecomEvent::ForegroundCallChanged { new, .. } => new.as_ref(),
            TelecomEvent::AudioStateChanged { .. } | TelecomEvent::CanAddCallChanged { .. } => None,
        }
    }

    pub fn passes_filter(&self, filter: &EventFilter) -> bool {
        if let Some(min_priority) = filter.min_priority {
            if self.priority() < min_priority {
                return false;
            }
        }

        if let Some(call_ids) = &filter.call_ids {
            match self.call_id() {
                Some(call_id) if call_ids.contains(call_id) => {}
                _ => return false,
            }
        }

        if let Some(call_states) = &filter.call_states {
            if let TelecomEvent::CallStateChanged { new, .. } = self {
                if !call_states.contains(new) {
                    return false;
                }
            }
        }

        if filter.exclude_audio && matches!(self, TelecomEvent::AudioStateChanged { .. }) {
            return false;
        }

        true
    }
}

/// Which events a subscription receives
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Only events for these calls (None = all calls)
    pub call_ids: Option<HashSet<CallId>>,
    /// Only state changes into these states (None = all states)
    pub call_states: Option<HashSet<CallState>>,
    /// Minimum event priority (None = all priorities)
    pub min_priority: Option<EventPriority>,
    /// Drop audio route notifications
    pub exclude_audio: bool,
}

/// Receives events from the emitter
#[async_trait]
pub trait TelecomEventHandler: Send + Sync {
    async fn on_event(&self, event: TelecomEvent);
}

#[derive(Clone)]
pub struct EventSubscription {
    handler: Arc<dyn TelecomEventHandler>,
    filter: EventFilter,
    id: uuid::Uuid,
}

impl std::fmt::Debug for EventSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSubscription")
            .field("id", &self.id)
            .field("filter", &self.filter)
            .finish()
    }
}

impl EventSubscription {
    pub fn new(handler: Arc<dyn TelecomEventHandler>, filter: EventFilter) -> Self {
        Self {
            handler,
            filter,
            id: uuid::Uuid::new_v4(),
        }
    }

    pub fn all_events(handler: Arc<dyn TelecomEventHandler>) -> Self {
        Self::new(handler, EventFilter::default())
    }

    /// Events for one call only
    pub fn call_events(handler: Arc<dyn TelecomEventHandler>, call_id: CallId) -> Self {
        let mut call_ids = HashSet::new();
        call_ids.insert(call_id);
        Self::new(
            handler,
            EventFilter {
                call_ids: Some(call_ids),
                ..Default::default()
            },
        )
    }

    pub fn high_priority_events(handler: Arc<dyn TelecomEventHandler>) -> Self {
        Self::new(
            handler,
            EventFilter {
                min_priority: Some(EventPriority::High),
                ..Default::default()
            },
        )
    }

    pub fn id(&self) -> uuid::Uuid {
        self.id
    }

    pub fn should_receive(&self, event: &TelecomEvent) -> bool {
        event.passes_filter(&self.filter)
    }

    pub async fn deliver_event(&self, event: TelecomEvent) {
        if self.should_receive(&event) {
            self.handler.on_event(event).await;
        }
    }
}

/// Fan-out hub for subscriber notifications
pub struct EventEmitter {
    subscriptions: RwLock<Vec<EventSubscription>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(Vec::new()),
        }
    }

    pub fn subscribe(&self, subscription: EventSubscription) -> uuid::Uuid {
        let id = subscription.id();
        self.subscriptions.write().push(subscription);
        id
    }

    pub fn unsubscribe(&self, subscription_id: uuid::Uuid) -> bool {
        let mut subscriptions = self.subscriptions.write();
        if let Some(pos) = subscriptions.iter().position(|s| s.id() == subscription_id) {
            subscriptions.remove(pos);
            true
        } else {
            false
        }
    }

    /// Deliver to every matching subscription in parallel and wait for all
    pub async fn emit(&self, event: TelecomEvent) {
        let subscriptions = self.subscriptions.read().clone();

        let tasks: Vec<_> = subscriptions
            .into_iter()
            .filter(|subscription| subscription.should_receive(&event))
            .map(|subscription| {
                let event = event.clone();
                tokio::spawn(async move {
                    subscription.deliver_event(event).await;
                })
            })
            .collect();

        for result in futures::future::join_all(tasks).await {
            if let Err(e) = result {
                tracing::error!("Error delivering event: {}", e);
            }
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct Collector {
        events: Mutex<Vec<TelecomEvent>>,
    }

    #[async_trait]
    impl TelecomEventHandler for Collector {
        async fn on_event(&self, event: TelecomEvent) {
            self.events.lock().await.push(event);
        }
    }

    fn state_change(id: &str, new: CallState) -> TelecomEvent {
        TelecomEvent::CallStateChanged {
            call_id: CallId::from(id),
            old: CallState::New,
            new,
        }
    }

    #[test]
    fn test_priority_filter() {
        let filter = EventFilter {
            min_priority: Some(EventPriority::High),
            ..Default::default()
        };
        assert!(state_change("a", CallState::Ringing).passes_filter(&filter));
        assert!(!state_change("a", CallState::Active).passes_filter(&filter));
    }

    #[test]
    fn test_call_filter_drops_global_events() {
        let mut ids = HashSet::new();
        ids.insert(CallId::from("a"));
        let filter = EventFilter {
            call_ids: Some(ids),
            ..Default::default()
        };
        assert!(state_change("a", CallState::Active).passes_filter(&filter));
        assert!(!state_change("b", CallState::Active).passes_filter(&filter));
        assert!(!TelecomEvent::CanAddCallChanged { can_add_call: true }.passes_filter(&filter));
    }

    #[tokio::test]
    async fn test_emit_reaches_matching_subscriptions() {
        let emitter = EventEmitter::new();
        let all = Arc::new(Collector::default());
        let only_b = Arc::new(Collector::default());
        emitter.subscribe(EventSubscription::all_events(all.clone()));
        emitter.subscribe(EventSubscription::call_events(only_b.clone(), CallId::from("b")));

        emitter.emit(state_change("a", CallState::Dialing)).await;
        emitter.emit(state_change("b", CallState::Dialing)).await;

        assert_eq!(all.events.lock().await.len(), 2);
        assert_eq!(only_b.events.lock().await.len(), 1);
    }

    #[test]
    fn test_unsubscribe() {
        let emitter = EventEmitter::new();
        let id = emitter.subscribe(EventSubscription::high_priority_events(Arc::new(Collector::default())));
        assert!(emitter.unsubscribe(id));
        assert!(!emitter.unsubscribe(id));
        assert_eq!(emitter.subscription_count(), 0);
    }
}
