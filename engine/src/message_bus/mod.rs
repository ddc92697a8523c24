//! Message Bus for fire-and-forget side effects
//!
//! Task lifecycle notifications, audit records and escalations leave the
//! task path through this bus. Subscribers get bounded channels; publishing
//! uses `try_send`, so a slow or dead subscriber drops events instead of
//! stalling the task that emitted them.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::warn;

use crate::db::EscalationRecord;

/// Channel buffer size for bounded channels
const CHANNEL_BUFFER_SIZE: usize = 256;

/// Event types that can be published on the message bus
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum EventType {
    TaskStarted,
    TaskCompleted,
    TaskFailed,
    TaskCancelled,
    /// A manager wrote an audit record
    ActivityLogged,
    /// A manager escalated to its supervisor
    Escalated,
    /// An escalation reached the top of the hierarchy
    OperatorAlert,
    /// Subscribe to all event types
    All,
}

/// Events that can be published on the message bus
#[derive(Debug, Clone)]
pub enum Event {
    TaskStarted {
        task_id: String,
        agent_id: String,
        requester_id: String,
    },
    TaskCompleted {
        task_id: String,
        agent_id: String,
    },
    TaskFailed {
        task_id: String,
        agent_id: String,
        error: String,
    },
    TaskCancelled {
        task_id: String,
    },
    ActivityLogged {
        agent_id: String,
        requester_id: String,
        event: String,
        metadata: serde_json::Value,
    },
    Escalated(EscalationRecord),
    OperatorAlert(EscalationRecord),
}

impl Event {
    /// Get the event type for this event
    pub fn event_type(&self) -> EventType {
        match self {
            Event::TaskStarted { .. } => EventType::TaskStarted,
            Event::TaskCompleted { .. } => EventType::TaskCompleted,
            Event::TaskFailed { .. } => EventType::TaskFailed,
            Event::TaskCancelled { .. } => EventType::TaskCancelled,
            Event::ActivityLogged { .. } => EventType::ActivityLogged,
            Event::Escalated(_) => EventType::Escalated,
            Event::OperatorAlert(_) => EventType::OperatorAlert,
        }
    }
}

/// Message bus for pub/sub communication between components
#[derive(Clone)]
pub struct MessageBus {
    /// Subscribers per event type, each with a bounded channel
    channels: Arc<Mutex<HashMap<EventType, Vec<mpsc::Sender<Event>>>>>,
}

impl MessageBus {
    /// Create a new MessageBus
    pub fn new() -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Subscribe to a specific event type, or `EventType::All`
    pub async fn subscribe(&self, event_type: EventType) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let mut channels = self.channels.lock().await;
        channels.entry(event_type).or_default().push(tx);
        rx
    }

    /// Publish an event without waiting on subscribers
    ///
    /// Closed subscribers are pruned. Full channels drop the event.
    pub async fn publish(&self, event: Event) {
        let mut channels = self.channels.lock().await;
        let event_type = event.event_type();

        for key in [event_type, EventType::All] {
            if let Some(subscribers) = channels.get_mut(&key) {
                subscribers.retain(|tx| match tx.try_send(event.clone()) {
                    Ok(()) => true,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!("Message bus subscriber full, dropping {:?}", event_type);
                        true
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => false,
                });
            }
        }
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}
