//! Event bus built on tokio broadcast channels with a bounded replay buffer

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::types::{Event, EventEnvelope};

const DEFAULT_CAPACITY: usize = 1000;

/// Event bus for publishing and subscribing to task events.
///
/// Every published envelope is also kept in a ring buffer of the same
/// capacity, so SSE clients reconnecting with `Last-Event-ID` can catch up.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
    history: Arc<Mutex<VecDeque<EventEnvelope>>>,
    capacity: usize,
    event_count: Arc<AtomicUsize>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            history: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
            event_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Wrap `event` in an envelope and publish it.
    pub fn emit(&self, event: Event) -> usize {
        self.publish(EventEnvelope::new(event))
    }

    /// Publish an envelope to all subscribers.
    ///
    /// Returns the number of subscribers that received it; the envelope is
    /// still recorded in the replay buffer when nobody is listening.
    pub fn publish(&self, envelope: EventEnvelope) -> usize {
        self.event_count.fetch_add(1, Ordering::Relaxed);
        {
            let mut history = self
                .history
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if history.len() >= self.capacity {
                history.pop_front();
            }
            history.push_back(envelope.clone());
        }
        self.sender.send(envelope).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    /// Envelopes published after `event_id`, oldest first.
    ///
    /// An id that has already left the buffer yields nothing.
    pub fn events_after(&self, event_id: Uuid) -> Vec<EventEnvelope> {
        let history = self
            .history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match history.iter().position(|e| e.id == event_id) {
            Some(index) => history.iter().skip(index + 1).cloned().collect(),
            None => Vec::new(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn event_count(&self) -> usize {
        self.event_count.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .field("event_count", &self.event_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffered_for(bus: &EventBus, task_id: Uuid) -> Vec<EventEnvelope> {
        bus.history
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.event.task_id() == Some(task_id))
            .cloned()
            .collect()
    }

    fn accepted(task_id: Uuid) -> Event {
        Event::TaskAccepted {
            task_id,
            task: "demo".to_string(),
            round: 1,
        }
    }

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        let envelope = EventEnvelope::new(accepted(Uuid::new_v4()));
        let sent = bus.publish(envelope.clone());
        assert_eq!(sent, 1);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.id, envelope.id);
    }

    #[tokio::test]
    async fn test_no_subscribers_still_buffers() {
        let bus = EventBus::new();
        let task_id = Uuid::new_v4();

        assert_eq!(bus.emit(accepted(task_id)), 0);
        assert_eq!(buffered_for(&bus, task_id).len(), 1);
        assert_eq!(bus.event_count(), 1);
    }

    #[tokio::test]
    async fn test_events_arrive_in_publish_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let task_id = Uuid::new_v4();

        for attempt in 1..=3 {
            bus.emit(Event::ActAttempt { task_id, attempt });
        }

        for expected in 1..=3 {
            match rx.recv().await.unwrap().event {
                Event::ActAttempt { attempt, .. } => assert_eq!(attempt, expected),
                other => panic!("unexpected event {:?}", other),
            }
        }
    }

    #[test]
    fn test_events_after_replays_tail() {
        let bus = EventBus::new();
        let task_id = Uuid::new_v4();
        let first = EventEnvelope::new(accepted(task_id));
        bus.publish(first.clone());
        bus.emit(Event::ActAttempt {
            task_id,
            attempt: 1,
        });
        bus.emit(Event::ActAttempt {
            task_id,
            attempt: 2,
        });

        assert_eq!(bus.events_after(first.id).len(), 2);
        assert!(bus.events_after(Uuid::new_v4()).is_empty());
    }

    #[test]
    fn test_buffer_is_bounded() {
        let bus = EventBus::with_capacity(2);
        let task_id = Uuid::new_v4();
        for attempt in 1..=5 {
            bus.emit(Event::ActAttempt { task_id, attempt });
        }

        let history = buffered_for(&bus, task_id);
        assert_eq!(history.len(), 2);
        assert!(matches!(
            history[0].event,
            Event::ActAttempt { attempt: 4, .. }
        ));
    }

    #[test]
    fn test_clone_shares_channel() {
        let bus1 = EventBus::new();
        let bus2 = bus1.clone();

        let _rx = bus2.subscribe();
        assert_eq!(bus1.subscriber_count(), 1);
        assert_eq!(bus2.subscriber_count(), 1);
    }
}
