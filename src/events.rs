//! Internal publish/subscribe channel between a coordinator and its
//! subordinate components (simulator watchdog, LED manager, display proxy).
//!
//! Events are small named strings on a topic, e.g. `"READY 3"` on the
//! component base topic. Subscriptions are drained non-blockingly at the top
//! of the owning coordinator's poll tick so that asynchronous reports only
//! ever influence the state machine between `advance` calls.

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

use arrayvec::ArrayString;
use tracing::warn;

pub const COMPONENT_BASE_TOPIC: &str = "component-base";
/// Topic for active-scenario change notifications to subordinates.
pub const SCENARIO_TOPIC: &str = "scenario";

pub const MAX_EVENT_BODY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub topic: &'static str,
    pub body: ArrayString<MAX_EVENT_BODY>,
}

impl Event {
    pub fn new(topic: &'static str, body: &str) -> Self {
        let mut buf = ArrayString::new();
        if buf.try_push_str(body).is_err() {
            warn!(topic, body, "event body truncated");
            for ch in body.chars() {
                if buf.try_push(ch).is_err() {
                    break;
                }
            }
        }
        Self { topic, body: buf }
    }
}

/// Component lifecycle reports exchanged on the base topic. The integer is
/// the target's registry index, not its bus component id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentEvent {
    Ready(u32),
    Error(u32),
    Reset(u32),
}

impl ComponentEvent {
    pub fn to_event(self) -> Event {
        let (tag, idx) = match self {
            ComponentEvent::Ready(idx) => ("READY", idx),
            ComponentEvent::Error(idx) => ("ERROR", idx),
            ComponentEvent::Reset(idx) => ("RESET", idx),
        };
        Event::new(COMPONENT_BASE_TOPIC, &format!("{tag} {idx}"))
    }

    pub fn parse(event: &Event) -> Option<Self> {
        if event.topic != COMPONENT_BASE_TOPIC {
            return None;
        }
        let (tag, idx) = event.body.split_once(' ')?;
        let idx: u32 = idx.parse().ok()?;
        match tag {
            "READY" => Some(ComponentEvent::Ready(idx)),
            "ERROR" => Some(ComponentEvent::Error(idx)),
            "RESET" => Some(ComponentEvent::Reset(idx)),
            _ => None,
        }
    }
}

/// Fan-out event channel: `publish` delivers a clone of the event to every
/// live subscription; subscriptions whose receiver is gone are pruned.
#[derive(Debug, Default)]
pub struct EventBus {
    senders: Vec<Sender<Event>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> Subscription {
        let (tx, rx) = mpsc::channel();
        self.senders.push(tx);
        Subscription { rx }
    }

    pub fn publish(&mut self, event: &Event) {
        self.senders
            .retain(|sender| sender.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.senders.len()
    }
}

#[derive(Debug)]
pub struct Subscription {
    rx: Receiver<Event>,
}

impl Subscription {
    /// Drain every pending event without blocking.
    pub fn drain(&mut self) -> Vec<Event> {
        let mut pending = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(event) => pending.push(event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_reaches_every_subscriber() {
        let mut bus = EventBus::new();
        let mut sub_a = bus.subscribe();
        let mut sub_b = bus.subscribe();

        bus.publish(&ComponentEvent::Reset(2).to_event());

        assert_eq!(sub_a.drain(), vec![Event::new(COMPONENT_BASE_TOPIC, "RESET 2")]);
        assert_eq!(sub_b.drain(), vec![Event::new(COMPONENT_BASE_TOPIC, "RESET 2")]);
    }

    #[test]
    fn test_drain_is_nonblocking_and_ordered() {
        let mut bus = EventBus::new();
        let mut sub = bus.subscribe();
        assert!(sub.drain().is_empty());

        bus.publish(&ComponentEvent::Ready(1).to_event());
        bus.publish(&ComponentEvent::Error(4).to_event());

        let drained = sub.drain();
        assert_eq!(ComponentEvent::parse(&drained[0]), Some(ComponentEvent::Ready(1)));
        assert_eq!(ComponentEvent::parse(&drained[1]), Some(ComponentEvent::Error(4)));
    }

    #[test]
    fn test_component_event_round_trip() {
        for event in [
            ComponentEvent::Ready(0),
            ComponentEvent::Error(6),
            ComponentEvent::Reset(3),
        ] {
            assert_eq!(ComponentEvent::parse(&event.to_event()), Some(event));
        }
    }

    #[test]
    fn test_foreign_topic_does_not_parse() {
        let event = Event::new("other-topic", "READY 1");
        assert_eq!(ComponentEvent::parse(&event), None);
    }

    #[test]
    fn test_dead_subscriptions_are_pruned() {
        let mut bus = EventBus::new();
        let sub = bus.subscribe();
        drop(sub);
        bus.publish(&ComponentEvent::Ready(0).to_event());
        assert_eq!(bus.subscriber_count(), 0);
    }
}
