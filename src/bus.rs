//! Typed change-notification bus.
//!
//! Observers subscribe once and receive every [`ChangeEvent`] over a plain
//! mpsc channel; a dropped receiver is pruned on the next publish. The bus
//! never blocks publishers.

use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Mutex;

use crate::types::ChangeEvent;

#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Sender<ChangeEvent>>>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer. Events published after this call are delivered
    /// in publish order.
    pub fn subscribe(&self) -> Receiver<ChangeEvent> {
        let (tx, rx) = channel();
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(tx);
        }
        rx
    }

    /// Deliver an event to every live subscriber; returns how many received
    /// it.
    pub fn publish(&self, event: &ChangeEvent) -> usize {
        let Ok(mut subscribers) = self.subscribers.lock() else {
            return 0;
        };
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        tracing::trace!(
            event.doc = event.doc(),
            event.subscribers = subscribers.len(),
            "event published"
        );
        subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(doc: &str) -> ChangeEvent {
        ChangeEvent::TokensUpdated {
            doc: doc.to_string(),
            version: 1,
        }
    }

    #[test]
    fn subscribers_receive_in_order() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        bus.publish(&sample("a"));
        bus.publish(&sample("b"));
        assert_eq!(rx.recv().expect("first").doc(), "a");
        assert_eq!(rx.recv().expect("second").doc(), "b");
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let bus = EventBus::new();
        let rx1 = bus.subscribe();
        let rx2 = bus.subscribe();
        drop(rx1);
        assert_eq!(bus.publish(&sample("x")), 1);
        assert_eq!(rx2.recv().expect("still live").doc(), "x");
    }

    #[test]
    fn publish_without_subscribers_is_fine() {
        let bus = EventBus::new();
        assert_eq!(bus.publish(&sample("quiet")), 0);
    }
}
