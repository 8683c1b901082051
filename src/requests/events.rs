// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Lifecycle events published to subscribers (approval UI, audit log, …).

use tokio::sync::broadcast::{self, error::RecvError};

use crate::models::{Proposal, Request, RequestStatus, Session};
use crate::risk::RiskAssessment;

/// Events buffered per subscriber before lagging ones start losing events.
const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub enum BridgeEvent {
    /// A new proposal awaits an approve/reject decision
    ProposalReceived {
        proposal: Proposal,
        risk: RiskAssessment,
    },
    SessionSettled(Session),
    SessionUpdated(Session),
    SessionClosed { topic: String },
    /// A request passed validation and was enqueued
    RequestPending(Request),
    /// A request carries its risk assessment and can be decided
    RequestAssessed(Request),
    /// A request reached a terminal state; its response was sent
    RequestResolved {
        id: u64,
        topic: String,
        status: RequestStatus,
    },
    /// `session_event` forwarded from the peer
    PeerEvent {
        topic: String,
        name: String,
        data: serde_json::Value,
    },
}

/// Fan-out of [`BridgeEvent`]s. Publishing never blocks or fails.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<BridgeEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            inner: self.sender.subscribe(),
        }
    }

    pub fn publish(&self, event: BridgeEvent) {
        // no subscribers is fine
        let _ = self.sender.send(event);
    }
}

/// One subscription to the [`EventBus`].
///
/// A subscriber that falls more than the bus capacity behind loses the
/// oldest events; the loss is logged and reception resumes with the oldest
/// event still buffered.
#[derive(Debug)]
pub struct EventReceiver {
    inner: broadcast::Receiver<BridgeEvent>,
}

impl EventReceiver {
    /// Next event, or `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<BridgeEvent> {
        loop {
            match self.inner.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event subscriber lagged, events dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_in_publish_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(BridgeEvent::SessionClosed { topic: "a".into() });
        bus.publish(BridgeEvent::SessionClosed { topic: "b".into() });

        for expected in ["a", "b"] {
            match rx.recv().await.unwrap() {
                BridgeEvent::SessionClosed { topic } => assert_eq!(topic, expected),
                other => panic!("unexpected event {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn lagging_subscriber_resumes_after_dropped_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        for i in 0..EVENT_CAPACITY + 10 {
            bus.publish(BridgeEvent::SessionClosed {
                topic: i.to_string(),
            });
        }

        match rx.recv().await {
            Some(BridgeEvent::SessionClosed { topic }) => assert_eq!(topic, "10"),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn closed_bus_ends_the_subscription() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        drop(bus);
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn publishing_without_subscribers_is_harmless() {
        EventBus::new().publish(BridgeEvent::SessionClosed { topic: "a".into() });
    }
}
