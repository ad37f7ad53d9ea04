//! EventBusActor - topic-based pub/sub over ractor Process Groups
//!
//! Delivery plane for the sensor platform boundary: detectors publish cues,
//! the planner publishes lifecycle telemetry and sighting reports, and
//! downstream consumers subscribe by topic. Transport encoding and
//! persistence live outside this subsystem.
//!
//! - Uses `ractor::pg` for topic fanout (no custom subscriber management)
//! - Process groups are scoped per bus instance so independent buses
//!   (one per test, typically) never cross-deliver
//! - Supports wildcard topic patterns (e.g. "planner.task.*")

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ractor::{cast, Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Well-known topics at the subsystem boundary.
pub const TOPIC_CUE_DIRECTIONAL: &str = "object.sighting.directional";
pub const TOPIC_SIGHTING_RELATIVE: &str = "object.sighting.relative";

/// One event on the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BusEvent {
    /// Unique event identifier (ULID)
    pub id: String,

    /// Topic for routing (hierarchical, e.g. "planner.task.completed")
    pub topic: String,

    /// Event payload (JSON value)
    pub payload: serde_json::Value,

    /// Timestamp in UTC
    pub timestamp: DateTime<Utc>,

    /// Source component identifier
    pub source: String,
}

impl BusEvent {
    pub fn new(
        topic: impl Into<String>,
        payload: impl Serialize,
        source: impl Into<String>,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: ulid::Ulid::new().to_string(),
            topic: topic.into(),
            payload: serde_json::to_value(payload)?,
            timestamp: Utc::now(),
            source: source.into(),
        })
    }

    /// Check whether this event matches a topic pattern.
    /// Supports wildcards: "planner.*" matches "planner.task", "planner.cue".
    pub fn matches_topic(&self, pattern: &str) -> bool {
        if pattern == "*" {
            return true;
        }
        if let Some(prefix) = pattern.strip_suffix(".*") {
            self.topic.starts_with(prefix)
                && (self.topic.len() == prefix.len()
                    || self.topic[prefix.len()..].starts_with('.'))
        } else {
            self.topic == pattern
        }
    }
}

/// Messages handled by EventBusActor
#[derive(Debug)]
pub enum EventBusMsg {
    /// Publish an event to its topic (and any matching wildcard groups)
    Publish { event: BusEvent },

    /// Subscribe an actor to a topic or wildcard pattern
    Subscribe {
        topic: String,
        subscriber: ActorRef<BusEvent>,
    },

    /// Unsubscribe an actor from a topic
    Unsubscribe {
        topic: String,
        subscriber: ActorRef<BusEvent>,
    },

    /// Get subscriber ids for a topic (for debugging)
    GetSubscribers {
        topic: String,
        reply: RpcReplyPort<Vec<ractor::ActorId>>,
    },
}

/// State for EventBusActor
pub struct EventBusState {
    /// Per-instance scope prefix for process group names
    scope: String,

    /// Cache of topic -> subscriber count (for metrics/debugging)
    subscription_stats: HashMap<String, usize>,
}

impl EventBusState {
    fn group(&self, topic: &str) -> String {
        format!("{}:{}", self.scope, topic)
    }
}

#[derive(Debug, Default)]
pub struct EventBusActor;

#[async_trait]
impl Actor for EventBusActor {
    type Msg = EventBusMsg;
    type State = EventBusState;
    type Arguments = ();

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        _args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let scope = ulid::Ulid::new().to_string();
        tracing::info!(actor_id = %myself.get_id(), scope = %scope, "EventBusActor starting");
        Ok(EventBusState {
            scope,
            subscription_stats: HashMap::new(),
        })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            EventBusMsg::Publish { event } => self.handle_publish(event, state),
            EventBusMsg::Subscribe { topic, subscriber } => {
                self.handle_subscribe(topic, subscriber, state)
            }
            EventBusMsg::Unsubscribe { topic, subscriber } => {
                self.handle_unsubscribe(topic, subscriber, state)
            }
            EventBusMsg::GetSubscribers { topic, reply } => {
                let members = ractor::pg::get_members(&state.group(&topic));
                let ids = members.iter().map(|cell| cell.get_id()).collect();
                let _ = reply.send(ids);
                Ok(())
            }
        }
    }

    async fn post_stop(
        &self,
        myself: ActorRef<Self::Msg>,
        _state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        tracing::debug!(actor_id = %myself.get_id(), "EventBusActor stopped");
        Ok(())
    }
}

impl EventBusActor {
    fn handle_publish(
        &self,
        event: BusEvent,
        state: &mut EventBusState,
    ) -> Result<(), ActorProcessingErr> {
        tracing::debug!(
            event_id = %event.id,
            topic = %event.topic,
            source = %event.source,
            "Publishing event"
        );

        // Exact-topic subscribers first, then wildcard patterns.
        self.broadcast_to_group(&state.group(&event.topic), &event);

        let parts: Vec<&str> = event.topic.split('.').collect();
        for i in 1..parts.len() {
            let wildcard = format!("{}.*", parts[..i].join("."));
            self.broadcast_to_group(&state.group(&wildcard), &event);
        }
        self.broadcast_to_group(&state.group("*"), &event);

        Ok(())
    }

    fn handle_subscribe(
        &self,
        topic: String,
        subscriber: ActorRef<BusEvent>,
        state: &mut EventBusState,
    ) -> Result<(), ActorProcessingErr> {
        ractor::pg::join(state.group(&topic), vec![subscriber.get_cell()]);
        *state.subscription_stats.entry(topic.clone()).or_insert(0) += 1;
        tracing::debug!(
            topic = %topic,
            subscriber = %subscriber.get_id(),
            "Actor subscribed to topic"
        );
        Ok(())
    }

    fn handle_unsubscribe(
        &self,
        topic: String,
        subscriber: ActorRef<BusEvent>,
        state: &mut EventBusState,
    ) -> Result<(), ActorProcessingErr> {
        ractor::pg::leave(state.group(&topic), vec![subscriber.get_cell()]);
        if let Some(count) = state.subscription_stats.get_mut(&topic) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                state.subscription_stats.remove(&topic);
            }
        }
        tracing::debug!(
            topic = %topic,
            subscriber = %subscriber.get_id(),
            "Actor unsubscribed from topic"
        );
        Ok(())
    }

    fn broadcast_to_group(&self, group: &str, event: &BusEvent) {
        for member in ractor::pg::get_members(&group.to_string()) {
            let actor_id = member.get_id();
            let subscriber: ActorRef<BusEvent> = member.into();
            if let Err(e) = cast!(subscriber, event.clone()) {
                tracing::warn!(
                    group = %group,
                    actor_id = %actor_id,
                    error = %e,
                    "Failed to deliver event to subscriber"
                );
            }
        }
    }
}

/// Convenience function to publish an event
pub fn publish_event(
    event_bus: &ActorRef<EventBusMsg>,
    event: BusEvent,
) -> Result<(), ractor::RactorErr<EventBusMsg>> {
    cast!(event_bus, EventBusMsg::Publish { event })
}

/// Convenience function to subscribe to a topic
pub fn subscribe(
    event_bus: &ActorRef<EventBusMsg>,
    topic: impl Into<String>,
    subscriber: ActorRef<BusEvent>,
) -> Result<(), ractor::RactorErr<EventBusMsg>> {
    cast!(
        event_bus,
        EventBusMsg::Subscribe {
            topic: topic.into(),
            subscriber,
        }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use ractor::Actor;
    use tokio::sync::mpsc;

    fn sample_event(topic: &str) -> BusEvent {
        BusEvent::new(topic, serde_json::json!({"n": 1}), "test").unwrap()
    }

    #[test]
    fn matches_topic_exact() {
        let event = sample_event("planner.task.completed");
        assert!(event.matches_topic("planner.task.completed"));
        assert!(!event.matches_topic("planner.task"));
        assert!(!event.matches_topic("planner.task.completed.extra"));
    }

    #[test]
    fn matches_topic_wildcard() {
        let event = sample_event("planner.task.completed");
        assert!(event.matches_topic("planner.*"));
        assert!(event.matches_topic("planner.task.*"));
        assert!(event.matches_topic("*"));
        assert!(!event.matches_topic("object.*"));
        assert!(!event.matches_topic("planner.cue.*"));
    }

    /// Forwards bus events into an mpsc channel for assertions.
    #[derive(Debug, Default)]
    pub struct CollectorActor;

    #[async_trait]
    impl Actor for CollectorActor {
        type Msg = BusEvent;
        type State = mpsc::UnboundedSender<BusEvent>;
        type Arguments = mpsc::UnboundedSender<BusEvent>;

        async fn pre_start(
            &self,
            _myself: ActorRef<Self::Msg>,
            args: Self::Arguments,
        ) -> Result<Self::State, ActorProcessingErr> {
            Ok(args)
        }

        async fn handle(
            &self,
            _myself: ActorRef<Self::Msg>,
            message: Self::Msg,
            state: &mut Self::State,
        ) -> Result<(), ActorProcessingErr> {
            let _ = state.send(message);
            Ok(())
        }
    }

    #[tokio::test]
    async fn delivers_to_exact_and_wildcard_subscribers() {
        let (bus, _bus_handle) = Actor::spawn(None, EventBusActor, ()).await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let (collector, _handle) = Actor::spawn(None, CollectorActor, tx).await.unwrap();

        subscribe(&bus, "planner.task.*", collector.clone()).unwrap();

        publish_event(&bus, sample_event("planner.task.completed")).unwrap();
        let got = tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.topic, "planner.task.completed");

        // unrelated topic does not reach the subscriber
        publish_event(&bus, sample_event("object.sighting.directional")).unwrap();
        let quiet =
            tokio::time::timeout(std::time::Duration::from_millis(100), rx.recv()).await;
        assert!(quiet.is_err());

        collector.stop(None);
        bus.stop(None);
    }

    #[tokio::test]
    async fn independent_buses_do_not_cross_deliver() {
        let (bus_a, _ha) = Actor::spawn(None, EventBusActor, ()).await.unwrap();
        let (bus_b, _hb) = Actor::spawn(None, EventBusActor, ()).await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let (collector, _hc) = Actor::spawn(None, CollectorActor, tx).await.unwrap();

        subscribe(&bus_a, "object.sighting.relative", collector.clone()).unwrap();
        publish_event(&bus_b, sample_event("object.sighting.relative")).unwrap();

        let quiet =
            tokio::time::timeout(std::time::Duration::from_millis(100), rx.recv()).await;
        assert!(quiet.is_err(), "event leaked across bus instances");

        collector.stop(None);
        bus_a.stop(None);
        bus_b.stop(None);
    }
}
