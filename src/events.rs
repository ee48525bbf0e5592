//! Typed change events and the in-process publish/subscribe bus.
//!
//! The synchronizer emits one event per category that actually changed,
//! plus an authoritative `ContextUpdated` carrying the full current
//! snapshot. Delivery is synchronous, in subscriber-registration order,
//! within the same logical turn as the mutation. A failing subscriber is
//! logged and isolated; it never blocks later subscribers or touches the
//! store.

use crate::identity::EntityRecord;
use crate::store::CurrentContext;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use thiserror::Error;
use tracing::warn;

/// Error returned by a subscriber handler; isolated and logged by the bus.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct SubscriberError(pub String);

impl SubscriberError {
    /// Create a subscriber error with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// The closed set of event kinds, used as subscription keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    LocationChanged,
    TerrainChanged,
    FactionEncountered,
    PersonDiscovered,
    ItemNoted,
    CombatStarted,
    CombatEnded,
    WeatherChanged,
    TimeChanged,
    ContextUpdated,
}

impl EventKind {
    /// Wire name of the kind.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::LocationChanged => "locationChanged",
            EventKind::TerrainChanged => "terrainChanged",
            EventKind::FactionEncountered => "factionEncountered",
            EventKind::PersonDiscovered => "personDiscovered",
            EventKind::ItemNoted => "itemNoted",
            EventKind::CombatStarted => "combatStarted",
            EventKind::CombatEnded => "combatEnded",
            EventKind::WeatherChanged => "weatherChanged",
            EventKind::TimeChanged => "timeChanged",
            EventKind::ContextUpdated => "contextUpdated",
        }
    }
}

/// The payload of a change event.
///
/// `ContextUpdated` is the authoritative full-state event; the others are
/// convenience deltas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Change {
    /// The current location changed.
    LocationChanged {
        location: String,
        // "kind" would collide with the enum tag on the wire.
        #[serde(rename = "type")]
        kind: Option<String>,
        tags: Vec<String>,
    },
    /// The terrain changed.
    TerrainChanged { terrain: String },
    /// A faction came into focus.
    FactionEncountered {
        faction: String,
        all_factions: Vec<String>,
    },
    /// A new person entered the registry.
    PersonDiscovered { entity: EntityRecord },
    /// A new item entered the registry.
    ItemNoted { entity: EntityRecord },
    /// Combat began.
    CombatStarted,
    /// Combat ended.
    CombatEnded,
    /// The weather changed.
    WeatherChanged { weather: String },
    /// The time of day changed.
    TimeChanged { time_of_day: String },
    /// Full current snapshot after a mutation; always emitted.
    ContextUpdated { current: CurrentContext },
}

impl Change {
    /// The kind discriminant of this change.
    pub fn kind(&self) -> EventKind {
        match self {
            Change::LocationChanged { .. } => EventKind::LocationChanged,
            Change::TerrainChanged { .. } => EventKind::TerrainChanged,
            Change::FactionEncountered { .. } => EventKind::FactionEncountered,
            Change::PersonDiscovered { .. } => EventKind::PersonDiscovered,
            Change::ItemNoted { .. } => EventKind::ItemNoted,
            Change::CombatStarted => EventKind::CombatStarted,
            Change::CombatEnded => EventKind::CombatEnded,
            Change::WeatherChanged { .. } => EventKind::WeatherChanged,
            Change::TimeChanged { .. } => EventKind::TimeChanged,
            Change::ContextUpdated { .. } => EventKind::ContextUpdated,
        }
    }
}

/// A change event as delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Store cursor at the moment of emission.
    pub emitted_at_cursor: u64,
    /// What changed.
    #[serde(flatten)]
    pub change: Change,
}

impl ChangeEvent {
    /// Build an event at a cursor.
    pub fn new(emitted_at_cursor: u64, change: Change) -> Self {
        Self {
            emitted_at_cursor,
            change,
        }
    }

    /// The kind discriminant.
    pub fn kind(&self) -> EventKind {
        self.change.kind()
    }
}

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Box<dyn FnMut(&ChangeEvent) -> Result<(), SubscriberError>>;

struct Subscriber {
    id: SubscriptionId,
    filter: Option<EventKind>,
    label: String,
    handler: Handler,
}

/// In-process publish/subscribe bus.
///
/// Instances are dependency-injected (typically owned by a
/// [`crate::tracker::ConversationTracker`]); there is no global registry,
/// so multiple independent conversations can coexist in one process.
#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<Subscriber>,
    next_id: u64,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to one event kind. Handlers run synchronously, in
    /// registration order, when a matching event is emitted.
    pub fn subscribe<F>(&mut self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: FnMut(&ChangeEvent) -> Result<(), SubscriberError> + 'static,
    {
        self.push(Some(kind), kind.name().to_string(), Box::new(handler))
    }

    /// Subscribe to every event kind.
    pub fn subscribe_all<F>(&mut self, handler: F) -> SubscriptionId
    where
        F: FnMut(&ChangeEvent) -> Result<(), SubscriberError> + 'static,
    {
        self.push(None, "all".to_string(), Box::new(handler))
    }

    fn push(&mut self, filter: Option<EventKind>, label: String, handler: Handler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.push(Subscriber {
            id,
            filter,
            label,
            handler,
        });
        id
    }

    /// Remove a subscription. Returns false if the id was already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| s.id != id);
        self.subscribers.len() != before
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Deliver one event to every matching subscriber.
    ///
    /// Handler errors and panics are logged and swallowed so one consumer
    /// cannot interrupt delivery to the rest.
    pub fn emit(&mut self, event: &ChangeEvent) {
        for subscriber in &mut self.subscribers {
            if let Some(kind) = subscriber.filter {
                if kind != event.kind() {
                    continue;
                }
            }
            let outcome = catch_unwind(AssertUnwindSafe(|| (subscriber.handler)(event)));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!(
                        subscriber = %subscriber.label,
                        kind = event.kind().name(),
                        error = %err,
                        "subscriber rejected event"
                    );
                }
                Err(panic) => {
                    let detail = panic_message(&panic);
                    warn!(
                        subscriber = %subscriber.label,
                        kind = event.kind().name(),
                        error = %detail,
                        "subscriber panicked during delivery"
                    );
                }
            }
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn context_event(cursor: u64) -> ChangeEvent {
        ChangeEvent::new(
            cursor,
            Change::ContextUpdated {
                current: CurrentContext::default(),
            },
        )
    }

    #[test]
    fn test_delivery_in_registration_order() {
        let mut bus = EventBus::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        for label in ["first", "second", "third"] {
            let order = Rc::clone(&order);
            bus.subscribe(EventKind::ContextUpdated, move |_| {
                order.borrow_mut().push(label);
                Ok(())
            });
        }

        bus.emit(&context_event(0));
        assert_eq!(*order.borrow(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_kind_filtering() {
        let mut bus = EventBus::new();
        let hits = Rc::new(RefCell::new(0u32));
        let counter = Rc::clone(&hits);
        bus.subscribe(EventKind::CombatStarted, move |_| {
            *counter.borrow_mut() += 1;
            Ok(())
        });

        bus.emit(&context_event(0));
        assert_eq!(*hits.borrow(), 0);

        bus.emit(&ChangeEvent::new(1, Change::CombatStarted));
        assert_eq!(*hits.borrow(), 1);
    }

    #[test]
    fn test_failing_subscriber_does_not_block_later_ones() {
        let mut bus = EventBus::new();
        let delivered = Rc::new(RefCell::new(false));

        bus.subscribe(EventKind::ContextUpdated, |_| {
            Err(SubscriberError::new("economy module out of coin"))
        });
        let flag = Rc::clone(&delivered);
        bus.subscribe(EventKind::ContextUpdated, move |_| {
            *flag.borrow_mut() = true;
            Ok(())
        });

        bus.emit(&context_event(0));
        assert!(*delivered.borrow());
    }

    #[test]
    fn test_panicking_subscriber_is_isolated() {
        let mut bus = EventBus::new();
        let delivered = Rc::new(RefCell::new(0u32));

        bus.subscribe(EventKind::ContextUpdated, |_| -> Result<(), SubscriberError> {
            panic!("handler bug");
        });
        let counter = Rc::clone(&delivered);
        bus.subscribe(EventKind::ContextUpdated, move |_| {
            *counter.borrow_mut() += 1;
            Ok(())
        });

        bus.emit(&context_event(0));
        bus.emit(&context_event(1));
        assert_eq!(*delivered.borrow(), 2);
    }

    #[test]
    fn test_unsubscribe() {
        let mut bus = EventBus::new();
        let hits = Rc::new(RefCell::new(0u32));
        let counter = Rc::clone(&hits);
        let id = bus.subscribe_all(move |_| {
            *counter.borrow_mut() += 1;
            Ok(())
        });

        bus.emit(&context_event(0));
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.emit(&context_event(1));

        assert_eq!(*hits.borrow(), 1);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_location_event_wire_shape() {
        let event = ChangeEvent::new(
            0,
            Change::LocationChanged {
                location: "tavern".to_string(),
                kind: Some("settlement".to_string()),
                tags: vec!["social".to_string()],
            },
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "LocationChanged");
        assert_eq!(json["location"], "tavern");
        assert_eq!(json["type"], "settlement");
        assert_eq!(json["tags"][0], "social");

        let back: ChangeEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_event_serialization_uses_kind_tag() {
        let event = ChangeEvent::new(
            4,
            Change::WeatherChanged {
                weather: "rain".to_string(),
            },
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "WeatherChanged");
        assert_eq!(json["weather"], "rain");
        assert_eq!(json["emitted_at_cursor"], 4);
    }
}
