//! The conversation tracker: the one-stop facade over synchronizer, store,
//! bus, and gates.
//!
//! Each tracker owns its own state, so several conversations can be tracked
//! independently in one process. Messages are observed one at a time; a
//! tracker is not meant to be shared across threads, and a re-entrant
//! observe is rejected rather than interleaved.

use crate::catalog::PatternCatalog;
use crate::consumer::ConsumerModule;
use crate::events::{panic_message, ChangeEvent, EventBus};
use crate::extract::Extractor;
use crate::gates::{GateLedger, GateTrigger};
use crate::message::Message;
use crate::persist::SavedConversation;
use crate::store::StateStore;
use crate::sync::{SequenceError, SyncError, Synchronizer};
use std::panic::{catch_unwind, AssertUnwindSafe};
use thiserror::Error;
use tracing::{info, warn};

/// Errors surfaced by the tracker.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// `observe` was called while another observe was in flight.
    #[error("tracker is busy applying another message")]
    Busy,

    /// The message index did not match the store cursor. The caller should
    /// re-derive state with [`ConversationTracker::resync`].
    #[error(transparent)]
    Sequence(#[from] SequenceError),

    /// The supplied history itself was malformed; the tracker holds an
    /// empty store and automatic tracking is off until a valid history
    /// arrives.
    #[error("automatic tracking unavailable: history is malformed")]
    TrackingUnavailable,
}

/// Builder for a [`ConversationTracker`].
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    catalog: PatternCatalog,
    triggers: Vec<GateTrigger>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            catalog: PatternCatalog::builtin(),
            triggers: crate::gates::builtin_triggers(),
        }
    }
}

impl TrackerConfig {
    /// The built-in catalog and gate triggers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the pattern catalog.
    pub fn with_catalog(mut self, catalog: PatternCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Add a gate trigger on top of the built-ins.
    pub fn with_trigger(mut self, trigger: GateTrigger) -> Self {
        self.triggers.push(trigger);
        self
    }

    /// Build the tracker.
    pub fn build(self) -> ConversationTracker {
        let mut gates = GateLedger::new();
        for trigger in self.triggers {
            gates.add_trigger(trigger);
        }
        ConversationTracker {
            sync: Synchronizer::new(Extractor::new(self.catalog)),
            store: StateStore::new(),
            bus: EventBus::new(),
            gates,
            modules: Vec::new(),
            in_flight: false,
        }
    }
}

/// Owns the full tracking pipeline for one conversation.
pub struct ConversationTracker {
    sync: Synchronizer,
    store: StateStore,
    bus: EventBus,
    gates: GateLedger,
    modules: Vec<Box<dyn ConsumerModule>>,
    in_flight: bool,
}

impl Default for ConversationTracker {
    fn default() -> Self {
        TrackerConfig::new().build()
    }
}

impl ConversationTracker {
    /// A tracker over the built-in catalog and gates.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current state snapshot.
    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// The gate ledger.
    pub fn gates(&self) -> &GateLedger {
        &self.gates
    }

    /// The event bus, for registering raw subscribers.
    pub fn bus_mut(&mut self) -> &mut EventBus {
        &mut self.bus
    }

    /// Register a consumer module. Modules are dispatched after each
    /// accepted message, in registration order, after bus delivery.
    pub fn register_module(&mut self, module: Box<dyn ConsumerModule>) {
        self.modules.push(module);
    }

    /// Observe one new message and fold it into the state.
    ///
    /// Returns the change events the message produced. An index that does
    /// not match the cursor leaves all state untouched.
    pub fn observe(&mut self, message: &Message) -> Result<Vec<ChangeEvent>, TrackerError> {
        if self.in_flight {
            return Err(TrackerError::Busy);
        }
        self.in_flight = true;
        let result = self.sync.apply_one(&mut self.store, message, &mut self.bus);
        let events = match result {
            Ok(events) => events,
            Err(err) => {
                self.in_flight = false;
                return Err(err.into());
            }
        };

        self.gates.observe_store(&self.store);
        self.dispatch_modules(&events);
        self.in_flight = false;
        Ok(events)
    }

    /// Throw away the store and refold the whole history.
    ///
    /// Gates stay latched across a resync; only [`Self::reset`] unlatches
    /// them. A malformed history leaves an empty store and returns
    /// [`TrackerError::TrackingUnavailable`].
    pub fn resync(&mut self, history: &[Message]) -> Result<(), TrackerError> {
        // Replay is silent on the bus: subscribers already saw live events.
        let mut silent = EventBus::new();
        match self.sync.rebuild(history, &mut silent) {
            Ok(store) => {
                self.store = store;
                self.gates.observe_store(&self.store);
                info!(cursor = ?self.store.cursor(), "state resynchronized from history");
                Ok(())
            }
            Err(SyncError::MalformedHistory { position, source }) => {
                warn!(position, error = %source, "history malformed, tracking disabled");
                self.store = StateStore::new();
                Err(TrackerError::TrackingUnavailable)
            }
        }
    }

    /// Full reset: empty store and every gate back to locked.
    pub fn reset(&mut self) {
        self.store = StateStore::new();
        self.gates.reset();
    }

    /// Capture store and gates into a persistable snapshot.
    pub fn snapshot(&self) -> SavedConversation {
        SavedConversation::capture(&self.store, &self.gates)
    }

    /// Restore store and gates from a loaded snapshot.
    pub fn restore(&mut self, saved: SavedConversation) {
        self.gates.restore(saved.gates.clone());
        self.store = saved.into_store();
    }

    fn dispatch_modules(&mut self, events: &[ChangeEvent]) {
        for event in events {
            for module in &mut self.modules {
                let outcome =
                    catch_unwind(AssertUnwindSafe(|| module.on_event(event, &self.store)));
                match outcome {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        warn!(
                            module = module.name(),
                            kind = event.kind().name(),
                            error = %err,
                            "consumer module rejected event"
                        );
                    }
                    Err(panic) => {
                        let detail = panic_message(&panic);
                        warn!(
                            module = module.name(),
                            kind = event.kind().name(),
                            error = %detail,
                            "consumer module panicked"
                        );
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for ConversationTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationTracker")
            .field("cursor", &self.store.cursor())
            .field("modules", &self.modules.len())
            .finish()
    }
}
