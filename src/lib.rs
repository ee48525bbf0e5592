//! Narrative state tracking for role-play chat transcripts.
//!
//! This crate provides:
//! - Pattern-based fact extraction from free-form narration
//! - A deterministic, replayable state store keyed to message indices
//! - Typed change events over an in-process publish/subscribe bus
//! - Monotonic feature gates for downstream consumer modules
//! - Versioned JSON persistence of the derived state
//!
//! # Quick Start
//!
//! ```ignore
//! use chronicle_core::{ConversationTracker, Message};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut tracker = ConversationTracker::new();
//!
//!     tracker.bus_mut().subscribe_all(|event| {
//!         println!("{:?}", event.kind());
//!         Ok(())
//!     });
//!
//!     tracker.observe(&Message::narrator(0, "You enter the tavern."))?;
//!     assert_eq!(tracker.store().current().location.as_deref(), Some("tavern"));
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod consumer;
pub mod events;
pub mod extract;
pub mod gates;
pub mod identity;
pub mod message;
pub mod persist;
pub mod store;
pub mod sync;
pub mod tracker;

// Primary public API
pub use catalog::{FactCategory, PatternCatalog};
pub use consumer::{ConsumerModule, Cooldown};
pub use events::{Change, ChangeEvent, EventBus, EventKind, SubscriberError, SubscriptionId};
pub use extract::{CandidateFact, Extractor, Matcher};
pub use gates::{Gate, GateLedger, GateTrigger};
pub use identity::{EntityId, EntityRecord};
pub use message::{history_from_lines, Author, Message};
pub use persist::{PersistError, SaveMetadata, SavedConversation};
pub use store::{CurrentContext, StateStore};
pub use sync::{SequenceError, SyncError, Synchronizer};
pub use tracker::{ConversationTracker, TrackerConfig, TrackerError};
