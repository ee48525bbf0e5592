//! Synchronization: folds candidate facts into the state store and emits
//! change events.
//!
//! There is deliberately one mutation path. `rebuild` is nothing more than
//! `apply_one` folded over the history from an empty store, so the
//! incremental and replay paths cannot diverge.

use crate::catalog::FactCategory;
use crate::events::{Change, ChangeEvent, EventBus};
use crate::extract::{Extractor, Matcher, ATTR_KIND, ATTR_TAGS, COMBAT_CLEAR, COMBAT_ENGAGED};
use crate::identity::{resolve, EntityId, EntityRecord};
use crate::message::Message;
use crate::store::StateStore;
use thiserror::Error;
use tracing::{debug, warn};

/// `apply_one` was called with a non-contiguous message index.
///
/// Recoverable: the caller re-derives state with [`Synchronizer::rebuild`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("out-of-order message: expected index {expected}, found {found}")]
pub struct SequenceError {
    /// The index the store would have accepted.
    pub expected: u64,
    /// The index that was offered.
    pub found: u64,
}

/// Errors from replaying a full history.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A history whose indices are not contiguous from zero; automatic
    /// tracking cannot proceed and the caller falls back to an empty store.
    #[error("malformed history at position {position}: {source}")]
    MalformedHistory {
        position: usize,
        source: SequenceError,
    },
}

/// Applies messages to a [`StateStore`] and emits [`ChangeEvent`]s.
pub struct Synchronizer<M = Extractor> {
    matcher: M,
}

impl Synchronizer<Extractor> {
    /// Synchronizer over the built-in pattern catalog.
    pub fn builtin() -> Self {
        Self::new(Extractor::builtin())
    }
}

impl<M: Matcher> Synchronizer<M> {
    /// Create a synchronizer over any matcher implementation.
    pub fn new(matcher: M) -> Self {
        Self { matcher }
    }

    /// The matcher in use.
    pub fn matcher(&self) -> &M {
        &self.matcher
    }

    /// Fold one message into the store.
    ///
    /// The message index must equal `store.next_index()`; anything else is a
    /// [`SequenceError`] and the store is left untouched. A message that
    /// matches nothing is not an error: the cursor still advances and only
    /// `ContextUpdated` is emitted. Returns the events produced, which are
    /// also delivered through `bus` as they are created.
    pub fn apply_one(
        &self,
        store: &mut StateStore,
        message: &Message,
        bus: &mut EventBus,
    ) -> Result<Vec<ChangeEvent>, SequenceError> {
        let expected = store.next_index();
        if message.index != expected {
            return Err(SequenceError {
                expected,
                found: message.index,
            });
        }

        let candidates = self.matcher.scan(message);
        let before = store.current().clone();

        // Registry pass: create novel records, refresh known ones.
        let resolution = resolve(&candidates, store);
        let novel_ids: Vec<EntityId> = resolution
            .novel
            .iter()
            .map(|fact| EntityId::derive(fact.category, &fact.name))
            .collect();
        let novel_records: Vec<EntityRecord> = resolution
            .novel
            .iter()
            .map(|fact| EntityRecord::from_fact(fact, message.index))
            .collect();
        for record in novel_records {
            store.insert_record(record);
        }
        for id in &resolution.known {
            store.touch(id, message.index);
        }

        // Singleton pass: overwrite current values, union location tags.
        let mut location_tags: Vec<String> = Vec::new();
        for fact in &candidates {
            match fact.category {
                FactCategory::Location => {
                    let current = store.current_mut();
                    current.location = Some(fact.name.clone());
                    current.location_kind = fact.attributes.get(ATTR_KIND).cloned();
                    location_tags = fact
                        .attributes
                        .get(ATTR_TAGS)
                        .map(|joined| {
                            joined
                                .split(',')
                                .filter(|t| !t.is_empty())
                                .map(|t| t.to_string())
                                .collect()
                        })
                        .unwrap_or_default();
                    store.add_tags(location_tags.iter().cloned());
                }
                FactCategory::Terrain => {
                    store.current_mut().terrain = Some(fact.name.clone());
                }
                FactCategory::Faction => {
                    store.current_mut().faction = Some(fact.name.clone());
                }
                FactCategory::Weather => {
                    store.current_mut().weather = Some(fact.name.clone());
                }
                FactCategory::TimeOfDay => {
                    store.current_mut().time_of_day = Some(fact.name.clone());
                }
                FactCategory::CombatSignal => match fact.name.as_str() {
                    COMBAT_ENGAGED => store.current_mut().in_combat = true,
                    COMBAT_CLEAR => store.current_mut().in_combat = false,
                    // A single ambiguous signal leaves the state alone.
                    _ => {}
                },
                FactCategory::Person | FactCategory::Item => {}
            }
        }

        store.set_cursor(message.index);

        let events = self.collect_events(store, &before, &novel_ids, &location_tags, message.index);
        for event in &events {
            bus.emit(event);
        }

        debug!(
            index = message.index,
            candidates = candidates.len(),
            events = events.len(),
            "message folded into store"
        );

        Ok(events)
    }

    /// Replay an entire history into a fresh store.
    ///
    /// Equivalent by construction to calling [`Self::apply_one`] for every
    /// message in ascending order starting from an empty store. A history
    /// whose indices are not contiguous from zero yields
    /// [`SyncError::MalformedHistory`].
    pub fn rebuild(
        &self,
        history: &[Message],
        bus: &mut EventBus,
    ) -> Result<StateStore, SyncError> {
        let mut store = StateStore::new();
        for (position, message) in history.iter().enumerate() {
            self.apply_one(&mut store, message, bus)
                .map_err(|source| {
                    warn!(
                        position,
                        index = message.index,
                        "malformed history, falling back"
                    );
                    SyncError::MalformedHistory { position, source }
                })?;
        }
        Ok(store)
    }

    /// Diff the store against the pre-mutation context and build the event
    /// list: one delta per changed category, then the authoritative
    /// `ContextUpdated`.
    fn collect_events(
        &self,
        store: &StateStore,
        before: &crate::store::CurrentContext,
        novel_ids: &[EntityId],
        location_tags: &[String],
        cursor: u64,
    ) -> Vec<ChangeEvent> {
        let after = store.current();
        let mut events = Vec::new();
        let mut push = |change: Change| events.push(ChangeEvent::new(cursor, change));

        if after.location != before.location {
            if let Some(location) = &after.location {
                push(Change::LocationChanged {
                    location: location.clone(),
                    kind: after.location_kind.clone(),
                    tags: location_tags.to_vec(),
                });
            }
        }
        if after.terrain != before.terrain {
            if let Some(terrain) = &after.terrain {
                push(Change::TerrainChanged {
                    terrain: terrain.clone(),
                });
            }
        }
        if after.faction != before.faction {
            if let Some(faction) = &after.faction {
                push(Change::FactionEncountered {
                    faction: faction.clone(),
                    all_factions: store.known_factions(),
                });
            }
        }
        for id in novel_ids {
            if let Some(record) = store.entity(id) {
                match record.category {
                    FactCategory::Person => push(Change::PersonDiscovered {
                        entity: record.clone(),
                    }),
                    FactCategory::Item => push(Change::ItemNoted {
                        entity: record.clone(),
                    }),
                    _ => {}
                }
            }
        }
        if after.in_combat != before.in_combat {
            push(if after.in_combat {
                Change::CombatStarted
            } else {
                Change::CombatEnded
            });
        }
        if after.weather != before.weather {
            if let Some(weather) = &after.weather {
                push(Change::WeatherChanged {
                    weather: weather.clone(),
                });
            }
        }
        if after.time_of_day != before.time_of_day {
            if let Some(time_of_day) = &after.time_of_day {
                push(Change::TimeChanged {
                    time_of_day: time_of_day.clone(),
                });
            }
        }
        push(Change::ContextUpdated {
            current: after.clone(),
        });

        events
    }
}
