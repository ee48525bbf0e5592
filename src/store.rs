//! The authoritative derived-state snapshot for one conversation.
//!
//! The store is mutated only by the synchronizer; everything else reads it.
//! Ordered maps keep serialization byte-stable, which the rebuild contract
//! (replay must reproduce the store exactly) relies on.

use crate::catalog::FactCategory;
use crate::identity::{EntityId, EntityRecord};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// The singleton slice of derived state: at most one current value per
/// category, plus the combat flag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurrentContext {
    /// Canonical name of the current location.
    pub location: Option<String>,
    /// Kind of the current location (settlement, wilderness, structure).
    pub location_kind: Option<String>,
    /// Current terrain.
    pub terrain: Option<String>,
    /// Most recently encountered faction.
    pub faction: Option<String>,
    /// Current weather.
    pub weather: Option<String>,
    /// Current time of day.
    pub time_of_day: Option<String>,
    /// Whether combat is underway.
    pub in_combat: bool,
}

/// Versioned snapshot of everything derived from a conversation so far.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateStore {
    current: CurrentContext,
    registries: BTreeMap<FactCategory, BTreeMap<EntityId, EntityRecord>>,
    tags: BTreeSet<String>,
    cursor: Option<u64>,
}

impl StateStore {
    /// A fresh, empty store with no messages folded in.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current singleton context.
    pub fn current(&self) -> &CurrentContext {
        &self.current
    }

    /// Index of the last message folded into the store, if any.
    pub fn cursor(&self) -> Option<u64> {
        self.cursor
    }

    /// The index the next message must carry to be accepted.
    pub fn next_index(&self) -> u64 {
        self.cursor.map(|c| c + 1).unwrap_or(0)
    }

    /// All tags accumulated from visited locations.
    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    /// Whether a tag has been accumulated.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Look up an entity record by id in its category registry.
    pub fn entity(&self, id: &EntityId) -> Option<&EntityRecord> {
        self.registries.values().find_map(|reg| reg.get(id))
    }

    /// All records of one category, in stable id order.
    pub fn entities_of(&self, category: FactCategory) -> Vec<&EntityRecord> {
        self.registries
            .get(&category)
            .map(|reg| reg.values().collect())
            .unwrap_or_default()
    }

    /// Number of known entities across all registries.
    pub fn entity_count(&self) -> usize {
        self.registries.values().map(|reg| reg.len()).sum()
    }

    /// Display names of every known faction, in stable order.
    pub fn known_factions(&self) -> Vec<String> {
        self.entities_of(FactCategory::Faction)
            .iter()
            .map(|record| record.display_name.clone())
            .collect()
    }

    /// The full registry map, for persistence capture.
    pub(crate) fn registries(&self) -> &BTreeMap<FactCategory, BTreeMap<EntityId, EntityRecord>> {
        &self.registries
    }

    /// Rebuild a store from persisted parts.
    pub(crate) fn from_parts(
        current: CurrentContext,
        registries: BTreeMap<FactCategory, BTreeMap<EntityId, EntityRecord>>,
        tags: BTreeSet<String>,
        cursor: Option<u64>,
    ) -> Self {
        Self {
            current,
            registries,
            tags,
            cursor,
        }
    }

    // Mutation is reserved for the synchronizer (and the resolver tests).

    pub(crate) fn current_mut(&mut self) -> &mut CurrentContext {
        &mut self.current
    }

    pub(crate) fn insert_record(&mut self, record: EntityRecord) {
        self.registries
            .entry(record.category)
            .or_default()
            .insert(record.id.clone(), record);
    }

    pub(crate) fn touch(&mut self, id: &EntityId, message_index: u64) {
        for registry in self.registries.values_mut() {
            if let Some(record) = registry.get_mut(id) {
                record.touch(message_index);
                return;
            }
        }
    }

    pub(crate) fn add_tags<I: IntoIterator<Item = String>>(&mut self, tags: I) {
        self.tags.extend(tags);
    }

    pub(crate) fn set_cursor(&mut self, index: u64) {
        self.cursor = Some(index);
    }
}
