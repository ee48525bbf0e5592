//! Identity resolution: normalized names, stable entity ids, and the
//! deduplication pass that separates novel facts from already-known entities.

use crate::catalog::FactCategory;
use crate::extract::CandidateFact;
use crate::store::StateStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Normalize a display name for identity purposes: lowercase, strip every
/// non-alphanumeric character (including whitespace).
pub fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Stable identifier for a known entity.
///
/// Derived purely from `(category, normalize(display_name))`, so the same
/// name always resolves to the same id within a category, and the same
/// normalized name in two categories yields two distinct ids.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Derive the id for a category and display name.
    pub fn derive(category: FactCategory, display_name: &str) -> Self {
        Self(format!("{}:{}", category.slug(), normalize(display_name)))
    }

    /// The underlying key string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A deduplicated knowledge-base entry for a place, faction, person or item.
///
/// Created on the first successful match, refreshed (never deleted by the
/// core) on every later one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Stable identity, derived from category + normalized display name.
    pub id: EntityId,
    /// Category this record lives under.
    pub category: FactCategory,
    /// Name as it first appeared in the narrative.
    pub display_name: String,
    /// Index of the message that introduced the entity.
    pub first_seen: u64,
    /// Index of the most recent message mentioning the entity.
    pub last_seen: u64,
    /// Free-form attributes carried over from extraction.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl EntityRecord {
    /// Build a record from a candidate fact seen at `message_index`.
    pub fn from_fact(fact: &CandidateFact, message_index: u64) -> Self {
        Self {
            id: EntityId::derive(fact.category, &fact.name),
            category: fact.category,
            display_name: fact.name.clone(),
            first_seen: message_index,
            last_seen: message_index,
            attributes: fact.attributes.clone(),
        }
    }

    /// Refresh the last-seen index.
    pub(crate) fn touch(&mut self, message_index: u64) {
        self.last_seen = message_index;
    }
}

/// Result of resolving one message's candidates against the registries.
#[derive(Debug)]
pub struct Resolution<'a> {
    /// Candidates with no existing record; these become new entities.
    pub novel: Vec<&'a CandidateFact>,
    /// Ids of entities that were already known and should be refreshed.
    pub known: Vec<EntityId>,
}

/// Classify registry-category candidates as novel or known.
///
/// Non-registry categories (weather, terrain, time, combat signals) pass
/// through the synchronizer directly and are ignored here. Two candidates in
/// the same message that normalize to the same id are collapsed to one.
pub fn resolve<'a>(candidates: &'a [CandidateFact], store: &StateStore) -> Resolution<'a> {
    let mut novel: Vec<&'a CandidateFact> = Vec::new();
    let mut known: Vec<EntityId> = Vec::new();
    let mut seen_this_message: Vec<EntityId> = Vec::new();

    for fact in candidates {
        if !fact.category.has_registry() {
            continue;
        }
        let id = EntityId::derive(fact.category, &fact.name);
        if seen_this_message.contains(&id) {
            continue;
        }
        seen_this_message.push(id.clone());

        if store.entity(&id).is_some() {
            known.push(id);
        } else {
            novel.push(fact);
        }
    }

    Resolution { novel, known }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::CandidateFact;

    #[test]
    fn test_normalize_strips_case_and_punctuation() {
        assert_eq!(normalize("Iron Sword"), "ironsword");
        assert_eq!(normalize("iron-sword!"), "ironsword");
        assert_eq!(normalize("  IRON  sword  "), "ironsword");
    }

    #[test]
    fn test_id_stability_across_variants() {
        let a = EntityId::derive(FactCategory::Item, "Iron Sword");
        let b = EntityId::derive(FactCategory::Item, "iron sword");
        let c = EntityId::derive(FactCategory::Item, "Iron-Sword!");
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn test_ids_are_category_scoped() {
        let place = EntityId::derive(FactCategory::Location, "Raven");
        let person = EntityId::derive(FactCategory::Person, "Raven");
        assert_ne!(place, person);
    }

    #[test]
    fn test_resolve_splits_novel_and_known() {
        let mut store = StateStore::new();
        let known_fact = CandidateFact::simple(FactCategory::Person, "Elena", "Elena");
        store.insert_record(EntityRecord::from_fact(&known_fact, 0));

        let candidates = vec![
            CandidateFact::simple(FactCategory::Person, "Elena", "Elena says"),
            CandidateFact::simple(FactCategory::Person, "Marcus", "Marcus nods"),
        ];
        let resolution = resolve(&candidates, &store);

        assert_eq!(resolution.known.len(), 1);
        assert_eq!(resolution.novel.len(), 1);
        assert_eq!(resolution.novel[0].name, "Marcus");
    }

    #[test]
    fn test_resolve_collapses_duplicates_within_message() {
        let store = StateStore::new();
        let candidates = vec![
            CandidateFact::simple(FactCategory::Item, "Iron Sword", "[+1 Iron Sword]"),
            CandidateFact::simple(FactCategory::Item, "iron sword", "an iron sword"),
        ];
        let resolution = resolve(&candidates, &store);
        assert_eq!(resolution.novel.len(), 1);
        assert!(resolution.known.is_empty());
    }

    #[test]
    fn test_resolve_ignores_non_registry_categories() {
        let store = StateStore::new();
        let candidates = vec![
            CandidateFact::simple(FactCategory::Weather, "rain", "rain"),
            CandidateFact::simple(FactCategory::CombatSignal, "engaged", "attack"),
        ];
        let resolution = resolve(&candidates, &store);
        assert!(resolution.novel.is_empty());
        assert!(resolution.known.is_empty());
    }
}
