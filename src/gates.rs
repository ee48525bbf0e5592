//! Monotonic feature-unlock gates.
//!
//! Consumer modules check a gate before doing generation work. A locked gate
//! means "produce nothing and discard what would have been produced", not
//! "queue for later". Once a gate latches open it stays open for the rest of
//! the conversation; a full state reset is the only way back.

use crate::store::StateStore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// State of one gate. The unlocked variant remembers the cursor at which it
/// opened so diagnostics can explain when and why.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state")]
pub enum Gate {
    /// Not yet triggered.
    Locked,
    /// Triggered at the given store cursor; stays open.
    Unlocked {
        /// Cursor of the message whose state opened the gate.
        since_cursor: u64,
    },
}

impl Gate {
    /// Whether the gate is open.
    pub fn is_open(&self) -> bool {
        matches!(self, Gate::Unlocked { .. })
    }
}

/// A condition that opens a gate: the store's accumulated tags intersecting
/// any of the trigger tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateTrigger {
    /// Name of the gate this trigger opens.
    pub gate: String,
    /// Tags, any one of which opens the gate.
    pub any_tag: BTreeSet<String>,
}

impl GateTrigger {
    /// Create a trigger.
    pub fn new(gate: impl Into<String>, tags: &[&str]) -> Self {
        Self {
            gate: gate.into(),
            any_tag: tags.iter().map(|t| t.to_string()).collect(),
        }
    }
}

/// The per-conversation gate ledger.
///
/// Gate names are arbitrary strings owned by consumer modules; the ledger
/// only stores and evaluates booleans and never interprets their meaning.
#[derive(Debug, Clone, Default)]
pub struct GateLedger {
    gates: BTreeMap<String, Gate>,
    triggers: Vec<GateTrigger>,
}

impl GateLedger {
    /// An empty ledger with no triggers.
    pub fn new() -> Self {
        Self::default()
    }

    /// A ledger carrying the built-in tag triggers.
    pub fn with_builtin_triggers() -> Self {
        Self {
            gates: BTreeMap::new(),
            triggers: builtin_triggers(),
        }
    }

    /// Add a trigger.
    pub fn add_trigger(&mut self, trigger: GateTrigger) {
        self.triggers.push(trigger);
    }

    /// Whether the named gate is open. Unknown names are locked.
    pub fn evaluate(&self, gate: &str) -> bool {
        self.gates.get(gate).map(Gate::is_open).unwrap_or(false)
    }

    /// Cursor at which the gate opened, if it has.
    pub fn unlocked_since(&self, gate: &str) -> Option<u64> {
        match self.gates.get(gate) {
            Some(Gate::Unlocked { since_cursor }) => Some(*since_cursor),
            _ => None,
        }
    }

    /// Latch a gate open at a cursor. Idempotent: a gate that is already
    /// open keeps its original opening cursor.
    pub fn latch(&mut self, gate: impl Into<String>, cursor: u64) {
        let name = gate.into();
        let entry = self.gates.entry(name.clone()).or_insert(Gate::Locked);
        if !entry.is_open() {
            debug!(gate = %name, cursor, "gate latched open");
            *entry = Gate::Unlocked {
                since_cursor: cursor,
            };
        }
    }

    /// Check every trigger against the store's tags and latch the ones that
    /// fire. Called by the tracker after each mutation.
    pub fn observe_store(&mut self, store: &StateStore) {
        let cursor = match store.cursor() {
            Some(cursor) => cursor,
            None => return,
        };
        let fired: Vec<String> = self
            .triggers
            .iter()
            .filter(|trigger| {
                !self.evaluate(&trigger.gate)
                    && trigger.any_tag.iter().any(|tag| store.has_tag(tag))
            })
            .map(|trigger| trigger.gate.clone())
            .collect();
        for gate in fired {
            self.latch(gate, cursor);
        }
    }

    /// All latched gates and their states, for persistence.
    pub fn snapshot(&self) -> BTreeMap<String, Gate> {
        self.gates.clone()
    }

    /// Replace the gate states from a persisted snapshot, keeping triggers.
    pub fn restore(&mut self, gates: BTreeMap<String, Gate>) {
        self.gates = gates;
    }

    /// Full reset: every gate returns to locked. The only unlatch path.
    pub fn reset(&mut self) {
        self.gates.clear();
    }
}

/// Gate names unlocked by the built-in location tags.
pub fn builtin_triggers() -> Vec<GateTrigger> {
    vec![
        GateTrigger::new("socialContextVisited", &["social"]),
        GateTrigger::new("questBoardVisited", &["quests"]),
        GateTrigger::new("marketVisited", &["trade"]),
        GateTrigger::new("dangerEncountered", &["danger"]),
    ]
}
