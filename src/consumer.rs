//! Consumer module seam and shared throttling helper.
//!
//! A consumer module is a downstream feature (ambient illustration, music
//! cues, a live map) that reacts to change events but never mutates the
//! store. Modules registered on a tracker are dispatched after each
//! accepted message, with the same isolation rules as bus subscribers.

use crate::events::{ChangeEvent, SubscriberError};
use crate::store::StateStore;

/// A downstream feature driven by change events.
///
/// Implementations may read the store snapshot passed alongside each event
/// but have no way to write it back.
pub trait ConsumerModule {
    /// Stable name used in log lines.
    fn name(&self) -> &str;

    /// Handle one event. Errors are logged by the tracker and do not stop
    /// dispatch to other modules.
    fn on_event(&mut self, event: &ChangeEvent, store: &StateStore) -> Result<(), SubscriberError>;
}

/// Message-count cooldown for modules that do expensive work.
///
/// A module fires at most once per `window` accepted messages, measured by
/// store cursor rather than wall clock so replay behaves identically.
#[derive(Debug, Clone, Copy)]
pub struct Cooldown {
    window: u64,
    last_fired: Option<u64>,
}

impl Cooldown {
    /// A cooldown of `window` messages. A zero window never throttles.
    pub fn new(window: u64) -> Self {
        Self {
            window,
            last_fired: None,
        }
    }

    /// Whether the module may fire at this cursor.
    pub fn ready(&self, cursor: u64) -> bool {
        match self.last_fired {
            None => true,
            Some(last) => cursor >= last.saturating_add(self.window),
        }
    }

    /// Record a firing at this cursor.
    pub fn fire(&mut self, cursor: u64) {
        self.last_fired = Some(cursor);
    }

    /// Forget the last firing, e.g. after a full reset.
    pub fn reset(&mut self) {
        self.last_fired = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cooldown_first_fire_is_free() {
        let cooldown = Cooldown::new(10);
        assert!(cooldown.ready(0));
        assert!(cooldown.ready(500));
    }

    #[test]
    fn test_cooldown_window() {
        let mut cooldown = Cooldown::new(5);
        cooldown.fire(10);
        assert!(!cooldown.ready(11));
        assert!(!cooldown.ready(14));
        assert!(cooldown.ready(15));
    }

    #[test]
    fn test_zero_window_never_throttles() {
        let mut cooldown = Cooldown::new(0);
        cooldown.fire(3);
        assert!(cooldown.ready(3));
    }

    #[test]
    fn test_reset_clears_history() {
        let mut cooldown = Cooldown::new(100);
        cooldown.fire(4);
        assert!(!cooldown.ready(5));
        cooldown.reset();
        assert!(cooldown.ready(5));
    }
}
