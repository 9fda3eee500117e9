use std::collections::HashMap;
use std::time::Duration;

use crate::IncidentCategory;

/// Observable per-category throttle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThrottleState {
    Ready,
    Cooling,
}

/// Per-category alert cooldown.
///
/// Every category starts `Ready`. Firing records the timestamp and moves
/// the category to `Cooling`; it becomes `Ready` again once strictly more
/// than the cooldown has elapsed (checked on every frame, not scheduled).
/// Suppressed candidates are dropped, not queued.
///
/// The caller marks a category fired when an alert is *attempted*: a failed
/// persistence still consumes the cooldown window, which prevents retry
/// storms against a broken recorder.
pub struct AlertThrottle {
    cooldown: Duration,
    last_fired_s: HashMap<IncidentCategory, u64>,
}

impl AlertThrottle {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_fired_s: HashMap::new(),
        }
    }

    pub fn state(&self, category: IncidentCategory, now_s: u64) -> ThrottleState {
        if self.is_ready(category, now_s) {
            ThrottleState::Ready
        } else {
            ThrottleState::Cooling
        }
    }

    pub fn is_ready(&self, category: IncidentCategory, now_s: u64) -> bool {
        match self.last_fired_s.get(&category) {
            None => true,
            Some(&fired_s) => now_s.saturating_sub(fired_s) > self.cooldown.as_secs(),
        }
    }

    pub fn mark_fired(&mut self, category: IncidentCategory, now_s: u64) {
        self.last_fired_s.insert(category, now_s);
    }
}
