//! Load-state history: the on/off outcome of every decided slot.

use std::collections::BTreeMap;

use chrono::{NaiveDateTime, TimeDelta, Timelike};

/// Per-slot record of whether the controllable load was on.
///
/// The engine only reads from the store; the caller writes the outcome with
/// [`LoadStateStore::set`] after each decision.
pub trait LoadStateStore {
    /// Recorded state for `slot_index`, if any.
    fn get(&self, slot_index: usize) -> Option<bool>;

    /// Records the state for `slot_index`, replacing any earlier value.
    fn set(&mut self, slot_index: usize, on: bool);

    /// Duration of one slot.
    fn slot_length(&self) -> TimeDelta;

    /// Whether the load was on in the slot before `slot_index`. Unknown counts as off.
    fn previous(&self, slot_index: usize) -> bool {
        slot_index
            .checked_sub(1)
            .and_then(|prev| self.get(prev))
            .unwrap_or(false)
    }

    /// Length of the current uninterrupted on-run, counted backward from the
    /// slot before `slot_index`.
    fn activation_runtime(&self, slot_index: usize) -> TimeDelta {
        let on_slots = (0..slot_index)
            .rev()
            .take_while(|&i| self.get(i) == Some(true))
            .count();
        self.slot_length() * on_slots as i32
    }

    /// Total on-time since midnight of `timestamp`'s day, excluding `slot_index` itself.
    fn today_runtime(&self, slot_index: usize, timestamp: NaiveDateTime) -> TimeDelta {
        let slot_secs = self.slot_length().num_seconds();
        if slot_secs <= 0 {
            return TimeDelta::zero();
        }
        let since_midnight = i64::from(timestamp.num_seconds_from_midnight());
        let slots_today = usize::try_from(since_midnight / slot_secs).unwrap_or(0);
        let day_start = slot_index.saturating_sub(slots_today);
        let on_slots = (day_start..slot_index)
            .filter(|&i| self.get(i) == Some(true))
            .count();
        self.slot_length() * on_slots as i32
    }
}

/// In-memory [`LoadStateStore`] keyed by slot index.
#[derive(Debug, Clone)]
pub struct LoadHistory {
    states: BTreeMap<usize, bool>,
    slot_length: TimeDelta,
}

impl LoadHistory {
    /// Creates an empty history for slots of `slot_length`.
    pub fn new(slot_length: TimeDelta) -> Self {
        Self {
            states: BTreeMap::new(),
            slot_length,
        }
    }

    /// Number of recorded slots.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Returns `true` when nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

impl LoadStateStore for LoadHistory {
    fn get(&self, slot_index: usize) -> Option<bool> {
        self.states.get(&slot_index).copied()
    }

    fn set(&mut self, slot_index: usize, on: bool) {
        self.states.insert(slot_index, on);
    }

    fn slot_length(&self) -> TimeDelta {
        self.slot_length
    }
}
