//! Simulation-clock event queue
//!
//! Delayed work (a bus entering service, a bus returning after its lap) is
//! queued against simulated time and drained at the start of the tick it
//! falls due in, before any agent moves. Nothing mutates agent state from
//! outside the tick.

use ordered_float::OrderedFloat;
use std::collections::BTreeMap;

use super::types::BusId;

/// Work the world performs when its time comes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduledAction {
    /// First entry of a bus into service
    ActivateBus(BusId),
    /// Return to service after a completed lap
    ReactivateBus(BusId),
}

impl ScheduledAction {
    pub fn bus(&self) -> BusId {
        match self {
            ScheduledAction::ActivateBus(id) | ScheduledAction::ReactivateBus(id) => *id,
        }
    }
}

/// Actions keyed by due time in ms; same-time actions keep insertion order
#[derive(Debug, Default)]
pub struct EventQueue {
    inner: BTreeMap<OrderedFloat<f64>, Vec<ScheduledAction>>,
    total: usize,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, due_ms: f64, action: ScheduledAction) {
        self.inner.entry(OrderedFloat(due_ms)).or_default().push(action);
        self.total += 1;
    }

    /// Remove and return every action due at or before `now_ms`, earliest
    /// first
    pub fn drain_due(&mut self, now_ms: f64) -> Vec<ScheduledAction> {
        let mut actions = Vec::new();
        while let Some(entry) = self.inner.first_entry() {
            if entry.key().into_inner() > now_ms {
                break;
            }
            actions.extend(entry.remove());
        }
        self.total -= actions.len();
        actions
    }

    /// Drop every pending action
    pub fn cancel_all(&mut self) -> usize {
        let cancelled = self.total;
        self.inner.clear();
        self.total = 0;
        cancelled
    }

    /// Drop pending actions for one bus
    pub fn cancel_bus(&mut self, bus: BusId) -> usize {
        let before = self.total;
        for actions in self.inner.values_mut() {
            actions.retain(|a| a.bus() != bus);
        }
        self.inner.retain(|_, actions| !actions.is_empty());
        self.total = self.inner.values().map(Vec::len).sum();
        before - self.total
    }

    pub fn next_due(&self) -> Option<f64> {
        self.inner.keys().next().map(|t| t.into_inner())
    }

    pub fn is_pending(&self, action: ScheduledAction) -> bool {
        self.inner.values().any(|actions| actions.contains(&action))
    }

    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}
