use std::collections::HashSet;

use replica_shared::{EntityId, FieldChange, FieldId, Tick};

/// Accumulates the `(entity, field)` writes of each tick for the
/// outbound delta encoder, preserving write order and collapsing
/// repeated writes of the same field within one tick.
#[derive(Default)]
pub struct DirtyFieldTracker {
    entries: Vec<(Tick, FieldChange)>,
    seen_this_tick: HashSet<(EntityId, FieldId)>,
    current_tick: Option<Tick>,
}

impl DirtyFieldTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, tick: Tick, change: FieldChange) {
        if self.current_tick != Some(tick) {
            self.current_tick = Some(tick);
            self.seen_this_tick.clear();
        }
        if !self.seen_this_tick.insert((change.entity, change.field)) {
            return;
        }
        self.entries.push((tick, change));
    }

    /// Drops every record for an entity, used when it despawns before
    /// the encoder ran.
    pub fn forget_entity(&mut self, entity: EntityId) {
        self.entries.retain(|(_, change)| change.entity != entity);
    }

    /// Takes everything accumulated so far, oldest first.
    pub fn take(&mut self) -> Vec<(Tick, FieldChange)> {
        self.seen_this_tick.clear();
        self.current_tick = None;
        std::mem::take(&mut self.entries)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.seen_this_tick.clear();
        self.current_tick = None;
    }
}

#[cfg(test)]
mod dirty_tracker_tests {
    use super::DirtyFieldTracker;
    use replica_shared::{EntityId, FieldChange, FieldId};

    fn change(entity: u16, field: u16) -> FieldChange {
        FieldChange {
            entity: EntityId::new(entity),
            field: FieldId(field),
        }
    }

    #[test]
    fn keeps_write_order_across_ticks() {
        let mut tracker = DirtyFieldTracker::new();
        tracker.record(1, change(3, 0));
        tracker.record(1, change(4, 1));
        tracker.record(2, change(3, 0));

        let ticks: Vec<u16> = tracker.take().iter().map(|(tick, _)| *tick).collect();
        assert_eq!(ticks, vec![1, 1, 2]);
        assert!(tracker.is_empty());
    }

    #[test]
    fn repeated_writes_within_a_tick_collapse() {
        let mut tracker = DirtyFieldTracker::new();
        tracker.record(1, change(3, 0));
        tracker.record(1, change(3, 1));
        tracker.record(1, change(3, 0));
        assert_eq!(tracker.take().len(), 2);
    }

    #[test]
    fn forgetting_an_entity_drops_its_records() {
        let mut tracker = DirtyFieldTracker::new();
        tracker.record(1, change(3, 0));
        tracker.record(1, change(4, 0));
        tracker.forget_entity(EntityId::new(3));

        let remaining = tracker.take();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].1.entity, EntityId::new(4));
    }
}
