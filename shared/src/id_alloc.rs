use std::collections::VecDeque;

use thiserror::Error;

use crate::types::EntityId;

/// Errors raised by entity id allocation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdAllocatorError {
    /// Every id in the allocator's range is live.
    #[error("No free entity ids left in range [{first}, {last}]")]
    Exhausted { first: u16, last: u16 },

    /// An id outside the allocator's range was returned to it.
    #[error("Entity id {id} does not belong to range [{first}, {last}]")]
    OutOfRange { first: u16, last: u16, id: u16 },
}

/// Hands out entity ids from a fixed range and recycles released ones
/// with a bumped version, so stale `{id, version}` handles never resolve
/// to the successor entity.
///
/// The server allocates from the synced range, the client from the local
/// range; both go through this.
pub struct EntityIdAllocator {
    first: u16,
    last: u16,
    next_fresh: u16,
    recycled: VecDeque<EntityId>,
    /// Version the next occupant of each id will carry; indexed relative
    /// to `first`.
    next_versions: Vec<u8>,
}

impl EntityIdAllocator {
    pub fn new(first: u16, last: u16) -> Self {
        assert!(first > 0 && first <= last, "invalid id range");
        Self {
            first,
            last,
            next_fresh: first,
            recycled: VecDeque::new(),
            next_versions: vec![0; usize::from(last - first) + 1],
        }
    }

    /// Takes a free id together with the version its occupant must carry.
    pub fn allocate(&mut self) -> Result<(EntityId, u8), IdAllocatorError> {
        let id = if let Some(id) = self.recycled.pop_front() {
            id
        } else if self.next_fresh <= self.last {
            let id = EntityId::new(self.next_fresh);
            self.next_fresh += 1;
            id
        } else {
            return Err(IdAllocatorError::Exhausted {
                first: self.first,
                last: self.last,
            });
        };
        Ok((id, self.next_versions[self.slot(id)]))
    }

    /// Returns an id for reuse. The next occupant gets a bumped version.
    pub fn release(&mut self, id: EntityId) -> Result<(), IdAllocatorError> {
        if id.value() < self.first || id.value() > self.last {
            return Err(IdAllocatorError::OutOfRange {
                first: self.first,
                last: self.last,
                id: id.value(),
            });
        }
        let slot = self.slot(id);
        self.next_versions[slot] = self.next_versions[slot].wrapping_add(1);
        self.recycled.push_back(id);
        Ok(())
    }

    pub fn reset(&mut self) {
        self.next_fresh = self.first;
        self.recycled.clear();
        self.next_versions.fill(0);
    }

    fn slot(&self, id: EntityId) -> usize {
        usize::from(id.value() - self.first)
    }
}
