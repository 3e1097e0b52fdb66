use log::warn;
use thiserror::Error;

use crate::constants::MAX_ENTITY_COUNT;
use crate::types::{EntityId, EntitySharedReference};
use crate::world::entity::EntityLogic;
use crate::world::ordered_set::OrderedIdSet;

/// Errors raised by entity-slot operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Entity id outside `[1, MAX_ENTITY_COUNT]`.
    #[error("Entity id {id} is outside the valid range [1, {max}]", max = MAX_ENTITY_COUNT)]
    InvalidEntityId { id: u16 },

    /// The id slot already holds a live entity.
    #[error("Entity id {id} is already occupied")]
    SlotOccupied { id: u16 },
}

struct EntitySlot {
    entity: Box<dyn EntityLogic>,
    /// Serializer scratch taken from the class pool at spawn, returned
    /// on removal.
    data_cache: Vec<u8>,
}

/// The id → entity table and the membership sets derived from it.
///
/// Slots are dense, indexed by the raw 16-bit id. The sets are ordered so
/// every per-tick walk is deterministic:
/// - `all`: constructed and not yet removed (destroyed entities stay
///   until removal, known-dead but indexable);
/// - `alive`: receives per-tick updates on this side;
/// - `lag_compensated`: participates in rewind.
pub struct EntityStore {
    slots: Vec<Option<EntitySlot>>,
    all: OrderedIdSet,
    alive: OrderedIdSet,
    lag_compensated: OrderedIdSet,
    count: usize,
}

impl EntityStore {
    pub fn new() -> Self {
        let mut slots = Vec::new();
        slots.resize_with(usize::from(MAX_ENTITY_COUNT) + 1, || None);
        Self {
            slots,
            all: OrderedIdSet::new(),
            alive: OrderedIdSet::new(),
            lag_compensated: OrderedIdSet::new(),
            count: 0,
        }
    }

    /// Count of occupied id slots.
    pub fn count(&self) -> usize {
        self.count
    }

    pub(crate) fn insert(
        &mut self,
        entity: Box<dyn EntityLogic>,
        data_cache: Vec<u8>,
    ) -> Result<(), StoreError> {
        let id = entity.header().id();
        if !id.is_valid() || id.value() > MAX_ENTITY_COUNT {
            return Err(StoreError::InvalidEntityId { id: id.value() });
        }
        if self.slots[id.index()].is_some() {
            return Err(StoreError::SlotOccupied { id: id.value() });
        }
        self.slots[id.index()] = Some(EntitySlot { entity, data_cache });
        self.count += 1;
        Ok(())
    }

    /// Clears the id slot, returning the entity and its data cache.
    /// Warns and proceeds when the entity was never marked destroyed.
    pub(crate) fn take(&mut self, id: EntityId) -> Option<(Box<dyn EntityLogic>, Vec<u8>)> {
        if !id.is_valid() || id.value() > MAX_ENTITY_COUNT {
            return None;
        }
        let slot = self.slots[id.index()].take()?;
        if !slot.entity.header().is_destroyed() {
            warn!(
                "Removing entity {} which was not marked destroyed",
                id.value()
            );
        }
        self.count -= 1;
        Some((slot.entity, slot.data_cache))
    }

    pub fn get(&self, id: EntityId) -> Option<&dyn EntityLogic> {
        if !id.is_valid() || id.value() > MAX_ENTITY_COUNT {
            return None;
        }
        self.slots[id.index()].as_ref().map(|slot| &*slot.entity)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut dyn EntityLogic> {
        if !id.is_valid() || id.value() > MAX_ENTITY_COUNT {
            return None;
        }
        self.slots[id.index()]
            .as_mut()
            .map(|slot| &mut *slot.entity)
    }

    /// Resolves a `{id, version}` handle: the slot must be occupied and
    /// the stored version must match. Stale handles resolve to none.
    pub fn get_by_reference(&self, reference: EntitySharedReference) -> Option<&dyn EntityLogic> {
        let entity = self.get(reference.id)?;
        (entity.header().version() == reference.version).then_some(entity)
    }

    pub fn get_by_reference_mut(
        &mut self,
        reference: EntitySharedReference,
    ) -> Option<&mut dyn EntityLogic> {
        let entity = self.get_mut(reference.id)?;
        (entity.header().version() == reference.version).then_some(entity)
    }

    // Membership sets

    pub fn all(&self) -> &OrderedIdSet {
        &self.all
    }

    pub fn alive(&self) -> &OrderedIdSet {
        &self.alive
    }

    pub fn lag_compensated(&self) -> &OrderedIdSet {
        &self.lag_compensated
    }

    pub(crate) fn all_mut(&mut self) -> &mut OrderedIdSet {
        &mut self.all
    }

    pub(crate) fn alive_mut(&mut self) -> &mut OrderedIdSet {
        &mut self.alive
    }

    pub(crate) fn lag_compensated_mut(&mut self) -> &mut OrderedIdSet {
        &mut self.lag_compensated
    }

    /// Runs `visit` over every lag-compensated entity in id order.
    pub(crate) fn for_each_lag_compensated(
        &mut self,
        mut visit: impl FnMut(&mut dyn EntityLogic),
    ) {
        let Self {
            slots,
            lag_compensated,
            ..
        } = self;
        for id in lag_compensated.iter() {
            if let Some(slot) = slots[id.index()].as_mut() {
                visit(&mut *slot.entity);
            }
        }
    }

    pub(crate) fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.all.clear();
        self.alive.clear();
        self.lag_compensated.clear();
        self.count = 0;
    }
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new()
    }
}
