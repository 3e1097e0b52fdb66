use thiserror::Error;

use crate::types::EntityId;

/// Errors raised by checked id-set mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderedSetError {
    /// Attempted to insert an id that is already a member.
    #[error("Entity id {id} is already in the set")]
    DuplicateId { id: u16 },

    /// Attempted to remove an id that is not a member.
    #[error("Entity id {id} is not in the set")]
    MissingId { id: u16 },
}

/// Set of entity ids kept in ascending order, so iteration is stable
/// across ticks and deterministic under rollback replay. Mutations are
/// checked: double-inserting or removing a non-member is a manager bug.
#[derive(Default)]
pub struct OrderedIdSet {
    ids: Vec<EntityId>,
}

impl OrderedIdSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.ids.binary_search(&id).is_ok()
    }

    pub fn try_insert(&mut self, id: EntityId) -> Result<(), OrderedSetError> {
        match self.ids.binary_search(&id) {
            Ok(_) => Err(OrderedSetError::DuplicateId { id: id.value() }),
            Err(position) => {
                self.ids.insert(position, id);
                Ok(())
            }
        }
    }

    /// # Panics
    ///
    /// Panics if the id is already a member. Check first, or use
    /// `try_insert`.
    pub fn insert(&mut self, id: EntityId) {
        self.try_insert(id)
            .expect("cannot insert an id that is already in the set")
    }

    pub fn try_remove(&mut self, id: EntityId) -> Result<(), OrderedSetError> {
        match self.ids.binary_search(&id) {
            Ok(position) => {
                self.ids.remove(position);
                Ok(())
            }
            Err(_) => Err(OrderedSetError::MissingId { id: id.value() }),
        }
    }

    /// # Panics
    ///
    /// Panics if the id is not a member. Check first, or use `try_remove`.
    pub fn remove(&mut self, id: EntityId) {
        self.try_remove(id)
            .expect("cannot remove an id that is not in the set")
    }

    /// Removes the id when present; reports whether it was.
    pub fn remove_if_present(&mut self, id: EntityId) -> bool {
        self.try_remove(id).is_ok()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EntityId> {
        self.ids.iter()
    }

    pub fn as_slice(&self) -> &[EntityId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }
}
