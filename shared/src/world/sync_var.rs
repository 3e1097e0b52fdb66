use std::cell::RefCell;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use log::warn;

use crate::types::{EntityId, FieldId};
use crate::value_types::FieldValue;

/// One recorded field write: which entity, which field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FieldChange {
    pub entity: EntityId,
    pub field: FieldId,
}

/// Single-threaded queue of field writes, drained by the manager after
/// each logic tick in write order. Consecutive duplicate writes collapse
/// into one entry; interleaved writes are all kept so ordering survives.
#[derive(Clone, Default)]
pub struct FieldChangeQueue {
    inner: Rc<RefCell<Vec<FieldChange>>>,
}

impl FieldChangeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, change: FieldChange) {
        let mut changes = self.inner.borrow_mut();
        if changes.last() == Some(&change) {
            return;
        }
        changes.push(change);
    }

    /// Takes every recorded change, oldest first.
    pub fn drain(&self) -> Vec<FieldChange> {
        std::mem::take(&mut *self.inner.borrow_mut())
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().len()
    }

    pub fn clear(&self) {
        self.inner.borrow_mut().clear();
    }
}

/// Write-barrier handle bound into an entity's tracked fields. Cloning is
/// cheap; all clones feed the same queue.
#[derive(Clone)]
pub struct FieldMutator {
    entity: EntityId,
    queue: FieldChangeQueue,
}

impl FieldMutator {
    pub fn new(entity: EntityId, queue: &FieldChangeQueue) -> Self {
        Self {
            entity,
            queue: queue.clone(),
        }
    }

    pub fn entity(&self) -> EntityId {
        self.entity
    }

    pub fn notify(&self, field: FieldId) {
        self.queue.push(FieldChange {
            entity: self.entity,
            field,
        });
    }
}

/// A replicated entity field: reads deref to the value, tracked writes
/// notify the manager's change queue so the serializer (server) or the
/// reconciler (client) sees them in write order.
pub struct SyncVar<T: FieldValue> {
    value: T,
    field: FieldId,
    mutator: Option<FieldMutator>,
}

impl<T: FieldValue> SyncVar<T> {
    pub fn new(field: FieldId, value: T) -> Self {
        Self {
            value,
            field,
            mutator: None,
        }
    }

    pub fn field(&self) -> FieldId {
        self.field
    }

    /// Binds the write barrier. Called by the manager right after the
    /// entity constructor runs.
    pub fn bind(&mut self, mutator: &FieldMutator) {
        self.mutator = Some(mutator.clone());
    }

    pub fn get(&self) -> T {
        self.value
    }

    /// Tracked write. No notification when the value is unchanged.
    pub fn set(&mut self, value: T) {
        if self.value == value {
            return;
        }
        self.notify();
        self.value = value;
    }

    /// Untracked write, used by rollback and lag-compensation restores
    /// which must not look like fresh authoritative changes.
    pub fn set_untracked(&mut self, value: T) {
        self.value = value;
    }

    fn notify(&self) {
        let Some(mutator) = &self.mutator else {
            warn!("SyncVar written before its field mutator was bound");
            return;
        };
        mutator.notify(self.field);
    }
}

impl<T: FieldValue> Deref for SyncVar<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

impl<T: FieldValue> DerefMut for SyncVar<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        // Assume the borrower will change the value.
        self.notify();
        &mut self.value
    }
}
