use log::warn;
use thiserror::Error;

use crate::constants::MAX_ENTITY_COUNT;
use crate::protocol::Protocol;
use crate::types::{ClassId, EntityId, EntitySharedReference, FilterId, NetworkMode};
use crate::world::entity::{EntityLogic, EntityParams, TickContext};
use crate::world::filter::Filters;
use crate::world::ordered_set::OrderedIdSet;
use crate::world::registry::{ClassKind, EntityClassData, EntityFlags, RegistryError};
use crate::world::store::{EntityStore, StoreError};
use crate::manager::RoleHooks;
use crate::world::sync_var::{FieldChange, FieldChangeQueue, FieldMutator};

/// Errors raised by entity lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorldError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// A filter query named a singleton class.
    #[error("{type_name} is a singleton class; use the singleton accessors")]
    SingletonQuery { type_name: &'static str },
}

/// Ordered iterator over the live members of one filter, ascending by id.
pub struct EntityIter<'a> {
    store: &'a EntityStore,
    ids: std::slice::Iter<'a, EntityId>,
}

impl<'a> Iterator for EntityIter<'a> {
    type Item = &'a dyn EntityLogic;

    fn next(&mut self) -> Option<Self::Item> {
        for id in self.ids.by_ref() {
            if let Some(entity) = self.store.get(*id) {
                if !entity.header().is_destroyed() {
                    return Some(entity);
                }
            }
        }
        None
    }
}

/// The entity tables and views of one manager: the id → entity store,
/// the class registry (through the locked protocol), the filter and
/// singleton tables, and the field-change queue.
///
/// All operations assume single-threaded cooperative scheduling; nothing
/// here locks.
pub struct EntityWorld {
    protocol: Protocol,
    mode: NetworkMode,
    store: EntityStore,
    filters: Filters,
    change_queue: FieldChangeQueue,
}

impl EntityWorld {
    /// Builds the world over a locked protocol.
    pub(crate) fn new(protocol: Protocol, mode: NetworkMode) -> Self {
        debug_assert!(protocol.is_locked(), "protocol must be locked first");
        let filters = Filters::new(
            protocol.entity_types.filter_count(),
            protocol.entity_types.singleton_count(),
        );
        Self {
            protocol,
            mode,
            store: EntityStore::new(),
            filters,
            change_queue: FieldChangeQueue::new(),
        }
    }

    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    pub fn mode(&self) -> NetworkMode {
        self.mode
    }

    pub fn entities_count(&self) -> usize {
        self.store.count()
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub(crate) fn store_mut(&mut self) -> &mut EntityStore {
        &mut self.store
    }

    /// Takes every field write recorded since the last drain, in write
    /// order.
    pub fn drain_field_changes(&self) -> Vec<FieldChange> {
        self.change_queue.drain()
    }

    // Lifecycle

    /// Creates the entity: validates id and class, runs the class
    /// constructor, installs the field write barrier and the data cache,
    /// and occupies the id slot. The entity joins no views until
    /// `construct_entity`.
    pub fn try_add_entity(
        &mut self,
        class_id: ClassId,
        id: EntityId,
        version: u8,
    ) -> Result<&mut dyn EntityLogic, WorldError> {
        if !id.is_valid() || id.value() > MAX_ENTITY_COUNT {
            return Err(StoreError::InvalidEntityId { id: id.value() }.into());
        }
        let class = self.protocol.entity_types.try_class(class_id)?;

        let mut entity = (class.constructor)(EntityParams::new(id, version, class_id));
        entity.bind_field_mutator(&FieldMutator::new(id, &self.change_queue));
        let data_cache = class.take_data_cache();

        self.store.insert(entity, data_cache)?;
        Ok(self.store.get_mut(id).expect("slot filled by insert"))
    }

    /// # Panics
    ///
    /// Panics on an invalid id or unregistered class. Use
    /// `try_add_entity` for non-panicking error handling.
    pub fn add_entity(
        &mut self,
        class_id: ClassId,
        id: EntityId,
        version: u8,
    ) -> &mut dyn EntityLogic {
        self.try_add_entity(class_id, id, version)
            .expect("failed to add entity")
    }

    /// Inserts the entity into every applicable view and brings it live:
    /// filter or singleton slots first, then `on_constructed`, then the
    /// all / alive / lag-compensated sets.
    pub fn construct_entity(
        &mut self,
        id: EntityId,
        ctx: &TickContext,
        hooks: &mut dyn RoleHooks,
    ) {
        let Some(entity) = self.store.get(id) else {
            warn!("Constructing entity {} which does not exist", id.value());
            return;
        };
        let header = *entity.header();
        if header.is_destroyed() {
            warn!("Constructing entity {} which is destroyed", id.value());
            return;
        }
        let class = self
            .protocol
            .entity_types
            .try_class(header.class_id())
            .expect("stored entity has a registered class");

        self.filters.on_constructed(class, id);

        let alive = Self::is_entity_alive(self.mode, class, header.is_local());
        let lag_compensated =
            !header.is_local() && class.kind == ClassKind::Normal && class.lag_compensated_count > 0;

        if let Some(entity) = self.store.get_mut(id) {
            entity.on_constructed(ctx);
        }

        self.store.all_mut().insert(id);
        if alive {
            self.store.alive_mut().insert(id);
            hooks.on_alive_entity_added(id);
        }
        if lag_compensated {
            self.store.lag_compensated_mut().insert(id);
        }
    }

    /// The alive predicate: updateable, and this side is responsible for
    /// ticking it.
    fn is_entity_alive(mode: NetworkMode, class: &EntityClassData, is_local: bool) -> bool {
        class.flags.contains(EntityFlags::UPDATEABLE)
            && (mode.is_server()
                || is_local
                || (mode.is_client() && class.flags.contains(EntityFlags::UPDATE_ON_CLIENT)))
    }

    /// Marks the entity destroyed and clears it out of every view. The
    /// id slot stays occupied (known-dead but indexable) until
    /// `remove_entity`.
    pub fn destroy_entity(&mut self, id: EntityId) {
        let Some(entity) = self.store.get_mut(id) else {
            warn!("Destroying entity {} which does not exist", id.value());
            return;
        };
        if entity.header().is_destroyed() {
            return;
        }
        entity.header_mut().mark_destroyed();
        let class_id = entity.header().class_id();

        let class = self
            .protocol
            .entity_types
            .try_class(class_id)
            .expect("stored entity has a registered class");
        self.filters.on_destroyed(class, id);
        self.store.lag_compensated_mut().remove_if_present(id);
        self.store.alive_mut().remove_if_present(id);

        if let Some(entity) = self.store.get_mut(id) {
            entity.on_destroyed();
        }
    }

    /// Frees the id slot and releases the entity's data cache back to
    /// the class pool. Removing a non-destroyed entity is reported and
    /// performed anyway.
    pub fn remove_entity(&mut self, id: EntityId) {
        let Some((entity, data_cache)) = self.store.take(id) else {
            warn!("Removing entity {} which does not exist", id.value());
            return;
        };
        self.store.all_mut().remove_if_present(id);
        if let Some(class) = self.protocol.entity_types.class(entity.header().class_id()) {
            class.release_data_cache(data_cache);
        }
    }

    // Lookup by reference

    pub fn try_get_entity_by_id<T: EntityLogic>(
        &self,
        reference: EntitySharedReference,
    ) -> Option<&T> {
        self.store.get_by_reference(reference)?.downcast_ref::<T>()
    }

    /// # Panics
    ///
    /// Panics when the reference is stale or points at a different class.
    /// Use `try_get_entity_by_id` for non-panicking lookup.
    pub fn get_entity_by_id<T: EntityLogic>(&self, reference: EntitySharedReference) -> &T {
        self.try_get_entity_by_id(reference)
            .expect("no live entity of this type at reference")
    }

    pub fn try_get_entity_by_id_mut<T: EntityLogic>(
        &mut self,
        reference: EntitySharedReference,
    ) -> Option<&mut T> {
        self.store
            .get_by_reference_mut(reference)?
            .downcast_mut::<T>()
    }

    pub fn get_entity_by_id_mut<T: EntityLogic>(
        &mut self,
        reference: EntitySharedReference,
    ) -> &mut T {
        self.try_get_entity_by_id_mut(reference)
            .expect("no live entity of this type at reference")
    }

    // Filter queries

    /// View over every live entity assignable to `T`: instances of `T`
    /// itself plus every class that declared `T` as a base.
    ///
    /// # Panics
    ///
    /// Panics when `T` was never registered, or is a singleton class.
    pub fn get_entities<T: EntityLogic>(&mut self) -> EntityIter<'_> {
        self.try_get_entities::<T>()
            .unwrap_or_else(|err| panic!("{err}"))
    }

    pub fn try_get_entities<T: EntityLogic>(&mut self) -> Result<EntityIter<'_>, WorldError> {
        let class = self.protocol.entity_types.try_class_of::<T>()?;
        if class.kind.is_singleton() {
            return Err(WorldError::SingletonQuery {
                type_name: class.type_name,
            });
        }
        let filter_id = class.filter_id;
        self.ensure_filter(filter_id);
        Ok(EntityIter {
            store: &self.store,
            ids: self.filters.members(filter_id).iter(),
        })
    }

    /// View over every live controller assignable to `T`.
    ///
    /// # Panics
    ///
    /// Panics when `T` was never registered.
    pub fn get_controllers<T: EntityLogic>(&mut self) -> EntityIter<'_> {
        if let Some(class) = self.protocol.entity_types.class_of::<T>() {
            debug_assert_eq!(class.kind, ClassKind::Controller);
        }
        self.get_entities::<T>()
    }

    fn ensure_filter(&mut self, filter_id: FilterId) {
        if self.filters.is_materialized(filter_id) {
            return;
        }
        let mut members = OrderedIdSet::new();
        for id in self.store.all().iter() {
            let Some(entity) = self.store.get(*id) else {
                continue;
            };
            if entity.header().is_destroyed() {
                continue;
            }
            let Some(class) = self.protocol.entity_types.class(entity.header().class_id()) else {
                continue;
            };
            if !class.kind.is_singleton() && class.joins_filter(filter_id) {
                members.insert(*id);
            }
        }
        self.filters.materialize(filter_id, members);
    }

    // Singletons

    /// # Panics
    ///
    /// Panics when `T` was never registered or is not a singleton class.
    pub fn try_get_singleton<T: EntityLogic>(&self) -> Option<&T> {
        let id = self.singleton_id::<T>()?;
        self.store.get(id)?.downcast_ref::<T>()
    }

    /// # Panics
    ///
    /// Panics when no live instance of `T` exists. Use
    /// `try_get_singleton` for non-panicking lookup.
    pub fn get_singleton<T: EntityLogic>(&self) -> &T {
        self.try_get_singleton::<T>()
            .expect("singleton instance is not alive")
    }

    pub fn try_get_singleton_mut<T: EntityLogic>(&mut self) -> Option<&mut T> {
        let id = self.singleton_id::<T>()?;
        self.store.get_mut(id)?.downcast_mut::<T>()
    }

    pub fn get_singleton_mut<T: EntityLogic>(&mut self) -> &mut T {
        self.try_get_singleton_mut::<T>()
            .expect("singleton instance is not alive")
    }

    /// Whether a live instance of exactly `T` occupies the slot. A
    /// destroyed instance, or a sibling class constructed into a shared
    /// base slot, does not count.
    pub fn has_singleton<T: EntityLogic>(&self) -> bool {
        self.try_get_singleton::<T>().is_some()
    }

    fn singleton_id<T: EntityLogic>(&self) -> Option<EntityId> {
        let class = self
            .protocol
            .entity_types
            .try_class_of::<T>()
            .unwrap_or_else(|err| panic!("{err}"));
        assert!(
            class.kind.is_singleton(),
            "{} is not a singleton class",
            class.type_name
        );
        self.filters.singleton(class.filter_id)
    }

    /// Occupant of a singleton slot by filter id, as an untyped handle.
    /// Serves polymorphic reads through base slots.
    pub fn singleton_by_filter(&self, filter_id: FilterId) -> Option<&dyn EntityLogic> {
        self.store.get(self.filters.singleton(filter_id)?)
    }

    // Per-tick work

    /// Advances every alive entity once, in id order. The member list is
    /// snapshotted first so logic may spawn or destroy without skewing
    /// the walk.
    pub fn tick_alive_entities(&mut self, ctx: &TickContext) {
        let ids: Vec<EntityId> = self.store.alive().as_slice().to_vec();
        for id in ids {
            if let Some(entity) = self.store.get_mut(id) {
                if !entity.header().is_destroyed() {
                    entity.update(ctx);
                }
            }
        }
    }

    /// Destroys and removes every entity and clears all views. The
    /// protocol and its registry survive.
    pub(crate) fn reset(&mut self) {
        let occupied: Vec<EntityId> = (1..=MAX_ENTITY_COUNT)
            .map(EntityId::new)
            .filter(|id| self.store.get(*id).is_some())
            .collect();
        for id in occupied {
            self.destroy_entity(id);
            self.remove_entity(id);
        }
        self.store_mut().clear();
        self.filters.clear();
        self.change_queue.clear();
    }
}
