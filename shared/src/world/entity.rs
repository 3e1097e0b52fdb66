use std::any::Any;

use crate::types::{
    ClassId, EntityId, EntitySharedReference, NetPlayer, NetworkMode, Tick, UpdateMode,
};
use crate::world::sync_var::FieldMutator;

/// Per-tick information handed to entity logic and role hooks.
#[derive(Clone, Copy, Debug)]
pub struct TickContext {
    pub tick: Tick,
    pub delta_time: f32,
    pub mode: NetworkMode,
    pub update_mode: UpdateMode,
}

impl TickContext {
    /// True while a rollback window is being replayed. Entity logic uses
    /// this to keep replayed side effects idempotent.
    pub fn in_rollback(&self) -> bool {
        self.update_mode == UpdateMode::PredictionRollback
    }
}

/// Identity and lifecycle state common to every entity.
#[derive(Clone, Copy, Debug)]
pub struct EntityHeader {
    id: EntityId,
    version: u8,
    class_id: ClassId,
    is_local: bool,
    is_destroyed: bool,
}

impl EntityHeader {
    pub fn new(id: EntityId, version: u8, class_id: ClassId) -> Self {
        Self {
            id,
            version,
            class_id,
            is_local: id.is_local(),
            is_destroyed: false,
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn class_id(&self) -> ClassId {
        self.class_id
    }

    pub fn is_local(&self) -> bool {
        self.is_local
    }

    pub fn is_destroyed(&self) -> bool {
        self.is_destroyed
    }

    /// Handle that resolves to this entity until the id is reused.
    pub fn shared_reference(&self) -> EntitySharedReference {
        EntitySharedReference::new(self.id, self.version)
    }

    pub(crate) fn mark_destroyed(&mut self) {
        self.is_destroyed = true;
    }
}

/// Arguments handed to an entity constructor.
#[derive(Clone, Copy, Debug)]
pub struct EntityParams {
    pub header: EntityHeader,
}

impl EntityParams {
    pub fn new(id: EntityId, version: u8, class_id: ClassId) -> Self {
        Self {
            header: EntityHeader::new(id, version, class_id),
        }
    }
}

/// Builds a fresh instance of a registered entity class.
pub type EntityConstructor = fn(EntityParams) -> Box<dyn EntityLogic>;

/// The behavior every entity class implements.
///
/// Only `header` / `header_mut` and the `Any` accessors are mandatory;
/// the lifecycle hooks default to no-ops so simple classes stay short.
pub trait EntityLogic: 'static {
    fn header(&self) -> &EntityHeader;

    fn header_mut(&mut self) -> &mut EntityHeader;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Called after the entity has joined its filters or singleton slot,
    /// before it joins the alive and lag-compensated sets.
    fn on_constructed(&mut self, _ctx: &TickContext) {}

    /// Called when the entity leaves all views. The id slot is still
    /// occupied until the entity is removed.
    fn on_destroyed(&mut self) {}

    /// Advances one fixed tick. Only alive entities are ticked.
    fn update(&mut self, _ctx: &TickContext) {}

    /// Installs the write-barrier handle into every tracked field.
    /// Classes without tracked fields ignore it.
    fn bind_field_mutator(&mut self, _mutator: &FieldMutator) {}

    /// Rewinds the rewindable field subset to the tick the given player
    /// observed. Paired with `disable_lag_compensation`.
    fn enable_lag_compensation(&mut self, _player: &NetPlayer) {}

    fn disable_lag_compensation(&mut self) {}
}

impl dyn EntityLogic {
    /// Downcast to a concrete entity class. Exact-type, like every
    /// typed accessor on the manager.
    pub fn downcast_ref<T: EntityLogic>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: EntityLogic>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }
}

/// A per-manager object outside the entity id space: one instance per
/// concrete type, local to this host, never replicated. Receives the
/// clock's visual and logic callbacks around each tick.
pub trait LocalSingleton: 'static {
    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Called once per `update()` with the wall delta, before any tick.
    fn visual_update(&mut self, _delta_time: f32) {}

    /// Called once per fired logic tick, before the role hook.
    fn logic_update(&mut self, _ctx: &TickContext) {}
}
