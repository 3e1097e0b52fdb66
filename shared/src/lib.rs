//! # Replica Shared
//! Common functionality shared between replica-server & replica-client
//! crates: the typed class registry, the entity store and its views, the
//! fixed-step tick clock, and the lag-compensation protocol.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

mod clock;
mod constants;
mod history;
mod id_alloc;
mod manager;
mod protocol;
mod tick_math;
mod types;
mod value_types;
mod world;

pub use clock::{ClockStep, StdTimeSource, TickClock, TimeSource};
pub use history::HistoryBuffer;
pub use id_alloc::{EntityIdAllocator, IdAllocatorError};
pub use constants::{
    INVALID_ENTITY_ID, MAX_ENTITY_COUNT, MAX_PARTS, MAX_PLAYERS, MAX_SAVED_STATE_DIFF,
    MAX_SYNCED_ENTITY_COUNT, MAX_TICKS_PER_UPDATE, MIN_SLOWDOWN_TICKS, SERVER_PLAYER_ID,
    TIME_SPEED_CHANGE_COEF,
};
pub use manager::{EntityManager, ManagerConfig, NullHooks, RoleHooks};
pub use protocol::{Protocol, ProtocolError};
pub use tick_math::{tick_delta, tick_newer_than, tick_older_than};
pub use types::{
    ClassId, DeserializeResult, EntityId, EntitySharedReference, FieldId, FilterId,
    MaxHistorySize, NetPlayer, NetworkMode, PlayerId, Tick, UpdateMode, CONTROLLERS_FILTER_ID,
};
pub use value_types::{FieldValue, FloatAngle, ValueTypeError, ValueTypeInfo, ValueTypes};
pub use world::{
    entity::{
        EntityConstructor, EntityHeader, EntityLogic, EntityParams, LocalSingleton, TickContext,
    },
    filter::Filters,
    ordered_set::{OrderedIdSet, OrderedSetError},
    registry::{
        ClassDef, ClassKind, EntityClassData, EntityFieldInfo, EntityFlags, EntityTypes, FieldDef,
        RegistryError, SyncFlags,
    },
    store::{EntityStore, StoreError},
    sync_var::{FieldChange, FieldChangeQueue, FieldMutator, SyncVar},
    world::{EntityIter, EntityWorld, WorldError},
};

/// The input-processor contract: held by reference by the role
/// specializations and invoked once per fixed tick to apply buffered
/// player input to the controllers. The core neither inspects nor
/// mutates it.
pub trait InputProcessor {
    fn apply_inputs(&mut self, world: &mut EntityWorld, ctx: &TickContext);
}
