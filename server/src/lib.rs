//! # Replica Server
//! The authoritative side of the simulation: allocates synced entity
//! ids, ticks the world, tracks which fields changed for the outbound
//! delta encoder, and rewinds the world for lag-compensated actions.

#![deny(
    trivial_casts,
    trivial_numeric_casts,
    unstable_features,
    unused_import_braces
)]

pub mod shared {
    pub use replica_shared::{
        ClassDef, ClassId, ClockStep, EntityHeader, EntityId, EntityLogic, EntityManager,
        EntityParams, EntitySharedReference, EntityWorld, FieldChange, FieldDef, FieldId,
        FieldValue, FloatAngle, HistoryBuffer, InputProcessor, ManagerConfig, MaxHistorySize,
        NetPlayer, NetworkMode, PlayerId, Protocol, RoleHooks, SyncFlags, SyncVar, Tick,
        TickContext, UpdateMode,
    };
}

mod dirty;
mod server;

pub use dirty::DirtyFieldTracker;
pub use server::{ServerEntityManager, ServerError};
