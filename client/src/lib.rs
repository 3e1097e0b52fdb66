//! # Replica Client
//! The predicting side of the simulation: ticks local and
//! client-updated entities ahead of the server, collects predicted
//! field writes for reconciliation, and slews its clock toward the
//! server tick.

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

mod client;

pub use client::{ClientEntityManager, ClientError};
