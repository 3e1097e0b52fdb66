//! The lag-compensation protocol: rewind to a player's observed tick,
//! restore on disable, and the idempotent / rollback-only guards.

mod common;

use common::*;
use replica_shared::{
    EntitySharedReference, NetPlayer, NetworkMode, PlayerId, UpdateMode,
};

fn soldier_position(manager: &replica_shared::EntityManager, id: replica_shared::EntityId) -> f32 {
    let soldier: &Soldier = manager.get_entity_by_id(EntitySharedReference::new(id, 0));
    soldier.position.get()
}

/// A moving soldier whose position history has been filled for ten ticks.
fn moving_soldier() -> (
    replica_shared::EntityManager,
    std::rc::Rc<std::cell::Cell<u64>>,
    replica_shared::EntityId,
) {
    let (mut manager, now) = manual_manager(NetworkMode::Server);
    let mut hooks = RecordingHooks::default();

    let id = spawn(&mut manager, &mut hooks, SOLDIER_CLASS, 3, 0);
    {
        let soldier: &mut Soldier = manager
            .world_mut()
            .get_entity_by_id_mut(EntitySharedReference::new(id, 0));
        soldier.speed = 1.0;
    }
    manager.update(&mut hooks);
    run_updates(&mut manager, &mut hooks, &now, 5, 33_332);
    (manager, now, id)
}

#[test]
fn enable_rewinds_and_disable_restores() {
    let (mut manager, _now, id) = moving_soldier();
    assert_eq!(manager.tick(), 10);
    assert_eq!(soldier_position(&manager, id), 10.0);

    let player = NetPlayer::new(PlayerId(1), 6);
    manager.enable_lag_compensation(&player);
    assert!(manager.is_lag_compensation_enabled());
    assert_eq!(soldier_position(&manager, id), 6.0);

    manager.disable_lag_compensation();
    assert!(!manager.is_lag_compensation_enabled());
    assert_eq!(soldier_position(&manager, id), 10.0);
}

#[test]
fn enable_is_idempotent() {
    let (mut manager, _now, id) = moving_soldier();

    manager.enable_lag_compensation(&NetPlayer::new(PlayerId(1), 6));
    // A second enable for a different tick must not re-rewind.
    manager.enable_lag_compensation(&NetPlayer::new(PlayerId(2), 2));
    assert_eq!(soldier_position(&manager, id), 6.0);

    manager.disable_lag_compensation();
    manager.disable_lag_compensation();
    assert_eq!(soldier_position(&manager, id), 10.0);
}

#[test]
fn rewound_writes_are_not_reported_as_changes() {
    let (mut manager, _now, id) = moving_soldier();
    let _ = id;

    manager.enable_lag_compensation(&NetPlayer::new(PlayerId(1), 6));
    manager.disable_lag_compensation();
    assert!(manager.world().drain_field_changes().is_empty());
}

#[test]
fn client_outside_rollback_does_not_rewind() {
    let (mut manager, now) = manual_manager(NetworkMode::Client);
    let mut hooks = RecordingHooks::default();

    // Local-range soldier so the client ticks it.
    let id = spawn(&mut manager, &mut hooks, SOLDIER_CLASS, 9000, 0);
    {
        let soldier: &mut Soldier = manager
            .world_mut()
            .get_entity_by_id_mut(EntitySharedReference::new(id, 0));
        soldier.speed = 1.0;
    }
    manager.update(&mut hooks);
    run_updates(&mut manager, &mut hooks, &now, 5, 33_332);

    manager.enable_lag_compensation(&NetPlayer::new(PlayerId(1), 6));
    assert!(!manager.is_lag_compensation_enabled());

    // During rollback the rewind is permitted.
    manager.set_update_mode(UpdateMode::PredictionRollback);
    manager.enable_lag_compensation(&NetPlayer::new(PlayerId(1), 6));
    assert!(manager.is_lag_compensation_enabled());
    manager.disable_lag_compensation();
}

#[test]
fn local_entities_are_not_lag_compensated() {
    let (mut manager, _now) = manual_manager(NetworkMode::Server);
    let mut hooks = RecordingHooks::default();

    let synced = spawn(&mut manager, &mut hooks, SOLDIER_CLASS, 3, 0);
    let local = spawn(&mut manager, &mut hooks, SOLDIER_CLASS, 9000, 0);

    let lag_set = manager.world().store().lag_compensated();
    assert!(lag_set.contains(synced));
    assert!(!lag_set.contains(local));
}
