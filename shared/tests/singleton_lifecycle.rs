//! Singleton slots: population on construction, clearing on
//! destruction, replacement, base-slot sharing, and the runtime type
//! check behind `has_singleton`.

mod common;

use common::*;
use replica_shared::{EntityLogic, NetworkMode};

#[test]
fn singleton_replacement_cycle() {
    let (mut manager, _now) = manual_manager(NetworkMode::Server);
    let mut hooks = RecordingHooks::default();

    let first = spawn(&mut manager, &mut hooks, GAME_STATE_CLASS, 1, 0);
    assert!(manager.has_singleton::<GameState>());
    assert_eq!(manager.get_singleton::<GameState>().header().id(), first);

    despawn(&mut manager, first);
    assert!(!manager.has_singleton::<GameState>());
    assert!(manager.try_get_singleton::<GameState>().is_none());

    let second = spawn(&mut manager, &mut hooks, GAME_STATE_CLASS, 2, 0);
    assert_eq!(manager.get_singleton::<GameState>().header().id(), second);
}

#[test]
fn singleton_occupies_its_base_slot_too() {
    let (mut manager, _now) = manual_manager(NetworkMode::Server);
    let mut hooks = RecordingHooks::default();

    let id = spawn(&mut manager, &mut hooks, GAME_STATE_CLASS, 1, 0);

    // Typed access through the base is exact-type and finds nothing...
    assert!(!manager.has_singleton::<BaseState>());

    // ...but the base slot itself holds the instance for untyped reads.
    let base_filter = manager
        .world()
        .protocol()
        .entity_types
        .class_of::<BaseState>()
        .unwrap()
        .filter_id;
    let occupant = manager.world().singleton_by_filter(base_filter).unwrap();
    assert_eq!(occupant.header().id(), id);

    despawn(&mut manager, id);
    assert!(manager.world().singleton_by_filter(base_filter).is_none());
}

#[test]
fn base_state_instance_does_not_satisfy_a_game_state_query() {
    let (mut manager, _now) = manual_manager(NetworkMode::Server);
    let mut hooks = RecordingHooks::default();

    spawn(&mut manager, &mut hooks, BASE_STATE_CLASS, 1, 0);
    assert!(manager.has_singleton::<BaseState>());
    assert!(!manager.has_singleton::<GameState>());
}

#[test]
fn singleton_mutation_through_the_typed_accessor() {
    let (mut manager, _now) = manual_manager(NetworkMode::Server);
    let mut hooks = RecordingHooks::default();

    spawn(&mut manager, &mut hooks, GAME_STATE_CLASS, 1, 0);
    manager.world_mut().get_singleton_mut::<GameState>().round = 3;
    assert_eq!(manager.get_singleton::<GameState>().round, 3);
}
