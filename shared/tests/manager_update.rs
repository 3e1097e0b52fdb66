//! The update pipeline end to end: fixed cadence, the backlog clamp,
//! local-singleton hooks, and field-change delivery order.

mod common;

use std::any::Any;

use common::*;
use replica_shared::{EntitySharedReference, LocalSingleton, NetworkMode, TickContext};

#[derive(Default)]
struct FrameCounter {
    visual_updates: u32,
    logic_updates: Vec<u16>,
    last_delta: f32,
}

impl LocalSingleton for FrameCounter {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn visual_update(&mut self, delta_time: f32) {
        self.visual_updates += 1;
        self.last_delta = delta_time;
    }

    fn logic_update(&mut self, ctx: &TickContext) {
        self.logic_updates.push(ctx.tick);
    }
}

#[test]
fn fixed_cadence_increments_tick_per_fired_step() {
    let (mut manager, now) = manual_manager(NetworkMode::Server);
    let mut hooks = RecordingHooks::default();

    manager.update(&mut hooks); // starts the clock
    assert_eq!(manager.tick(), 0);

    // 33.33 ms at 60 fps: two ticks per update call.
    run_updates(&mut manager, &mut hooks, &now, 3, 33_332);
    assert_eq!(manager.tick(), 6);
    assert_eq!(hooks.ticks, vec![1, 2, 3, 4, 5, 6]);
    assert!(manager.lerp_factor() >= 0.0 && manager.lerp_factor() < 1.0);
}

#[test]
fn backlog_clamp_fires_at_most_five_ticks_then_resumes() {
    let (mut manager, now) = manual_manager(NetworkMode::Server);
    let mut hooks = RecordingHooks::default();

    manager.update(&mut hooks);

    // A full second of pause: only five ticks fire, the rest is shed.
    now.set(now.get() + 1_000_000);
    let step = manager.update(&mut hooks);
    assert_eq!(step.ticks_fired, 5);
    assert!(step.backlog_shed);
    assert_eq!(manager.tick(), 5);

    // Normal cadence afterwards.
    run_updates(&mut manager, &mut hooks, &now, 1, 16_666);
    assert_eq!(manager.tick(), 6);
}

#[test]
fn alive_entities_advance_once_per_tick() {
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
    run_updates(&mut manager, &mut hooks, &now, 2, 33_332);

    let soldier: &Soldier = manager.get_entity_by_id(EntitySharedReference::new(id, 0));
    assert_eq!(soldier.position.get(), 4.0);
}

#[test]
fn field_changes_arrive_after_each_tick_in_write_order() {
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
    run_updates(&mut manager, &mut hooks, &now, 1, 33_332);

    // One position change per fired tick, tagged with that tick.
    let seen: Vec<(u16, u16)> = hooks
        .changes
        .iter()
        .map(|(tick, change)| (*tick, change.field.0))
        .collect();
    assert_eq!(seen, vec![(1, POSITION_FIELD.0), (2, POSITION_FIELD.0)]);
    assert!(hooks
        .changes
        .iter()
        .all(|(_, change)| change.entity == id));
}

#[test]
fn local_singleton_receives_visual_then_logic_updates() {
    let (mut manager, now) = manual_manager(NetworkMode::Server);
    let mut hooks = RecordingHooks::default();

    manager.add_local_singleton(FrameCounter::default());
    manager.update(&mut hooks);
    run_updates(&mut manager, &mut hooks, &now, 1, 33_332);

    let counter = manager.get_local_singleton::<FrameCounter>();
    assert_eq!(counter.visual_updates, 1);
    assert_eq!(counter.logic_updates, vec![1, 2]);
    assert!((counter.last_delta - 0.033_332).abs() < 1e-4);
    assert!((manager.visual_delta_time() - 0.033_332).abs() < 1e-4);
}

#[test]
fn reset_is_idempotent_and_restores_fresh_behavior() {
    let (mut manager, now) = manual_manager(NetworkMode::Server);
    let mut hooks = RecordingHooks::default();

    spawn(&mut manager, &mut hooks, SOLDIER_CLASS, 3, 0);
    spawn(&mut manager, &mut hooks, GAME_STATE_CLASS, 4, 0);
    manager.add_local_singleton(FrameCounter::default());
    manager.update(&mut hooks);
    run_updates(&mut manager, &mut hooks, &now, 2, 33_332);
    assert_ne!(manager.tick(), 0);

    manager.reset();
    manager.reset();

    assert!(!manager.is_running());
    assert_eq!(manager.tick(), 0);
    assert_eq!(manager.entities_count(), 0);
    assert_eq!(manager.get_entities::<Soldier>().count(), 0);
    assert!(!manager.has_singleton::<GameState>());
    assert!(manager.try_get_local_singleton::<FrameCounter>().is_none());
    assert!(manager.in_normal_state());

    // A fresh construction behaves identically.
    let mut fresh_hooks = RecordingHooks::default();
    manager.update(&mut fresh_hooks);
    run_updates(&mut manager, &mut fresh_hooks, &now, 1, 33_332);
    assert_eq!(manager.tick(), 2);
    assert_eq!(fresh_hooks.ticks, vec![1, 2]);
}
