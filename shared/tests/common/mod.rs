//! Fixture shared by the integration tests: a small entity taxonomy
//! (a three-deep class chain, a controller, singletons) over a manual
//! clock.

#![allow(dead_code)]

use std::any::Any;
use std::cell::Cell;
use std::rc::Rc;

use replica_shared::{
    ClassDef, ClassId, EntityHeader, EntityId, EntityLogic, EntityManager, EntityParams,
    EntityWorld, FieldChange, FieldDef, FieldId, FieldMutator, HistoryBuffer, ManagerConfig,
    MaxHistorySize, NetPlayer, NetworkMode, Protocol, RoleHooks, SyncFlags, SyncVar, Tick,
    TickContext, TimeSource, EntityFlags,
};

pub const ACTOR_CLASS: ClassId = ClassId(1);
pub const UNIT_CLASS: ClassId = ClassId(2);
pub const SOLDIER_CLASS: ClassId = ClassId(3);
pub const EFFECT_CLASS: ClassId = ClassId(4);
pub const CONTROLLER_CLASS: ClassId = ClassId(5);
pub const BASE_STATE_CLASS: ClassId = ClassId(6);
pub const GAME_STATE_CLASS: ClassId = ClassId(7);

pub const POSITION_FIELD: FieldId = FieldId(0);
pub const HEALTH_FIELD: FieldId = FieldId(1);

/// Test clock ticking in microseconds, advanced by hand.
pub struct ManualTimeSource {
    now: Rc<Cell<u64>>,
}

impl TimeSource for ManualTimeSource {
    fn now_ticks(&self) -> u64 {
        self.now.get()
    }

    fn ticks_per_second(&self) -> u64 {
        1_000_000
    }
}

macro_rules! entity_header_impl {
    () => {
        fn header(&self) -> &EntityHeader {
            &self.header
        }

        fn header_mut(&mut self) -> &mut EntityHeader {
            &mut self.header
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    };
}

/// Root of the non-singleton chain. Not updateable.
pub struct Actor {
    header: EntityHeader,
}

impl Actor {
    pub fn construct(params: EntityParams) -> Box<dyn EntityLogic> {
        Box::new(Self {
            header: params.header,
        })
    }
}

impl EntityLogic for Actor {
    entity_header_impl!();
}

/// Middle of the chain.
pub struct Unit {
    header: EntityHeader,
}

impl Unit {
    pub fn construct(params: EntityParams) -> Box<dyn EntityLogic> {
        Box::new(Self {
            header: params.header,
        })
    }
}

impl EntityLogic for Unit {
    entity_header_impl!();
}

/// Leaf of the chain: updateable, replicated position with rewind
/// history, replicated health.
pub struct Soldier {
    header: EntityHeader,
    pub position: SyncVar<f32>,
    pub health: SyncVar<u16>,
    pub speed: f32,
    position_history: HistoryBuffer<f32>,
    saved_position: Option<f32>,
}

impl Soldier {
    pub fn construct(params: EntityParams) -> Box<dyn EntityLogic> {
        Box::new(Self {
            header: params.header,
            position: SyncVar::new(POSITION_FIELD, 0.0),
            health: SyncVar::new(HEALTH_FIELD, 100),
            speed: 0.0,
            position_history: HistoryBuffer::new(MaxHistorySize::Ticks32),
            saved_position: None,
        })
    }
}

impl EntityLogic for Soldier {
    entity_header_impl!();

    fn update(&mut self, ctx: &TickContext) {
        if self.speed != 0.0 {
            let next = self.position.get() + self.speed;
            self.position.set(next);
        }
        self.position_history.record(ctx.tick, self.position.get());
    }

    fn bind_field_mutator(&mut self, mutator: &FieldMutator) {
        self.position.bind(mutator);
        self.health.bind(mutator);
    }

    fn enable_lag_compensation(&mut self, player: &NetPlayer) {
        if let Some(historical) = self.position_history.rewind(player.simulated_server_tick) {
            self.saved_position = Some(self.position.get());
            self.position.set_untracked(historical);
        }
    }

    fn disable_lag_compensation(&mut self) {
        if let Some(saved) = self.saved_position.take() {
            self.position.set_untracked(saved);
        }
    }
}

/// Client-visible effect: ticked on both sides.
pub struct Effect {
    header: EntityHeader,
    pub age: u32,
}

impl Effect {
    pub fn construct(params: EntityParams) -> Box<dyn EntityLogic> {
        Box::new(Self {
            header: params.header,
            age: 0,
        })
    }
}

impl EntityLogic for Effect {
    entity_header_impl!();

    fn update(&mut self, _ctx: &TickContext) {
        self.age += 1;
    }
}

/// A player controller.
pub struct PlayerController {
    header: EntityHeader,
}

impl PlayerController {
    pub fn construct(params: EntityParams) -> Box<dyn EntityLogic> {
        Box::new(Self {
            header: params.header,
        })
    }
}

impl EntityLogic for PlayerController {
    entity_header_impl!();
}

/// Singleton base slot occupant.
pub struct BaseState {
    header: EntityHeader,
}

impl BaseState {
    pub fn construct(params: EntityParams) -> Box<dyn EntityLogic> {
        Box::new(Self {
            header: params.header,
        })
    }
}

impl EntityLogic for BaseState {
    entity_header_impl!();
}

/// Concrete singleton, declaring `BaseState` as its base.
pub struct GameState {
    header: EntityHeader,
    pub round: u16,
}

impl GameState {
    pub fn construct(params: EntityParams) -> Box<dyn EntityLogic> {
        Box::new(Self {
            header: params.header,
            round: 0,
        })
    }
}

impl EntityLogic for GameState {
    entity_header_impl!();
}

pub fn test_protocol() -> Protocol {
    let mut protocol = Protocol::builder();
    protocol
        .tick_rate(60)
        .add_entity::<Actor>(ACTOR_CLASS, ClassDef::normal(Actor::construct))
        .add_entity::<Unit>(UNIT_CLASS, ClassDef::normal(Unit::construct).base::<Actor>())
        .add_entity::<Soldier>(
            SOLDIER_CLASS,
            ClassDef::normal(Soldier::construct)
                .flags(EntityFlags::UPDATEABLE)
                .field(
                    FieldDef::of::<f32>(
                        POSITION_FIELD,
                        SyncFlags::INTERPOLATED.union(SyncFlags::LAG_COMPENSATED),
                    )
                    .with_change_notification(),
                )
                .field(FieldDef::of::<u16>(HEALTH_FIELD, SyncFlags::NONE))
                .base::<Unit>()
                .base::<Actor>(),
        )
        .add_entity::<Effect>(
            EFFECT_CLASS,
            ClassDef::normal(Effect::construct)
                .flags(EntityFlags::UPDATEABLE.union(EntityFlags::UPDATE_ON_CLIENT)),
        )
        .add_entity::<PlayerController>(
            CONTROLLER_CLASS,
            ClassDef::controller(PlayerController::construct).flags(EntityFlags::UPDATEABLE),
        )
        .add_entity::<BaseState>(BASE_STATE_CLASS, ClassDef::singleton(BaseState::construct))
        .add_entity::<GameState>(
            GAME_STATE_CLASS,
            ClassDef::singleton(GameState::construct).base::<BaseState>(),
        );
    protocol.build()
}

/// A manager over the test protocol and a handle to its clock.
pub fn manual_manager(mode: NetworkMode) -> (EntityManager, Rc<Cell<u64>>) {
    let now = Rc::new(Cell::new(0u64));
    let config = ManagerConfig {
        time_source: Some(Box::new(ManualTimeSource { now: now.clone() })),
        ..Default::default()
    };
    (EntityManager::new(test_protocol(), mode, config), now)
}

/// Role hooks that record everything the core reports.
#[derive(Default)]
pub struct RecordingHooks {
    pub ticks: Vec<Tick>,
    pub changes: Vec<(Tick, FieldChange)>,
    pub alive_added: Vec<EntityId>,
}

impl RoleHooks for RecordingHooks {
    fn on_logic_tick(&mut self, world: &mut EntityWorld, ctx: &TickContext) {
        self.ticks.push(ctx.tick);
        world.tick_alive_entities(ctx);
    }

    fn entity_field_changed(
        &mut self,
        _world: &mut EntityWorld,
        ctx: &TickContext,
        change: FieldChange,
    ) {
        self.changes.push((ctx.tick, change));
    }

    fn on_alive_entity_added(&mut self, entity: EntityId) {
        self.alive_added.push(entity);
    }
}

/// Adds and constructs an entity outside the tick loop.
pub fn spawn(
    manager: &mut EntityManager,
    hooks: &mut dyn RoleHooks,
    class_id: ClassId,
    id: u16,
    version: u8,
) -> EntityId {
    let entity_id = EntityId::new(id);
    let ctx = manager.tick_context();
    manager.world_mut().add_entity(class_id, entity_id, version);
    manager.world_mut().construct_entity(entity_id, &ctx, hooks);
    entity_id
}

/// Destroys and removes in one step.
pub fn despawn(manager: &mut EntityManager, id: EntityId) {
    manager.world_mut().destroy_entity(id);
    manager.world_mut().remove_entity(id);
}

/// Runs `updates` manager updates, advancing the clock by
/// `micros_per_update` before each.
pub fn run_updates(
    manager: &mut EntityManager,
    hooks: &mut dyn RoleHooks,
    now: &Rc<Cell<u64>>,
    updates: usize,
    micros_per_update: u64,
) {
    for _ in 0..updates {
        now.set(now.get() + micros_per_update);
        manager.update(hooks);
    }
}
