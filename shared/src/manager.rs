use std::any::{type_name, TypeId};
use std::collections::HashMap;

use crate::clock::{ClockStep, TickClock, TimeSource};
use crate::constants::SERVER_PLAYER_ID;
use crate::protocol::Protocol;
use crate::types::{
    EntityId, EntitySharedReference, MaxHistorySize, NetPlayer, NetworkMode, PlayerId, Tick,
    UpdateMode,
};
use crate::world::entity::{EntityLogic, LocalSingleton, TickContext};
use crate::world::lag_compensation::LagCompensation;
use crate::world::sync_var::FieldChange;
use crate::world::world::{EntityIter, EntityWorld};

/// The operations a role specialization (server or client) supplies to
/// the core. The core stays role-agnostic; these hooks carry everything
/// that differs between the two sides.
pub trait RoleHooks {
    /// Called once per fixed logic tick.
    fn on_logic_tick(&mut self, world: &mut EntityWorld, ctx: &TickContext);

    /// Called after each tick for every tracked field written during it,
    /// in write order. The server turns these into outbound deltas, the
    /// client into reconciliation candidates.
    fn entity_field_changed(&mut self, world: &mut EntityWorld, ctx: &TickContext, change: FieldChange);

    /// Called when an entity joins the alive set.
    fn on_alive_entity_added(&mut self, _entity: EntityId) {}
}

/// Configuration of one manager instance.
pub struct ManagerConfig {
    /// Per-manager prefix byte the transport uses to route packets.
    pub header_byte: u8,
    pub player_id: PlayerId,
    /// Clock override, mainly for tests; defaults to the standard
    /// monotonic source.
    pub time_source: Option<Box<dyn TimeSource>>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            header_byte: 0,
            player_id: PlayerId(SERVER_PLAYER_ID),
            time_source: None,
        }
    }
}

#[derive(Default)]
struct LocalSingletons {
    index: HashMap<TypeId, usize>,
    items: Vec<Box<dyn LocalSingleton>>,
}

impl LocalSingletons {
    fn add<S: LocalSingleton>(&mut self, singleton: S) {
        let type_id = TypeId::of::<S>();
        if self.index.contains_key(&type_id) {
            panic!("Local singleton {} already added", type_name::<S>());
        }
        self.index.insert(type_id, self.items.len());
        self.items.push(Box::new(singleton));
    }

    fn get<S: LocalSingleton>(&self) -> Option<&S> {
        let position = *self.index.get(&TypeId::of::<S>())?;
        self.items[position].as_any().downcast_ref::<S>()
    }

    fn get_mut<S: LocalSingleton>(&mut self) -> Option<&mut S> {
        let position = *self.index.get(&TypeId::of::<S>())?;
        self.items[position].as_any_mut().downcast_mut::<S>()
    }

    fn visual_update(&mut self, delta_time: f32) {
        for singleton in &mut self.items {
            singleton.visual_update(delta_time);
        }
    }

    fn logic_update(&mut self, ctx: &TickContext) {
        for singleton in &mut self.items {
            singleton.logic_update(ctx);
        }
    }

    fn clear(&mut self) {
        self.index.clear();
        self.items.clear();
    }
}

/// The role-agnostic entity manager: the world, the fixed-step clock,
/// the local singletons, and the lag-compensation toggle. The server and
/// client crates wrap it (as a public `base` field) and drive it through
/// their [`RoleHooks`].
pub struct EntityManager {
    world: EntityWorld,
    clock: TickClock,
    update_mode: UpdateMode,
    header_byte: u8,
    player_id: PlayerId,
    max_history_size: MaxHistorySize,
    local_singletons: LocalSingletons,
    lag_compensation: LagCompensation,
}

impl EntityManager {
    /// Builds a manager over the protocol, locking it if the host did
    /// not already.
    pub fn new(mut protocol: Protocol, mode: NetworkMode, config: ManagerConfig) -> Self {
        if !protocol.is_locked() {
            protocol.lock();
        }
        let clock = match config.time_source {
            Some(source) => TickClock::new(protocol.frames_per_second, source),
            None => TickClock::standard(protocol.frames_per_second),
        };
        let max_history_size = protocol.max_history_size;
        Self {
            world: EntityWorld::new(protocol, mode),
            clock,
            update_mode: UpdateMode::Normal,
            header_byte: config.header_byte,
            player_id: config.player_id,
            max_history_size,
            local_singletons: LocalSingletons::default(),
            lag_compensation: LagCompensation::new(),
        }
    }

    // The update pipeline

    /// Advances wall time and fires due logic ticks: the local-singleton
    /// visual hook first, then per fired tick the local-singleton logic
    /// hooks, `on_logic_tick`, and the drained field changes in write
    /// order.
    pub fn update(&mut self, hooks: &mut dyn RoleHooks) -> ClockStep {
        let Self {
            world,
            clock,
            local_singletons,
            update_mode,
            ..
        } = self;

        let Some(visual_delta) = clock.advance() else {
            return ClockStep::idle(0.0);
        };
        local_singletons.visual_update(visual_delta);

        let mode = world.mode();
        let delta_time = clock.delta_time_f32();
        let update_mode = *update_mode;
        clock.run_ticks(|tick| {
            let ctx = TickContext {
                tick,
                delta_time,
                mode,
                update_mode,
            };
            local_singletons.logic_update(&ctx);
            hooks.on_logic_tick(world, &ctx);
            for change in world.drain_field_changes() {
                hooks.entity_field_changed(world, &ctx, change);
            }
        })
    }

    /// Returns the manager to its pre-first-tick state: clock stopped at
    /// tick 0, every entity destroyed and removed, all views cleared,
    /// local singletons dropped. Idempotent.
    pub fn reset(&mut self) {
        self.clock.reset();
        self.world.reset();
        self.local_singletons.clear();
        self.lag_compensation.reset();
        self.update_mode = UpdateMode::Normal;
    }

    /// Context describing the current tick, for lifecycle calls made
    /// between updates.
    pub fn tick_context(&self) -> TickContext {
        TickContext {
            tick: self.clock.tick(),
            delta_time: self.clock.delta_time_f32(),
            mode: self.world.mode(),
            update_mode: self.update_mode,
        }
    }

    // World access

    pub fn world(&self) -> &EntityWorld {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut EntityWorld {
        &mut self.world
    }

    // Lag compensation

    /// Rewinds every lag-compensated entity to the tick `player`
    /// observed. No-op when already enabled, or on a client outside
    /// rollback.
    pub fn enable_lag_compensation(&mut self, player: &NetPlayer) {
        let mode = self.world.mode();
        self.lag_compensation
            .enable(player, mode, self.update_mode, self.world.store_mut());
    }

    /// Restores every lag-compensated entity. No-op when not enabled.
    pub fn disable_lag_compensation(&mut self) {
        self.lag_compensation.disable(self.world.store_mut());
    }

    pub fn is_lag_compensation_enabled(&self) -> bool {
        self.lag_compensation.is_enabled()
    }

    // Local singletons

    /// # Panics
    ///
    /// Panics if a singleton of the same type was already added.
    pub fn add_local_singleton<S: LocalSingleton>(&mut self, singleton: S) {
        self.local_singletons.add(singleton);
    }

    pub fn try_get_local_singleton<S: LocalSingleton>(&self) -> Option<&S> {
        self.local_singletons.get::<S>()
    }

    /// # Panics
    ///
    /// Panics if no singleton of this type was added. Use
    /// `try_get_local_singleton` for non-panicking lookup.
    pub fn get_local_singleton<S: LocalSingleton>(&self) -> &S {
        self.try_get_local_singleton::<S>()
            .expect("local singleton was never added")
    }

    pub fn try_get_local_singleton_mut<S: LocalSingleton>(&mut self) -> Option<&mut S> {
        self.local_singletons.get_mut::<S>()
    }

    pub fn get_local_singleton_mut<S: LocalSingleton>(&mut self) -> &mut S {
        self.try_get_local_singleton_mut::<S>()
            .expect("local singleton was never added")
    }

    // Query surface, delegated to the world

    pub fn entities_count(&self) -> usize {
        self.world.entities_count()
    }

    pub fn try_get_entity_by_id<T: EntityLogic>(
        &self,
        reference: EntitySharedReference,
    ) -> Option<&T> {
        self.world.try_get_entity_by_id(reference)
    }

    pub fn get_entity_by_id<T: EntityLogic>(&self, reference: EntitySharedReference) -> &T {
        self.world.get_entity_by_id(reference)
    }

    pub fn get_entities<T: EntityLogic>(&mut self) -> EntityIter<'_> {
        self.world.get_entities::<T>()
    }

    pub fn get_controllers<T: EntityLogic>(&mut self) -> EntityIter<'_> {
        self.world.get_controllers::<T>()
    }

    pub fn try_get_singleton<T: EntityLogic>(&self) -> Option<&T> {
        self.world.try_get_singleton::<T>()
    }

    pub fn get_singleton<T: EntityLogic>(&self) -> &T {
        self.world.get_singleton::<T>()
    }

    pub fn has_singleton<T: EntityLogic>(&self) -> bool {
        self.world.has_singleton::<T>()
    }

    // Clock and identity accessors

    pub fn tick(&self) -> Tick {
        self.clock.tick()
    }

    pub fn lerp_factor(&self) -> f32 {
        self.clock.lerp_factor()
    }

    pub fn visual_delta_time(&self) -> f32 {
        self.clock.visual_delta_time()
    }

    pub fn frames_per_second(&self) -> u16 {
        self.clock.frames_per_second()
    }

    pub fn delta_time(&self) -> f64 {
        self.clock.delta_time()
    }

    pub fn delta_time_f32(&self) -> f32 {
        self.clock.delta_time_f32()
    }

    pub fn is_running(&self) -> bool {
        self.clock.is_running()
    }

    pub fn mode(&self) -> NetworkMode {
        self.world.mode()
    }

    pub fn is_server(&self) -> bool {
        self.world.mode().is_server()
    }

    pub fn is_client(&self) -> bool {
        self.world.mode().is_client()
    }

    pub fn update_mode(&self) -> UpdateMode {
        self.update_mode
    }

    /// Flips the manager between normal ticking and rollback replay.
    /// Driven by the client's prediction layer.
    pub fn set_update_mode(&mut self, update_mode: UpdateMode) {
        self.update_mode = update_mode;
    }

    pub fn in_rollback_state(&self) -> bool {
        self.update_mode == UpdateMode::PredictionRollback
    }

    pub fn in_normal_state(&self) -> bool {
        self.update_mode == UpdateMode::Normal
    }

    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    /// Installs the player id assigned by the server during handshake.
    pub fn set_player_id(&mut self, player_id: PlayerId) {
        self.player_id = player_id;
    }

    pub fn header_byte(&self) -> u8 {
        self.header_byte
    }

    pub fn max_history_size(&self) -> MaxHistorySize {
        self.max_history_size
    }

    /// Slew control for the client: positive slows the tick rate,
    /// negative speeds it up. Clamped to `[-1, 1]`.
    pub fn set_speed_multiplier(&mut self, multiplier: f32) {
        self.clock.set_speed_multiplier(multiplier);
    }

    pub fn speed_multiplier(&self) -> f32 {
        self.clock.speed_multiplier()
    }

    /// Hard tick resync, for when the client has drifted beyond what the
    /// slew can recover.
    pub fn resync_tick(&mut self, tick: Tick) {
        self.clock.set_tick(tick);
    }
}

/// No-op hooks, for hosts (and tests) that drive a bare manager.
pub struct NullHooks;

impl RoleHooks for NullHooks {
    fn on_logic_tick(&mut self, _world: &mut EntityWorld, _ctx: &TickContext) {}

    fn entity_field_changed(
        &mut self,
        _world: &mut EntityWorld,
        _ctx: &TickContext,
        _change: FieldChange,
    ) {
    }
}
