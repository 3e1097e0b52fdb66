use std::collections::HashMap;

use log::warn;
use thiserror::Error;

use replica_shared::{
    ClockStep, EntityIdAllocator, EntityLogic, EntityManager, EntitySharedReference, EntityWorld,
    FieldChange, IdAllocatorError, InputProcessor, ManagerConfig, NetPlayer, NetworkMode,
    PlayerId, Protocol, RoleHooks, Tick, TickContext, WorldError, MAX_PLAYERS,
    MAX_SYNCED_ENTITY_COUNT, SERVER_PLAYER_ID,
};

use crate::dirty::DirtyFieldTracker;

/// Errors raised by the server manager.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServerError {
    #[error(transparent)]
    World(#[from] WorldError),

    #[error(transparent)]
    IdAllocation(#[from] IdAllocatorError),

    /// The player table is full.
    #[error("Player limit of {MAX_PLAYERS} reached")]
    PlayerLimitReached,

    /// Player id 0 belongs to the server.
    #[error("Player id 0 is reserved for the server")]
    ReservedPlayerId,

    /// A player with this id is already connected.
    #[error("Player {id} is already connected")]
    DuplicatePlayer { id: u8 },

    /// No player with this id is connected.
    #[error("Player {id} is not connected")]
    UnknownPlayer { id: u8 },
}

/// Server half of the role hooks: applies buffered input, advances the
/// alive set, and routes field writes into the dirty tracker feeding the
/// delta encoder.
struct ServerRole {
    dirty: DirtyFieldTracker,
    input_processor: Option<Box<dyn InputProcessor>>,
}

impl RoleHooks for ServerRole {
    fn on_logic_tick(&mut self, world: &mut EntityWorld, ctx: &TickContext) {
        if let Some(input_processor) = &mut self.input_processor {
            input_processor.apply_inputs(world, ctx);
        }
        world.tick_alive_entities(ctx);
    }

    fn entity_field_changed(
        &mut self,
        _world: &mut EntityWorld,
        ctx: &TickContext,
        change: FieldChange,
    ) {
        self.dirty.record(ctx.tick, change);
    }
}

/// The authoritative entity manager: owns the synced id range, the
/// player table, and the per-tick dirty-field stream consumed by the
/// outbound delta encoder.
pub struct ServerEntityManager {
    pub base: EntityManager,
    role: ServerRole,
    id_allocator: EntityIdAllocator,
    players: HashMap<PlayerId, NetPlayer>,
}

impl ServerEntityManager {
    pub fn new(protocol: Protocol, mut config: ManagerConfig) -> Self {
        config.player_id = PlayerId(SERVER_PLAYER_ID);
        Self {
            base: EntityManager::new(protocol, NetworkMode::Server, config),
            role: ServerRole {
                dirty: DirtyFieldTracker::new(),
                input_processor: None,
            },
            id_allocator: EntityIdAllocator::new(1, MAX_SYNCED_ENTITY_COUNT),
            players: HashMap::new(),
        }
    }

    pub fn with_input_processor(mut self, input_processor: Box<dyn InputProcessor>) -> Self {
        self.role.input_processor = Some(input_processor);
        self
    }

    /// Advances the wall clock, firing due logic ticks.
    pub fn update(&mut self) -> ClockStep {
        let Self { base, role, .. } = self;
        base.update(role)
    }

    // Spawning

    /// Spawns and constructs an entity of class `T` on a freshly
    /// allocated synced id.
    pub fn spawn<T: EntityLogic>(&mut self) -> Result<EntitySharedReference, ServerError> {
        self.spawn_with::<T>(|_| {})
    }

    /// Like [`spawn`], running `init` on the entity between the
    /// constructor and its insertion into the world views.
    ///
    /// [`spawn`]: ServerEntityManager::spawn
    pub fn spawn_with<T: EntityLogic>(
        &mut self,
        init: impl FnOnce(&mut T),
    ) -> Result<EntitySharedReference, ServerError> {
        let class_id = self
            .base
            .world()
            .protocol()
            .entity_types
            .try_class_of::<T>()
            .map_err(WorldError::from)?
            .class_id;
        let (id, version) = self.id_allocator.allocate()?;

        let entity = self.base.world_mut().try_add_entity(class_id, id, version)?;
        let typed = entity
            .downcast_mut::<T>()
            .expect("class constructor built its own type");
        init(typed);

        let ctx = self.base.tick_context();
        self.base
            .world_mut()
            .construct_entity(id, &ctx, &mut self.role);
        Ok(EntitySharedReference::new(id, version))
    }

    /// Destroys, removes, and recycles the entity behind a live handle.
    /// Stale handles are reported and ignored.
    pub fn despawn(&mut self, reference: EntitySharedReference) {
        if self
            .base
            .world()
            .store()
            .get_by_reference(reference)
            .is_none()
        {
            warn!(
                "Despawning stale reference {{id: {}, version: {}}}",
                reference.id.value(),
                reference.version
            );
            return;
        }
        self.base.world_mut().destroy_entity(reference.id);
        self.base.world_mut().remove_entity(reference.id);
        self.role.dirty.forget_entity(reference.id);
        if let Err(error) = self.id_allocator.release(reference.id) {
            warn!("Failed to recycle entity id: {error}");
        }
    }

    /// Everything written since the last call, oldest tick first, for
    /// the delta encoder.
    pub fn take_dirty_fields(&mut self) -> Vec<(Tick, FieldChange)> {
        self.role.dirty.take()
    }

    // Player table

    pub fn add_player(&mut self, player: NetPlayer) -> Result<(), ServerError> {
        if player.id.0 == SERVER_PLAYER_ID {
            return Err(ServerError::ReservedPlayerId);
        }
        if self.players.len() >= usize::from(MAX_PLAYERS) {
            return Err(ServerError::PlayerLimitReached);
        }
        if self.players.contains_key(&player.id) {
            return Err(ServerError::DuplicatePlayer { id: player.id.0 });
        }
        self.players.insert(player.id, player);
        Ok(())
    }

    pub fn remove_player(&mut self, id: PlayerId) -> Result<(), ServerError> {
        self.players
            .remove(&id)
            .map(|_| ())
            .ok_or(ServerError::UnknownPlayer { id: id.0 })
    }

    pub fn player(&self, id: PlayerId) -> Option<&NetPlayer> {
        self.players.get(&id)
    }

    pub fn players_count(&self) -> usize {
        self.players.len()
    }

    /// Records the server tick a player most recently observed, from
    /// their acknowledgements.
    pub fn set_player_simulated_tick(
        &mut self,
        id: PlayerId,
        tick: Tick,
    ) -> Result<(), ServerError> {
        let player = self
            .players
            .get_mut(&id)
            .ok_or(ServerError::UnknownPlayer { id: id.0 })?;
        player.simulated_server_tick = tick;
        Ok(())
    }

    /// Rewinds the world to what the given player observed, for hit
    /// detection of that player's action.
    pub fn enable_lag_compensation_for(&mut self, id: PlayerId) -> Result<(), ServerError> {
        let player = *self
            .players
            .get(&id)
            .ok_or(ServerError::UnknownPlayer { id: id.0 })?;
        self.base.enable_lag_compensation(&player);
        Ok(())
    }

    pub fn disable_lag_compensation(&mut self) {
        self.base.disable_lag_compensation();
    }

    /// Resets the world and the id space. The player table survives;
    /// connections outlive the simulation.
    pub fn reset(&mut self) {
        self.base.reset();
        self.id_allocator.reset();
        self.role.dirty.clear();
    }
}
