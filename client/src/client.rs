use log::warn;
use thiserror::Error;

use replica_shared::{
    tick_delta, ClockStep, EntityIdAllocator, EntityLogic, EntityManager, EntitySharedReference,
    EntityWorld, FieldChange, IdAllocatorError, InputProcessor, ManagerConfig, NetworkMode,
    Protocol, RoleHooks, Tick, TickContext, UpdateMode, WorldError, MAX_ENTITY_COUNT,
    MAX_SAVED_STATE_DIFF, MAX_SYNCED_ENTITY_COUNT,
};

/// Speed-multiplier gain per tick of distance to the target tick.
const SLEW_GAIN_PER_TICK: f32 = 0.1;

/// How many ticks ahead of the observed server tick the client aims to
/// run, so its inputs arrive in time.
const DEFAULT_TICK_LEAD: Tick = 2;

/// Errors raised by the client manager.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error(transparent)]
    World(#[from] WorldError),

    #[error(transparent)]
    IdAllocation(#[from] IdAllocatorError),
}

/// Client half of the role hooks: applies local input, advances the
/// alive set, and collects writes to predicted fields for the
/// reconciliation layer.
struct ClientRole {
    predicted: Vec<(Tick, FieldChange)>,
    input_processor: Option<Box<dyn InputProcessor>>,
}

impl RoleHooks for ClientRole {
    fn on_logic_tick(&mut self, world: &mut EntityWorld, ctx: &TickContext) {
        if let Some(input_processor) = &mut self.input_processor {
            input_processor.apply_inputs(world, ctx);
        }
        world.tick_alive_entities(ctx);
    }

    fn entity_field_changed(
        &mut self,
        world: &mut EntityWorld,
        ctx: &TickContext,
        change: FieldChange,
    ) {
        // Only predicted fields are reconciled; the rest is
        // authoritative inbound state.
        let Some(entity) = world.store().get(change.entity) else {
            return;
        };
        let Some(class) = world.protocol().entity_types.class(entity.header().class_id()) else {
            return;
        };
        let predicted = class
            .fields
            .iter()
            .any(|field| field.id == change.field && field.is_predicted);
        if predicted {
            self.predicted.push((ctx.tick, change));
        }
    }
}

/// The predicting entity manager: owns the local (non-synced) id range,
/// the rollback window state, and the slew that keeps the local tick a
/// small lead ahead of the server's.
pub struct ClientEntityManager {
    pub base: EntityManager,
    role: ClientRole,
    local_id_allocator: EntityIdAllocator,
    tick_lead: Tick,
    last_server_tick: Option<Tick>,
}

impl ClientEntityManager {
    pub fn new(protocol: Protocol, config: ManagerConfig) -> Self {
        Self {
            base: EntityManager::new(protocol, NetworkMode::Client, config),
            role: ClientRole {
                predicted: Vec::new(),
                input_processor: None,
            },
            local_id_allocator: EntityIdAllocator::new(
                MAX_SYNCED_ENTITY_COUNT + 1,
                MAX_ENTITY_COUNT,
            ),
            tick_lead: DEFAULT_TICK_LEAD,
            last_server_tick: None,
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

    // Local entities

    /// Spawns a local (non-synced) entity; it is ticked by this client
    /// only and never replicated.
    pub fn spawn_local<T: EntityLogic>(&mut self) -> Result<EntitySharedReference, ClientError> {
        self.spawn_local_with::<T>(|_| {})
    }

    pub fn spawn_local_with<T: EntityLogic>(
        &mut self,
        init: impl FnOnce(&mut T),
    ) -> Result<EntitySharedReference, ClientError> {
        let class_id = self
            .base
            .world()
            .protocol()
            .entity_types
            .try_class_of::<T>()
            .map_err(WorldError::from)?
            .class_id;
        let (id, version) = self.local_id_allocator.allocate()?;

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

    pub fn despawn_local(&mut self, reference: EntitySharedReference) {
        if self
            .base
            .world()
            .store()
            .get_by_reference(reference)
            .is_none()
        {
            warn!(
                "Despawning stale local reference {{id: {}, version: {}}}",
                reference.id.value(),
                reference.version
            );
            return;
        }
        self.base.world_mut().destroy_entity(reference.id);
        self.base.world_mut().remove_entity(reference.id);
        if let Err(error) = self.local_id_allocator.release(reference.id) {
            warn!("Failed to recycle local entity id: {error}");
        }
    }

    // Prediction & rollback

    /// Writes to predicted fields since the last call, oldest first, for
    /// the reconciliation layer.
    pub fn take_predicted_changes(&mut self) -> Vec<(Tick, FieldChange)> {
        std::mem::take(&mut self.role.predicted)
    }

    /// Enters the rollback window: subsequent ticks replay predicted
    /// state against fresh authoritative data.
    pub fn enter_rollback(&mut self) {
        self.base.set_update_mode(UpdateMode::PredictionRollback);
    }

    pub fn exit_rollback(&mut self) {
        self.base.set_update_mode(UpdateMode::Normal);
    }

    // Server-tick slew

    /// Target lead over the observed server tick.
    pub fn set_tick_lead(&mut self, tick_lead: Tick) {
        self.tick_lead = tick_lead;
    }

    pub fn last_server_tick(&self) -> Option<Tick> {
        self.last_server_tick
    }

    /// Feeds the freshest server tick into the slew. Small errors adjust
    /// the clock speed multiplier; drift beyond the saved-state window
    /// snaps the tick outright.
    pub fn sync_server_tick(&mut self, server_tick: Tick) {
        self.last_server_tick = Some(server_tick);
        let target = server_tick.wrapping_add(self.tick_lead);
        let error = tick_delta(self.base.tick(), target);

        if error.unsigned_abs() > MAX_SAVED_STATE_DIFF.unsigned_abs() {
            self.base.resync_tick(target);
            self.base.set_speed_multiplier(0.0);
            return;
        }
        // Positive error: we are behind the target, shorten the step.
        self.base
            .set_speed_multiplier(-(error as f32) * SLEW_GAIN_PER_TICK);
    }

    pub fn reset(&mut self) {
        self.base.reset();
        self.local_id_allocator.reset();
        self.role.predicted.clear();
        self.last_server_tick = None;
    }
}
