use log::warn;

use crate::types::{NetPlayer, NetworkMode, UpdateMode};
use crate::world::store::EntityStore;

/// The lag-compensation toggle: wraps a caller-supplied operation
/// (typically hit detection for one player's action) so it observes the
/// world as that player saw it at their simulated server tick.
///
/// Both transitions are idempotent-guarded; a client manager may only
/// rewind while replaying a rollback window.
pub(crate) struct LagCompensation {
    enabled: bool,
}

impl LagCompensation {
    pub(crate) fn new() -> Self {
        Self { enabled: false }
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn enable(
        &mut self,
        player: &NetPlayer,
        mode: NetworkMode,
        update_mode: UpdateMode,
        store: &mut EntityStore,
    ) {
        if self.enabled {
            return;
        }
        if mode.is_client() && update_mode != UpdateMode::PredictionRollback {
            warn!("Lag compensation on the client is only available during rollback");
            return;
        }
        self.enabled = true;
        store.for_each_lag_compensated(|entity| entity.enable_lag_compensation(player));
    }

    pub(crate) fn disable(&mut self, store: &mut EntityStore) {
        if !self.enabled {
            return;
        }
        self.enabled = false;
        store.for_each_lag_compensated(|entity| entity.disable_lag_compensation());
    }

    pub(crate) fn reset(&mut self) {
        self.enabled = false;
    }
}
