// Wire-format constants. Changing any of these breaks protocol compatibility
// with peers built against the old values.

/// Highest entity id that is synchronized over the network.
pub const MAX_SYNCED_ENTITY_COUNT: u16 = 8192;

/// Highest entity id overall. Ids in `(MAX_SYNCED_ENTITY_COUNT, MAX_ENTITY_COUNT]`
/// are local-only and never leave the host that spawned them.
pub const MAX_ENTITY_COUNT: u16 = 16384;

/// Entity id `0` never refers to an entity.
pub const INVALID_ENTITY_ID: u16 = 0;

/// Player id reserved for the server itself.
pub const SERVER_PLAYER_ID: u8 = 0;

/// Maximum number of connected players.
pub const MAX_PLAYERS: u8 = 254;

/// Maximum number of parts a state packet may be split into.
pub const MAX_PARTS: usize = 256;

/// Widest tick window (in ticks) a saved state may be behind the head
/// before it is considered unusable for rewind or delta encoding.
pub const MAX_SAVED_STATE_DIFF: i16 = 30;

/// Hard cap on logic ticks fired by a single `update()` call. When the
/// backlog covers more, the remainder is shed instead of replayed.
pub const MAX_TICKS_PER_UPDATE: u16 = 5;

/// Fraction of the fixed step that the speed multiplier may add or remove
/// while the client slews toward the server tick.
pub const TIME_SPEED_CHANGE_COEF: f64 = 0.1;

/// Floor for the slew adjustment, in raw clock ticks. Keeps the slew
/// effective on very high-resolution clocks.
pub const MIN_SLOWDOWN_TICKS: i64 = 100;
