//! Fixed-step tick clock with speed correction.
//!
//! Wall time from a monotonic [`TimeSource`] feeds a signed accumulator;
//! whole fixed steps are drained into logic ticks, a bounded number per
//! `update()` call. The client nudges the effective step length through
//! [`TickClock::set_speed_multiplier`] to slew toward the server tick
//! without discontinuities.

use std::time::Instant;

use crate::constants::{MAX_TICKS_PER_UPDATE, MIN_SLOWDOWN_TICKS, TIME_SPEED_CHANGE_COEF};
use crate::types::Tick;

/// Monotonic high-resolution time. The only clock operation the manager
/// performs; implementations must never step backwards.
pub trait TimeSource {
    /// Current time in raw clock ticks since an arbitrary origin.
    fn now_ticks(&self) -> u64;

    /// Raw clock ticks per second.
    fn ticks_per_second(&self) -> u64;
}

/// Default time source over `std::time::Instant`, in nanoseconds.
pub struct StdTimeSource {
    origin: Instant,
}

impl StdTimeSource {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for StdTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for StdTimeSource {
    fn now_ticks(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }

    fn ticks_per_second(&self) -> u64 {
        1_000_000_000
    }
}

/// What one `update()` call did.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClockStep {
    /// Wall seconds since the previous `update()`.
    pub visual_delta_time: f32,
    /// Logic ticks fired during this call, at most `MAX_TICKS_PER_UPDATE`.
    pub ticks_fired: u16,
    /// True when the tick clamp hit and the remaining backlog was shed.
    pub backlog_shed: bool,
}

impl ClockStep {
    pub(crate) fn idle(visual_delta_time: f32) -> Self {
        Self {
            visual_delta_time,
            ticks_fired: 0,
            backlog_shed: false,
        }
    }
}

pub struct TickClock {
    source: Box<dyn TimeSource>,
    frames_per_second: u16,
    delta_time: f64,
    delta_time_ticks: i64,
    slowdown_ticks: i64,
    accumulator: i64,
    last_time: u64,
    running: bool,
    tick: Tick,
    lerp_factor: f32,
    visual_delta_time: f32,
    speed_multiplier: f32,
}

impl TickClock {
    pub fn new(frames_per_second: u16, source: Box<dyn TimeSource>) -> Self {
        let frequency = source.ticks_per_second();
        let delta_time = 1.0 / f64::from(frames_per_second);
        let delta_time_ticks = (delta_time * frequency as f64) as i64;
        let slowdown_ticks =
            ((delta_time * TIME_SPEED_CHANGE_COEF * frequency as f64) as i64).max(MIN_SLOWDOWN_TICKS);
        Self {
            source,
            frames_per_second,
            delta_time,
            delta_time_ticks,
            slowdown_ticks,
            accumulator: 0,
            last_time: 0,
            running: false,
            tick: 0,
            lerp_factor: 0.0,
            visual_delta_time: 0.0,
            speed_multiplier: 0.0,
        }
    }

    pub fn standard(frames_per_second: u16) -> Self {
        Self::new(frames_per_second, Box::new(StdTimeSource::new()))
    }

    /// First half of an update: reads wall time into the accumulator and
    /// returns the wall delta in seconds. Returns `None` on the first
    /// call after construction or [`reset`], which only starts the clock.
    ///
    /// [`reset`]: TickClock::reset
    pub fn advance(&mut self) -> Option<f32> {
        let now = self.source.now_ticks();
        if !self.running {
            self.running = true;
            self.last_time = now;
            self.visual_delta_time = 0.0;
            return None;
        }

        let ticks_delta = now.saturating_sub(self.last_time) as i64;
        self.visual_delta_time = ticks_delta as f32 / self.source.ticks_per_second() as f32;
        self.accumulator += ticks_delta;
        self.last_time = now;
        Some(self.visual_delta_time)
    }

    /// Second half of an update: drains whole fixed steps out of the
    /// accumulator, calling `on_logic_tick` with each fired tick number,
    /// at most `MAX_TICKS_PER_UPDATE` of them. When the clamp hits, the
    /// remaining backlog is shed and the lerp factor keeps its previous
    /// value.
    pub fn run_ticks<L: FnMut(Tick)>(&mut self, mut on_logic_tick: L) -> ClockStep {
        if !self.running {
            return ClockStep::idle(0.0);
        }

        let max_ticks = self.delta_time_ticks
            + (self.speed_multiplier as f64 * self.slowdown_ticks as f64) as i64;

        let mut fired: u16 = 0;
        while self.accumulator >= max_ticks {
            self.accumulator -= max_ticks;
            self.tick = self.tick.wrapping_add(1);
            fired += 1;
            on_logic_tick(self.tick);

            if fired >= MAX_TICKS_PER_UPDATE {
                // Running too far behind: shed the backlog rather than
                // replaying it, and skip the lerp update for this frame.
                self.accumulator = 0;
                self.last_time = self.source.now_ticks();
                return ClockStep {
                    visual_delta_time: self.visual_delta_time,
                    ticks_fired: fired,
                    backlog_shed: true,
                };
            }
        }

        self.lerp_factor = self.accumulator as f32 / max_ticks as f32;
        ClockStep {
            visual_delta_time: self.visual_delta_time,
            ticks_fired: fired,
            backlog_shed: false,
        }
    }

    /// Sets the slew multiplier, clamped to `[-1, 1]`. Positive values
    /// lengthen the effective step (slowing the tick rate), negative
    /// values shorten it.
    pub fn set_speed_multiplier(&mut self, multiplier: f32) {
        self.speed_multiplier = multiplier.clamp(-1.0, 1.0);
    }

    pub fn speed_multiplier(&self) -> f32 {
        self.speed_multiplier
    }

    /// Forces the tick counter, used by the client on a hard resync.
    pub fn set_tick(&mut self, tick: Tick) {
        self.tick = tick;
    }

    pub fn tick(&self) -> Tick {
        self.tick
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Fractional progress of wall time into the next tick, in `[0, 1)`.
    pub fn lerp_factor(&self) -> f32 {
        self.lerp_factor
    }

    pub fn visual_delta_time(&self) -> f32 {
        self.visual_delta_time
    }

    pub fn frames_per_second(&self) -> u16 {
        self.frames_per_second
    }

    /// Fixed step length in seconds.
    pub fn delta_time(&self) -> f64 {
        self.delta_time
    }

    pub fn delta_time_f32(&self) -> f32 {
        self.delta_time as f32
    }

    /// Stops the clock and returns it to the pre-first-tick state.
    pub fn reset(&mut self) {
        self.running = false;
        self.accumulator = 0;
        self.last_time = 0;
        self.tick = 0;
        self.lerp_factor = 0.0;
        self.visual_delta_time = 0.0;
        self.speed_multiplier = 0.0;
    }
}
