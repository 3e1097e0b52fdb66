use crate::constants::MAX_SAVED_STATE_DIFF;
use crate::tick_math::tick_delta;
use crate::types::{MaxHistorySize, Tick};
use crate::value_types::FieldValue;

/// Fixed-capacity, tick-indexed ring buffer holding the recent values of
/// one rewindable field. Entities record into it once per tick; the
/// lag-compensation protocol reads back the value a given player observed.
///
/// A slot is addressed by `tick % capacity` and tagged with the tick that
/// wrote it, so stale generations are never confused with current ones.
pub struct HistoryBuffer<T: FieldValue> {
    slots: Box<[Option<(Tick, T)>]>,
}

impl<T: FieldValue> HistoryBuffer<T> {
    pub fn new(size: MaxHistorySize) -> Self {
        Self {
            slots: vec![None; size.capacity()].into_boxed_slice(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Records the field value simulated at `tick`, overwriting whatever
    /// generation previously occupied the slot.
    pub fn record(&mut self, tick: Tick, value: T) {
        let index = tick as usize % self.slots.len();
        self.slots[index] = Some((tick, value));
    }

    /// The value observed at `tick`: the entry written at that exact tick,
    /// or the newest one before it within the saved-state window. Returns
    /// `None` when the window holds nothing usable.
    pub fn rewind(&self, tick: Tick) -> Option<T> {
        let reach = (self.slots.len() as i16 - 1).min(MAX_SAVED_STATE_DIFF);
        for back in 0..=reach {
            let probe = tick.wrapping_sub(back as Tick);
            let index = probe as usize % self.slots.len();
            if let Some((stored_tick, value)) = self.slots[index] {
                if stored_tick == probe {
                    return Some(value);
                }
            }
        }
        None
    }

    /// Newest recorded entry at or before `tick`, with its tick.
    pub fn rewind_entry(&self, tick: Tick) -> Option<(Tick, T)> {
        let reach = (self.slots.len() as i16 - 1).min(MAX_SAVED_STATE_DIFF);
        for back in 0..=reach {
            let probe = tick.wrapping_sub(back as Tick);
            let index = probe as usize % self.slots.len();
            if let Some((stored_tick, value)) = self.slots[index] {
                if stored_tick == probe {
                    return Some((stored_tick, value));
                }
            }
        }
        None
    }

    /// Interpolated value between the entries bracketing `tick`, falling
    /// back to the nearest single entry. Used by renderers that smooth
    /// rewound state.
    pub fn rewind_interpolated(&self, tick: Tick, t: f32) -> Option<T> {
        let (from_tick, from) = self.rewind_entry(tick)?;
        let next_tick = from_tick.wrapping_add(1);
        let next_index = next_tick as usize % self.slots.len();
        if let Some((stored_tick, to)) = self.slots[next_index] {
            if stored_tick == next_tick && tick_delta(tick, next_tick) >= 0 {
                return Some(T::interpolate(from, to, t));
            }
        }
        Some(from)
    }

    pub fn clear(&mut self) {
        self.slots.fill(None);
    }
}
