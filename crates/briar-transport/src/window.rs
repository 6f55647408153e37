//! Sliding replay window over stream numbers.
//!
//! ```text
//!            floor = centre - 16                    centre + 16
//!                 │                                      │
//!   seen (old) ◄──┼──────────────── 32 bits ─────────────┼──► unseen (future)
//!                 │ bit 0 ............ bit 16 ... bit 31 │
//!                                       ▲
//!                                     centre
//! ```
//!
//! Stream numbers below the floor are treated as seen: they can never be
//! accepted again. Stream numbers at or above the ceiling are unseen. Marking
//! a number above the centre slides the window up so that number becomes
//! the new centre.

use briar_proto::REORDERING_WINDOW_SIZE;
use serde::{Deserialize, Serialize};

/// Half the window: distance from the centre to the floor and to the ceiling.
const HALF: u64 = (REORDERING_WINDOW_SIZE / 2) as u64;

/// Bitmap of recently used stream numbers.
///
/// # Invariants
///
/// - `centre` never decreases
/// - A stream number is reported as newly seen by [`set_seen`](Self::set_seen)
///   at most once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderingWindow {
    centre: u64,
    bitmap: u32,
}

impl ReorderingWindow {
    /// Fresh window covering stream numbers `0..32`.
    pub fn new() -> Self {
        Self { centre: HALF, bitmap: 0 }
    }

    /// Restore a window from its persisted parts.
    pub fn from_parts(centre: u64, bitmap: u32) -> Self {
        Self { centre, bitmap }
    }

    /// Centre of the window.
    pub fn centre(&self) -> u64 {
        self.centre
    }

    /// Raw bitmap; bit `i` is stream number `centre - 16 + i`.
    pub fn bitmap(&self) -> u32 {
        self.bitmap
    }

    /// Whether `stream_number` must be rejected as already used.
    pub fn is_seen(&self, stream_number: u64) -> bool {
        match self.bit_index(stream_number) {
            None => true,
            Some(i) if i >= REORDERING_WINDOW_SIZE as u64 => false,
            Some(i) => self.bitmap & (1 << i) != 0,
        }
    }

    /// Mark `stream_number` as used, sliding the window if it lies above the
    /// centre.
    ///
    /// Returns `true` if the number was newly marked, `false` if it was
    /// already seen or below the floor (no change in either case).
    pub fn set_seen(&mut self, stream_number: u64) -> bool {
        if self.is_seen(stream_number) {
            return false;
        }

        if stream_number > self.centre {
            self.slide(stream_number);
        }

        let Some(i) = self.bit_index(stream_number) else {
            unreachable!("stream number is at or below the centre after sliding");
        };
        self.bitmap |= 1 << i;
        true
    }

    /// Unseen stream numbers inside the window, in ascending order.
    ///
    /// These are the only candidates tag recognition needs to try.
    pub fn unseen(&self) -> impl Iterator<Item = u64> {
        let window = *self;
        (0..REORDERING_WINDOW_SIZE as u64).filter_map(move |i| {
            let stream_number = (window.centre + i).checked_sub(HALF)?;
            (window.bitmap & (1 << i) == 0).then_some(stream_number)
        })
    }

    fn slide(&mut self, new_centre: u64) {
        debug_assert!(new_centre > self.centre);

        let shift = new_centre - self.centre;
        self.bitmap = if shift >= REORDERING_WINDOW_SIZE as u64 { 0 } else { self.bitmap >> shift };
        self.centre = new_centre;
    }

    /// Position of `stream_number` relative to the floor, or `None` below it.
    fn bit_index(&self, stream_number: u64) -> Option<u64> {
        stream_number.saturating_add(HALF).checked_sub(self.centre)
    }
}

impl Default for ReorderingWindow {
    fn default() -> Self {
        Self::new()
    }
}
