//! Per-slot occupancy classification
//!
//! Each slot is watched by two rangefinders. Readings at or below the near
//! threshold mean "something is close"; the pair tolerance decides whether two
//! close readings agree with each other.
//!
//! Rule, checked in order for readings `a`, `b`:
//! 1. both far                          -> vacant
//! 2. both near and `|a - b| <= tol`    -> occupied
//! 3. exactly one near                  -> misaligned
//! 4. both near but disagreeing         -> error

use crate::domain::protocol::{check_shape, ShapeError, SAMPLES_PER_SLOT};
use crate::domain::types::{OccupancyState, Snapshot};

/// Default near/far threshold (inclusive on the near side)
pub const DEFAULT_NEAR_THRESHOLD: u32 = 4;

/// Default maximum difference for two near readings to count as one object
pub const DEFAULT_PAIR_TOLERANCE: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classifier {
    slot_count: usize,
    near_threshold: u32,
    pair_tolerance: u32,
}

impl Classifier {
    pub fn new(slot_count: usize, near_threshold: u32, pair_tolerance: u32) -> Self {
        Self { slot_count, near_threshold, pair_tolerance }
    }

    /// Classifier with the reference calibration for `slot_count` slots
    pub fn with_defaults(slot_count: usize) -> Self {
        Self::new(slot_count, DEFAULT_NEAR_THRESHOLD, DEFAULT_PAIR_TOLERANCE)
    }

    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    pub fn near_threshold(&self) -> u32 {
        self.near_threshold
    }

    pub fn pair_tolerance(&self) -> u32 {
        self.pair_tolerance
    }

    /// Classify a single sensor pair
    #[inline]
    pub fn classify_pair(&self, a: u32, b: u32) -> OccupancyState {
        let a_far = a > self.near_threshold;
        let b_far = b > self.near_threshold;

        if a_far && b_far {
            OccupancyState::Vacant
        } else if !a_far && !b_far && a.abs_diff(b) <= self.pair_tolerance {
            OccupancyState::Occupied
        } else if a_far != b_far {
            OccupancyState::Misaligned
        } else {
            OccupancyState::Error
        }
    }

    /// Classify a full sample sequence into a snapshot
    ///
    /// Rejects sequences that are not exactly two samples per slot; no partial
    /// snapshot is ever produced.
    pub fn classify(&self, samples: &[u32]) -> Result<Snapshot, ShapeError> {
        check_shape(samples, self.slot_count)?;

        let states = samples
            .chunks_exact(SAMPLES_PER_SLOT)
            .map(|pair| self.classify_pair(pair[0], pair[1]))
            .collect();

        Ok(Snapshot::from_states(states))
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::with_defaults(3)
    }
}
