//! Shared types for the slot monitor

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// Newtype wrapper for 0-based slot indices
///
/// Displayed with the 1-based public naming scheme (`slot1`, `slot2`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct SlotId(pub usize);

impl std::fmt::Display for SlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "slot{}", self.0 + 1)
    }
}

/// Occupancy classification for a single slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OccupancyState {
    /// Both sensors see open space (also the "no signal yet" default)
    #[default]
    Vacant,
    /// Both sensors see a close, consistent obstruction
    Occupied,
    /// Only one sensor sees an obstruction
    Misaligned,
    /// Both sensors see something close but disagree
    Error,
}

impl OccupancyState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OccupancyState::Vacant => "vacant",
            OccupancyState::Occupied => "occupied",
            OccupancyState::Misaligned => "misaligned",
            OccupancyState::Error => "error",
        }
    }
}

impl std::fmt::Display for OccupancyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Complete occupancy state of every configured slot
///
/// Built whole by the classifier and never mutated afterwards. Serializes as a
/// flat JSON object keyed by slot name, in slot order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    states: Vec<OccupancyState>,
}

impl Snapshot {
    /// All slots vacant
    pub fn vacant(slot_count: usize) -> Self {
        Self { states: vec![OccupancyState::Vacant; slot_count] }
    }

    pub fn from_states(states: Vec<OccupancyState>) -> Self {
        Self { states }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn get(&self, slot: SlotId) -> Option<OccupancyState> {
        self.states.get(slot.0).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SlotId, OccupancyState)> + '_ {
        self.states.iter().enumerate().map(|(i, &state)| (SlotId(i), state))
    }

    /// Number of slots in the given state
    pub fn count(&self, state: OccupancyState) -> usize {
        self.states.iter().filter(|&&s| s == state).count()
    }
}

impl Serialize for Snapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.states.len()))?;
        for (slot, state) in self.iter() {
            map.serialize_entry(&slot.to_string(), &state)?;
        }
        map.end()
    }
}
