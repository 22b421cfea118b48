//! Authoritative entity membership and stable network indices.
//!
//! Two views of the same population: an insertion-ordered list of every
//! resident entity, and a dense slot table mapping `MapEntityIndex` to the
//! subset the protocol layer addresses by index. Iteration hands out
//! snapshots so an entity removing itself (or a neighbour) mid-pass cannot
//! corrupt the walk.

use std::fmt;

use log::error;

use super::entity::EntityId;

/// Stable per-map index of a network-visible entity.
///
/// Kept small – it rides in every delta-sync packet. Slots are reused
/// after removal; stale handles cached by remote code fail the generational
/// `EntityId` liveness check instead of aliasing the new occupant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MapEntityIndex(pub u16);

impl fmt::Display for MapEntityIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Dense slot table with lowest-free-slot allocation.
#[derive(Debug, Default)]
pub(crate) struct DynamicSlots {
    slots: Vec<Option<EntityId>>,
}

impl DynamicSlots {
    /// Claim the lowest free slot for `ent`.
    pub fn insert(&mut self, ent: EntityId) -> MapEntityIndex {
        let slot = match self.slots.iter().position(Option::is_none) {
            Some(i) => i,
            None => {
                self.slots.push(None);
                self.slots.len() - 1
            }
        };
        debug_assert!(slot <= u16::MAX as usize, "map entity index space exhausted");
        self.slots[slot] = Some(ent);
        MapEntityIndex(slot as u16)
    }

    /// Force-assign `ent` to `index`, growing the table as needed.
    /// Returns the previous occupant, if any.
    pub fn set(&mut self, index: MapEntityIndex, ent: EntityId) -> Option<EntityId> {
        let i = index.0 as usize;
        if i >= self.slots.len() {
            self.slots.resize(i + 1, None);
        }
        self.slots[i].replace(ent)
    }

    /// Release `index`, returning whatever occupied it.
    pub fn free(&mut self, index: MapEntityIndex) -> Option<EntityId> {
        self.slots.get_mut(index.0 as usize).and_then(Option::take)
    }

    /// Bounds-checked lookup; out-of-range is "not found", never a panic.
    pub fn get(&self, index: MapEntityIndex) -> Option<EntityId> {
        self.slots.get(index.0 as usize).copied().flatten()
    }

    /// Occupied slots in index order.
    pub fn iter(&self) -> impl Iterator<Item = (MapEntityIndex, EntityId)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.map(|ent| (MapEntityIndex(i as u16), ent)))
    }
}

/// Canonical entity set of one map.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    /// Insertion-ordered membership list. Order is load-bearing: collision
    /// candidates and queries walk it (via the grid) and must be
    /// reproducible for a given operation sequence.
    entities: Vec<EntityId>,
    dynamic: DynamicSlots,
}

impl EntityRegistry {
    pub fn new() -> EntityRegistry {
        EntityRegistry::default()
    }

    /// Append to the membership list. A duplicate add is a programmer
    /// error: flagged loudly, then ignored so state stays consistent.
    pub fn add(&mut self, ent: EntityId) -> bool {
        if self.entities.contains(&ent) {
            debug_assert!(false, "entity already in the map's entity list");
            error!("attempted to add already-resident entity {ent:?}");
            return false;
        }
        self.entities.push(ent);
        true
    }

    /// Drop from the membership list. Removing an absent entity is flagged
    /// (it usually means a double dispose) but not fatal.
    pub fn remove(&mut self, ent: EntityId) -> bool {
        match self.entities.iter().position(|&e| e == ent) {
            Some(i) => {
                self.entities.remove(i);
                true
            }
            None => {
                debug_assert!(false, "entity was not in the map's entity list");
                error!("attempted to remove non-resident entity {ent:?}");
                false
            }
        }
    }

    #[inline]
    pub fn contains(&self, ent: EntityId) -> bool {
        self.entities.contains(&ent)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Copy-on-read snapshot for iteration that survives mid-pass
    /// mutation of the registry.
    pub fn snapshot(&self) -> Vec<EntityId> {
        self.entities.clone()
    }

    /// Live view in insertion order. Do not mutate the registry while
    /// holding this; use [`snapshot`](Self::snapshot) for that.
    pub fn iter(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.iter().copied()
    }

    // ------------------------------------------------------------------
    // Stable-index slots
    // ------------------------------------------------------------------

    pub(crate) fn alloc_index(&mut self, ent: EntityId) -> MapEntityIndex {
        self.dynamic.insert(ent)
    }

    pub(crate) fn set_index(&mut self, index: MapEntityIndex, ent: EntityId) -> Option<EntityId> {
        self.dynamic.set(index, ent)
    }

    pub(crate) fn free_index(&mut self, index: MapEntityIndex) -> Option<EntityId> {
        self.dynamic.free(index)
    }

    pub fn get_index(&self, index: MapEntityIndex) -> Option<EntityId> {
        self.dynamic.get(index)
    }

    /// Network-visible entities in index order.
    pub fn dynamic_iter(&self) -> impl Iterator<Item = (MapEntityIndex, EntityId)> + '_ {
        self.dynamic.iter()
    }
}
