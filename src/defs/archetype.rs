//! Static entity archetype table.
//!
//! Spawn-time templates for the kinds of entities the server places on a
//! map. Gameplay code looks these up by id and turns them into an
//! [`EntityDef`](crate::sim::EntityDef) at a concrete position.

use glam::Vec2;
use once_cell::sync::Lazy;
use std::collections::HashMap;

use super::{CollisionKind, EntityFlags};

/// Immutable spawn template for one kind of entity.
#[derive(Debug, Clone, Copy)]
pub struct ArchetypeInfo {
    pub id: &'static str,
    pub size: Vec2,
    pub weight: f32,
    pub flags: EntityFlags,
    pub collision: CollisionKind,
}

pub static ARCHETYPES: &[ArchetypeInfo] = &[
    // Networked character-sized mover.
    ArchetypeInfo {
        id: "WANDERER",
        size: Vec2::new(24.0, 40.0),
        weight: 1.0,
        flags: EntityFlags::DYNAMIC,
        collision: CollisionKind::Full,
    },
    // Networked pushable prop.
    ArchetypeInfo {
        id: "CRATE",
        size: Vec2::new(32.0, 32.0),
        weight: 2.0,
        flags: EntityFlags::DYNAMIC,
        collision: CollisionKind::Full,
    },
    // Networked marker with no physical presence (waypoints, triggers).
    ArchetypeInfo {
        id: "MARKER",
        size: Vec2::new(8.0, 8.0),
        weight: 0.0,
        flags: EntityFlags::DYNAMIC.union(EntityFlags::WEIGHTLESS),
        collision: CollisionKind::None,
    },
    // Static solid geometry; trimmed instead of evicted on map shrink.
    ArchetypeInfo {
        id: "WALL_BLOCK",
        size: Vec2::new(128.0, 128.0),
        weight: 0.0,
        flags: EntityFlags::WALL.union(EntityFlags::WEIGHTLESS),
        collision: CollisionKind::Full,
    },
];

static BY_ID: Lazy<HashMap<&'static str, &'static ArchetypeInfo>> =
    Lazy::new(|| ARCHETYPES.iter().map(|info| (info.id, info)).collect());

pub fn by_id(id: &str) -> Option<&'static ArchetypeInfo> {
    BY_ID.get(id).copied()
}
