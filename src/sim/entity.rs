//! Entity state components and the behavior hook surface.
//!
//! An entity is a `hecs` handle plus a handful of small copy components;
//! the map owns the world they live in. Anything game-specific (AI,
//! character logic, pickups) hangs off the boxed [`Behavior`] component and
//! talks back to the map through its public mutation methods – there is no
//! other way to move an entity, which is what keeps the grid and the
//! boundary clamp in sync by construction.

use glam::Vec2;

use super::map::Map;
use crate::defs::{ArchetypeInfo, CollisionKind, EntityFlags};
use crate::world::Aabb;

/// Handle to a resident entity. Generational: a handle kept past removal
/// goes stale instead of aliasing a later occupant of the same slot.
pub type EntityId = hecs::Entity;

/// Mutable bounding box – position and size.
#[derive(Debug, Clone, Copy)]
pub struct Bounds(pub Aabb);

/// Pixels per second, integrated once per tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct Velocity(pub Vec2);

/// Gravity multiplier; 0 pins the entity against vertical acceleration.
#[derive(Debug, Clone, Copy)]
pub struct Weight(pub f32);

/// Lifecycle flags wrapper.
#[derive(Debug, Clone, Copy)]
pub struct Flags(pub EntityFlags);

/// Collision participation wrapper.
#[derive(Debug, Clone, Copy)]
pub struct Collision(pub CollisionKind);

/// Boxed game logic attached to an entity.
pub struct Brain(pub Box<dyn Behavior>);

/// Per-entity hooks called by the map during a tick.
///
/// All hooks receive the map itself; the entity's own `Brain` is checked
/// out for the duration of the call, so re-entrant mutation of `me` is
/// safe. Handlers may move or remove any entity, including themselves.
pub trait Behavior: Send + Sync + 'static {
    /// One simulation step.
    fn update(&mut self, map: &mut Map, me: EntityId, dt: f32) {
        let _ = (map, me, dt);
    }

    /// `me` moved into `other`; `displacement` is the separation vector
    /// computed for the pair. Notification only – applying (or ignoring)
    /// the push is this handler's call.
    fn collide_into(&mut self, map: &mut Map, me: EntityId, other: EntityId, displacement: Vec2) {
        let _ = (map, me, other, displacement);
    }

    /// `other` moved into `me`; same `displacement` the mover received.
    fn collide_from(&mut self, map: &mut Map, me: EntityId, other: EntityId, displacement: Vec2) {
        let _ = (map, me, other, displacement);
    }
}

/// Everything needed to place one entity on a map.
///
/// Plain data on purpose – build one with a struct literal, an archetype,
/// or the `wall` shorthand, then hand it to
/// [`Map::add_entity`](crate::sim::Map::add_entity).
pub struct EntityDef {
    pub bounds: Aabb,
    pub collision: CollisionKind,
    pub flags: EntityFlags,
    pub velocity: Vec2,
    pub weight: f32,
    pub brain: Option<Box<dyn Behavior>>,
}

impl EntityDef {
    pub fn new(bounds: Aabb) -> EntityDef {
        EntityDef {
            bounds,
            collision: CollisionKind::Full,
            flags: EntityFlags::empty(),
            velocity: Vec2::ZERO,
            weight: 1.0,
            brain: None,
        }
    }

    /// Static solid map geometry.
    pub fn wall(bounds: Aabb) -> EntityDef {
        EntityDef {
            flags: EntityFlags::WALL | EntityFlags::WEIGHTLESS,
            weight: 0.0,
            ..EntityDef::new(bounds)
        }
    }

    /// Instantiate an archetype at `pos`.
    pub fn from_archetype(info: &ArchetypeInfo, pos: Vec2) -> EntityDef {
        EntityDef {
            collision: info.collision,
            flags: info.flags,
            weight: info.weight,
            ..EntityDef::new(Aabb::new(pos, info.size))
        }
    }

    pub fn with_velocity(mut self, velocity: Vec2) -> EntityDef {
        self.velocity = velocity;
        self
    }

    pub fn with_brain(mut self, brain: Box<dyn Behavior>) -> EntityDef {
        self.brain = Some(brain);
        self
    }
}
