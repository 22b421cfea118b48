//! The map core: spatial index + entity lifecycle + per-tick driver.
//!
//! One `Map` owns everything about the entities resident on it – the hecs
//! world holding their components, the 128 px broad-phase grid, and the
//! registry with the stable network indices. A single logical thread drives
//! it; there are no locks – `Map` is `Send` but not `Sync`, so a second
//! thread cannot reach in while a tick runs.
//!
//! All position/size mutation goes through the map so that grid
//! maintenance and boundary clamping can never be forgotten by a caller.

use std::fmt;

use glam::Vec2;
use log::{error, warn};

use super::entity::{Behavior, Bounds, Brain, Collision, EntityDef, EntityId, Flags, Velocity, Weight};
use super::grid::EntityGrid;
use super::registry::{EntityRegistry, MapEntityIndex};
use super::physics;
use crate::defs::{CollisionKind, EntityFlags};
use crate::world::{Aabb, TimeSource, WorldConfig};

/// Identifies one map within the world server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MapId(pub u16);

impl fmt::Display for MapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable index held by a dynamic entity, stored as a component so removal
/// can find the slot without a reverse scan.
#[derive(Debug, Clone, Copy)]
pub(crate) struct NetIndex(pub MapEntityIndex);

pub struct Map {
    pub(crate) id: MapId,
    pub(crate) name: String,
    pub(crate) size: Vec2,
    pub(crate) config: WorldConfig,
    pub(crate) clock: Box<dyn TimeSource>,
    pub(crate) world: hecs::World,
    pub(crate) grid: EntityGrid,
    pub(crate) registry: EntityRegistry,
    updating: bool,
}

impl Map {
    /// Build an empty map. `size` must be positive on both axes before any
    /// entity is added; the grid is allocated here and only ever rebuilt by
    /// [`set_dimensions`](Self::set_dimensions).
    pub fn new(
        id: MapId,
        name: impl Into<String>,
        size: Vec2,
        config: WorldConfig,
        clock: Box<dyn TimeSource>,
    ) -> Map {
        debug_assert!(size.x > 0.0 && size.y > 0.0, "map size must be positive");
        let mut grid = EntityGrid::new();
        grid.set_size(size);
        Map {
            id,
            name: name.into(),
            size,
            config,
            clock,
            world: hecs::World::new(),
            grid,
            registry: EntityRegistry::new(),
            updating: true,
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    #[inline]
    pub fn id(&self) -> MapId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Map size in pixels.
    #[inline]
    pub fn size(&self) -> Vec2 {
        self.size
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.size.x
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.size.y
    }

    #[inline]
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Current game time in milliseconds, straight from the injected clock.
    #[inline]
    pub fn time_ms(&self) -> u32 {
        self.clock.now_ms()
    }

    /// Whether [`update`](Self::update) currently does anything; clear to
    /// pause the physics.
    #[inline]
    pub fn is_updating(&self) -> bool {
        self.updating
    }

    pub fn set_updating(&mut self, updating: bool) {
        self.updating = updating;
    }

    #[inline]
    pub fn entity_count(&self) -> usize {
        self.registry.len()
    }

    /// Resident entities in insertion order.
    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.registry.iter()
    }

    /// Network-visible entities with their stable indices, index order.
    pub fn dynamic_entities(&self) -> impl Iterator<Item = (MapEntityIndex, EntityId)> + '_ {
        self.registry.dynamic_iter()
    }

    /// Dynamic entity at `index`, or `None` for a free or out-of-range
    /// slot. Never panics – stale indices from remote peers are routine.
    pub fn get_entity_at(&self, index: MapEntityIndex) -> Option<EntityId> {
        self.registry.get_index(index)
    }

    // ------------------------------------------------------------------
    // Component access (copy-out; `None` for non-resident handles)
    // ------------------------------------------------------------------

    pub fn bounds(&self, ent: EntityId) -> Option<Aabb> {
        self.world.get::<&Bounds>(ent).ok().map(|b| b.0)
    }

    pub fn collision_kind(&self, ent: EntityId) -> Option<CollisionKind> {
        self.world.get::<&Collision>(ent).ok().map(|c| c.0)
    }

    pub fn flags(&self, ent: EntityId) -> Option<EntityFlags> {
        self.world.get::<&Flags>(ent).ok().map(|f| f.0)
    }

    pub fn velocity(&self, ent: EntityId) -> Option<Vec2> {
        self.world.get::<&Velocity>(ent).ok().map(|v| v.0)
    }

    pub fn set_velocity(&mut self, ent: EntityId, velocity: Vec2) {
        if let Ok(mut v) = self.world.get::<&mut Velocity>(ent) {
            v.0 = velocity;
        }
    }

    pub fn weight(&self, ent: EntityId) -> Option<f32> {
        self.world.get::<&Weight>(ent).ok().map(|w| w.0)
    }

    /// Stable index of `ent`, when it has one.
    pub fn net_index(&self, ent: EntityId) -> Option<MapEntityIndex> {
        self.world.get::<&NetIndex>(ent).ok().map(|i| i.0)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Add an entity, auto-allocating the lowest free stable index when it
    /// is flagged `DYNAMIC`. The entity is clamped fully inside the map
    /// before this returns, so its final position may differ from
    /// `def.bounds`.
    pub fn add_entity(&mut self, def: EntityDef) -> EntityId {
        let dynamic = def.flags.contains(EntityFlags::DYNAMIC);
        let ent = self.spawn(def);
        if dynamic {
            let index = self.registry.alloc_index(ent);
            let _ = self.world.insert_one(ent, NetIndex(index));
        }
        self.finish_add(ent);
        ent
    }

    /// Add an entity under a pre-assigned stable index – the
    /// reconstruction path used when rebuilding networked state. A live
    /// occupant of the slot should not exist; if one does it is evicted
    /// first and the anomaly logged.
    pub fn add_entity_with_index(&mut self, def: EntityDef, index: MapEntityIndex) -> EntityId {
        if let Some(existing) = self.registry.get_index(index) {
            debug_assert!(false, "an entity already holds MapEntityIndex {index}");
            error!("index {index} already occupied by {existing:?}; evicting");
            self.remove_entity(existing);
        }

        let ent = self.spawn(def);
        self.registry.set_index(index, ent);
        let _ = self.world.insert_one(ent, NetIndex(index));
        self.finish_add(ent);
        ent
    }

    fn spawn(&mut self, def: EntityDef) -> EntityId {
        let ent = self.world.spawn((
            Bounds(def.bounds),
            Collision(def.collision),
            Flags(def.flags),
            Velocity(def.velocity),
            Weight(def.weight),
        ));
        if let Some(brain) = def.brain {
            let _ = self.world.insert_one(ent, Brain(brain));
        }
        ent
    }

    /// Shared tail of both add paths: registry, grid, then force the
    /// entity inside the map (which may synchronously move it).
    fn finish_add(&mut self, ent: EntityId) {
        self.registry.add(ent);
        if let Some(b) = self.bounds(ent) {
            self.grid.insert(ent, &b);
        }
        self.clamp_into_bounds(ent);
    }

    /// Remove an entity from the map: registry, stable index slot, grid,
    /// world, in that order. Tolerant of double disposal – the second call
    /// finds a dead handle, scrubs any leftovers and returns.
    pub fn remove_entity(&mut self, ent: EntityId) {
        if !self.world.contains(ent) {
            warn!("remove_entity: {ent:?} is not alive (double dispose?)");
            self.grid.remove(ent);
            return;
        }

        self.registry.remove(ent);

        if let Ok(NetIndex(index)) = self.world.remove_one::<NetIndex>(ent) {
            let freed = self.registry.free_index(index);
            if freed != Some(ent) {
                debug_assert!(false, "entity held MapEntityIndex {index} not matching its slot");
                error!("slot {index} held {freed:?} while removing {ent:?}");
                // Whatever occupied the slot is already gone from it; keep going.
            }
        }

        self.grid.remove(ent);
        let _ = self.world.despawn(ent);
    }

    // ------------------------------------------------------------------
    // Movement (the only mutation paths for position/size)
    // ------------------------------------------------------------------

    /// Instantly move the entity's top-left corner to `new_min`. No-op when
    /// already there.
    pub fn teleport(&mut self, ent: EntityId, new_min: Vec2) {
        let Some(old) = self.bounds(ent) else {
            debug_assert!(false, "teleport on non-resident entity");
            error!("teleport: {ent:?} has no bounds");
            return;
        };
        if new_min == old.min {
            return;
        }
        self.apply_bounds(ent, old.moved_to(new_min), &old);
    }

    /// Move by `offset` (zero is a no-op).
    pub fn translate(&mut self, ent: EntityId, offset: Vec2) {
        if offset == Vec2::ZERO {
            return;
        }
        let Some(old) = self.bounds(ent) else {
            debug_assert!(false, "translate on non-resident entity");
            error!("translate: {ent:?} has no bounds");
            return;
        };
        self.apply_bounds(ent, old.translated(offset), &old);
    }

    /// Change the entity's size, keeping its top-left corner.
    pub fn resize(&mut self, ent: EntityId, new_size: Vec2) {
        let Some(old) = self.bounds(ent) else {
            debug_assert!(false, "resize on non-resident entity");
            error!("resize: {ent:?} has no bounds");
            return;
        };
        if new_size == old.size() {
            return;
        }
        self.apply_bounds(ent, Aabb::new(old.min, new_size), &old);
    }

    /// Teleport, but clamp the target so the entity stays in the map.
    pub fn safe_teleport(&mut self, ent: EntityId, pos: Vec2) {
        let Some(b) = self.bounds(ent) else {
            return;
        };
        let mut pos = pos.max(Vec2::ZERO);
        pos = pos.min(self.size - b.size()).max(Vec2::ZERO);
        self.teleport(ent, pos);
    }

    /// Resize, but shrink the request so the entity stays in the map.
    pub fn safe_resize(&mut self, ent: EntityId, size: Vec2) {
        let Some(b) = self.bounds(ent) else {
            return;
        };
        let size = size.min(self.size - b.min);
        self.resize(ent, size);
    }

    /// Write the new box, reposition in the grid against the old one, then
    /// pull the entity back inside the map if the change pushed it out.
    fn apply_bounds(&mut self, ent: EntityId, new: Aabb, old: &Aabb) {
        if let Ok(mut b) = self.world.get::<&mut Bounds>(ent) {
            b.0 = new;
        }
        self.grid.reposition(ent, old, &new);
        self.clamp_into_bounds(ent);
    }

    /// Teleport the entity to the nearest fully in-bounds position of the
    /// same size. Already-in-bounds entities are untouched – no grid
    /// churn, no spurious movement. Boundary violations are expected from
    /// normal physics, so this is silent correction, not an error.
    pub fn clamp_into_bounds(&mut self, ent: EntityId) {
        let Some(b) = self.bounds(ent) else {
            return;
        };
        let mut min = b.min;
        if min.x < 0.0 {
            min.x = 0.0;
        }
        if min.y < 0.0 {
            min.y = 0.0;
        }
        if min.x + b.width() > self.size.x {
            min.x = self.size.x - b.width();
        }
        if min.y + b.height() > self.size.y {
            min.y = self.size.y - b.height();
        }
        if min != b.min {
            let new = b.moved_to(min);
            if let Ok(mut bounds) = self.world.get::<&mut Bounds>(ent) {
                bounds.0 = new;
            }
            self.grid.reposition(ent, &b, &new);
        }
    }

    /// Clamp a movement `offset` so applying it keeps the entity in the
    /// map.
    pub fn keep_in_map(&self, ent: EntityId, offset: &mut Vec2) {
        let Some(b) = self.bounds(ent) else {
            debug_assert!(false, "keep_in_map on non-resident entity");
            error!("keep_in_map: {ent:?} has no bounds");
            return;
        };
        if b.min.x + offset.x < 0.0 {
            offset.x = -b.min.x;
        } else if b.max.x + offset.x > self.size.x {
            offset.x = self.size.x - b.max.x;
        }
        if b.min.y + offset.y < 0.0 {
            offset.y = -b.min.y;
        } else if b.max.y + offset.y > self.size.y {
            offset.y = self.size.y - b.max.y;
        }
    }

    // ------------------------------------------------------------------
    // Bounds predicates
    // ------------------------------------------------------------------

    pub fn contains_point(&self, p: Vec2) -> bool {
        p.x >= 0.0 && p.y >= 0.0 && p.x < self.size.x && p.y < self.size.y
    }

    pub fn is_in_bounds(&self, b: &Aabb) -> bool {
        b.min.x >= 0.0 && b.min.y >= 0.0 && b.max.x <= self.size.x && b.max.y <= self.size.y
    }

    // ------------------------------------------------------------------
    // Queries (finite, restartable; every call re-walks the grid)
    // ------------------------------------------------------------------

    /// Visit each distinct entity whose box intersects `rect`; stop early
    /// when `f` returns `false`.
    pub fn for_each_entity_in<F>(&self, rect: &Aabb, mut f: F) -> bool
    where
        F: FnMut(EntityId) -> bool,
    {
        self.grid.for_each_in_rect(rect, |ent| {
            match self.bounds(ent) {
                Some(b) if b.intersects(rect) => f(ent),
                _ => true,
            }
        })
    }

    /// All entities intersecting `rect`, deduplicated, deterministic order.
    pub fn entities_in(&self, rect: &Aabb) -> Vec<EntityId> {
        let mut out = Vec::new();
        self.for_each_entity_in(rect, |ent| {
            out.push(ent);
            true
        });
        out
    }

    /// As [`entities_in`](Self::entities_in) with a caller predicate.
    pub fn entities_in_where<F>(&self, rect: &Aabb, mut pred: F) -> Vec<EntityId>
    where
        F: FnMut(EntityId) -> bool,
    {
        let mut out = Vec::new();
        self.for_each_entity_in(rect, |ent| {
            if pred(ent) {
                out.push(ent);
            }
            true
        });
        out
    }

    /// All entities whose box contains `p`. A point outside the grid is an
    /// empty result, never an error.
    pub fn entities_at(&self, p: Vec2) -> Vec<EntityId> {
        self.grid
            .bucket_at(p)
            .iter()
            .copied()
            .filter(|&ent| self.bounds(ent).is_some_and(|b| b.contains(p)))
            .collect()
    }

    /// As [`entities_at`](Self::entities_at) with a caller predicate.
    pub fn entities_at_where<F>(&self, p: Vec2, mut pred: F) -> Vec<EntityId>
    where
        F: FnMut(EntityId) -> bool,
    {
        self.grid
            .bucket_at(p)
            .iter()
            .copied()
            .filter(|&ent| self.bounds(ent).is_some_and(|b| b.contains(p)))
            .filter(|&ent| pred(ent))
            .collect()
    }

    /// Entities intersecting `rect` that carry any of `flags`.
    pub fn entities_in_with_flags(&self, rect: &Aabb, flags: EntityFlags) -> Vec<EntityId> {
        self.entities_in_where(rect, |ent| {
            self.flags(ent).is_some_and(|f| f.intersects(flags))
        })
    }

    pub fn contains_entities_in(&self, rect: &Aabb) -> bool {
        !self.for_each_entity_in(rect, |_| false)
    }

    /// Collidable entities intersecting `rect`, excluding `exclude`.
    pub(crate) fn collidable_in(&self, rect: &Aabb, exclude: Option<EntityId>) -> Vec<EntityId> {
        self.entities_in_where(rect, |ent| {
            Some(ent) != exclude
                && self
                    .collision_kind(ent)
                    .is_some_and(|k| k != CollisionKind::None)
        })
    }

    // ------------------------------------------------------------------
    // Tick driver
    // ------------------------------------------------------------------

    /// Advance the map one tick. Iterates a snapshot of the residents so
    /// an entity disposing itself (or others) mid-pass cannot corrupt the
    /// walk; each entity gets velocity integration, its behavior hook, and
    /// collision checks when it is moving.
    pub fn update(&mut self, delta_time: f32) {
        if !self.updating {
            return;
        }

        for ent in self.registry.snapshot() {
            if !self.world.contains(ent) {
                continue; // removed earlier in this same pass
            }

            physics::integrate(self, ent, delta_time);

            if let Ok(Brain(mut brain)) = self.world.remove_one::<Brain>(ent) {
                brain.update(self, ent, delta_time);
                // The entity may have removed itself; reinsertion on a dead
                // handle is a harmless no-op.
                let _ = self.world.insert_one(ent, Brain(brain));
            }

            if !self.world.contains(ent) {
                continue;
            }
            if self.velocity(ent).is_some_and(|v| v != Vec2::ZERO) {
                self.check_collisions(ent);
            }
        }
    }

    /// Detect and report the collisions `ent` currently participates in.
    ///
    /// Notification only: each hit invokes `collide_into` on `ent` and
    /// `collide_from` on the other party with the shared separation vector;
    /// whether anything moves is up to those handlers. Returns the number
    /// of collisions reported.
    pub fn check_collisions(&mut self, ent: EntityId) -> usize {
        let Some(kind) = self.collision_kind(ent) else {
            warn!("check_collisions: {ent:?} is not resident");
            return 0;
        };
        if kind == CollisionKind::None {
            return 0;
        }
        let Some(bounds) = self.bounds(ent) else {
            return 0;
        };

        // Snapshot the candidates before dispatching: handlers moving or
        // removing entities must not disturb this walk.
        let candidates = self.collidable_in(&bounds, Some(ent));

        let mut collisions = 0;
        for other in candidates {
            if !self.world.contains(ent) {
                break; // a handler disposed us mid-walk
            }
            // Re-read every box: earlier handlers may have shifted either
            // party.
            let pair = (
                self.bounds(ent),
                self.bounds(other),
                self.collision_kind(other),
            );
            let (Some(a), Some(b), Some(other_kind)) = pair else {
                continue;
            };
            if let Some(displacement) = Aabb::mtd(&a, &b, other_kind) {
                self.notify_collision(ent, other, displacement);
                collisions += 1;
            }
        }
        collisions
    }

    fn notify_collision(&mut self, ent: EntityId, other: EntityId, displacement: Vec2) {
        if let Ok(Brain(mut brain)) = self.world.remove_one::<Brain>(ent) {
            brain.collide_into(self, ent, other, displacement);
            let _ = self.world.insert_one(ent, Brain(brain));
        }
        if let Ok(Brain(mut brain)) = self.world.remove_one::<Brain>(other) {
            brain.collide_from(self, other, ent, displacement);
            let _ = self.world.insert_one(other, Brain(brain));
        }
    }

    // ------------------------------------------------------------------
    // Dimension changes
    // ------------------------------------------------------------------

    /// Resize the map. Destructive on shrink: walls sticking out are
    /// trimmed to fit (or evicted when wholly outside), everything else
    /// out of bounds is evicted. The grid is rebuilt from scratch and all
    /// survivors re-inserted.
    pub fn set_dimensions(&mut self, new_size: Vec2) {
        if new_size == self.size {
            return;
        }
        debug_assert!(new_size.x > 0.0 && new_size.y > 0.0, "map size must be positive");

        let shrinking = new_size.x < self.size.x || new_size.y < self.size.y;
        if shrinking {
            for ent in self.registry.snapshot() {
                let Some(b) = self.bounds(ent) else {
                    continue;
                };
                let wall = self.flags(ent).is_some_and(|f| f.contains(EntityFlags::WALL));

                if wall {
                    if b.min.x >= new_size.x || b.min.y >= new_size.y {
                        warn!("map {} shrink to {new_size}: evicting wall {ent:?}", self.id);
                        self.remove_entity(ent);
                    } else if b.max.x > new_size.x || b.max.y > new_size.y {
                        let trimmed = Vec2::new(
                            b.width().min(new_size.x - b.min.x),
                            b.height().min(new_size.y - b.min.y),
                        );
                        // Grid is rebuilt below; write the box directly.
                        if let Ok(mut bounds) = self.world.get::<&mut Bounds>(ent) {
                            bounds.0 = Aabb::new(b.min, trimmed);
                        }
                    }
                } else if b.max.x > new_size.x || b.max.y > new_size.y {
                    warn!("map {} shrink to {new_size}: evicting {ent:?}", self.id);
                    self.remove_entity(ent);
                }
            }
        }

        self.size = new_size;
        self.grid.set_size(new_size);
        for ent in self.registry.snapshot() {
            if let Some(b) = self.bounds(ent) {
                self.grid.insert(ent, &b);
            }
        }
    }

    /// Attach (or replace) the behavior hook of a resident entity.
    pub fn set_brain(&mut self, ent: EntityId, brain: Box<dyn Behavior>) {
        if self.world.contains(ent) {
            let _ = self.world.insert_one(ent, Brain(brain));
        }
    }
}

// ──────────────────────────────────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::grid::GRID_CELL;
    use crate::world::FixedClock;
    use std::sync::{Arc, Mutex};

    /// Zero-gravity map so entities only move when a test says so.
    fn test_map(w: f32, h: f32) -> Map {
        let config = WorldConfig {
            gravity: Vec2::ZERO,
            max_velocity: Vec2::new(10_000.0, 10_000.0),
        };
        Map::new(MapId(1), "test", Vec2::new(w, h), config, Box::new(FixedClock(0)))
    }

    fn boxed(x: f32, y: f32, w: f32, h: f32) -> Aabb {
        Aabb::new(Vec2::new(x, y), Vec2::new(w, h))
    }

    fn dynamic(b: Aabb) -> EntityDef {
        EntityDef {
            flags: EntityFlags::DYNAMIC,
            ..EntityDef::new(b)
        }
    }

    /// Brute-force cross-check of the grid/registry invariant: every
    /// resident appears in exactly the buckets overlapping its box.
    fn assert_consistent(map: &Map) {
        let (gw, gh) = map.grid.grid_size();
        for ent in map.registry.snapshot() {
            let b = map.bounds(ent).expect("resident entity must have bounds");
            let x0 = ((b.min.x / GRID_CELL).floor() as i32).clamp(0, gw - 1);
            let y0 = ((b.min.y / GRID_CELL).floor() as i32).clamp(0, gh - 1);
            let x1 = ((b.max.x / GRID_CELL).floor() as i32).clamp(x0, gw - 1);
            let y1 = ((b.max.y / GRID_CELL).floor() as i32).clamp(y0, gh - 1);
            for y in 0..gh {
                for x in 0..gw {
                    let inside = x >= x0 && x <= x1 && y >= y0 && y <= y1;
                    assert_eq!(
                        map.grid.bucket_holds(x, y, ent),
                        inside,
                        "entity {ent:?} bucket ({x},{y}) mismatch for box {b:?}"
                    );
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Recording behaviors
    // ------------------------------------------------------------------

    type Log = Arc<Mutex<Vec<(&'static str, Vec2)>>>;

    struct Recorder {
        tag: &'static str,
        log: Log,
    }

    impl Behavior for Recorder {
        fn collide_into(&mut self, _map: &mut Map, _me: EntityId, _other: EntityId, d: Vec2) {
            self.log.lock().unwrap().push(("into", d));
        }

        fn collide_from(&mut self, _map: &mut Map, _me: EntityId, _other: EntityId, d: Vec2) {
            self.log.lock().unwrap().push(("from", d));
        }

        fn update(&mut self, _map: &mut Map, _me: EntityId, _dt: f32) {
            self.log.lock().unwrap().push((self.tag, Vec2::ZERO));
        }
    }

    struct SelfDisposer {
        tag: &'static str,
        log: Log,
    }

    impl Behavior for SelfDisposer {
        fn update(&mut self, map: &mut Map, me: EntityId, _dt: f32) {
            self.log.lock().unwrap().push((self.tag, Vec2::ZERO));
            map.remove_entity(me);
        }
    }

    // ------------------------------------------------------------------
    // Boundary + collision scenarios
    // ------------------------------------------------------------------

    #[test]
    fn move_past_border_is_clamped_and_regridded() {
        // 640x480 map = 5x4 buckets. The entity starts in the top-left
        // corner region and is teleported past the right border.
        let mut map = test_map(640.0, 480.0);
        let e1 = map.add_entity(EntityDef::new(boxed(100.0, 100.0, 50.0, 50.0)));
        assert!(map.grid.bucket_holds(0, 0, e1));
        assert_consistent(&map);

        map.teleport(e1, Vec2::new(600.0, 100.0));

        // max.x would be 650 on a 640-wide map: pulled back to 590.
        let b = map.bounds(e1).unwrap();
        assert_eq!(b.min, Vec2::new(590.0, 100.0));
        assert_eq!(b.size(), Vec2::new(50.0, 50.0));
        assert!(map.grid.bucket_holds(4, 0, e1));
        for y in 0..4 {
            assert!(!map.grid.bucket_holds(0, y, e1), "stale column-0 bucket ref");
        }
        assert_consistent(&map);
    }

    #[test]
    fn overlap_reports_one_collision_with_symmetric_displacement() {
        let mut map = test_map(200.0, 200.0);
        let log: Log = Arc::new(Mutex::new(Vec::new()));

        let a = map.add_entity(EntityDef::new(boxed(0.0, 0.0, 10.0, 10.0)).with_brain(Box::new(
            Recorder {
                tag: "a",
                log: Arc::clone(&log),
            },
        )));
        let b = map.add_entity(EntityDef::new(boxed(5.0, 5.0, 10.0, 10.0)));
        map.set_brain(
            b,
            Box::new(Recorder {
                tag: "b",
                log: Arc::clone(&log),
            }),
        );

        let hits = map.check_collisions(a);
        assert_eq!(hits, 1);

        let events = log.lock().unwrap().clone();
        assert_eq!(events.len(), 2);
        let (into, from) = (events[0], events[1]);
        assert_eq!(into.0, "into");
        assert_eq!(from.0, "from");
        assert_eq!(into.1, from.1, "both parties see the same separation");
        assert_eq!(into.1.length(), 5.0, "5 px along the axis of least overlap");
        assert_ne!(into.1, Vec2::ZERO);
    }

    #[test]
    fn collision_opt_out_short_circuits() {
        let mut map = test_map(200.0, 200.0);
        let ghost = map.add_entity(EntityDef {
            collision: CollisionKind::None,
            ..EntityDef::new(boxed(0.0, 0.0, 10.0, 10.0))
        });
        let _solid = map.add_entity(EntityDef::new(boxed(5.0, 5.0, 10.0, 10.0)));

        assert_eq!(map.check_collisions(ghost), 0, "opt-out entity never collides");

        // And a solid mover ignores opted-out candidates.
        let solid2 = map.add_entity(EntityDef::new(boxed(2.0, 2.0, 4.0, 4.0)));
        let hits = map.check_collisions(solid2);
        let candidates = map.collidable_in(&map.bounds(solid2).unwrap(), Some(solid2));
        assert!(!candidates.contains(&ghost));
        assert_eq!(hits, 1);
    }

    // ------------------------------------------------------------------
    // Stable indices
    // ------------------------------------------------------------------

    #[test]
    fn dynamic_indices_are_unique_and_reused_lowest_first() {
        let mut map = test_map(640.0, 480.0);
        let a = map.add_entity(dynamic(boxed(0.0, 0.0, 10.0, 10.0)));
        let b = map.add_entity(dynamic(boxed(20.0, 0.0, 10.0, 10.0)));
        let c = map.add_entity(dynamic(boxed(40.0, 0.0, 10.0, 10.0)));
        let _wall = map.add_entity(EntityDef::wall(boxed(0.0, 400.0, 640.0, 80.0)));

        let ia = map.net_index(a).unwrap();
        let ib = map.net_index(b).unwrap();
        let ic = map.net_index(c).unwrap();
        assert_eq!((ia, ib, ic), (MapEntityIndex(0), MapEntityIndex(1), MapEntityIndex(2)));
        assert_eq!(map.get_entity_at(ia), Some(a));
        assert_eq!(map.get_entity_at(ib), Some(b));
        assert_eq!(map.get_entity_at(ic), Some(c));

        map.remove_entity(b);
        assert_eq!(map.get_entity_at(ib), None, "freed slot reads as absent");

        let d = map.add_entity(dynamic(boxed(60.0, 0.0, 10.0, 10.0)));
        assert_eq!(map.net_index(d), Some(MapEntityIndex(1)), "lowest slot reused");
        assert_eq!(map.get_entity_at(MapEntityIndex(1)), Some(d));

        // Walls never claim a slot.
        assert_eq!(map.dynamic_entities().count(), 3);
    }

    #[test]
    fn explicit_index_reconstruction() {
        let mut map = test_map(640.0, 480.0);
        let e = map.add_entity_with_index(dynamic(boxed(0.0, 0.0, 10.0, 10.0)), MapEntityIndex(7));
        assert_eq!(map.net_index(e), Some(MapEntityIndex(7)));
        assert_eq!(map.get_entity_at(MapEntityIndex(7)), Some(e));
        assert_eq!(map.get_entity_at(MapEntityIndex(3)), None);

        // Auto allocation fills the gap below the explicit slot.
        let f = map.add_entity(dynamic(boxed(20.0, 0.0, 10.0, 10.0)));
        assert_eq!(map.net_index(f), Some(MapEntityIndex(0)));
    }

    // ------------------------------------------------------------------
    // Boundary behavior
    // ------------------------------------------------------------------

    #[test]
    fn clamp_is_idempotent_for_in_bounds_entities() {
        let mut map = test_map(640.0, 480.0);
        let e = map.add_entity(EntityDef::new(boxed(10.0, 10.0, 20.0, 20.0)));
        let before = map.bounds(e).unwrap();
        let refs = map.grid.reference_count(e);

        map.clamp_into_bounds(e);

        assert_eq!(map.bounds(e).unwrap(), before, "no spurious movement");
        assert_eq!(map.grid.reference_count(e), refs, "no grid churn");
    }

    #[test]
    fn add_outside_bounds_is_pulled_in() {
        let mut map = test_map(640.0, 480.0);
        let e = map.add_entity(EntityDef::new(boxed(-40.0, 470.0, 20.0, 20.0)));
        let b = map.bounds(e).unwrap();
        assert_eq!(b.min, Vec2::new(0.0, 460.0));
        assert_eq!(b.size(), Vec2::new(20.0, 20.0), "clamp preserves size");
        assert!(map.is_in_bounds(&b));
        assert_consistent(&map);
    }

    #[test]
    fn keep_in_map_trims_offsets() {
        let mut map = test_map(640.0, 480.0);
        let e = map.add_entity(EntityDef::new(boxed(10.0, 10.0, 20.0, 20.0)));

        let mut off = Vec2::new(-50.0, 0.0);
        map.keep_in_map(e, &mut off);
        assert_eq!(off, Vec2::new(-10.0, 0.0));

        let mut off = Vec2::new(10_000.0, 5.0);
        map.keep_in_map(e, &mut off);
        assert_eq!(off, Vec2::new(610.0, 5.0));
    }

    #[test]
    fn safe_teleport_and_resize_respect_borders() {
        let mut map = test_map(640.0, 480.0);
        let e = map.add_entity(EntityDef::new(boxed(10.0, 10.0, 20.0, 20.0)));

        map.safe_teleport(e, Vec2::new(10_000.0, -50.0));
        let b = map.bounds(e).unwrap();
        assert_eq!(b.min, Vec2::new(620.0, 0.0));

        map.safe_resize(e, Vec2::new(100.0, 100.0));
        let b = map.bounds(e).unwrap();
        assert_eq!(b.size(), Vec2::new(20.0, 100.0), "width capped at the border");
        assert_consistent(&map);
    }

    // ------------------------------------------------------------------
    // Tick driver
    // ------------------------------------------------------------------

    #[test]
    fn update_integrates_velocity() {
        let mut map = test_map(640.0, 480.0);
        let e = map.add_entity(
            EntityDef::new(boxed(10.0, 10.0, 20.0, 20.0)).with_velocity(Vec2::new(100.0, 0.0)),
        );

        map.update(0.5);

        assert_eq!(map.bounds(e).unwrap().min, Vec2::new(60.0, 10.0));
        assert_consistent(&map);
    }

    #[test]
    fn paused_map_does_not_tick() {
        let mut map = test_map(640.0, 480.0);
        let e = map.add_entity(
            EntityDef::new(boxed(10.0, 10.0, 20.0, 20.0)).with_velocity(Vec2::new(100.0, 0.0)),
        );

        map.set_updating(false);
        map.update(0.5);
        assert_eq!(map.bounds(e).unwrap().min, Vec2::new(10.0, 10.0));

        map.set_updating(true);
        map.update(0.5);
        assert_eq!(map.bounds(e).unwrap().min, Vec2::new(60.0, 10.0));
    }

    #[test]
    fn self_disposal_mid_update_is_safe() {
        let mut map = test_map(640.0, 480.0);
        let log: Log = Arc::new(Mutex::new(Vec::new()));

        let _a = map.add_entity(EntityDef::new(boxed(0.0, 0.0, 10.0, 10.0)).with_brain(Box::new(
            Recorder {
                tag: "a",
                log: Arc::clone(&log),
            },
        )));
        let b = map.add_entity(EntityDef::new(boxed(30.0, 0.0, 10.0, 10.0)).with_brain(Box::new(
            SelfDisposer {
                tag: "b",
                log: Arc::clone(&log),
            },
        )));
        let _c = map.add_entity(EntityDef::new(boxed(60.0, 0.0, 10.0, 10.0)).with_brain(Box::new(
            Recorder {
                tag: "c",
                log: Arc::clone(&log),
            },
        )));

        map.update(0.1);

        let tags: Vec<_> = log.lock().unwrap().iter().map(|(t, _)| *t).collect();
        assert_eq!(tags, vec!["a", "b", "c"], "no entity skipped or duplicated");
        assert_eq!(map.entity_count(), 2);
        assert!(map.bounds(b).is_none());
        assert_consistent(&map);

        // Next tick runs only the survivors.
        log.lock().unwrap().clear();
        map.update(0.1);
        let tags: Vec<_> = log.lock().unwrap().iter().map(|(t, _)| *t).collect();
        assert_eq!(tags, vec!["a", "c"]);
    }

    #[test]
    fn double_dispose_is_tolerated() {
        let mut map = test_map(640.0, 480.0);
        let e = map.add_entity(EntityDef::new(boxed(10.0, 10.0, 20.0, 20.0)));
        map.remove_entity(e);
        map.remove_entity(e); // logs, does not panic or corrupt
        assert_eq!(map.entity_count(), 0);
        assert_eq!(map.grid.reference_count(e), 0);
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    #[test]
    fn queries_deduplicate_and_filter() {
        let mut map = test_map(640.0, 480.0);
        let spanner = map.add_entity(EntityDef::new(boxed(100.0, 100.0, 300.0, 300.0)));
        let wall = map.add_entity(EntityDef::wall(boxed(0.0, 0.0, 640.0, 16.0)));

        let everything = boxed(0.0, 0.0, 640.0, 480.0);
        let all = map.entities_in(&everything);
        assert_eq!(all.len(), 2, "spanning entity reported once");

        let walls = map.entities_in_with_flags(&everything, EntityFlags::WALL);
        assert_eq!(walls, vec![wall]);

        assert_eq!(map.entities_at(Vec2::new(150.0, 150.0)), vec![spanner]);
        assert!(map.entities_at(Vec2::new(-10.0, 10.0)).is_empty());
        assert!(
            map.entities_at_where(Vec2::new(150.0, 150.0), |e| e != spanner)
                .is_empty()
        );
        assert!(map.contains_entities_in(&boxed(0.0, 0.0, 30.0, 30.0)));
        assert!(!map.contains_entities_in(&boxed(500.0, 400.0, 30.0, 30.0)));
        assert!(map.contains_point(Vec2::new(0.0, 0.0)));
        assert!(!map.contains_point(Vec2::new(640.0, 10.0)));
    }

    #[test]
    fn grid_registry_consistency_over_random_ops() {
        let mut map = test_map(640.0, 480.0);
        let mut live = Vec::new();

        for i in 0..24 {
            let x = (i * 53 % 600) as f32;
            let y = (i * 91 % 440) as f32;
            let e = map.add_entity(dynamic(boxed(x, y, 24.0, 40.0)));
            live.push(e);
            assert_consistent(&map);
        }
        for (i, &e) in live.iter().enumerate() {
            match i % 4 {
                0 => map.teleport(e, Vec2::new((i * 37 % 640) as f32, (i * 71 % 480) as f32)),
                1 => map.translate(e, Vec2::new(97.0, -33.0)),
                2 => map.resize(e, Vec2::new(160.0, 8.0)),
                _ => map.remove_entity(e),
            }
            assert_consistent(&map);
        }
    }

    // ------------------------------------------------------------------
    // Dimension changes
    // ------------------------------------------------------------------

    #[test]
    fn shrink_trims_walls_and_evicts_the_rest() {
        let mut map = test_map(640.0, 480.0);
        let trim_wall = map.add_entity(EntityDef::wall(boxed(500.0, 10.0, 100.0, 50.0)));
        let gone_wall = map.add_entity(EntityDef::wall(boxed(600.0, 400.0, 40.0, 80.0)));
        let evicted = map.add_entity(dynamic(boxed(600.0, 100.0, 20.0, 20.0)));
        let survivor = map.add_entity(dynamic(boxed(100.0, 100.0, 20.0, 20.0)));
        let evicted_idx = map.net_index(evicted).unwrap();

        map.set_dimensions(Vec2::new(512.0, 480.0));

        assert_eq!(map.size(), Vec2::new(512.0, 480.0));
        assert_eq!(
            map.bounds(trim_wall).unwrap(),
            boxed(500.0, 10.0, 12.0, 50.0),
            "wall trimmed down to the new border"
        );
        assert!(map.bounds(gone_wall).is_none(), "wall wholly outside evicted");
        assert!(map.bounds(evicted).is_none());
        assert_eq!(map.get_entity_at(evicted_idx), None, "evicted slot freed");
        assert!(map.bounds(survivor).is_some());
        assert_eq!(map.grid.grid_size(), (4, 4));
        assert_consistent(&map);
    }
}
