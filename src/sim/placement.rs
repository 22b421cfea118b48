//! Placement search and wall-adjacency helpers.
//!
//! Used by spawn logic and the editor surface: find a nearby spot where a
//! box fits without overlapping collidable geometry, or align a box flush
//! against neighbouring walls.

use glam::Vec2;
use thiserror::Error;

use super::entity::EntityId;
use super::map::Map;
use crate::defs::EntityFlags;
use crate::world::Aabb;

/// Extra pixels searched in every direction around a blocked placement.
/// Larger values find more spots but let entities warp further from where
/// they asked to be.
pub const PLACEMENT_PADDING: f32 = 128.0;

/// Default snap margin for [`Map::snap_to_walls`].
pub const SNAP_MARGIN: f32 = 20.0;

/// The placement search ran out of candidates. Policy (spawn anyway, retry
/// elsewhere, reject) belongs to the caller.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
#[error("no collision-free placement near ({x:.1}, {y:.1})")]
pub struct NoValidPlacement {
    pub x: f32,
    pub y: f32,
}

/// The twelve canonical positions for placing `cb` around `src`: directly
/// above/below/left/right keeping the free coordinate, plus the eight
/// edge-aligned variants. One pixel of clearance keeps the results from
/// re-colliding with `src` itself.
fn positions_around(src: &Aabb, cb: &Aabb) -> [Vec2; 12] {
    let (w, h) = (cb.width(), cb.height());
    [
        // Top
        Vec2::new(cb.min.x, src.min.y - h - 1.0),
        // Bottom
        Vec2::new(cb.min.x, src.max.y + 1.0),
        // Left
        Vec2::new(src.min.x - w - 1.0, cb.min.y),
        // Right
        Vec2::new(src.max.x + 1.0, cb.min.y),
        // Top, left-aligned
        Vec2::new(src.min.x, src.min.y - h - 1.0),
        // Top, right-aligned
        Vec2::new(src.max.x - w, src.min.y - h - 1.0),
        // Bottom, left-aligned
        Vec2::new(src.min.x, src.max.y + 1.0),
        // Bottom, right-aligned
        Vec2::new(src.max.x - w, src.max.y + 1.0),
        // Left, top-aligned
        Vec2::new(src.min.x - w - 1.0, src.min.y),
        // Left, bottom-aligned
        Vec2::new(src.min.x - w - 1.0, src.max.y - h),
        // Right, top-aligned
        Vec2::new(src.max.x + 1.0, src.min.y),
        // Right, bottom-aligned
        Vec2::new(src.max.x + 1.0, src.max.y - h),
    ]
}

impl Map {
    /// A placement is valid when the box lies fully inside the map and
    /// touches no collidable entity.
    pub fn is_valid_placement(&self, rect: &Aabb) -> bool {
        self.is_in_bounds(rect) && self.collidable_in(rect, None).is_empty()
    }

    /// Find the valid position closest to `cb.min` where a box of `cb`'s
    /// size fits. A box that is already valid keeps its own position.
    ///
    /// Candidates are the twelve canonical offsets around every collidable
    /// entity within [`PLACEMENT_PADDING`] of the request; ties resolve to
    /// the first candidate found, which is deterministic because the
    /// candidate walk follows grid order.
    pub fn closest_valid_placement(&self, cb: &Aabb) -> Result<Vec2, NoValidPlacement> {
        if self.is_valid_placement(cb) {
            return Ok(cb.min);
        }

        let padded = Aabb::from_extents(
            cb.min - Vec2::splat(PLACEMENT_PADDING),
            cb.max + Vec2::splat(PLACEMENT_PADDING),
        );
        let nearby = self.collidable_in(&padded, None);

        let mut best: Option<(f32, Vec2)> = None;
        for ent in nearby {
            let Some(src) = self.bounds(ent) else {
                continue;
            };
            for candidate in positions_around(&src, cb) {
                if !self.is_valid_placement(&cb.moved_to(candidate)) {
                    continue;
                }
                let dist = candidate.distance_squared(cb.min);
                if best.is_none_or(|(b, _)| dist < b) {
                    best = Some((dist, candidate));
                }
            }
        }

        best.map(|(_, p)| p).ok_or(NoValidPlacement {
            x: cb.min.x,
            y: cb.min.y,
        })
    }

    /// Position aligning `ent` flush with any wall edge within `max_diff`
    /// pixels. Pure query – the caller decides whether to apply it.
    pub fn snap_to_walls(&self, ent: EntityId, max_diff: f32) -> Option<Vec2> {
        let b = self.bounds(ent)?;
        let mut ret = b.min;

        let probe = Aabb::new(
            b.min - Vec2::splat(max_diff * 0.5),
            b.size() + Vec2::splat(max_diff),
        );
        for wall in self.entities_in_with_flags(&probe, EntityFlags::WALL) {
            if wall == ent {
                continue;
            }
            let Some(w) = self.bounds(wall) else {
                continue;
            };

            // own right edge to wall left edge
            if (probe.max.x - w.min.x).abs() < max_diff {
                ret.x = w.min.x - b.width();
            }
            // own left edge to wall right edge
            if (w.max.x - probe.min.x).abs() < max_diff {
                ret.x = w.max.x;
            }
            // own bottom to wall top
            if (probe.max.y - w.min.y).abs() < max_diff {
                ret.y = w.min.y - b.height();
            }
            // own top to wall bottom
            if (w.max.y - probe.min.y).abs() < max_diff {
                ret.y = w.max.y;
            }
        }
        Some(ret)
    }
}

// ──────────────────────────────────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::entity::EntityDef;
    use crate::sim::map::MapId;
    use crate::world::{FixedClock, WorldConfig};

    fn test_map(w: f32, h: f32) -> Map {
        let config = WorldConfig {
            gravity: Vec2::ZERO,
            ..WorldConfig::default()
        };
        Map::new(MapId(2), "place", Vec2::new(w, h), config, Box::new(FixedClock(0)))
    }

    fn boxed(x: f32, y: f32, w: f32, h: f32) -> Aabb {
        Aabb::new(Vec2::new(x, y), Vec2::new(w, h))
    }

    #[test]
    fn valid_box_keeps_its_position() {
        let mut map = test_map(200.0, 200.0);
        map.add_entity(EntityDef::wall(boxed(0.0, 0.0, 100.0, 20.0)));

        let free = boxed(120.0, 120.0, 20.0, 20.0);
        assert!(map.is_valid_placement(&free));
        assert_eq!(map.closest_valid_placement(&free), Ok(free.min));
    }

    #[test]
    fn blocked_box_relocates_to_nearest_candidate() {
        // 20x20 box colliding with a wall across the top of a 200x200 map:
        // the closest of the twelve candidates is directly below the wall.
        let mut map = test_map(200.0, 200.0);
        map.add_entity(EntityDef::wall(boxed(0.0, 0.0, 100.0, 20.0)));

        let request = boxed(40.0, 0.0, 20.0, 20.0);
        assert!(!map.is_valid_placement(&request));

        let pos = map.closest_valid_placement(&request).expect("room below the wall");
        assert_eq!(pos, Vec2::new(40.0, 21.0));
        assert!(map.is_valid_placement(&boxed(pos.x, pos.y, 20.0, 20.0)));
    }

    #[test]
    fn fully_blocked_search_reports_failure() {
        // Wall covers the entire map: nowhere to go.
        let mut map = test_map(200.0, 200.0);
        map.add_entity(EntityDef::wall(boxed(0.0, 0.0, 200.0, 200.0)));

        let request = boxed(40.0, 40.0, 20.0, 20.0);
        let err = map.closest_valid_placement(&request).unwrap_err();
        assert_eq!(err, NoValidPlacement { x: 40.0, y: 40.0 });
    }

    #[test]
    fn out_of_bounds_placement_is_invalid() {
        let map = test_map(200.0, 200.0);
        assert!(!map.is_valid_placement(&boxed(-5.0, 10.0, 20.0, 20.0)));
        assert!(!map.is_valid_placement(&boxed(190.0, 10.0, 20.0, 20.0)));
    }

    #[test]
    fn snap_aligns_to_nearby_wall_edges() {
        let mut map = test_map(400.0, 400.0);
        map.add_entity(EntityDef::wall(boxed(100.0, 0.0, 50.0, 400.0)));

        // 6 px short of the wall's left edge: snaps flush against it.
        let e = map.add_entity(EntityDef::new(boxed(70.0, 50.0, 24.0, 24.0)));
        let snapped = map.snap_to_walls(e, SNAP_MARGIN).unwrap();
        assert_eq!(snapped.x, 100.0 - 24.0);
        assert_eq!(snapped.y, 50.0, "free axis untouched");
    }
}
