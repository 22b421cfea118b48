//! Uniform entity grid – the map's broad phase.
//!
//! * One bucket ≙ 128×128 px (same granularity the wall grid always used).
//! * Buckets are dense (`Vec`, row-major) and insertion-ordered – collision
//!   outcomes must be reproducible for a given operation sequence, so no
//!   hash-ordered iteration anywhere on this path.
//! * The grid stores handles only; entity state lives in the world.
//!
//! Maintenance is write-through: every move/resize routes through
//! [`reposition`](EntityGrid::reposition) with the pre-move box.

use glam::Vec2;
use smallvec::SmallVec;

use super::entity::EntityId;
use crate::world::Aabb;

/// Side length of one grid bucket in pixels.
pub const GRID_CELL: f32 = 128.0;

/// Small fixed-capacity bucket – few live entities share a 128 px cell in
/// practice, so the common case never allocates.
type Bucket = SmallVec<[EntityId; 8]>;

/// Clamped inclusive bucket rectangle `(min_x, min_y, max_x, max_y)`.
type BucketRange = (i32, i32, i32, i32);

#[derive(Debug, Default)]
pub struct EntityGrid {
    width: i32,
    height: i32,
    buckets: Vec<Bucket>,
}

impl EntityGrid {
    pub fn new() -> EntityGrid {
        EntityGrid::default()
    }

    /// (Re)allocate for a map of `size` pixels. All prior bucket contents
    /// are discarded; the caller re-inserts every survivor.
    pub fn set_size(&mut self, size: Vec2) {
        self.width = (size.x / GRID_CELL).ceil().max(1.0) as i32;
        self.height = (size.y / GRID_CELL).ceil().max(1.0) as i32;
        self.buckets = vec![Bucket::new(); (self.width * self.height) as usize];
    }

    /// Bucket dimensions `(columns, rows)`.
    #[inline]
    pub fn grid_size(&self) -> (i32, i32) {
        (self.width, self.height)
    }

    #[inline]
    fn is_legal(&self, x: i32, y: i32) -> bool {
        x >= 0 && x < self.width && y >= 0 && y < self.height
    }

    #[inline]
    fn index(&self, x: i32, y: i32) -> usize {
        (y * self.width + x) as usize
    }

    /// Bucket rectangle covered by `b`, clamped into the grid. A box lying
    /// entirely outside still maps to its nearest edge bucket, and a
    /// degenerate box still occupies its origin bucket.
    fn bucket_range(&self, b: &Aabb) -> BucketRange {
        if self.buckets.is_empty() {
            return (0, 0, -1, -1); // empty range – grid not sized yet
        }
        let min_x = ((b.min.x / GRID_CELL).floor() as i32).clamp(0, self.width - 1);
        let min_y = ((b.min.y / GRID_CELL).floor() as i32).clamp(0, self.height - 1);
        let max_x = ((b.max.x / GRID_CELL).floor() as i32).clamp(min_x, self.width - 1);
        let max_y = ((b.max.y / GRID_CELL).floor() as i32).clamp(min_y, self.height - 1);
        (min_x, min_y, max_x, max_y)
    }

    /// Add `ent` to every bucket its box covers, skipping duplicates
    /// within a bucket.
    pub fn insert(&mut self, ent: EntityId, b: &Aabb) {
        let (x0, y0, x1, y1) = self.bucket_range(b);
        for y in y0..=y1 {
            for x in x0..=x1 {
                let i = self.index(x, y);
                let bucket = &mut self.buckets[i];
                if !bucket.contains(&ent) {
                    bucket.push(ent);
                }
            }
        }
    }

    /// Remove `ent` from every bucket. Full scan – removal is far rarer
    /// than query on the hot path. Order-preserving.
    pub fn remove(&mut self, ent: EntityId) {
        for bucket in &mut self.buckets {
            if let Some(i) = bucket.iter().position(|&e| e == ent) {
                bucket.remove(i);
            }
        }
    }

    fn remove_in_range(&mut self, ent: EntityId, range: BucketRange) {
        let (x0, y0, x1, y1) = range;
        for y in y0..=y1 {
            for x in x0..=x1 {
                let i = self.index(x, y);
                let bucket = &mut self.buckets[i];
                if let Some(j) = bucket.iter().position(|&e| e == ent) {
                    bucket.remove(j);
                }
            }
        }
    }

    /// Incremental maintenance after a move or resize: no-op when the
    /// bucket rectangle did not change, otherwise clear the old range and
    /// re-insert fresh.
    pub fn reposition(&mut self, ent: EntityId, old: &Aabb, new: &Aabb) {
        let old_range = self.bucket_range(old);
        let new_range = self.bucket_range(new);
        if old_range == new_range {
            return;
        }
        self.remove_in_range(ent, old_range);
        self.insert(ent, new);
    }

    /// Lazy walk of the bucket slices overlapping `rect` (not flattened,
    /// not deduplicated – an entity spanning cells shows up once per cell).
    pub fn buckets_overlapping(&self, rect: &Aabb) -> impl Iterator<Item = &[EntityId]> + '_ {
        let (x0, y0, x1, y1) = self.bucket_range(rect);
        (y0..=y1).flat_map(move |y| {
            (x0..=x1).map(move |x| self.buckets[(y * self.width + x) as usize].as_slice())
        })
    }

    /// Visit every distinct entity whose bucket rectangle overlaps `rect`,
    /// in bucket-scan order. Stops early when `f` returns `false`; the
    /// return value reports whether the walk ran to completion.
    pub fn for_each_in_rect<F>(&self, rect: &Aabb, mut f: F) -> bool
    where
        F: FnMut(EntityId) -> bool,
    {
        let mut seen: SmallVec<[EntityId; 16]> = SmallVec::new();
        for bucket in self.buckets_overlapping(rect) {
            for &ent in bucket {
                if seen.contains(&ent) {
                    continue;
                }
                seen.push(ent);
                if !f(ent) {
                    return false;
                }
            }
        }
        true
    }

    /// Entities in the single bucket containing `p`. Points outside the
    /// grid yield an empty slice rather than an error.
    pub fn bucket_at(&self, p: Vec2) -> &[EntityId] {
        let x = (p.x / GRID_CELL).floor() as i32;
        let y = (p.y / GRID_CELL).floor() as i32;
        if !self.is_legal(x, y) {
            return &[];
        }
        self.buckets[self.index(x, y)].as_slice()
    }

    /// True when `ent` sits in the bucket at grid coordinates `(x, y)`.
    /// Test/diagnostic helper for invariant cross-checks.
    pub fn bucket_holds(&self, x: i32, y: i32, ent: EntityId) -> bool {
        self.is_legal(x, y) && self.buckets[self.index(x, y)].contains(&ent)
    }

    /// How many buckets currently reference `ent`.
    pub fn reference_count(&self, ent: EntityId) -> usize {
        self.buckets
            .iter()
            .filter(|bucket| bucket.contains(&ent))
            .count()
    }
}
