//! World tuning and the game-time collaborator.
//!
//! Both are handed to [`Map`](crate::sim::Map) at construction; nothing in
//! the core reaches for ambient globals.

use glam::Vec2;
use std::time::Instant;

/// Physics tuning shared by every entity on a map.
#[derive(Clone, Copy, Debug)]
pub struct WorldConfig {
    /// Acceleration applied per second of game time, scaled by entity
    /// weight. +Y points down.
    pub gravity: Vec2,
    /// Per-axis velocity ceiling (px/s), applied symmetrically.
    pub max_velocity: Vec2,
}

impl Default for WorldConfig {
    fn default() -> Self {
        WorldConfig {
            gravity: Vec2::new(0.0, 950.0),
            max_velocity: Vec2::new(600.0, 900.0),
        }
    }
}

/// Source of the current game time in milliseconds.
///
/// The core only forwards this to entity logic; it never branches on it.
pub trait TimeSource: Send {
    fn now_ms(&self) -> u32;
}

/// Wall-clock time source counting from its own creation.
#[derive(Debug)]
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    pub fn new() -> MonotonicClock {
        MonotonicClock {
            start: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicClock {
    fn now_ms(&self) -> u32 {
        self.start.elapsed().as_millis() as u32
    }
}

/// Fixed time source for tests and deterministic replays.
#[derive(Debug, Default)]
pub struct FixedClock(pub u32);

impl TimeSource for FixedClock {
    fn now_ms(&self) -> u32 {
        self.0
    }
}
