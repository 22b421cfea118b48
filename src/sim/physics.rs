//! Velocity integration – the pre-collision movement step of a tick.
//!
//! Gravity scales with entity weight, velocity is ceiling-clamped per axis,
//! and the resulting displacement routes through [`Map::translate`] so grid
//! maintenance and boundary clamping come along for free.

use glam::Vec2;

use super::entity::EntityId;
use super::map::Map;
use crate::defs::EntityFlags;

/// Advance one entity by `dt` seconds of velocity.
pub(crate) fn integrate(map: &mut Map, ent: EntityId, dt: f32) {
    let Some(flags) = map.flags(ent) else {
        return;
    };
    let Some(mut velocity) = map.velocity(ent) else {
        return;
    };
    let weight = map.weight(ent).unwrap_or(0.0);

    if !flags.contains(EntityFlags::WEIGHTLESS) && weight != 0.0 {
        velocity += map.config().gravity * weight * dt;
    }

    let max = map.config().max_velocity;
    velocity = velocity.clamp(-max, max);
    map.set_velocity(ent, velocity);

    if velocity != Vec2::ZERO {
        map.translate(ent, velocity * dt);
    }
}
