//! Authoritative 2-D map simulation core.
//!
//! One [`sim::Map`] per game map: it tracks every live entity's bounding
//! box in a uniform 128 px grid, keeps the stable [`sim::MapEntityIndex`]
//! addressing the protocol layer syncs against, resolves collisions each
//! tick, and clamps everything inside the map borders. Transport,
//! persistence and game rules live elsewhere and talk to this crate
//! through `Map`'s public surface.

pub mod defs;
pub mod mapfile;
pub mod sim;
pub mod world;
