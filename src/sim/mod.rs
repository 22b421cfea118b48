mod entity;
mod grid;
mod map;
mod physics;
mod placement;
mod registry;
mod tic;

pub use entity::{
    Behavior, Bounds, Brain, Collision, EntityDef, EntityId, Flags, Velocity, Weight,
};
pub use grid::{EntityGrid, GRID_CELL};
pub use map::{Map, MapId};
pub use placement::{NoValidPlacement, PLACEMENT_PADDING, SNAP_MARGIN};
pub use registry::{EntityRegistry, MapEntityIndex};
pub use tic::{DT, SIM_FPS, TickPump};
