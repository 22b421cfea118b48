pub mod archetype;
pub mod flags;

pub use self::{
    archetype::{ARCHETYPES, ArchetypeInfo, by_id},
    flags::{CollisionKind, EntityFlags},
};
