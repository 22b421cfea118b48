use bitflags::bitflags;

bitflags! {
    /// Lifecycle / placement flags carried by every resident entity.
    #[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
    pub struct EntityFlags: u16 {
        /// Needs a stable `MapEntityIndex` so remote clients can address it.
        const DYNAMIC    = 0x0001;
        /// Static boundary geometry. Trimmed to fit on a map shrink instead
        /// of being evicted.
        const WALL       = 0x0002;
        /// Unaffected by gravity during velocity integration.
        const WEIGHTLESS = 0x0004;
    }
}

/// How an entity participates in collision resolution.
///
/// `None` opts the entity out of the whole collision pipeline; `Full`
/// resolves against the complete bounding rectangle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CollisionKind {
    None,
    #[default]
    Full,
}
