//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Repositories are keyed on `Entity::Id`, so composite keys (e.g. a join row
/// addressed by two foreign keys) are expressed as a tuple or a small key struct.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> Self::Id;
}
