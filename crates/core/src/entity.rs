//! Entity trait: identity + continuity across state changes.

use std::collections::HashMap;

/// Entity marker + minimal interface.
///
/// Products are entities: stock changes between checkouts, the identifier does not.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Copy + Eq + Ord + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> Self::Id;
}

/// Key entities by their identifier. A later duplicate replaces an earlier one.
pub fn index_by_id<E, I>(entities: I) -> HashMap<E::Id, E>
where
    E: Entity,
    I: IntoIterator<Item = E>,
{
    entities.into_iter().map(|e| (e.id(), e)).collect()
}
