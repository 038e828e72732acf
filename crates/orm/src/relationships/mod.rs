//! Relationship resolution
//!
//! A relationship is declared on a model spec as a [`RelationshipDef`] and
//! resolved once, on first access, into an immutable [`Relationship`]
//! descriptor. The descriptor knows how to fetch lazily for one record and
//! how to resolve eagerly for a whole page of native rows without query
//! explosion.

mod eager;
mod loader;
mod metadata;

pub use loader::Relationship;
pub use metadata::{Cardinality, Merge, NativeBy, RelationKind, RelationshipDef, WHEREIN_MAX};
