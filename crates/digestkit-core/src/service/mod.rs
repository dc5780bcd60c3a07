//! Feature-facing services composed from the stores.

mod lookup;

pub use lookup::{Definition, DefinitionOrigin, DefinitionSource, WordLookup};
