//! The Entity Data Model: the read-only schema surface an OData writer
//! validates payloads against. A Model holds named structured types and the
//! entity container (entity sets and singletons), and answers the narrow set
//! of queries the writer engine needs: property lookup through base-type
//! chains, assignability, key properties, collection element types, and
//! navigation-target resolution.

mod container;
pub use container::{EntitySet, NavigationSource, NavigationSourceKind, Singleton};

mod model;
pub use model::{Model, ResolvedProperty};

mod types;
pub use types::{
    NavigationProperty, PrimitiveKind, Property, StructuredKind, StructuredType, TypeRef,
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("duplicate type name: '{0}'")]
    DuplicateType(String),
    #[error("duplicate entity set: '{0}'")]
    DuplicateEntitySet(String),
    #[error("duplicate singleton: '{0}'")]
    DuplicateSingleton(String),
    #[error("base type '{base}' of '{name}' was not found")]
    BaseTypeNotFound { name: String, base: String },
}
