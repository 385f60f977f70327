//! Core domain model for the OCLFHIR terminology engine.
//!
//! This crate defines the materialized, immutable value structs the engine
//! operates on (owners, repository versions, concepts, mappings, collection
//! references), the typed error taxonomy, the access-scope filter, and the
//! locale-tagged display resolution rules shared by the resource converters
//! and the terminology operations.

pub mod access;
pub mod constants;
pub mod display;
pub mod error;
pub mod model;

pub use access::AccessScope;
pub use error::CoreError;
pub use model::{
    CollectionReference, Concept, LocalizedText, Mapping, Owner, OwnerKind, RepositoryKind,
    RepositoryVersion,
};
