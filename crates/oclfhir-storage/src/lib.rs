//! Storage abstraction for the OCLFHIR terminology engine.
//!
//! The engine treats persistence as a repository interface returning
//! already-materialized records; this crate defines that interface
//! ([`TerminologyStore`]), the version-selection modes, and the storage
//! error type. Backends must provide repeatable reads: given the same
//! owner/id/version/access-scope, two concurrent selections must return the
//! same version row.

pub mod error;
pub mod traits;
pub mod types;

pub use error::{ErrorCategory, StorageError};
pub use traits::TerminologyStore;
pub use types::{RepositoryQuery, ResourceType, VersionSelector};

/// Type alias for a shareable store instance.
pub type DynTerminologyStore = std::sync::Arc<dyn TerminologyStore>;
