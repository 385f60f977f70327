//! In-memory terminology store for the OCLFHIR engine.
//!
//! Reference implementation of [`oclfhir_storage::TerminologyStore`] used by
//! the engine tests. Tables are plain vectors behind an `RwLock`; reads take
//! the lock for the duration of one query, which makes every selection
//! repeatable within a request.
//!
//! # Example
//!
//! ```ignore
//! use oclfhir_db_memory::InMemoryStore;
//!
//! let store = InMemoryStore::new();
//! store.add_org("OCL");
//! let repo_id = store.insert_repository(diagnosis_cs_v1());
//! store.insert_concept(repo_id, allergic_disorder());
//! ```

mod store;

pub use store::InMemoryStore;

// Re-export the store trait for convenience
pub use oclfhir_storage::{StorageError, TerminologyStore};

/// Creates a new shareable in-memory store instance.
pub fn create_store() -> oclfhir_storage::DynTerminologyStore {
    std::sync::Arc::new(InMemoryStore::new())
}
