//! The terminology store trait.

use async_trait::async_trait;

use oclfhir_core::{
    AccessScope, CollectionReference, Concept, Mapping, RepositoryKind, RepositoryVersion,
};

use crate::error::StorageError;
use crate::types::{RepositoryQuery, VersionSelector};

/// Read-side repository interface the resolution engine is built on.
///
/// Implementations must be thread-safe (`Send + Sync`) and must not return
/// partially committed rows: the same query under the same access scope must
/// be repeatable within a request.
///
/// # Example
///
/// ```ignore
/// use oclfhir_storage::{RepositoryQuery, TerminologyStore, VersionSelector};
///
/// async fn latest(store: &dyn TerminologyStore, url: &str) -> Option<RepositoryVersion> {
///     store
///         .repository_versions(
///             RepositoryKind::Source,
///             &RepositoryQuery::ByUrl { url: url.into() },
///             &VersionSelector::LatestReleased,
///             &AccessScope::public(),
///         )
///         .await
///         .ok()?
///         .into_iter()
///         .next()
/// }
/// ```
#[async_trait]
pub trait TerminologyStore: Send + Sync {
    // ==================== Version selection ====================

    /// Returns the repository version rows matching the query under the given
    /// selector and access scope.
    ///
    /// Mode contracts:
    /// - `Exact`: at most one row with that exact version string.
    /// - `Wildcard`: every non-`HEAD` row, ordered by version string descending.
    /// - `LatestReleased`: the most recently created row with `released = true`
    ///   (never `HEAD`); empty when no released row exists.
    ///
    /// An empty result is not an error here; the resolver turns it into a
    /// typed not-found.
    async fn repository_versions(
        &self,
        kind: RepositoryKind,
        query: &RepositoryQuery,
        selector: &VersionSelector,
        access: &AccessScope,
    ) -> Result<Vec<RepositoryVersion>, StorageError>;

    /// Reads one repository version row by its internal id, access-unscoped.
    /// Used by the mapping live-reference fallback.
    async fn repository_by_id(&self, id: u64) -> Result<Option<RepositoryVersion>, StorageError>;

    /// Checks for an existing (owner, id, version) or (owner, url, version)
    /// row so write-path callers can distinguish conflict from not-found.
    async fn version_exists(
        &self,
        kind: RepositoryKind,
        query: &RepositoryQuery,
        version: &str,
    ) -> Result<bool, StorageError>;

    // ==================== Concepts ====================

    /// Finds a concept by code within a repository version. Codes are matched
    /// against the percent-decoded mnemonic.
    async fn find_concept(
        &self,
        repository_id: u64,
        code: &str,
    ) -> Result<Option<Concept>, StorageError>;

    /// All concepts of a repository version, ordered by mnemonic.
    async fn concepts_of(&self, repository_id: u64) -> Result<Vec<Concept>, StorageError>;

    /// Reads one concept row by its internal id, for the mapping
    /// live-reference fallback.
    async fn concept_by_id(&self, id: u64) -> Result<Option<Concept>, StorageError>;

    // ==================== Mappings and references ====================

    /// All mapping rows of a repository version.
    async fn mappings_of(&self, repository_id: u64) -> Result<Vec<Mapping>, StorageError>;

    /// All collection-reference expressions of a repository version, in
    /// stored order.
    async fn references_of(
        &self,
        repository_id: u64,
    ) -> Result<Vec<CollectionReference>, StorageError>;

    // ==================== Owners ====================

    /// Whether an organization with the given mnemonic exists.
    async fn org_exists(&self, mnemonic: &str) -> Result<bool, StorageError>;

    /// Whether a user with the given username exists.
    async fn user_exists(&self, username: &str) -> Result<bool, StorageError>;
}
