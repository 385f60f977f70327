//! The resolution engine.
//!
//! Wraps the terminology store and turns its empty results into typed
//! not-found errors carrying what was searched. Also owns the two multi-step
//! resolutions the converters depend on: collection-reference expressions
//! (value-set membership) and mapping endpoints (snapshot first, then the
//! live row reference).

use oclfhir_core::constants::HEAD;
use oclfhir_core::{
    AccessScope, Concept, Mapping, Owner, OwnerKind, RepositoryKind, RepositoryVersion,
};
use oclfhir_storage::{
    DynTerminologyStore, RepositoryQuery, ResourceType, TerminologyStore, VersionSelector,
};

use crate::accession::{self, ReferenceExpression};
use crate::error::OperationError;

/// A collection reference resolved down to its concept and the canonical
/// system it lives in.
#[derive(Debug, Clone)]
pub struct ResolvedReference {
    pub system: String,
    /// Version of the referenced repository; absent when the reference points
    /// at the working copy.
    pub version: Option<String>,
    pub concept: Concept,
    /// Default locale of the repository the concept belongs to, for display
    /// resolution.
    pub default_locale: String,
}

/// A mapping with all four endpoints resolved to concrete values. Mappings
/// that cannot be fully resolved are not translatable and never reach the
/// grouper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMapping {
    pub equivalence: String,
    pub from_system: String,
    pub from_version: String,
    pub from_code: String,
    pub from_display: Option<String>,
    pub to_system: String,
    pub to_version: String,
    pub to_code: String,
    pub to_display: Option<String>,
}

/// Resolution engine over a terminology store.
#[derive(Clone)]
pub struct Resolver {
    store: DynTerminologyStore,
}

impl Resolver {
    pub fn new(store: DynTerminologyStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &dyn TerminologyStore {
        self.store.as_ref()
    }

    /// Resolves every version row matching the query under the selector
    /// derived from the caller's version argument. Empty is not-found.
    pub async fn resolve_versions(
        &self,
        kind: RepositoryKind,
        resource_type: ResourceType,
        query: &RepositoryQuery,
        version: Option<&str>,
        access: &AccessScope,
    ) -> Result<Vec<RepositoryVersion>, OperationError> {
        let selector = VersionSelector::from_param(version);
        let rows = self
            .store
            .repository_versions(kind, query, &selector, access)
            .await?;
        if rows.is_empty() {
            tracing::debug!(
                resource_type = %resource_type,
                query = %query.describe(),
                version = %selector.describe(),
                "Resolution produced no rows"
            );
            return Err(OperationError::not_found(
                resource_type,
                query.describe(),
                selector.describe(),
            ));
        }
        Ok(rows)
    }

    /// Resolves exactly one version row: the exact version when given, the
    /// most recently released otherwise. Never falls back to `HEAD`.
    pub async fn resolve_one(
        &self,
        kind: RepositoryKind,
        resource_type: ResourceType,
        query: &RepositoryQuery,
        version: Option<&str>,
        access: &AccessScope,
    ) -> Result<RepositoryVersion, OperationError> {
        let mut rows = self
            .resolve_versions(kind, resource_type, query, version, access)
            .await?;
        Ok(rows.swap_remove(0))
    }

    /// Resolves a caller-supplied `system` value, which is either a canonical
    /// URL or a repository accession URI. A version carried inside the URI is
    /// used only when no explicit version argument was given. An `owner`
    /// narrows URL resolution to that owner's repositories; accession URIs
    /// already carry their owner.
    pub async fn resolve_system(
        &self,
        kind: RepositoryKind,
        resource_type: ResourceType,
        owner: Option<&Owner>,
        system: &str,
        version: Option<&str>,
        access: &AccessScope,
    ) -> Result<RepositoryVersion, OperationError> {
        if let Some(owner) = owner {
            self.verify_owner(owner).await?;
        }
        if accession::is_repository_uri(system) {
            let (owner, repository_id, uri_version) = accession::parse_repository_uri(system)?;
            let query = RepositoryQuery::ById {
                owner,
                id: repository_id,
            };
            let version = version.or(uri_version.as_deref());
            return self
                .resolve_one(kind, resource_type, &query, version, access)
                .await;
        }
        let query = match owner {
            Some(owner) => RepositoryQuery::ByOwnerAndUrl {
                owner: owner.clone(),
                url: system.to_string(),
            },
            None => RepositoryQuery::ByUrl {
                url: system.to_string(),
            },
        };
        self.resolve_one(kind, resource_type, &query, version, access)
            .await
    }

    /// Rejects a supplied owner token whose organization or user is unknown.
    async fn verify_owner(&self, owner: &Owner) -> Result<(), OperationError> {
        let exists = match owner.kind {
            OwnerKind::Organization => self.store.org_exists(&owner.id).await?,
            OwnerKind::User => self.store.user_exists(&owner.id).await?,
        };
        if exists {
            Ok(())
        } else {
            Err(OperationError::invalid_request(format!(
                "Owner '{}' does not exist",
                owner.token()
            )))
        }
    }

    /// Conflict check for write-path callers: errors when an identical
    /// owner+id+version or owner+url+version row already exists.
    pub async fn ensure_absent(
        &self,
        kind: RepositoryKind,
        query: &RepositoryQuery,
        version: &str,
    ) -> Result<(), OperationError> {
        if self.store.version_exists(kind, query, version).await? {
            return Err(OperationError::conflict(format!(
                "{} version '{version}' already exists",
                query.describe()
            )));
        }
        Ok(())
    }

    /// Resolves one collection-reference expression down to its concept.
    /// A reference whose repository or concept no longer resolves yields
    /// `None` rather than failing the whole membership build.
    pub async fn resolve_reference(
        &self,
        expression: &str,
        access: &AccessScope,
    ) -> Result<Option<ResolvedReference>, OperationError> {
        let reference: ReferenceExpression = match accession::parse_reference(expression) {
            Ok(parsed) => parsed,
            Err(_) => {
                tracing::warn!(expression = %expression, "Skipping unparsable collection reference");
                return Ok(None);
            }
        };

        let query = RepositoryQuery::ById {
            owner: reference.owner,
            id: reference.repository_id,
        };
        let selector = VersionSelector::Exact(reference.repository_version.clone());
        let Some(repository) = self
            .store
            .repository_versions(RepositoryKind::Source, &query, &selector, access)
            .await?
            .into_iter()
            .next()
        else {
            return Ok(None);
        };

        let Some(concept) = self
            .store
            .find_concept(repository.id, &reference.concept_code)
            .await?
        else {
            return Ok(None);
        };

        let version = Some(repository.version.clone()).filter(|v| v != HEAD);
        Ok(Some(ResolvedReference {
            system: repository
                .canonical_url
                .clone()
                .unwrap_or_else(|| repository.uri.clone()),
            version,
            concept,
            default_locale: repository.default_locale,
        }))
    }

    /// Resolves a mapping's four endpoints: the denormalized snapshot wins;
    /// missing pieces fall back to the live concept/repository row. Returns
    /// `None` when system, code, or equivalence is still empty afterwards.
    pub async fn resolve_mapping(
        &self,
        mapping: &Mapping,
    ) -> Result<Option<ResolvedMapping>, OperationError> {
        let equivalence = mapping.map_type.trim();
        if equivalence.is_empty() {
            return Ok(None);
        }

        let from = self
            .resolve_endpoint(
                mapping.from_source_url.as_deref(),
                mapping.from_source_version.as_deref(),
                mapping.from_concept_code.as_deref(),
                mapping.from_concept_name.as_deref(),
                mapping.from_source_id,
                mapping.from_concept_id,
            )
            .await?;
        let to = self
            .resolve_endpoint(
                mapping.to_source_url.as_deref(),
                mapping.to_source_version.as_deref(),
                mapping.to_concept_code.as_deref(),
                mapping.to_concept_name.as_deref(),
                mapping.to_source_id,
                mapping.to_concept_id,
            )
            .await?;

        let (Some(from), Some(to)) = (from, to) else {
            return Ok(None);
        };
        Ok(Some(ResolvedMapping {
            equivalence: equivalence.to_string(),
            from_system: from.system,
            from_version: from.version,
            from_code: from.code,
            from_display: from.display,
            to_system: to.system,
            to_version: to.version,
            to_code: to.code,
            to_display: to.display,
        }))
    }

    async fn resolve_endpoint(
        &self,
        snapshot_url: Option<&str>,
        snapshot_version: Option<&str>,
        snapshot_code: Option<&str>,
        snapshot_name: Option<&str>,
        source_id: Option<u64>,
        concept_id: Option<u64>,
    ) -> Result<Option<Endpoint>, OperationError> {
        let mut system = snapshot_url.unwrap_or("").to_string();
        let mut version = snapshot_version.unwrap_or("").to_string();
        if system.is_empty()
            && let Some(id) = source_id
            && let Some(repository) = self.store.repository_by_id(id).await?
        {
            system = repository.canonical_url.clone().unwrap_or_default();
            if version.is_empty() {
                version = repository.version.clone();
            }
        }

        let mut code = snapshot_code.unwrap_or("").to_string();
        let mut display = snapshot_name.map(String::from).filter(|n| !n.is_empty());
        if code.is_empty()
            && let Some(id) = concept_id
            && let Some(concept) = self.store.concept_by_id(id).await?
        {
            code = concept.code();
            if display.is_none() && !concept.name.is_empty() {
                display = Some(concept.name.clone());
            }
        }

        if system.is_empty() || code.is_empty() {
            return Ok(None);
        }
        Ok(Some(Endpoint {
            system,
            version,
            code,
            display,
        }))
    }
}

struct Endpoint {
    system: String,
    version: String,
    code: String,
    display: Option<String>,
}
