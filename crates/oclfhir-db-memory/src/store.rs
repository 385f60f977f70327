//! Table layout and query execution for the in-memory store.

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use oclfhir_core::constants::HEAD;
use oclfhir_core::{
    AccessScope, CollectionReference, Concept, Mapping, Owner, RepositoryKind, RepositoryVersion,
};
use oclfhir_storage::{RepositoryQuery, StorageError, TerminologyStore, VersionSelector};

#[derive(Default)]
struct Tables {
    repositories: Vec<RepositoryVersion>,
    concepts: Vec<Concept>,
    /// Membership join: repository version row -> concept row ids. Many
    /// repository versions may share one concept row through this join.
    concept_links: HashMap<u64, Vec<u64>>,
    mappings: HashMap<u64, Vec<Mapping>>,
    references: HashMap<u64, Vec<CollectionReference>>,
    orgs: HashSet<String>,
    users: HashSet<String>,
    next_repository_id: u64,
    next_concept_id: u64,
}

/// In-memory [`TerminologyStore`] with seed helpers for tests.
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables {
                next_repository_id: 1,
                next_concept_id: 1,
                ..Tables::default()
            }),
        }
    }

    /// Registers an organization owner.
    pub fn add_org(&self, mnemonic: impl Into<String>) {
        self.tables.write().unwrap_or_else(PoisonError::into_inner).orgs.insert(mnemonic.into());
    }

    /// Registers a user owner.
    pub fn add_user(&self, username: impl Into<String>) {
        self.tables.write().unwrap_or_else(PoisonError::into_inner).users.insert(username.into());
    }

    /// Inserts a repository version row, assigning and returning its row id.
    pub fn insert_repository(&self, mut repository: RepositoryVersion) -> u64 {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        let id = tables.next_repository_id;
        tables.next_repository_id += 1;
        repository.id = id;
        tables.repositories.push(repository);
        id
    }

    /// Inserts a concept row and links it to a repository version. Returns
    /// the concept row id so further versions can share it via
    /// [`InMemoryStore::link_concept`].
    pub fn insert_concept(&self, repository_id: u64, mut concept: Concept) -> u64 {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        let id = tables.next_concept_id;
        tables.next_concept_id += 1;
        concept.id = id;
        let active = concept.is_active && !concept.retired;
        tables.concepts.push(concept);
        tables.concept_links.entry(repository_id).or_default().push(id);
        if active {
            if let Some(repo) = tables.repositories.iter_mut().find(|r| r.id == repository_id) {
                repo.active_concepts += 1;
            }
        }
        id
    }

    /// Links an existing concept row into another repository version.
    pub fn link_concept(&self, repository_id: u64, concept_id: u64) {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        let active = tables
            .concepts
            .iter()
            .find(|c| c.id == concept_id)
            .map(|c| c.is_active && !c.retired)
            .unwrap_or(false);
        tables
            .concept_links
            .entry(repository_id)
            .or_default()
            .push(concept_id);
        if active {
            if let Some(repo) = tables.repositories.iter_mut().find(|r| r.id == repository_id) {
                repo.active_concepts += 1;
            }
        }
    }

    /// Appends a mapping row to a repository version.
    pub fn insert_mapping(&self, repository_id: u64, mapping: Mapping) {
        self.tables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .mappings
            .entry(repository_id)
            .or_default()
            .push(mapping);
    }

    /// Appends a collection-reference expression to a repository version.
    pub fn insert_reference(&self, repository_id: u64, expression: impl Into<String>) {
        self.tables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .references
            .entry(repository_id)
            .or_default()
            .push(CollectionReference::new(expression));
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn owner_matches(repository: &RepositoryVersion, owner: &Owner) -> bool {
    repository.owner == *owner
}

fn query_matches(repository: &RepositoryVersion, query: &RepositoryQuery) -> bool {
    match query {
        RepositoryQuery::ById { owner, id } => {
            owner_matches(repository, owner) && repository.mnemonic == *id
        }
        RepositoryQuery::ByUrl { url } => repository.canonical_url.as_deref() == Some(url),
        RepositoryQuery::ByOwnerAndUrl { owner, url } => {
            owner_matches(repository, owner) && repository.canonical_url.as_deref() == Some(url)
        }
    }
}

#[async_trait]
impl TerminologyStore for InMemoryStore {
    async fn repository_versions(
        &self,
        kind: RepositoryKind,
        query: &RepositoryQuery,
        selector: &VersionSelector,
        access: &AccessScope,
    ) -> Result<Vec<RepositoryVersion>, StorageError> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        let candidates = tables
            .repositories
            .iter()
            .filter(|r| r.kind == kind)
            .filter(|r| query_matches(r, query))
            .filter(|r| access.permits(&r.public_access));

        let rows = match selector {
            VersionSelector::Exact(version) => candidates
                .filter(|r| r.version == *version)
                .take(1)
                .cloned()
                .collect(),
            VersionSelector::Wildcard => {
                let mut rows: Vec<RepositoryVersion> = candidates
                    .filter(|r| r.version != HEAD)
                    .cloned()
                    .collect();
                rows.sort_by(|a, b| b.version.cmp(&a.version));
                rows
            }
            VersionSelector::LatestReleased => candidates
                .filter(|r| r.released && r.version != HEAD)
                .max_by_key(|r| r.created_at)
                .cloned()
                .into_iter()
                .collect(),
        };
        Ok(rows)
    }

    async fn repository_by_id(&self, id: u64) -> Result<Option<RepositoryVersion>, StorageError> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        Ok(tables.repositories.iter().find(|r| r.id == id).cloned())
    }

    async fn version_exists(
        &self,
        kind: RepositoryKind,
        query: &RepositoryQuery,
        version: &str,
    ) -> Result<bool, StorageError> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        Ok(tables
            .repositories
            .iter()
            .filter(|r| r.kind == kind)
            .filter(|r| query_matches(r, query))
            .any(|r| r.version == version))
    }

    async fn find_concept(
        &self,
        repository_id: u64,
        code: &str,
    ) -> Result<Option<Concept>, StorageError> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        let Some(links) = tables.concept_links.get(&repository_id) else {
            return Ok(None);
        };
        // Many rows may share one logical concept; the highest row id is the
        // most recent one.
        Ok(tables
            .concepts
            .iter()
            .filter(|c| links.contains(&c.id))
            .filter(|c| c.code() == code)
            .max_by_key(|c| c.id)
            .cloned())
    }

    async fn concepts_of(&self, repository_id: u64) -> Result<Vec<Concept>, StorageError> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        let Some(links) = tables.concept_links.get(&repository_id) else {
            return Ok(Vec::new());
        };
        let mut concepts: Vec<Concept> = tables
            .concepts
            .iter()
            .filter(|c| links.contains(&c.id))
            .cloned()
            .collect();
        concepts.sort_by(|a, b| a.mnemonic.cmp(&b.mnemonic));
        Ok(concepts)
    }

    async fn concept_by_id(&self, id: u64) -> Result<Option<Concept>, StorageError> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        Ok(tables.concepts.iter().find(|c| c.id == id).cloned())
    }

    async fn mappings_of(&self, repository_id: u64) -> Result<Vec<Mapping>, StorageError> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        Ok(tables.mappings.get(&repository_id).cloned().unwrap_or_default())
    }

    async fn references_of(
        &self,
        repository_id: u64,
    ) -> Result<Vec<CollectionReference>, StorageError> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        Ok(tables
            .references
            .get(&repository_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn org_exists(&self, mnemonic: &str) -> Result<bool, StorageError> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        Ok(tables.orgs.contains(mnemonic))
    }

    async fn user_exists(&self, username: &str) -> Result<bool, StorageError> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        Ok(tables.users.contains(username))
    }
}
