//! The four terminology operations plus resource reads.
//!
//! Each operation resolves exactly one repository version, fetches the rows
//! it needs through the store, and emits a FHIR JSON body. Parameter structs
//! carry already-parsed wire values; the engine never touches HTTP.

pub mod expand;
pub mod lookup;
pub mod translate;
pub mod validate_code;

pub use expand::ExpandParams;
pub use lookup::LookupParams;
pub use translate::TranslateParams;
pub use validate_code::ValidateCodeParams;

use serde_json::{Value, json};

use oclfhir_core::{AccessScope, Owner, RepositoryKind};
use oclfhir_storage::{DynTerminologyStore, RepositoryQuery, ResourceType, TerminologyStore};

use crate::convert::{MappingGroup, group_mappings, to_code_system, to_concept_map, to_value_set};
use crate::error::OperationError;
use crate::resolve::Resolver;

/// Operation engine over a terminology store.
#[derive(Clone)]
pub struct TerminologyEngine {
    resolver: Resolver,
}

impl TerminologyEngine {
    pub fn new(store: DynTerminologyStore) -> Self {
        Self {
            resolver: Resolver::new(store),
        }
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Reads one CodeSystem version with its concept definitions.
    pub async fn read_code_system(
        &self,
        owner: Owner,
        id: &str,
        version: Option<&str>,
        access: &AccessScope,
    ) -> Result<Value, OperationError> {
        let query = RepositoryQuery::ById {
            owner,
            id: id.to_string(),
        };
        let repository = self
            .resolver
            .resolve_one(
                RepositoryKind::Source,
                ResourceType::CodeSystem,
                &query,
                version,
                access,
            )
            .await?;
        let concepts = self.resolver.store().concepts_of(repository.id).await?;
        Ok(to_code_system(&repository, Some(&concepts)))
    }

    /// Reads one ValueSet version with its membership resolved.
    pub async fn read_value_set(
        &self,
        owner: Owner,
        id: &str,
        version: Option<&str>,
        access: &AccessScope,
    ) -> Result<Value, OperationError> {
        let query = RepositoryQuery::ById {
            owner,
            id: id.to_string(),
        };
        let repository = self
            .resolver
            .resolve_one(
                RepositoryKind::Collection,
                ResourceType::ValueSet,
                &query,
                version,
                access,
            )
            .await?;
        let references = self.resolver.store().references_of(repository.id).await?;
        to_value_set(&self.resolver, &repository, &references, false, access).await
    }

    /// Reads one ConceptMap version with its groups.
    pub async fn read_concept_map(
        &self,
        owner: Owner,
        id: &str,
        version: Option<&str>,
        access: &AccessScope,
    ) -> Result<Value, OperationError> {
        let query = RepositoryQuery::ById {
            owner,
            id: id.to_string(),
        };
        let repository = self
            .resolver
            .resolve_one(
                RepositoryKind::Source,
                ResourceType::ConceptMap,
                &query,
                version,
                access,
            )
            .await?;
        let groups = self.resolved_groups(repository.id).await?;
        Ok(to_concept_map(&repository, Some(&groups)))
    }

    /// Resolves and groups every translatable mapping of a repository
    /// version. Mappings with unresolvable endpoints drop out here.
    pub(crate) async fn resolved_groups(
        &self,
        repository_id: u64,
    ) -> Result<Vec<MappingGroup>, OperationError> {
        let mappings = self.resolver.store().mappings_of(repository_id).await?;
        let mut resolved = Vec::with_capacity(mappings.len());
        for mapping in &mappings {
            if let Some(mapping) = self.resolver.resolve_mapping(mapping).await? {
                resolved.push(mapping);
            }
        }
        Ok(group_mappings(&resolved))
    }
}

/// Parses an optional `owner` input of the form `org:<id>` or `user:<id>`.
pub(crate) fn parse_owner(owner: Option<&str>) -> Result<Option<Owner>, OperationError> {
    owner
        .filter(|o| !o.is_empty())
        .map(Owner::parse)
        .transpose()
        .map_err(OperationError::from)
}

/// Wraps operation output parameters into a Parameters resource.
pub(crate) fn parameters(parameter: Vec<Value>) -> Value {
    json!({
        "resourceType": "Parameters",
        "parameter": parameter,
    })
}

/// A code identified by explicit parameters or a `coding` value. The coding
/// replaces the explicit code and system when it carries either; its version
/// is only ever coding-sourced.
pub(crate) struct CodedValue {
    pub code: Option<String>,
    pub system: Option<String>,
    pub version: Option<String>,
}

pub(crate) fn coded_value(
    code: Option<&str>,
    system: Option<&str>,
    coding: Option<&Value>,
) -> CodedValue {
    if let Some(coding) = coding {
        let field = |name: &str| {
            coding
                .get(name)
                .and_then(Value::as_str)
                .filter(|v| !v.is_empty())
                .map(String::from)
        };
        let coded_code = field("code");
        let coded_system = field("system");
        if coded_code.is_some() || coded_system.is_some() {
            return CodedValue {
                code: coded_code,
                system: coded_system,
                version: field("version"),
            };
        }
    }
    CodedValue {
        code: code.filter(|c| !c.is_empty()).map(String::from),
        system: system.filter(|s| !s.is_empty()).map(String::from),
        version: None,
    }
}
