//! Materialized value structs for the terminology repository.
//!
//! The persistence layer returns these fully loaded; nothing in the engine
//! mutates them. The original entity hierarchy is flattened into independent
//! structs since no behavior lives on the shared base.

use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::constants::{ORG_PREFIX, USER_PREFIX};
use crate::error::CoreError;

/// The kind of entity that owns repositories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnerKind {
    Organization,
    User,
}

/// An organization or user that holds repositories. Resolved once per request
/// and never mutated by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Owner {
    pub kind: OwnerKind,
    /// Organization mnemonic or username.
    pub id: String,
}

impl Owner {
    pub fn org(id: impl Into<String>) -> Self {
        Self {
            kind: OwnerKind::Organization,
            id: id.into(),
        }
    }

    pub fn user(id: impl Into<String>) -> Self {
        Self {
            kind: OwnerKind::User,
            id: id.into(),
        }
    }

    /// Parses an owner token of the form `org:<mnemonic>` or `user:<username>`.
    pub fn parse(token: &str) -> Result<Self, CoreError> {
        if let Some(id) = token.strip_prefix(ORG_PREFIX) {
            if !id.is_empty() {
                return Ok(Self::org(id));
            }
        } else if let Some(id) = token.strip_prefix(USER_PREFIX) {
            if !id.is_empty() {
                return Ok(Self::user(id));
            }
        }
        Err(CoreError::invalid_owner(token))
    }

    /// Renders the owner back into its token form. Also used as the computed
    /// `publisher` of converted resources.
    pub fn token(&self) -> String {
        match self.kind {
            OwnerKind::Organization => format!("{ORG_PREFIX}{}", self.id),
            OwnerKind::User => format!("{USER_PREFIX}{}", self.id),
        }
    }
}

/// Whether a repository version holds concepts (code-system-like / concept-
/// map-like "Source") or concept references (value-set-like "Collection").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryKind {
    Source,
    Collection,
}

/// One version row of a named repository. For a given (owner, mnemonic) there
/// may be many version rows; at most one is flagged latest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryVersion {
    /// Internal row id, unique across versions.
    pub id: u64,
    pub kind: RepositoryKind,
    pub owner: Owner,
    pub mnemonic: String,
    pub version: String,
    pub name: String,
    pub full_name: Option<String>,
    pub description: Option<String>,
    /// Canonical URL used for URL-based resolution.
    pub canonical_url: Option<String>,
    /// External id emitted as the converted resource's `url`.
    pub external_id: Option<String>,
    /// Internal accession URI, e.g. `/orgs/OCL/sources/diagnosis-cs/v1.0/`.
    pub uri: String,
    pub default_locale: String,
    pub is_active: bool,
    pub released: bool,
    pub retired: bool,
    pub is_latest_version: bool,
    /// Visibility level matched against the caller's access scope.
    pub public_access: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub revision_date: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Count of active concepts, denormalized by the store.
    pub active_concepts: u64,
    /// Raw JSON side-channels; parsed lazily by the extras overlay and the
    /// base converters.
    pub extras: Option<String>,
    pub identifier: Option<String>,
    pub contact: Option<String>,
    pub jurisdiction: Option<String>,
}

impl RepositoryVersion {
    /// The URL the converted resource carries: the external id when set,
    /// falling back to the canonical URL so URL-resolved repositories stay
    /// self-describing.
    pub fn resource_url(&self) -> Option<&str> {
        self.external_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(self.canonical_url.as_deref().filter(|s| !s.is_empty()))
    }
}

/// A locale-tagged display text. One per (concept, locale) is flagged
/// preferred; `text_type` is rendered as the FHIR designation `use`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedText {
    pub name: String,
    pub locale: Option<String>,
    pub text_type: Option<String>,
    pub locale_preferred: bool,
}

impl LocalizedText {
    pub fn new(name: impl Into<String>, locale: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            locale: Some(locale.into()),
            text_type: None,
            locale_preferred: false,
        }
    }

    pub fn preferred(mut self) -> Self {
        self.locale_preferred = true;
        self
    }

    pub fn with_type(mut self, text_type: impl Into<String>) -> Self {
        self.text_type = Some(text_type.into());
        self
    }
}

/// A concept belonging to a repository version through the membership join.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Concept {
    /// Internal row id, target of live mapping references.
    pub id: u64,
    /// Stored mnemonic; may be percent-encoded, see [`Concept::code`].
    pub mnemonic: String,
    pub name: String,
    pub concept_class: String,
    pub datatype: String,
    pub is_active: bool,
    pub retired: bool,
    pub description: Option<String>,
    /// Locale-tagged display names.
    pub names: Vec<LocalizedText>,
    /// Locale-tagged descriptions/definitions.
    pub descriptions: Vec<LocalizedText>,
}

impl Concept {
    /// The concept code: the stored mnemonic, percent-decoded on read.
    pub fn code(&self) -> String {
        percent_decode_str(&self.mnemonic)
            .decode_utf8()
            .map(|c| c.into_owned())
            .unwrap_or_else(|_| self.mnemonic.clone())
    }
}

/// A directed edge between two concepts. Each endpoint is identified either
/// by a denormalized snapshot (url/version/code/display) or by a live row
/// reference; the snapshot takes precedence when present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Mapping {
    /// Equivalence code; matched against the fixed vocabulary on output.
    pub map_type: String,
    pub from_source_url: Option<String>,
    pub from_source_version: Option<String>,
    pub from_concept_code: Option<String>,
    pub from_concept_name: Option<String>,
    pub from_source_id: Option<u64>,
    pub from_concept_id: Option<u64>,
    pub to_source_url: Option<String>,
    pub to_source_version: Option<String>,
    pub to_concept_code: Option<String>,
    pub to_concept_name: Option<String>,
    pub to_source_id: Option<u64>,
    pub to_concept_id: Option<u64>,
}

/// A path-like expression stored against a value-set-like repository,
/// e.g. `/orgs/OCL/sources/diagnosis-cs/v1.0/concepts/AD/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionReference {
    pub expression: String,
}

impl CollectionReference {
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
        }
    }
}
