//! Query types for the terminology store.

use serde::{Deserialize, Serialize};

use oclfhir_core::Owner;
use oclfhir_core::constants::VERSION_ALL;

/// The protocol resource kind a resolution is performed for; carried into
/// not-found errors so callers can report what was searched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceType {
    CodeSystem,
    ValueSet,
    ConceptMap,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CodeSystem => "CodeSystem",
            Self::ValueSet => "ValueSet",
            Self::ConceptMap => "ConceptMap",
        }
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the caller identifies the repository being resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryQuery {
    /// Owner + repository mnemonic.
    ById { owner: Owner, id: String },
    /// Canonical URL, searched across owners.
    ByUrl { url: String },
    /// Canonical URL scoped to one owner.
    ByOwnerAndUrl { owner: Owner, url: String },
}

impl RepositoryQuery {
    /// Human-readable id-or-url used in not-found reporting.
    pub fn describe(&self) -> String {
        match self {
            Self::ById { owner, id } => format!("{} {}", owner.token(), id),
            Self::ByUrl { url } => url.clone(),
            Self::ByOwnerAndUrl { owner, url } => format!("{} {}", owner.token(), url),
        }
    }
}

/// The three version-selection modes.
///
/// `LatestReleased` never falls back to `HEAD`: a repository with no released
/// row resolves to nothing under this mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSelector {
    /// The exact version string.
    Exact(String),
    /// Every version row except `HEAD`, ordered by version string descending.
    Wildcard,
    /// The most recently created row flagged released.
    LatestReleased,
}

impl VersionSelector {
    /// Maps a caller-supplied version argument onto a selection mode:
    /// `*` is the wildcard, absent/empty means most-recent-released.
    pub fn from_param(version: Option<&str>) -> Self {
        match version {
            Some(v) if v == VERSION_ALL => Self::Wildcard,
            Some(v) if !v.is_empty() => Self::Exact(v.to_string()),
            _ => Self::LatestReleased,
        }
    }

    /// The version token to report in not-found errors.
    pub fn describe(&self) -> &str {
        match self {
            Self::Exact(v) => v,
            Self::Wildcard => "*",
            Self::LatestReleased => "latest released",
        }
    }
}
