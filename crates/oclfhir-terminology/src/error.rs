//! Typed errors for the terminology operations.
//!
//! The wire encoder maps these onto the protocol's standard error body; the
//! engine never renders error text beyond the messages carried here. A code
//! that exists but fails its display check is a normal `result = false`
//! outcome, not an error.

use oclfhir_storage::{ResourceType, StorageError};

/// Errors raised by resolution and the four terminology operations.
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    /// A required parameter is missing or malformed. Fatal, never retried.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Description of the invalid parameter.
        message: String,
    },

    /// Resolution produced zero candidate rows.
    #[error("{resource_type} '{id_or_url}' version '{version}' not found")]
    NotFound {
        resource_type: ResourceType,
        /// The id or canonical URL that was searched, with the owner token
        /// prefixed when the search was owner-scoped.
        id_or_url: String,
        /// The version token that was searched.
        version: String,
    },

    /// The resolved repository version does not contain the requested code.
    /// Distinct from a `false` validate-code result, which is not an error.
    #[error("The code '{code}' is invalid")]
    CodeNotFound {
        code: String,
        /// The system the code was searched in.
        system: String,
    },

    /// An identical owner+id+version or owner+url+version row already exists.
    /// Surfaced by write-path callers probing before create.
    #[error("Conflict: {message}")]
    Conflict {
        /// Description of the conflicting row.
        message: String,
    },

    /// The caller's access scope does not cover the requested resource.
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Description of the scope mismatch.
        message: String,
    },

    /// The storage backend failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// An invariant inside the engine was violated.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl OperationError {
    /// Creates a new `InvalidRequest` error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates a typed not-found reporting what was searched.
    #[must_use]
    pub fn not_found(
        resource_type: ResourceType,
        id_or_url: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self::NotFound {
            resource_type,
            id_or_url: id_or_url.into(),
            version: version.into(),
        }
    }

    /// Creates a new `CodeNotFound` error.
    #[must_use]
    pub fn code_not_found(code: impl Into<String>, system: impl Into<String>) -> Self {
        Self::CodeNotFound {
            code: code.into(),
            system: system.into(),
        }
    }

    /// Creates a new `Conflict` error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true for the invalid-request class.
    #[must_use]
    pub fn is_invalid_request(&self) -> bool {
        matches!(self, Self::InvalidRequest { .. })
    }

    /// Returns true for the not-found class.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::CodeNotFound { .. })
    }
}

impl From<oclfhir_core::CoreError> for OperationError {
    fn from(err: oclfhir_core::CoreError) -> Self {
        // Parse failures on caller-supplied tokens are caller errors.
        Self::InvalidRequest {
            message: err.to_string(),
        }
    }
}
