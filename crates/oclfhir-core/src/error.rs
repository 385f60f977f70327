use thiserror::Error;

/// Core error types for OCLFHIR domain parsing and conversion.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid owner token: {0}")]
    InvalidOwner(String),

    #[error("Invalid accession expression: {0}")]
    InvalidExpression(String),

    #[error("Invalid version token: {0}")]
    InvalidVersion(String),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl CoreError {
    /// Create a new InvalidOwner error
    pub fn invalid_owner(token: impl Into<String>) -> Self {
        Self::InvalidOwner(token.into())
    }

    /// Create a new InvalidExpression error
    pub fn invalid_expression(expression: impl Into<String>) -> Self {
        Self::InvalidExpression(expression.into())
    }

    /// Create a new InvalidVersion error
    pub fn invalid_version(version: impl Into<String>) -> Self {
        Self::InvalidVersion(version.into())
    }
}
