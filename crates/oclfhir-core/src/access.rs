//! Access-scope filtering for the read path.
//!
//! The routing/auth layer computes the visibility levels a caller is entitled
//! to see and passes them in; every version-selection query applies the scope
//! at query granularity. The engine never widens a scope on its own.

use serde::{Deserialize, Serialize};

/// An ordered list of public-access levels the caller may see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessScope(Vec<String>);

impl AccessScope {
    /// The scope granted to unauthenticated callers.
    pub fn public() -> Self {
        Self(vec!["View".into(), "Edit".into()])
    }

    pub fn new(levels: Vec<String>) -> Self {
        Self(levels)
    }

    pub fn levels(&self) -> &[String] {
        &self.0
    }

    /// Whether a repository with the given public-access level is visible.
    pub fn permits(&self, public_access: &str) -> bool {
        self.0.iter().any(|level| level == public_access)
    }
}

impl Default for AccessScope {
    fn default() -> Self {
        Self::public()
    }
}
