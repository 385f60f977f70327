//! Configuration loading for the OCLFHIR terminology service.
//!
//! Priority order (lowest to highest):
//! 1. Defaults - hardcoded sane defaults
//! 2. File config - from `oclfhir.toml`
//! 3. Environment variables - `OCLFHIR__<SECTION>__<KEY>` pattern
//!
//! The file is optional; a missing path loads pure defaults plus whatever
//! the environment overrides.

use std::path::Path;

use serde::{Deserialize, Serialize};

use oclfhir_core::AccessScope;

/// Environment variable prefix; section and key are separated by `__`.
const ENV_PREFIX: &str = "OCLFHIR__";

/// Error types for configuration operations
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl ConfigError {
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Service settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub search_index: SearchIndexSettings,
    pub access: AccessSettings,
    pub logging: LoggingSettings,
}

/// Outward-facing server identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Base URL advertised in generated resource links.
    pub base_url: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".into(),
            port: 8080,
        }
    }
}

/// Settings for the post-write search-index refresh call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchIndexSettings {
    pub enabled: bool,
    /// Endpoint notified after repository writes.
    pub refresh_url: Option<String>,
    /// Service token sent with the refresh request.
    pub service_token: Option<String>,
}

impl Default for SearchIndexSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            refresh_url: None,
            service_token: None,
        }
    }
}

/// Visibility levels granted to unauthenticated callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessSettings {
    pub default_levels: Vec<String>,
}

impl Default for AccessSettings {
    fn default() -> Self {
        Self {
            default_levels: vec!["View".into(), "Edit".into()],
        }
    }
}

impl AccessSettings {
    /// The access scope applied to requests without credentials.
    pub fn default_scope(&self) -> AccessScope {
        AccessScope::new(self.default_levels.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Filter directive for the subscriber, e.g. `info` or `oclfhir=debug`.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl Settings {
    /// Loads settings from an optional TOML file plus process environment
    /// overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut table = match path {
            Some(path) if path.exists() => {
                let raw = std::fs::read_to_string(path)?;
                toml::from_str(&raw).map_err(|e| ConfigError::parse(format!("TOML parse error: {e}")))?
            }
            Some(path) => {
                tracing::debug!(path = %path.display(), "Config file absent, using defaults");
                toml::Table::new()
            }
            None => toml::Table::new(),
        };
        apply_env_overrides(&mut table, std::env::vars());
        let settings: Settings = toml::Value::Table(table)
            .try_into()
            .map_err(|e| ConfigError::parse(format!("Invalid configuration: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parses settings from a TOML string, without environment overrides.
    pub fn from_toml(raw: &str) -> Result<Self> {
        let settings: Settings =
            toml::from_str(raw).map_err(|e| ConfigError::parse(format!("TOML parse error: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.base_url.is_empty() {
            return Err(ConfigError::validation("server.base_url must not be empty"));
        }
        if self.access.default_levels.is_empty() {
            return Err(ConfigError::validation(
                "access.default_levels must not be empty",
            ));
        }
        if self.search_index.enabled && self.search_index.refresh_url.is_none() {
            return Err(ConfigError::validation(
                "search_index.refresh_url is required when search_index.enabled",
            ));
        }
        Ok(())
    }
}

/// Applies `OCLFHIR__<SECTION>__<KEY>` variables onto the parsed table.
/// Section and key names are lowercased; values parse as TOML scalars and
/// fall back to plain strings.
fn apply_env_overrides(table: &mut toml::Table, vars: impl Iterator<Item = (String, String)>) {
    for (name, raw) in vars {
        let Some(rest) = name.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        let Some((section, key)) = rest.split_once("__") else {
            tracing::warn!(variable = %name, "Ignoring override without a section");
            continue;
        };
        let value = raw
            .parse::<toml::Value>()
            .unwrap_or(toml::Value::String(raw));
        let section_table = table
            .entry(section.to_ascii_lowercase())
            .or_insert_with(|| toml::Value::Table(toml::Table::new()));
        if let Some(section_table) = section_table.as_table_mut() {
            section_table.insert(key.to_ascii_lowercase(), value);
        }
    }
}
