//! Accession expression parsing.
//!
//! Accession expressions are the path-like identifiers the repository uses
//! internally, e.g. `/orgs/OCL/CodeSystem/diagnosis-cs/version/v1.0/`.
//! Collection references use the same grammar with a trailing `concepts`
//! section: `/orgs/OCL/sources/diagnosis-cs/v1.0/concepts/AD/`.

use std::sync::LazyLock;

use regex::Regex;

use oclfhir_core::Owner;
use oclfhir_core::constants::{CONCEPTS, HEAD, ORGS, USERS};

use crate::error::OperationError;

/// Matches a repository accession URI used as a `system` value in place of a
/// canonical URL, with an optional version segment.
static REPOSITORY_URI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/(orgs|users)/[^/]+/(sources|collections)/[^/]+(/[^/]+)?/?$")
        .unwrap_or_else(|e| unreachable!("invalid repository uri pattern: {e}"))
});

/// A parsed accession expression in canonical form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessionExpression {
    pub owner: Owner,
    pub resource_id: String,
    pub version: String,
    /// The canonicalized expression: leading and trailing `/`, version
    /// segment always present.
    pub expression: String,
}

/// Ensures the expression carries a leading and trailing `/`.
pub fn format_expression(expression: &str) -> String {
    let mut formatted = String::with_capacity(expression.len() + 2);
    if !expression.starts_with('/') {
        formatted.push('/');
    }
    formatted.push_str(expression);
    if !expression.ends_with('/') {
        formatted.push('/');
    }
    formatted
}

/// Parses `/<orgs|users>/<ownerId>/<Type>/<resourceId>[/version/<v>|/<v>]/`.
///
/// The version segment may be written either as a bare token or as the
/// literal `version` followed by the token; both parse to the same result.
/// When no version is present the canonical token `HEAD` is assigned and
/// appended to the canonicalized expression.
pub fn parse_accession(
    expression: &str,
    expected_type: &str,
) -> Result<AccessionExpression, OperationError> {
    let formatted = format_expression(expression);
    let segments: Vec<&str> = formatted.split('/').filter(|s| !s.is_empty()).collect();

    let owner = match segments.first() {
        Some(&kind) if kind == ORGS || kind == USERS => {
            let id = segments
                .get(1)
                .filter(|id| !id.is_empty())
                .ok_or_else(|| owner_error(&formatted))?;
            if kind == ORGS {
                Owner::org(*id)
            } else {
                Owner::user(*id)
            }
        }
        _ => return Err(owner_error(&formatted)),
    };

    if segments.get(2) != Some(&expected_type) {
        return Err(OperationError::invalid_request(format!(
            "Expression '{formatted}' does not name a {expected_type} resource"
        )));
    }
    let resource_id = segments
        .get(3)
        .filter(|id| !id.is_empty())
        .map(|id| id.to_string())
        .ok_or_else(|| {
            OperationError::invalid_request(format!(
                "Resource id missing from expression '{formatted}'"
            ))
        })?;

    let version = match (segments.get(4), segments.get(5)) {
        (Some(&"version"), Some(v)) if !v.is_empty() => (*v).to_string(),
        (Some(v), _) if !v.is_empty() => (*v).to_string(),
        _ => HEAD.to_string(),
    };

    let expression = if segments.len() > 4 {
        formatted
    } else {
        format!("{formatted}{version}/")
    };

    Ok(AccessionExpression {
        owner,
        resource_id,
        version,
        expression,
    })
}

fn owner_error(expression: &str) -> OperationError {
    OperationError::invalid_request(format!(
        "Owner type and id missing from expression '{expression}'"
    ))
}

/// A parsed collection-reference expression: the referenced repository
/// version plus the concept inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceExpression {
    pub owner: Owner,
    pub repository_id: String,
    pub repository_version: String,
    pub concept_code: String,
    pub concept_version: Option<String>,
}

/// Parses `/orgs/<O>/sources/<S>[/<v>]/concepts/<C>[/<cv>]/`. The `concepts`
/// segment splits the repository part from the concept part, which is what
/// disambiguates a version token from a concept code.
pub fn parse_reference(expression: &str) -> Result<ReferenceExpression, OperationError> {
    let formatted = format_expression(expression);
    let segments: Vec<&str> = formatted.split('/').filter(|s| !s.is_empty()).collect();

    let split = segments
        .iter()
        .position(|s| *s == CONCEPTS)
        .ok_or_else(|| {
            OperationError::invalid_request(format!(
                "Reference '{formatted}' has no concepts segment"
            ))
        })?;
    let (repository_part, concept_part) = (&segments[..split], &segments[split + 1..]);

    let owner = match repository_part.first() {
        Some(&ORGS) => Owner::org(*repository_part.get(1).ok_or_else(|| owner_error(&formatted))?),
        Some(&USERS) => {
            Owner::user(*repository_part.get(1).ok_or_else(|| owner_error(&formatted))?)
        }
        _ => return Err(owner_error(&formatted)),
    };
    let repository_id = repository_part
        .get(3)
        .filter(|id| !id.is_empty())
        .map(|id| id.to_string())
        .ok_or_else(|| {
            OperationError::invalid_request(format!(
                "Repository id missing from reference '{formatted}'"
            ))
        })?;
    let repository_version = repository_part
        .get(4)
        .map_or_else(|| HEAD.to_string(), |v| (*v).to_string());

    let concept_code = concept_part
        .first()
        .filter(|code| !code.is_empty())
        .map(|code| code.to_string())
        .ok_or_else(|| {
            OperationError::invalid_request(format!(
                "Concept code missing from reference '{formatted}'"
            ))
        })?;
    let concept_version = concept_part.get(1).map(|v| (*v).to_string());

    Ok(ReferenceExpression {
        owner,
        repository_id,
        repository_version,
        concept_code,
        concept_version,
    })
}

/// Whether a `system` value is a repository accession URI rather than a
/// canonical URL.
pub fn is_repository_uri(system: &str) -> bool {
    REPOSITORY_URI.is_match(system)
}

/// Splits a repository accession URI into (owner, repository id, version).
pub fn parse_repository_uri(
    uri: &str,
) -> Result<(Owner, String, Option<String>), OperationError> {
    let formatted = format_expression(uri);
    let segments: Vec<&str> = formatted.split('/').filter(|s| !s.is_empty()).collect();
    let owner = match segments.first() {
        Some(&ORGS) => Owner::org(*segments.get(1).ok_or_else(|| owner_error(&formatted))?),
        Some(&USERS) => Owner::user(*segments.get(1).ok_or_else(|| owner_error(&formatted))?),
        _ => return Err(owner_error(&formatted)),
    };
    let repository_id = segments
        .get(3)
        .filter(|id| !id.is_empty())
        .map(|id| id.to_string())
        .ok_or_else(|| {
            OperationError::invalid_request(format!(
                "Repository id missing from uri '{formatted}'"
            ))
        })?;
    let version = segments.get(4).map(|v| (*v).to_string());
    Ok((owner, repository_id, version))
}
