//! Repository version to ValueSet conversion.
//!
//! Membership comes from the stored collection references: each expression
//! resolves to a concept in some source version, and concepts group into one
//! `compose.include` block per (system, version) pair.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde_json::{Value, json};

use oclfhir_core::display::display_for_language;
use oclfhir_core::{AccessScope, CollectionReference, RepositoryVersion};

use crate::accession;
use crate::error::OperationError;
use crate::extras::ExtrasOverlay;
use crate::resolve::Resolver;

use super::{
    apply_side_channels, code_system_status, designation_json, ensure_accession_identifier,
    format_date,
};

/// Converts a repository version into a ValueSet resource, building
/// `compose.include` from the given collection references.
pub async fn to_value_set(
    resolver: &Resolver,
    repository: &RepositoryVersion,
    references: &[CollectionReference],
    include_designations: bool,
    access: &AccessScope,
) -> Result<Value, OperationError> {
    let mut resource = base_value_set(repository);

    apply_side_channels(&mut resource, repository);
    ExtrasOverlay::parse(repository.extras.as_deref()).apply_value_set(&mut resource);
    ensure_accession_identifier(&mut resource, &repository.uri);

    let mut inactive = resource["compose"]["inactive"] == json!(true);
    let mut includes: IndexMap<(String, Option<String>), Vec<Value>> = IndexMap::new();
    for expression in ordered_expressions(references) {
        let Some(resolved) = resolver.resolve_reference(&expression, access).await? else {
            continue;
        };
        let concept = &resolved.concept;
        if concept.retired {
            inactive = true;
        }
        let mut entry = json!({
            "code": concept.code(),
            "display": display_for_language(&concept.names, &resolved.default_locale)
                .unwrap_or_default(),
        });
        if include_designations {
            let designations: Vec<Value> = concept
                .names
                .iter()
                .filter(|t| !t.name.is_empty())
                .map(designation_json)
                .collect();
            if !designations.is_empty() {
                entry["designation"] = Value::Array(designations);
            }
        }
        includes
            .entry((resolved.system, resolved.version))
            .or_default()
            .push(entry);
    }

    let include_blocks: Vec<Value> = includes
        .into_iter()
        .map(|((system, version), concepts)| {
            let mut block = json!({ "system": system, "concept": concepts });
            if let Some(version) = version {
                block["version"] = json!(version);
            }
            block
        })
        .collect();
    if !include_blocks.is_empty() {
        match resource["compose"]
            .get_mut("include")
            .and_then(Value::as_array_mut)
        {
            Some(existing) => existing.extend(include_blocks),
            None => resource["compose"]["include"] = Value::Array(include_blocks),
        }
    }
    if inactive {
        resource["compose"]["inactive"] = json!(true);
    }
    Ok(resource)
}

/// The ValueSet without membership: header fields, side-channels, extras.
pub(crate) fn base_value_set(repository: &RepositoryVersion) -> Value {
    let mut resource = json!({
        "resourceType": "ValueSet",
        "id": repository.mnemonic,
        "version": repository.version,
        "name": repository.name,
        "status": code_system_status(repository),
        "publisher": repository.owner.token(),
    });
    if let Some(url) = repository.resource_url() {
        resource["url"] = json!(url);
    }
    if let Some(title) = repository.full_name.as_deref().filter(|t| !t.is_empty()) {
        resource["title"] = json!(title);
    }
    if let Some(description) = repository.description.as_deref().filter(|d| !d.is_empty()) {
        resource["description"] = json!(description);
    }
    if let Some(date) = format_date(repository) {
        resource["date"] = json!(date);
    }
    resource
}

/// Deduplicates and orders reference expressions. The key concatenates
/// concept id/version and source id/version, so two references to the same
/// concept in the same source version collapse to one and output order is
/// stable regardless of stored order.
pub(crate) fn ordered_expressions(references: &[CollectionReference]) -> Vec<String> {
    let mut ordered: BTreeMap<String, String> = BTreeMap::new();
    for reference in references {
        let Ok(parsed) = accession::parse_reference(&reference.expression) else {
            continue;
        };
        let key = format!(
            "{}{}{}{}",
            parsed.concept_code,
            parsed.concept_version.as_deref().unwrap_or_default(),
            parsed.repository_id,
            parsed.repository_version
        );
        ordered.insert(key, reference.expression.clone());
    }
    ordered.into_values().collect()
}
