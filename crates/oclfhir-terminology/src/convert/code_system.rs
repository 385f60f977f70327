//! Repository version to CodeSystem conversion.

use serde_json::{Value, json};

use oclfhir_core::constants::{
    CONCEPT_CLASS, DATATYPE, DEFINITION, DESC_CC, DESC_DT, DESC_HL7_CONCEPT_PROP, INACTIVE,
    SYSTEM_CC, SYSTEM_DT, SYSTEM_HL7_CONCEPT_PROP,
};
use oclfhir_core::display::display_for_language;
use oclfhir_core::{Concept, LocalizedText, RepositoryVersion};

use crate::extras::ExtrasOverlay;

use super::{
    apply_side_channels, code_system_status, designation_json, ensure_accession_identifier,
    format_date,
};

/// Converts a repository version into a CodeSystem resource. Concepts are
/// attached only when the caller fetched them; plain resolution reads leave
/// them out to keep list responses cheap.
pub fn to_code_system(repository: &RepositoryVersion, concepts: Option<&[Concept]>) -> Value {
    let mut resource = json!({
        "resourceType": "CodeSystem",
        "id": repository.mnemonic,
        "version": repository.version,
        "name": repository.name,
        "status": code_system_status(repository),
        "language": repository.default_locale,
        "publisher": repository.owner.token(),
        "count": repository.active_concepts,
        "property": property_declarations(),
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

    apply_side_channels(&mut resource, repository);
    ExtrasOverlay::parse(repository.extras.as_deref()).apply_code_system(&mut resource);
    ensure_accession_identifier(&mut resource, &repository.uri);

    if let Some(concepts) = concepts {
        let definitions: Vec<Value> = concepts
            .iter()
            .map(|concept| concept_definition(concept, &repository.default_locale))
            .collect();
        if !definitions.is_empty() {
            resource["concept"] = Value::Array(definitions);
        }
    }
    resource
}

/// The three repository-level property declarations every CodeSystem
/// carries: concept class, datatype, and the HL7 inactive flag.
fn property_declarations() -> Value {
    json!([
        {
            "code": CONCEPT_CLASS,
            "uri": SYSTEM_CC,
            "description": DESC_CC,
            "type": "string"
        },
        {
            "code": DATATYPE,
            "uri": SYSTEM_DT,
            "description": DESC_DT,
            "type": "string"
        },
        {
            "code": INACTIVE,
            "uri": SYSTEM_HL7_CONCEPT_PROP,
            "description": DESC_HL7_CONCEPT_PROP,
            "type": "coding"
        }
    ])
}

fn concept_definition(concept: &Concept, default_locale: &str) -> Value {
    let mut definition = json!({ "code": concept.code() });

    let display = if concept.name.is_empty() {
        display_for_language(&concept.names, default_locale).unwrap_or_default()
    } else {
        concept.name.clone()
    };
    definition["display"] = json!(display);

    if let Some(text) = concept_definition_text(concept, default_locale) {
        definition["definition"] = json!(text);
    }

    let designations: Vec<Value> = concept
        .names
        .iter()
        .filter(|t| !t.name.is_empty())
        .map(designation_json)
        .collect();
    if !designations.is_empty() {
        definition["designation"] = Value::Array(designations);
    }

    let mut properties = vec![
        json!({ "code": CONCEPT_CLASS, "valueString": concept.concept_class }),
        json!({ "code": DATATYPE, "valueString": concept.datatype }),
    ];
    if concept.retired {
        properties.push(json!({ "code": INACTIVE, "valueBoolean": true }));
    }
    definition["property"] = Value::Array(properties);
    definition
}

/// The definition text: the locale-resolved description flagged as a
/// definition, falling back to the plain description column.
fn concept_definition_text(concept: &Concept, default_locale: &str) -> Option<String> {
    let definitions: Vec<LocalizedText> = concept
        .descriptions
        .iter()
        .filter(|d| {
            d.text_type
                .as_deref()
                .is_some_and(|t| t.eq_ignore_ascii_case(DEFINITION))
        })
        .cloned()
        .collect();
    display_for_language(&definitions, default_locale)
        .or_else(|| concept.description.clone())
        .filter(|text| !text.trim().is_empty())
}
