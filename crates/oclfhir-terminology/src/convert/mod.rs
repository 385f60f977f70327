//! Repository record to FHIR resource conversion.
//!
//! One converter per resource kind, each pure over the materialized record
//! plus whatever dependent rows the caller already fetched. Shared pieces
//! live here: status computation, the accession identifier, the JSON
//! side-channel fields, and designation emission.

pub mod code_system;
pub mod concept_map;
pub mod value_set;

pub use code_system::to_code_system;
pub use concept_map::{MappingGroup, SourceElement, TargetElement, group_mappings, to_concept_map};
pub use value_set::to_value_set;

use serde_json::{Value, json};
use time::format_description::well_known::Rfc3339;

use oclfhir_core::constants::{ACSN, ACSN_SYSTEM};
use oclfhir_core::{LocalizedText, RepositoryVersion};

/// System of the accession identifier value.
pub(crate) const OCL_IDENTIFIER_SYSTEM: &str = "http://fhir.openconceptlab.org";

/// Publication status for code-system-like and value-set-like resources:
/// active when the version is active or released.
pub(crate) fn code_system_status(repository: &RepositoryVersion) -> &'static str {
    if repository.is_active || repository.released {
        "active"
    } else if repository.retired {
        "retired"
    } else {
        "unknown"
    }
}

/// Publication status for concept-map-like resources. The rule differs from
/// the code-system one: active unless retired and not released.
pub(crate) fn concept_map_status(repository: &RepositoryVersion) -> &'static str {
    if !repository.retired || repository.released {
        "active"
    } else if repository.retired {
        "retired"
    } else {
        "unknown"
    }
}

/// Builds the accession identifier from a repository's internal URI.
pub(crate) fn accession_identifier(uri: &str) -> Value {
    json!({
        "type": {
            "coding": [{
                "system": ACSN_SYSTEM,
                "code": ACSN,
                "display": "Accession ID"
            }],
            "text": "Accession ID"
        },
        "system": OCL_IDENTIFIER_SYSTEM,
        "value": uri
    })
}

/// Whether the resource already carries an ACSN-typed identifier, e.g. from
/// the stored identifier side-channel.
pub(crate) fn has_accession_identifier(resource: &Value) -> bool {
    resource
        .get("identifier")
        .and_then(Value::as_array)
        .is_some_and(|identifiers| {
            identifiers.iter().any(|identifier| {
                identifier
                    .get("type")
                    .and_then(|t| t.get("coding"))
                    .and_then(Value::as_array)
                    .is_some_and(|codings| {
                        codings.iter().any(|c| {
                            c.get("system").and_then(Value::as_str) == Some(ACSN_SYSTEM)
                                && c.get("code").and_then(Value::as_str) == Some(ACSN)
                        })
                    })
            })
        })
}

/// Adds the accession identifier unless an ACSN-typed one is already present.
pub(crate) fn ensure_accession_identifier(resource: &mut Value, uri: &str) {
    if has_accession_identifier(resource) {
        return;
    }
    let identifier = accession_identifier(uri);
    match resource.get_mut("identifier").and_then(Value::as_array_mut) {
        Some(identifiers) => identifiers.push(identifier),
        None => resource["identifier"] = json!([identifier]),
    }
}

/// Copies the stored JSON side-channels (identifier, contact, jurisdiction)
/// onto the resource. Each channel holds either a bare array or an encoded
/// resource wrapping the field; malformed channels are skipped.
pub(crate) fn apply_side_channels(resource: &mut Value, repository: &RepositoryVersion) {
    for (field, raw) in [
        ("identifier", repository.identifier.as_deref()),
        ("contact", repository.contact.as_deref()),
        ("jurisdiction", repository.jurisdiction.as_deref()),
    ] {
        if let Some(values) = raw.and_then(|raw| parse_channel(raw, field)) {
            resource[field] = values;
        }
    }
}

fn parse_channel(raw: &str, field: &str) -> Option<Value> {
    let parsed: Value = match serde_json::from_str(raw) {
        Ok(parsed) => parsed,
        Err(error) => {
            tracing::warn!(field, %error, "Ignoring malformed side-channel blob");
            return None;
        }
    };
    match parsed {
        Value::Array(_) => Some(parsed),
        Value::Object(mut fields) => fields.remove(field).filter(Value::is_array),
        _ => None,
    }
}

/// A locale-tagged text as a FHIR designation element.
pub(crate) fn designation_json(text: &LocalizedText) -> Value {
    let mut designation = json!({ "value": text.name });
    if let Some(locale) = text.locale.as_deref().filter(|l| !l.is_empty()) {
        designation["language"] = json!(locale);
    }
    if let Some(text_type) = text.text_type.as_deref().filter(|t| !t.is_empty()) {
        designation["use"] = json!({ "code": text_type });
    }
    designation
}

/// Formats a revision date as an RFC 3339 string for the `date` element.
pub(crate) fn format_date(repository: &RepositoryVersion) -> Option<String> {
    repository
        .revision_date
        .and_then(|date| date.format(&Rfc3339).ok())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use oclfhir_core::{Owner, RepositoryKind};
    use time::OffsetDateTime;

    pub(crate) fn repository(kind: RepositoryKind) -> RepositoryVersion {
        RepositoryVersion {
            id: 1,
            kind,
            owner: Owner::org("OCL"),
            mnemonic: "diagnosis-cs".into(),
            version: "v1.0".into(),
            name: "diagnosis-cs".into(),
            full_name: Some("Diagnosis Codes".into()),
            description: Some("Diagnoses used in clinical records".into()),
            canonical_url: Some("https://ocl.org/CodeSystem/diagnosis-cs".into()),
            external_id: Some("https://fhir.ocl.org/CodeSystem/diagnosis-cs".into()),
            uri: "/orgs/OCL/sources/diagnosis-cs/v1.0/".into(),
            default_locale: "en".into(),
            is_active: true,
            released: true,
            retired: false,
            is_latest_version: true,
            public_access: "View".into(),
            revision_date: None,
            created_at: OffsetDateTime::from_unix_timestamp(1_600_000_000).unwrap(),
            active_concepts: 2,
            extras: None,
            identifier: None,
            contact: None,
            jurisdiction: None,
        }
    }

    #[test]
    fn test_status_rules_differ_per_kind() {
        let mut repo = repository(RepositoryKind::Source);
        repo.is_active = false;
        repo.released = false;
        repo.retired = true;
        assert_eq!(code_system_status(&repo), "retired");
        assert_eq!(concept_map_status(&repo), "retired");

        repo.retired = false;
        assert_eq!(code_system_status(&repo), "unknown");
        // not retired counts as active for concept maps
        assert_eq!(concept_map_status(&repo), "active");
    }

    #[test]
    fn test_accession_identifier_added_once() {
        let mut resource = json!({});
        ensure_accession_identifier(&mut resource, "/orgs/OCL/sources/diagnosis-cs/v1.0/");
        assert!(has_accession_identifier(&resource));
        ensure_accession_identifier(&mut resource, "/orgs/OCL/sources/diagnosis-cs/v1.0/");
        assert_eq!(resource["identifier"].as_array().unwrap().len(), 1);
        assert_eq!(
            resource["identifier"][0]["value"],
            "/orgs/OCL/sources/diagnosis-cs/v1.0/"
        );
    }

    #[test]
    fn test_side_channels_wrapped_and_bare() {
        let mut repo = repository(RepositoryKind::Source);
        repo.identifier =
            Some(r#"{"resourceType":"CodeSystem","identifier":[{"system":"s","value":"v"}]}"#.into());
        repo.contact = Some(r#"[{"name":"OCL"}]"#.into());
        repo.jurisdiction = Some("{broken".into());
        let mut resource = json!({});
        apply_side_channels(&mut resource, &repo);
        assert_eq!(resource["identifier"][0]["system"], "s");
        assert_eq!(resource["contact"][0]["name"], "OCL");
        assert!(resource.get("jurisdiction").is_none());
    }
}
