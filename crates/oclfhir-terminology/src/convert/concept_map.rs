//! Repository version to ConceptMap conversion and the mapping grouper.

use std::collections::BTreeMap;

use serde_json::{Value, json};

use oclfhir_core::constants::{EQUIVALENCE_EXTENSION_URL, is_known_equivalence};
use oclfhir_core::RepositoryVersion;

use crate::extras::ExtrasOverlay;
use crate::resolve::ResolvedMapping;

use super::{
    apply_side_channels, concept_map_status, ensure_accession_identifier, format_date,
};

/// One output group: all mappings sharing a (source, source-version, target,
/// target-version) tuple, nested per source code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingGroup {
    pub source: String,
    pub source_version: String,
    pub target: String,
    pub target_version: String,
    pub elements: Vec<SourceElement>,
}

/// One source code with its translations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceElement {
    pub code: String,
    pub display: Option<String>,
    pub targets: Vec<TargetElement>,
}

/// One translation target under a source code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetElement {
    pub code: String,
    pub display: Option<String>,
    pub equivalence: String,
}

/// Groups resolved mappings by the concatenated endpoint key. Two mappings
/// land in one group only when all four resolved values are textually
/// identical, including empty versions. Groups come out ordered by that key
/// and source elements lexicographic by code, so the result is independent
/// of input row order.
pub fn group_mappings(mappings: &[ResolvedMapping]) -> Vec<MappingGroup> {
    let mut grouped: BTreeMap<String, Vec<&ResolvedMapping>> = BTreeMap::new();
    for mapping in mappings {
        let key = format!(
            "{}{}{}{}",
            mapping.from_system, mapping.from_version, mapping.to_system, mapping.to_version
        );
        grouped.entry(key).or_default().push(mapping);
    }

    grouped
        .into_values()
        .map(|members| {
            // endpoint fields are invariant within a group by construction
            let first = members[0];
            let mut by_code: BTreeMap<&str, Vec<&ResolvedMapping>> = BTreeMap::new();
            for &member in &members {
                by_code.entry(member.from_code.as_str()).or_default().push(member);
            }
            let elements = by_code
                .into_iter()
                .map(|(code, members)| SourceElement {
                    code: code.to_string(),
                    display: members
                        .iter()
                        .find_map(|m| m.from_display.clone().filter(|d| !d.is_empty())),
                    targets: members
                        .iter()
                        .map(|m| TargetElement {
                            code: m.to_code.clone(),
                            display: m.to_display.clone().filter(|d| !d.is_empty()),
                            equivalence: m.equivalence.clone(),
                        })
                        .collect(),
                })
                .collect();
            MappingGroup {
                source: first.from_system.clone(),
                source_version: first.from_version.clone(),
                target: first.to_system.clone(),
                target_version: first.to_version.clone(),
                elements,
            }
        })
        .collect()
}

/// Converts a repository version into a ConceptMap resource. Groups are
/// attached only when explicitly requested, which keeps list responses from
/// paying the mapping-resolution cost.
pub fn to_concept_map(repository: &RepositoryVersion, groups: Option<&[MappingGroup]>) -> Value {
    let mut resource = json!({
        "resourceType": "ConceptMap",
        "id": repository.mnemonic,
        "version": repository.version,
        "name": repository.name,
        "status": concept_map_status(repository),
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

    apply_side_channels(&mut resource, repository);
    ExtrasOverlay::parse(repository.extras.as_deref()).apply_concept_map(&mut resource);
    // concept maps live under the sources namespace internally; the
    // accession identifier advertises the protocol resource type instead
    let identifier_uri = repository.uri.replacen("/sources/", "/ConceptMap/", 1);
    ensure_accession_identifier(&mut resource, &identifier_uri);

    if let Some(groups) = groups {
        let groups: Vec<Value> = groups.iter().map(group_json).collect();
        if !groups.is_empty() {
            resource["group"] = Value::Array(groups);
        }
    }
    resource
}

fn group_json(group: &MappingGroup) -> Value {
    let mut value = json!({
        "source": group.source,
        "target": group.target,
    });
    if !group.source_version.is_empty() {
        value["sourceVersion"] = json!(group.source_version);
    }
    if !group.target_version.is_empty() {
        value["targetVersion"] = json!(group.target_version);
    }
    let elements: Vec<Value> = group
        .elements
        .iter()
        .map(|element| {
            let mut source = json!({ "code": element.code });
            if let Some(display) = element.display.as_deref() {
                source["display"] = json!(display);
            }
            let targets: Vec<Value> = element.targets.iter().map(target_json).collect();
            source["target"] = Value::Array(targets);
            source
        })
        .collect();
    value["element"] = Value::Array(elements);
    value
}

fn target_json(target: &TargetElement) -> Value {
    let mut value = json!({ "code": target.code });
    if let Some(display) = target.display.as_deref() {
        value["display"] = json!(display);
    }
    if is_known_equivalence(&target.equivalence) {
        value["equivalence"] = json!(target.equivalence);
    } else {
        value["extension"] = json!([{
            "url": EQUIVALENCE_EXTENSION_URL,
            "valueString": target.equivalence
        }]);
    }
    value
}
