//! `ConceptMap/$translate`.

use serde::Deserialize;
use serde_json::{Value, json};

use oclfhir_core::{AccessScope, RepositoryKind};
use oclfhir_storage::ResourceType;

use super::{TerminologyEngine, coded_value, parameters, parse_owner};
use crate::accession;
use crate::error::OperationError;

const MATCHES_FOUND: &str = "Matches found!";

/// Parameters of `$translate`. `url` names the ConceptMap; `system`/`code`
/// identify the source concept and may arrive inside `coding`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TranslateParams {
    pub url: Option<String>,
    pub concept_map_version: Option<String>,
    pub system: Option<String>,
    /// Source system version.
    pub version: Option<String>,
    pub code: Option<String>,
    pub coding: Option<Value>,
    pub target_system: Option<String>,
    /// `org:<id>` or `user:<id>`; narrows `url` resolution.
    pub owner: Option<String>,
}

impl TerminologyEngine {
    /// Translates a source code through the resolved ConceptMap version.
    /// Emits one `match` entry per matching target; an empty match list is a
    /// `result = false` body, not an error.
    pub async fn translate(
        &self,
        params: &TranslateParams,
        access: &AccessScope,
    ) -> Result<Value, OperationError> {
        let url = params
            .url
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| OperationError::invalid_request("Parameter 'url' is required"))?;
        let coded = coded_value(
            params.code.as_deref(),
            params.system.as_deref(),
            params.coding.as_ref(),
        );
        let code = coded
            .code
            .ok_or_else(|| OperationError::invalid_request("Parameter 'code' is required"))?;
        let system = coded
            .system
            .ok_or_else(|| OperationError::invalid_request("Parameter 'system' is required"))?;
        let version = coded.version.or_else(|| params.version.clone());
        let owner = parse_owner(params.owner.as_deref())?;

        let concept_map = self
            .resolver()
            .resolve_system(
                RepositoryKind::Source,
                ResourceType::ConceptMap,
                owner.as_ref(),
                url,
                params.concept_map_version.as_deref(),
                access,
            )
            .await?;

        // mapping groups carry canonical URLs; a repository accession URI
        // supplied as the source system resolves to its canonical first
        let source_system = if accession::is_repository_uri(&system) {
            let source = self
                .resolver()
                .resolve_system(
                    RepositoryKind::Source,
                    ResourceType::CodeSystem,
                    None,
                    &system,
                    version.as_deref(),
                    access,
                )
                .await?;
            source.canonical_url.clone().unwrap_or(source.uri)
        } else {
            system
        };

        let groups = self.resolved_groups(concept_map.id).await?;
        let mut matches = Vec::new();
        for group in &groups {
            if group.source != source_system {
                continue;
            }
            if version.as_deref().is_some_and(|v| group.source_version != v) {
                continue;
            }
            if params
                .target_system
                .as_deref()
                .is_some_and(|t| group.target != t)
            {
                continue;
            }
            for element in group.elements.iter().filter(|e| e.code == code) {
                for target in &element.targets {
                    let mut concept = json!({
                        "system": group.target,
                        "code": target.code,
                    });
                    if !group.target_version.is_empty() {
                        concept["version"] = json!(group.target_version);
                    }
                    if let Some(display) = target.display.as_deref() {
                        concept["display"] = json!(display);
                    }
                    matches.push(json!({
                        "name": "match",
                        "part": [
                            {"name": "equivalence", "valueString": target.equivalence},
                            {"name": "concept", "valueCoding": concept},
                        ]
                    }));
                }
            }
        }

        let mut parameter = vec![json!({"name": "result", "valueBoolean": !matches.is_empty()})];
        if !matches.is_empty() {
            parameter.push(json!({"name": "message", "valueString": MATCHES_FOUND}));
        }
        parameter.extend(matches);
        Ok(parameters(parameter))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use oclfhir_core::{AccessScope, Mapping, Owner, RepositoryKind};
    use oclfhir_db_memory::InMemoryStore;

    use super::super::testing;
    use super::*;

    fn mapping(to_code: &str, equivalence: &str) -> Mapping {
        Mapping {
            map_type: equivalence.into(),
            from_source_url: Some("https://ocl.org/CodeSystem/diagnosis-cs".into()),
            from_source_version: Some("v1.0".into()),
            from_concept_code: Some("AD".into()),
            from_concept_name: Some("Allergic Disorder".into()),
            to_source_url: Some("http://snomed.info/sct".into()),
            to_source_version: Some("2023".into()),
            to_concept_code: Some(to_code.into()),
            to_concept_name: Some(format!("SNOMED {to_code}")),
            ..Default::default()
        }
    }

    fn seeded() -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        store.add_org("OCL");
        let map_id = store.insert_repository({
            let mut map = testing::repository(RepositoryKind::Source);
            map.mnemonic = "diagnosis-map".into();
            map.canonical_url = Some("https://ocl.org/ConceptMap/diagnosis-map".into());
            map.external_id = None;
            map.uri = "/orgs/OCL/sources/diagnosis-map/v1.0/".into();
            map
        });
        store.insert_mapping(map_id, mapping("403966000", "SAME-AS"));
        store.insert_mapping(map_id, mapping("609328004", "NARROWER-THAN"));
        store
    }

    fn base_params() -> TranslateParams {
        TranslateParams {
            url: Some("https://ocl.org/ConceptMap/diagnosis-map".into()),
            system: Some("https://ocl.org/CodeSystem/diagnosis-cs".into()),
            code: Some("AD".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_translate_emits_match_per_target() {
        let store = seeded();
        let engine = testing::engine(&store);
        let body = engine
            .translate(&base_params(), &AccessScope::public())
            .await
            .unwrap();

        let parameter = body["parameter"].as_array().unwrap();
        assert_eq!(parameter[0]["valueBoolean"], true);
        assert_eq!(parameter[1]["valueString"], "Matches found!");
        let matches: Vec<_> = parameter.iter().filter(|p| p["name"] == "match").collect();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0]["part"][0]["valueString"], "SAME-AS");
        assert_eq!(matches[1]["part"][0]["valueString"], "NARROWER-THAN");
        assert_eq!(
            matches[0]["part"][1]["valueCoding"]["system"],
            "http://snomed.info/sct"
        );
        assert_eq!(matches[0]["part"][1]["valueCoding"]["version"], "2023");
        assert_eq!(matches[0]["part"][1]["valueCoding"]["code"], "403966000");
    }

    #[tokio::test]
    async fn test_translate_no_match_is_false_result() {
        let store = seeded();
        let engine = testing::engine(&store);
        let mut params = base_params();
        params.code = Some("TB".into());
        let body = engine
            .translate(&params, &AccessScope::public())
            .await
            .unwrap();
        let parameter = body["parameter"].as_array().unwrap();
        assert_eq!(parameter[0]["valueBoolean"], false);
        assert_eq!(parameter.len(), 1);
    }

    #[tokio::test]
    async fn test_translate_target_system_filter() {
        let store = seeded();
        let engine = testing::engine(&store);
        let mut params = base_params();
        params.target_system = Some("http://loinc.org".into());
        let body = engine
            .translate(&params, &AccessScope::public())
            .await
            .unwrap();
        assert_eq!(body["parameter"][0]["valueBoolean"], false);
    }

    #[tokio::test]
    async fn test_translate_owner_scopes_shared_canonical_url() {
        let store = Arc::new(InMemoryStore::new());
        for (org, to_code) in [("ALPHA", "111"), ("BETA", "222")] {
            store.add_org(org);
            let map_id = store.insert_repository({
                let mut map = testing::repository(RepositoryKind::Source);
                map.owner = Owner::org(org);
                map.mnemonic = "diagnosis-map".into();
                map.canonical_url = Some("https://ocl.org/ConceptMap/shared-map".into());
                map.external_id = None;
                map.uri = format!("/orgs/{org}/sources/diagnosis-map/v1.0/");
                map
            });
            store.insert_mapping(map_id, mapping(to_code, "SAME-AS"));
        }
        let engine = testing::engine(&store);
        let mut params = base_params();
        params.url = Some("https://ocl.org/ConceptMap/shared-map".into());
        params.owner = Some("org:BETA".into());
        let body = engine
            .translate(&params, &AccessScope::public())
            .await
            .unwrap();
        let parameter = body["parameter"].as_array().unwrap();
        let matches: Vec<_> = parameter.iter().filter(|p| p["name"] == "match").collect();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0]["part"][1]["valueCoding"]["code"], "222");
    }

    #[tokio::test]
    async fn test_translate_source_version_filter() {
        let store = seeded();
        let engine = testing::engine(&store);
        let mut params = base_params();
        params.version = Some("v2.0".into());
        let body = engine
            .translate(&params, &AccessScope::public())
            .await
            .unwrap();
        assert_eq!(body["parameter"][0]["valueBoolean"], false);
    }
}
