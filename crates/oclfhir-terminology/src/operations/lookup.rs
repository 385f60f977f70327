//! `CodeSystem/$lookup`.

use serde::Deserialize;
use serde_json::{Value, json};

use oclfhir_core::constants::{CONCEPT_CLASS, DATATYPE};
use oclfhir_core::display::display_for_lookup;
use oclfhir_core::{AccessScope, LocalizedText, RepositoryKind};
use oclfhir_storage::{ResourceType, TerminologyStore};

use super::{TerminologyEngine, coded_value, parameters, parse_owner};
use crate::error::OperationError;

/// Parameters of `$lookup`. `coding` replaces `code`/`system`/`version` when
/// it carries a code or system; `owner` (`org:<id>` or `user:<id>`) narrows
/// system resolution when two owners publish the same canonical URL.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LookupParams {
    pub code: Option<String>,
    pub system: Option<String>,
    pub version: Option<String>,
    pub coding: Option<Value>,
    pub display_language: Option<String>,
    pub owner: Option<String>,
}

impl TerminologyEngine {
    /// Looks a code up in the resolved CodeSystem version and returns its
    /// name, version, display, designations, and the two mandatory
    /// properties. A code absent from the resolved version is not-found.
    pub async fn lookup(
        &self,
        params: &LookupParams,
        access: &AccessScope,
    ) -> Result<Value, OperationError> {
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

        let repository = self
            .resolver()
            .resolve_system(
                RepositoryKind::Source,
                ResourceType::CodeSystem,
                owner.as_ref(),
                &system,
                version.as_deref(),
                access,
            )
            .await?;
        let concept = self
            .resolver()
            .store()
            .find_concept(repository.id, &code)
            .await?
            .ok_or_else(|| OperationError::code_not_found(&code, &system))?;

        let language = params.display_language.as_deref().filter(|l| !l.is_empty());
        let mut parameter = vec![
            json!({"name": "name", "valueString": repository.name}),
            json!({"name": "version", "valueString": repository.version}),
        ];
        if let Some(display) =
            display_for_lookup(&concept.names, language, &repository.default_locale)
        {
            parameter.push(json!({"name": "display", "valueString": display}));
        }
        for text in concept.names.iter().filter(|t| !t.name.is_empty()) {
            if language.is_some_and(|l| text.locale.as_deref() != Some(l)) {
                continue;
            }
            parameter.push(designation_parameter(text));
        }
        for (property, value) in [
            (CONCEPT_CLASS, &concept.concept_class),
            (DATATYPE, &concept.datatype),
        ] {
            parameter.push(json!({
                "name": "property",
                "part": [
                    {"name": "code", "valueCode": property},
                    {"name": "value", "valueString": value},
                ]
            }));
        }
        Ok(parameters(parameter))
    }
}

fn designation_parameter(text: &LocalizedText) -> Value {
    let mut part = Vec::with_capacity(3);
    if let Some(locale) = text.locale.as_deref().filter(|l| !l.is_empty()) {
        part.push(json!({"name": "language", "valueCode": locale}));
    }
    if let Some(text_type) = text.text_type.as_deref().filter(|t| !t.is_empty()) {
        part.push(json!({"name": "use", "valueCoding": {"code": text_type}}));
    }
    part.push(json!({"name": "value", "valueString": text.name}));
    json!({"name": "designation", "part": part})
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use oclfhir_core::{AccessScope, Owner, RepositoryKind};
    use oclfhir_db_memory::InMemoryStore;
    use serde_json::json;

    use super::super::testing;
    use super::*;

    fn seeded() -> (Arc<InMemoryStore>, u64) {
        let store = Arc::new(InMemoryStore::new());
        store.add_org("OCL");
        let repo_id = store.insert_repository(testing::repository(RepositoryKind::Source));
        store.insert_concept(repo_id, testing::concept("AD", "Allergic Disorder"));
        (store, repo_id)
    }

    #[tokio::test]
    async fn test_lookup_emits_core_parameters() {
        let (store, _) = seeded();
        let engine = testing::engine(&store);
        let params = LookupParams {
            code: Some("AD".into()),
            system: Some("https://ocl.org/CodeSystem/diagnosis-cs".into()),
            ..Default::default()
        };
        let result = engine.lookup(&params, &AccessScope::public()).await.unwrap();

        let parameter = result["parameter"].as_array().unwrap();
        assert_eq!(parameter[0], json!({"name": "name", "valueString": "diagnosis-cs"}));
        assert_eq!(parameter[1], json!({"name": "version", "valueString": "v1.0"}));
        assert_eq!(
            parameter[2],
            json!({"name": "display", "valueString": "Allergic Disorder"})
        );
        // both locales come back as designations, then the two properties
        let designations: Vec<_> = parameter
            .iter()
            .filter(|p| p["name"] == "designation")
            .collect();
        assert_eq!(designations.len(), 2);
        let properties: Vec<_> = parameter
            .iter()
            .filter(|p| p["name"] == "property")
            .collect();
        assert_eq!(properties[0]["part"][0]["valueCode"], "conceptclass");
        assert_eq!(properties[0]["part"][1]["valueString"], "Diagnosis");
        assert_eq!(properties[1]["part"][0]["valueCode"], "datatype");
    }

    #[tokio::test]
    async fn test_lookup_display_language_filters_designations() {
        let (store, _) = seeded();
        let engine = testing::engine(&store);
        let params = LookupParams {
            code: Some("AD".into()),
            system: Some("https://ocl.org/CodeSystem/diagnosis-cs".into()),
            display_language: Some("es".into()),
            ..Default::default()
        };
        let result = engine.lookup(&params, &AccessScope::public()).await.unwrap();

        let parameter = result["parameter"].as_array().unwrap();
        let designations: Vec<_> = parameter
            .iter()
            .filter(|p| p["name"] == "designation")
            .collect();
        assert_eq!(designations.len(), 1);
        assert_eq!(designations[0]["part"][0]["valueCode"], "es");
    }

    #[tokio::test]
    async fn test_lookup_coding_parameter() {
        let (store, _) = seeded();
        let engine = testing::engine(&store);
        let params = LookupParams {
            coding: Some(json!({
                "system": "https://ocl.org/CodeSystem/diagnosis-cs",
                "code": "AD",
            })),
            ..Default::default()
        };
        let result = engine.lookup(&params, &AccessScope::public()).await.unwrap();
        assert_eq!(result["parameter"][0]["valueString"], "diagnosis-cs");
    }

    #[tokio::test]
    async fn test_lookup_missing_system_is_invalid_request() {
        let (store, _) = seeded();
        let engine = testing::engine(&store);
        let params = LookupParams {
            code: Some("AD".into()),
            ..Default::default()
        };
        let err = engine
            .lookup(&params, &AccessScope::public())
            .await
            .unwrap_err();
        assert!(err.is_invalid_request());
    }

    fn shared_url_store() -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        for (org, display) in [
            ("ALPHA", "Alpha Allergic Disorder"),
            ("BETA", "Beta Allergic Disorder"),
        ] {
            store.add_org(org);
            let mut repository = testing::repository(RepositoryKind::Source);
            repository.owner = Owner::org(org);
            repository.canonical_url = Some("https://ocl.org/CodeSystem/shared-cs".into());
            repository.external_id = None;
            repository.uri = format!("/orgs/{org}/sources/diagnosis-cs/v1.0/");
            let repo_id = store.insert_repository(repository);
            store.insert_concept(repo_id, testing::concept("AD", display));
        }
        store
    }

    #[tokio::test]
    async fn test_lookup_owner_scopes_shared_canonical_url() {
        let store = shared_url_store();
        let engine = testing::engine(&store);
        for (token, display) in [
            ("org:ALPHA", "Alpha Allergic Disorder"),
            ("org:BETA", "Beta Allergic Disorder"),
        ] {
            let params = LookupParams {
                code: Some("AD".into()),
                system: Some("https://ocl.org/CodeSystem/shared-cs".into()),
                owner: Some(token.into()),
                ..Default::default()
            };
            let result = engine.lookup(&params, &AccessScope::public()).await.unwrap();
            let parameter = result["parameter"].as_array().unwrap();
            assert_eq!(
                parameter[2],
                json!({"name": "display", "valueString": display})
            );
        }
    }

    #[tokio::test]
    async fn test_lookup_unknown_owner_is_rejected() {
        let store = shared_url_store();
        let engine = testing::engine(&store);
        let mut params = LookupParams {
            code: Some("AD".into()),
            system: Some("https://ocl.org/CodeSystem/shared-cs".into()),
            owner: Some("org:GAMMA".into()),
            ..Default::default()
        };
        let err = engine
            .lookup(&params, &AccessScope::public())
            .await
            .unwrap_err();
        assert!(err.is_invalid_request());

        // malformed token
        params.owner = Some("team:ALPHA".into());
        let err = engine
            .lookup(&params, &AccessScope::public())
            .await
            .unwrap_err();
        assert!(err.is_invalid_request());
    }

    #[tokio::test]
    async fn test_lookup_unknown_code_is_not_found() {
        let (store, _) = seeded();
        let engine = testing::engine(&store);
        let params = LookupParams {
            code: Some("NOPE".into()),
            system: Some("https://ocl.org/CodeSystem/diagnosis-cs".into()),
            ..Default::default()
        };
        let err = engine
            .lookup(&params, &AccessScope::public())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "The code 'NOPE' is invalid");
    }
}
