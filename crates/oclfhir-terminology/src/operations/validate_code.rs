//! `$validate-code` for code systems and value sets.

use serde::Deserialize;
use serde_json::{Value, json};

use oclfhir_core::display::validate_display;
use oclfhir_core::{AccessScope, Owner, RepositoryKind, RepositoryVersion};
use oclfhir_storage::{ResourceType, TerminologyStore};

use super::{TerminologyEngine, coded_value, parameters, parse_owner};
use crate::accession;
use crate::error::OperationError;

const INVALID_DISPLAY: &str = "Invalid display.";

/// Parameters of `$validate-code`.
///
/// With a `system` (explicit or inside `coding`), `url` names the ValueSet
/// whose membership is checked. Without one, `url` is itself the CodeSystem
/// canonical and the check runs against the system directly.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidateCodeParams {
    pub url: Option<String>,
    pub value_set_version: Option<String>,
    pub code: Option<String>,
    /// CodeSystem version for system-level validation.
    pub version: Option<String>,
    pub system: Option<String>,
    pub system_version: Option<String>,
    pub display: Option<String>,
    pub display_language: Option<String>,
    pub coding: Option<Value>,
    /// `org:<id>` or `user:<id>`; narrows url and system resolution.
    pub owner: Option<String>,
}

impl TerminologyEngine {
    /// Validates a code, returning a `result` parameter and, when the
    /// display check fails, `message = "Invalid display."`. An absent code
    /// is a `false` result, not an error.
    pub async fn validate_code(
        &self,
        params: &ValidateCodeParams,
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
        let display = params.display.as_deref().map(strip_quotes);
        let language = params.display_language.as_deref().filter(|l| !l.is_empty());
        let owner = parse_owner(params.owner.as_deref())?;

        match coded.system {
            Some(system) => {
                let system_version = coded
                    .version
                    .or_else(|| params.system_version.clone());
                self.validate_in_value_set(
                    owner.as_ref(),
                    url,
                    params.value_set_version.as_deref(),
                    &system,
                    system_version.as_deref(),
                    &code,
                    display,
                    language,
                    access,
                )
                .await
            }
            None => {
                let version = coded.version.or_else(|| params.version.clone());
                self.validate_in_code_system(
                    owner.as_ref(),
                    url,
                    version.as_deref(),
                    &code,
                    display,
                    language,
                    access,
                )
                .await
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn validate_in_code_system(
        &self,
        owner: Option<&Owner>,
        system: &str,
        version: Option<&str>,
        code: &str,
        display: Option<&str>,
        language: Option<&str>,
        access: &AccessScope,
    ) -> Result<Value, OperationError> {
        let repository = self
            .resolver()
            .resolve_system(
                RepositoryKind::Source,
                ResourceType::CodeSystem,
                owner,
                system,
                version,
                access,
            )
            .await?;
        match self
            .resolver()
            .store()
            .find_concept(repository.id, code)
            .await?
        {
            Some(concept) => Ok(display_outcome(&concept.names, display, language)),
            None => Ok(outcome(false, None)),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn validate_in_value_set(
        &self,
        owner: Option<&Owner>,
        url: &str,
        value_set_version: Option<&str>,
        system: &str,
        system_version: Option<&str>,
        code: &str,
        display: Option<&str>,
        language: Option<&str>,
        access: &AccessScope,
    ) -> Result<Value, OperationError> {
        let collection = self
            .resolver()
            .resolve_system(
                RepositoryKind::Collection,
                ResourceType::ValueSet,
                owner,
                url,
                value_set_version,
                access,
            )
            .await?;
        let source = self
            .resolver()
            .resolve_system(
                RepositoryKind::Source,
                ResourceType::CodeSystem,
                owner,
                system,
                system_version,
                access,
            )
            .await?;

        let references = self.resolver().store().references_of(collection.id).await?;
        if !references
            .iter()
            .any(|reference| references_concept(&reference.expression, &source, code))
        {
            return Ok(outcome(false, None));
        }

        match self.resolver().store().find_concept(source.id, code).await? {
            Some(concept) => Ok(display_outcome(&concept.names, display, language)),
            None => Ok(outcome(false, None)),
        }
    }
}

/// Whether a collection-reference expression points at the given code inside
/// the resolved source version.
fn references_concept(expression: &str, source: &RepositoryVersion, code: &str) -> bool {
    accession::parse_reference(expression).is_ok_and(|parsed| {
        parsed.owner == source.owner
            && parsed.repository_id == source.mnemonic
            && parsed.repository_version == source.version
            && parsed.concept_code == code
    })
}

fn display_outcome(
    names: &[oclfhir_core::LocalizedText],
    display: Option<&str>,
    language: Option<&str>,
) -> Value {
    match display {
        Some(display) if !validate_display(names, display, language) => {
            outcome(false, Some(INVALID_DISPLAY))
        }
        _ => outcome(true, None),
    }
}

fn outcome(result: bool, message: Option<&str>) -> Value {
    let mut parameter = vec![json!({"name": "result", "valueBoolean": result})];
    if let Some(message) = message {
        parameter.push(json!({"name": "message", "valueString": message}));
    }
    parameters(parameter)
}

/// Strips one pair of surrounding double quotes off a supplied display.
fn strip_quotes(display: &str) -> &str {
    let display = display.strip_prefix('"').unwrap_or(display);
    display.strip_suffix('"').unwrap_or(display)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use oclfhir_core::{AccessScope, RepositoryKind};
    use oclfhir_db_memory::InMemoryStore;
    use serde_json::json;

    use super::super::testing;
    use super::*;

    fn seeded() -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        store.add_org("OCL");
        let repo_id = store.insert_repository(testing::repository(RepositoryKind::Source));
        store.insert_concept(repo_id, testing::concept("AD", "Allergic Disorder"));
        store
    }

    fn valid_params(display: Option<&str>, language: Option<&str>) -> ValidateCodeParams {
        ValidateCodeParams {
            url: Some("https://ocl.org/CodeSystem/diagnosis-cs".into()),
            code: Some("AD".into()),
            display: display.map(String::from),
            display_language: language.map(String::from),
            ..Default::default()
        }
    }

    fn result_of(body: &serde_json::Value) -> bool {
        body["parameter"][0]["valueBoolean"].as_bool().unwrap()
    }

    #[tokio::test]
    async fn test_validate_code_present_and_absent() {
        let store = seeded();
        let engine = testing::engine(&store);
        let access = AccessScope::public();

        let body = engine.validate_code(&valid_params(None, None), &access).await.unwrap();
        assert!(result_of(&body));

        let mut params = valid_params(None, None);
        params.code = Some("NOPE".into());
        let body = engine.validate_code(&params, &access).await.unwrap();
        assert!(!result_of(&body));
        assert_eq!(body["parameter"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_validate_code_display_check() {
        let store = seeded();
        let engine = testing::engine(&store);
        let access = AccessScope::public();

        // quoted display is accepted after stripping
        let body = engine
            .validate_code(&valid_params(Some("\"Allergic Disorder\""), None), &access)
            .await
            .unwrap();
        assert!(result_of(&body));

        let body = engine
            .validate_code(&valid_params(Some("Wrong"), None), &access)
            .await
            .unwrap();
        assert!(!result_of(&body));
        assert_eq!(body["parameter"][1]["valueString"], "Invalid display.");
    }

    #[tokio::test]
    async fn test_validate_code_display_language_restricts_texts() {
        let store = seeded();
        let engine = testing::engine(&store);
        let access = AccessScope::public();

        // the English text exists but only Spanish texts are tried
        let body = engine
            .validate_code(&valid_params(Some("Allergic Disorder"), Some("es")), &access)
            .await
            .unwrap();
        assert!(!result_of(&body));

        let body = engine
            .validate_code(
                &valid_params(Some("Allergic Disorder (es)"), Some("es")),
                &access,
            )
            .await
            .unwrap();
        assert!(result_of(&body));
    }

    #[tokio::test]
    async fn test_validate_code_in_value_set_membership() {
        let store = seeded();
        let collection_id = store.insert_repository({
            let mut collection = testing::repository(RepositoryKind::Collection);
            collection.mnemonic = "diagnosis-vs".into();
            collection.canonical_url = Some("https://ocl.org/ValueSet/diagnosis-vs".into());
            collection.external_id = None;
            collection.uri = "/orgs/OCL/collections/diagnosis-vs/v1.0/".into();
            collection
        });
        store.insert_reference(collection_id, "/orgs/OCL/sources/diagnosis-cs/v1.0/concepts/AD/");

        let engine = testing::engine(&store);
        let access = AccessScope::public();
        let mut params = valid_params(None, None);
        params.url = Some("https://ocl.org/ValueSet/diagnosis-vs".into());
        params.system = Some("https://ocl.org/CodeSystem/diagnosis-cs".into());
        params.system_version = Some("v1.0".into());

        let body = engine.validate_code(&params, &access).await.unwrap();
        assert!(result_of(&body));

        params.code = Some("NOPE".into());
        let body = engine.validate_code(&params, &access).await.unwrap();
        assert!(!result_of(&body));
    }

    #[tokio::test]
    async fn test_validate_code_owner_scopes_shared_canonical_url() {
        let store = Arc::new(InMemoryStore::new());
        for (org, code) in [("ALPHA", "AD"), ("BETA", "TB")] {
            store.add_org(org);
            let mut repository = testing::repository(RepositoryKind::Source);
            repository.owner = oclfhir_core::Owner::org(org);
            repository.canonical_url = Some("https://ocl.org/CodeSystem/shared-cs".into());
            repository.external_id = None;
            repository.uri = format!("/orgs/{org}/sources/diagnosis-cs/v1.0/");
            let repo_id = store.insert_repository(repository);
            store.insert_concept(repo_id, testing::concept(code, "Shared Concept"));
        }
        let engine = testing::engine(&store);
        let access = AccessScope::public();

        // AD only exists in ALPHA's version of the shared canonical
        let mut params = ValidateCodeParams {
            url: Some("https://ocl.org/CodeSystem/shared-cs".into()),
            code: Some("AD".into()),
            owner: Some("org:ALPHA".into()),
            ..Default::default()
        };
        let body = engine.validate_code(&params, &access).await.unwrap();
        assert!(result_of(&body));

        params.owner = Some("org:BETA".into());
        let body = engine.validate_code(&params, &access).await.unwrap();
        assert!(!result_of(&body));
    }

    #[tokio::test]
    async fn test_validate_code_coding_parameter() {
        let store = seeded();
        let engine = testing::engine(&store);
        let mut params = ValidateCodeParams {
            url: Some("https://ocl.org/CodeSystem/diagnosis-cs".into()),
            ..Default::default()
        };
        params.coding = Some(json!({"code": "AD"}));
        let body = engine
            .validate_code(&params, &AccessScope::public())
            .await
            .unwrap();
        assert!(result_of(&body));
    }
}
