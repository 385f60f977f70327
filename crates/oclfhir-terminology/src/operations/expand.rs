//! `ValueSet/$expand`.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{Value, json};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

use oclfhir_core::display::display_for_lookup;
use oclfhir_core::{AccessScope, RepositoryKind, RepositoryVersion};
use oclfhir_storage::{RepositoryQuery, ResourceType, TerminologyStore, VersionSelector};

use super::{TerminologyEngine, parse_owner};
use crate::convert::value_set::{base_value_set, ordered_expressions};
use crate::convert::{
    apply_side_channels, code_system_status, designation_json, ensure_accession_identifier,
};
use crate::error::OperationError;
use crate::extras::ExtrasOverlay;
use crate::paginate::{DEFAULT_PAGE_SIZE, paginate, validate_page_param};

/// Parameters of `$expand`. `exclude-system` and `system-version` entries are
/// `url` or `url|version` strings; `filter` holds `__`-separated terms with
/// optional `"`-quoting.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExpandParams {
    pub url: Option<String>,
    pub value_set_version: Option<String>,
    pub offset: Option<i64>,
    pub count: Option<i64>,
    pub include_designations: bool,
    pub include_definition: bool,
    pub active_only: bool,
    pub display_language: Option<String>,
    pub filter: Option<String>,
    #[serde(rename = "exclude-system")]
    pub exclude_system: Vec<String>,
    #[serde(rename = "system-version")]
    pub system_version: Vec<String>,
    /// `org:<id>` or `user:<id>`; narrows `url` resolution.
    pub owner: Option<String>,
}

struct ContainsEntry {
    system: String,
    version: Option<String>,
    code: String,
    display: Option<String>,
    inactive: bool,
    designations: Vec<Value>,
}

impl TerminologyEngine {
    /// Expands the resolved ValueSet version into a flat, sorted, paginated
    /// code list. `total` is the pre-pagination count and `count = 0` returns
    /// the full list.
    pub async fn expand(
        &self,
        params: &ExpandParams,
        access: &AccessScope,
    ) -> Result<Value, OperationError> {
        let url = params
            .url
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| OperationError::invalid_request("Parameter 'url' is required"))?;
        let offset = validate_page_param("offset", params.offset)?.unwrap_or(0);
        let count = validate_page_param("count", params.count)?.unwrap_or(DEFAULT_PAGE_SIZE);
        let owner = parse_owner(params.owner.as_deref())?;

        let collection = self
            .resolver()
            .resolve_system(
                RepositoryKind::Collection,
                ResourceType::ValueSet,
                owner.as_ref(),
                url,
                params.value_set_version.as_deref(),
                access,
            )
            .await?;

        let overrides = self
            .resolve_system_overrides(&params.system_version, access)
            .await?;
        let excludes = parse_excludes(&params.exclude_system);
        let filters = parse_filters(params.filter.as_deref());
        let language = params.display_language.as_deref().filter(|l| !l.is_empty());

        let references = self.resolver().store().references_of(collection.id).await?;
        let mut entries: Vec<ContainsEntry> = Vec::new();
        for expression in ordered_expressions(&references) {
            let Some(resolved) = self.resolver().resolve_reference(&expression, access).await?
            else {
                continue;
            };

            // a caller-pinned system version redirects working-copy
            // references only; a reference pinned to a version keeps it
            let (version, concept, default_locale) = match overrides.get(&resolved.system) {
                Some(pinned) if resolved.version.is_none() => {
                    let Some(concept) = self
                        .resolver()
                        .store()
                        .find_concept(pinned.id, &resolved.concept.code())
                        .await?
                    else {
                        continue;
                    };
                    (
                        Some(pinned.version.clone()),
                        concept,
                        pinned.default_locale.clone(),
                    )
                }
                _ => (resolved.version, resolved.concept, resolved.default_locale),
            };

            if params.active_only && concept.retired {
                continue;
            }
            let code = concept.code();
            if !filters.is_empty() && !filters.iter().any(|f| code.contains(f.as_str())) {
                continue;
            }
            if is_excluded(&excludes, &resolved.system, version.as_deref()) {
                continue;
            }

            let designations: Vec<Value> = if params.include_designations {
                concept
                    .names
                    .iter()
                    .filter(|t| !t.name.is_empty())
                    .map(designation_json)
                    .collect()
            } else {
                Vec::new()
            };
            entries.push(ContainsEntry {
                system: resolved.system,
                version,
                code,
                display: display_for_lookup(&concept.names, language, &default_locale),
                inactive: concept.retired,
                designations,
            });
        }

        entries.sort_by(|a, b| {
            a.system
                .cmp(&b.system)
                .then_with(|| b.version.cmp(&a.version))
                .then_with(|| a.code.cmp(&b.code))
        });
        let total = entries.len();
        let page = paginate(entries, offset, count);

        let mut resource = if params.include_definition {
            let mut base = base_value_set(&collection);
            apply_side_channels(&mut base, &collection);
            ExtrasOverlay::parse(collection.extras.as_deref()).apply_value_set(&mut base);
            ensure_accession_identifier(&mut base, &collection.uri);
            base
        } else {
            json!({
                "resourceType": "ValueSet",
                "status": code_system_status(&collection),
            })
        };
        if let Some(canonical) = collection.resource_url() {
            resource["compose"] = json!({
                "include": [{
                    "valueSet": [format!("{canonical}|{}", collection.version)],
                }],
            });
        }
        resource["expansion"] = json!({
            "identifier": Uuid::new_v4().to_string(),
            "timestamp": OffsetDateTime::now_utc()
                .format(&Rfc3339)
                .unwrap_or_default(),
            "total": total,
            "offset": offset,
            "parameter": parameter_echo(params, url),
            "contains": page.iter().map(contains_json).collect::<Vec<_>>(),
        });
        Ok(resource)
    }

    /// Resolves each `url|version` override to its version row. An override
    /// that names an unresolvable system version is a caller error.
    async fn resolve_system_overrides(
        &self,
        entries: &[String],
        access: &AccessScope,
    ) -> Result<HashMap<String, RepositoryVersion>, OperationError> {
        let mut overrides = HashMap::with_capacity(entries.len());
        for entry in entries {
            let Some((url, version)) = entry.split_once('|').filter(|(u, v)| {
                !u.is_empty() && !v.is_empty()
            }) else {
                return Err(OperationError::invalid_request(format!(
                    "system-version '{entry}' must be of the form url|version"
                )));
            };
            let query = RepositoryQuery::ByUrl {
                url: url.to_string(),
            };
            let selector = VersionSelector::Exact(version.to_string());
            let Some(row) = self
                .resolver()
                .store()
                .repository_versions(RepositoryKind::Source, &query, &selector, access)
                .await?
                .into_iter()
                .next()
            else {
                return Err(OperationError::invalid_request(format!(
                    "Code system of url={url}, version={version} does not exist."
                )));
            };
            overrides.insert(url.to_string(), row);
        }
        Ok(overrides)
    }
}

fn parse_filters(filter: Option<&str>) -> Vec<String> {
    filter
        .unwrap_or_default()
        .split("__")
        .map(|term| term.replace('"', ""))
        .filter(|term| !term.is_empty())
        .collect()
}

fn parse_excludes(entries: &[String]) -> Vec<(String, Option<String>)> {
    entries
        .iter()
        .filter(|e| !e.is_empty())
        .map(|entry| match entry.split_once('|') {
            Some((url, version)) if !version.is_empty() => {
                (url.to_string(), Some(version.to_string()))
            }
            Some((url, _)) => (url.to_string(), None),
            None => (entry.clone(), None),
        })
        .collect()
}

fn is_excluded(
    excludes: &[(String, Option<String>)],
    system: &str,
    version: Option<&str>,
) -> bool {
    excludes.iter().any(|(url, excluded_version)| {
        url == system
            && excluded_version
                .as_deref()
                .is_none_or(|excluded| Some(excluded) == version)
    })
}

fn contains_json(entry: &ContainsEntry) -> Value {
    let mut value = json!({
        "system": entry.system,
        "code": entry.code,
    });
    if let Some(version) = entry.version.as_deref() {
        value["version"] = json!(version);
    }
    if entry.inactive {
        value["inactive"] = json!(true);
    }
    if let Some(display) = entry.display.as_deref() {
        value["display"] = json!(display);
    }
    if !entry.designations.is_empty() {
        value["designation"] = json!(entry.designations);
    }
    value
}

fn parameter_echo(params: &ExpandParams, url: &str) -> Vec<Value> {
    let mut echo = vec![json!({"name": "url", "valueUri": url})];
    if let Some(version) = params.value_set_version.as_deref() {
        echo.push(json!({"name": "valueSetVersion", "valueString": version}));
    }
    echo.push(json!({"name": "offset", "valueInteger": params.offset.unwrap_or(0)}));
    echo.push(json!({
        "name": "count",
        "valueInteger": params.count.unwrap_or(i64::from(DEFAULT_PAGE_SIZE)),
    }));
    echo.push(json!({
        "name": "includeDesignations",
        "valueBoolean": params.include_designations,
    }));
    echo.push(json!({
        "name": "includeDefinition",
        "valueBoolean": params.include_definition,
    }));
    echo.push(json!({"name": "activeOnly", "valueBoolean": params.active_only}));
    if let Some(language) = params.display_language.as_deref() {
        echo.push(json!({"name": "displayLanguage", "valueCode": language}));
    }
    if let Some(filter) = params.filter.as_deref() {
        echo.push(json!({"name": "filter", "valueString": filter}));
    }
    for entry in &params.exclude_system {
        echo.push(json!({"name": "exclude-system", "valueString": entry}));
    }
    for entry in &params.system_version {
        echo.push(json!({"name": "system-version", "valueString": entry}));
    }
    echo
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use oclfhir_core::{AccessScope, RepositoryKind};
    use oclfhir_db_memory::InMemoryStore;

    use super::super::testing;
    use super::*;

    fn seeded() -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        store.add_org("OCL");
        let source_id = store.insert_repository(testing::repository(RepositoryKind::Source));
        store.insert_concept(source_id, testing::concept("AD", "Allergic Disorder"));
        store.insert_concept(source_id, testing::concept("TB", "Tuberculosis"));
        let mut retired = testing::concept("XX", "Retired Diagnosis");
        retired.retired = true;
        store.insert_concept(source_id, retired);

        let collection_id = store.insert_repository({
            let mut collection = testing::repository(RepositoryKind::Collection);
            collection.mnemonic = "diagnosis-vs".into();
            collection.canonical_url = Some("https://ocl.org/ValueSet/diagnosis-vs".into());
            collection.external_id = None;
            collection.uri = "/orgs/OCL/collections/diagnosis-vs/v1.0/".into();
            collection
        });
        for code in ["AD", "TB", "XX"] {
            store.insert_reference(
                collection_id,
                format!("/orgs/OCL/sources/diagnosis-cs/v1.0/concepts/{code}/"),
            );
        }
        store
    }

    fn base_params() -> ExpandParams {
        ExpandParams {
            url: Some("https://ocl.org/ValueSet/diagnosis-vs".into()),
            ..Default::default()
        }
    }

    fn codes(body: &serde_json::Value) -> Vec<String> {
        body["expansion"]["contains"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["code"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_expand_sorted_full_list() {
        let store = seeded();
        let engine = testing::engine(&store);
        let body = engine
            .expand(&base_params(), &AccessScope::public())
            .await
            .unwrap();

        assert_eq!(codes(&body), vec!["AD", "TB", "XX"]);
        assert_eq!(body["expansion"]["total"], 3);
        assert_eq!(body["expansion"]["offset"], 0);
        assert!(body["expansion"]["identifier"].as_str().is_some());
        // status-only resource without includeDefinition
        assert_eq!(body["status"], "active");
        assert!(body.get("name").is_none());
        assert_eq!(
            body["compose"]["include"][0]["valueSet"][0],
            "https://ocl.org/ValueSet/diagnosis-vs|v1.0"
        );
    }

    #[tokio::test]
    async fn test_expand_pagination_keeps_full_total() {
        let store = seeded();
        let engine = testing::engine(&store);
        let mut params = base_params();
        params.offset = Some(1);
        params.count = Some(1);
        let body = engine.expand(&params, &AccessScope::public()).await.unwrap();

        assert_eq!(codes(&body), vec!["TB"]);
        assert_eq!(body["expansion"]["total"], 3);
        assert_eq!(body["expansion"]["offset"], 1);

        // count 0 expands everything
        params.offset = Some(0);
        params.count = Some(0);
        let body = engine.expand(&params, &AccessScope::public()).await.unwrap();
        assert_eq!(codes(&body).len(), 3);
    }

    #[tokio::test]
    async fn test_expand_active_only_and_inactive_flag() {
        let store = seeded();
        let engine = testing::engine(&store);

        let body = engine
            .expand(&base_params(), &AccessScope::public())
            .await
            .unwrap();
        let contains = body["expansion"]["contains"].as_array().unwrap();
        assert_eq!(contains[2]["inactive"], true);

        let mut params = base_params();
        params.active_only = true;
        let body = engine.expand(&params, &AccessScope::public()).await.unwrap();
        assert_eq!(codes(&body), vec!["AD", "TB"]);
    }

    #[tokio::test]
    async fn test_expand_filter_terms() {
        let store = seeded();
        let engine = testing::engine(&store);
        let mut params = base_params();
        params.filter = Some("\"AD\"__TB".into());
        let body = engine.expand(&params, &AccessScope::public()).await.unwrap();
        assert_eq!(codes(&body), vec!["AD", "TB"]);
    }

    #[tokio::test]
    async fn test_expand_exclude_system() {
        let store = seeded();
        let engine = testing::engine(&store);
        let mut params = base_params();
        params.exclude_system =
            vec!["https://ocl.org/CodeSystem/diagnosis-cs|v1.0".into()];
        let body = engine.expand(&params, &AccessScope::public()).await.unwrap();
        assert!(codes(&body).is_empty());
        assert_eq!(body["expansion"]["total"], 0);
    }

    #[tokio::test]
    async fn test_expand_system_version_redirects_only_working_copy_references() {
        let store = Arc::new(InMemoryStore::new());
        store.add_org("OCL");
        let v1 = store.insert_repository(testing::repository(RepositoryKind::Source));
        store.insert_concept(v1, testing::concept("AD", "Allergic Disorder"));

        let head = store.insert_repository({
            let mut source = testing::repository(RepositoryKind::Source);
            source.version = "HEAD".into();
            source.released = false;
            source.uri = "/orgs/OCL/sources/diagnosis-cs/HEAD/".into();
            source
        });
        store.insert_concept(head, testing::concept("TB", "Tuberculosis"));

        let v2 = store.insert_repository({
            let mut source = testing::repository(RepositoryKind::Source);
            source.version = "v2.0".into();
            source.uri = "/orgs/OCL/sources/diagnosis-cs/v2.0/".into();
            source
        });
        store.insert_concept(v2, testing::concept("AD", "Updated Allergic Disorder"));
        store.insert_concept(v2, testing::concept("TB", "Updated Tuberculosis"));

        let collection_id = store.insert_repository({
            let mut collection = testing::repository(RepositoryKind::Collection);
            collection.mnemonic = "diagnosis-vs".into();
            collection.canonical_url = Some("https://ocl.org/ValueSet/diagnosis-vs".into());
            collection.external_id = None;
            collection.uri = "/orgs/OCL/collections/diagnosis-vs/v1.0/".into();
            collection
        });
        store.insert_reference(
            collection_id,
            "/orgs/OCL/sources/diagnosis-cs/v1.0/concepts/AD/",
        );
        store.insert_reference(collection_id, "/orgs/OCL/sources/diagnosis-cs/concepts/TB/");

        let engine = testing::engine(&store);
        let mut params = base_params();
        params.system_version =
            vec!["https://ocl.org/CodeSystem/diagnosis-cs|v2.0".into()];
        let body = engine.expand(&params, &AccessScope::public()).await.unwrap();

        let contains = body["expansion"]["contains"].as_array().unwrap();
        assert_eq!(contains.len(), 2);
        // the working-copy reference follows the pinned system version
        assert_eq!(contains[0]["code"], "TB");
        assert_eq!(contains[0]["version"], "v2.0");
        assert_eq!(contains[0]["display"], "Updated Tuberculosis");
        // the version-pinned reference keeps its own version
        assert_eq!(contains[1]["code"], "AD");
        assert_eq!(contains[1]["version"], "v1.0");
        assert_eq!(contains[1]["display"], "Allergic Disorder");
    }

    #[tokio::test]
    async fn test_expand_unknown_system_version_override_is_rejected() {
        let store = seeded();
        let engine = testing::engine(&store);
        let mut params = base_params();
        params.system_version =
            vec!["https://ocl.org/CodeSystem/diagnosis-cs|v9.9".into()];
        let err = engine
            .expand(&params, &AccessScope::public())
            .await
            .unwrap_err();
        assert!(err.is_invalid_request());
        assert!(err.to_string().contains("does not exist."));
    }

    #[tokio::test]
    async fn test_expand_include_definition_carries_header() {
        let store = seeded();
        let engine = testing::engine(&store);
        let mut params = base_params();
        params.include_definition = true;
        let body = engine.expand(&params, &AccessScope::public()).await.unwrap();
        assert_eq!(body["id"], "diagnosis-vs");
        assert_eq!(body["publisher"], "org:OCL");
        assert_eq!(body["expansion"]["total"], 3);
    }

    #[tokio::test]
    async fn test_expand_negative_offset_is_rejected() {
        let store = seeded();
        let engine = testing::engine(&store);
        let mut params = base_params();
        params.offset = Some(-1);
        let err = engine
            .expand(&params, &AccessScope::public())
            .await
            .unwrap_err();
        assert!(err.is_invalid_request());
    }
}
