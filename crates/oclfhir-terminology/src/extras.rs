//! The extras JSON overlay.
//!
//! Repository rows carry a raw JSON side-channel (`extras`) holding protocol
//! fields not modeled as first-class columns: filter declarations, extra
//! identifiers, purpose, copyright, and for value sets a `compose` block.
//! The overlay parses the blob once and merges the recognized pieces onto a
//! base converted resource. It only adds what the base conversion left
//! absent; it never removes base data.

use serde_json::{Value, json};

use oclfhir_core::constants::{CONCEPT_CLASS, DATATYPE, FILTER_OPERATORS, IDENTIFIER_USE_CODES};

/// A parsed extras blob, ready to merge onto converted resources.
#[derive(Debug, Default)]
pub struct ExtrasOverlay {
    root: Option<Value>,
}

impl ExtrasOverlay {
    /// Parses a raw extras string. A malformed blob is logged and treated as
    /// absent; stored side-channel noise must not fail a read.
    pub fn parse(extras: Option<&str>) -> Self {
        let root = match extras.filter(|s| !s.trim().is_empty()) {
            Some(raw) => match serde_json::from_str::<Value>(raw) {
                Ok(value) if value.is_object() => Some(value),
                Ok(_) => None,
                Err(error) => {
                    tracing::warn!(%error, "Ignoring malformed extras blob");
                    None
                }
            },
            None => None,
        };
        Self { root }
    }

    /// Merges the code-system pieces: filter declarations, identifiers,
    /// purpose, copyright.
    pub fn apply_code_system(&self, resource: &mut Value) {
        self.apply_filters(resource);
        self.apply_identifiers(resource);
        self.apply_texts(resource);
    }

    /// Merges the value-set pieces: identifiers, purpose, copyright, and the
    /// `compose` block.
    pub fn apply_value_set(&self, resource: &mut Value) {
        self.apply_identifiers(resource);
        self.apply_texts(resource);
        self.apply_compose(resource);
    }

    /// Merges the concept-map pieces: identifiers, purpose, copyright.
    pub fn apply_concept_map(&self, resource: &mut Value) {
        self.apply_identifiers(resource);
        self.apply_texts(resource);
    }

    fn apply_filters(&self, resource: &mut Value) {
        let filters: Vec<Value> = self
            .array("filters")
            .iter()
            .filter_map(|entry| filter_descriptor(entry))
            .collect();
        if !filters.is_empty() {
            append_all(resource, "filter", filters);
        }
    }

    fn apply_identifiers(&self, resource: &mut Value) {
        let identifiers: Vec<Value> = self
            .array("identifiers")
            .iter()
            .filter_map(|entry| identifier_descriptor(entry))
            .collect();
        if !identifiers.is_empty() {
            append_all(resource, "identifier", identifiers);
        }
    }

    fn apply_texts(&self, resource: &mut Value) {
        for field in ["purpose", "copyright"] {
            if let Some(text) = self.string(field)
                && resource.get(field).is_none()
            {
                resource[field] = Value::String(text);
            }
        }
    }

    fn apply_compose(&self, resource: &mut Value) {
        let Some(compose) = self.root.as_ref().and_then(|r| r.get("compose")) else {
            return;
        };
        if compose.get("inactive").and_then(Value::as_bool) == Some(true) {
            resource["compose"]["inactive"] = json!(true);
        }
        let includes: Vec<Value> = compose
            .get("include")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| include_block(entry))
                    .collect()
            })
            .unwrap_or_default();
        if !includes.is_empty() {
            append_all(&mut resource["compose"], "include", includes);
        }
    }

    fn array(&self, field: &str) -> Vec<Value> {
        self.root
            .as_ref()
            .and_then(|r| r.get(field))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    }

    fn string(&self, field: &str) -> Option<String> {
        self.root
            .as_ref()
            .and_then(|r| r.get(field))
            .and_then(Value::as_str)
            .map(String::from)
    }
}

fn is_property_code(code: &str) -> bool {
    code == CONCEPT_CLASS || code == DATATYPE
}

/// Converts one extras `filters` entry into a filter declaration. Entries
/// with an unrecognized property code are skipped entirely; an unrecognized
/// operator just leaves the operator list empty.
fn filter_descriptor(entry: &Value) -> Option<Value> {
    let code = entry.get("code").and_then(Value::as_str)?;
    if !is_property_code(code) {
        return None;
    }
    let operators: Vec<&str> = entry
        .get("operator")
        .and_then(Value::as_str)
        .filter(|op| FILTER_OPERATORS.contains(op))
        .into_iter()
        .collect();
    let mut filter = json!({ "code": code, "operator": operators });
    if let Some(description) = entry.get("description").and_then(Value::as_str) {
        filter["description"] = json!(description);
    }
    if let Some(value) = entry.get("value").and_then(Value::as_str) {
        filter["value"] = json!(value);
    }
    Some(filter)
}

/// Converts one extras `identifiers` entry. Both `system` and `value` are
/// required; a `use` outside the identifier-use vocabulary is dropped while
/// the identifier itself is kept.
fn identifier_descriptor(entry: &Value) -> Option<Value> {
    let system = entry.get("system").and_then(Value::as_str)?;
    let value = entry.get("value").and_then(Value::as_str)?;
    let mut identifier = json!({ "system": system, "value": value });
    if let Some(use_code) = entry
        .get("use")
        .and_then(Value::as_str)
        .filter(|u| IDENTIFIER_USE_CODES.contains(u))
    {
        identifier["use"] = json!(use_code);
    }
    Some(identifier)
}

/// Converts one extras `compose.include` entry: `system` is required,
/// `version` optional, nested filters restricted to the two property codes.
fn include_block(entry: &Value) -> Option<Value> {
    let system = entry.get("system").and_then(Value::as_str)?;
    let mut include = json!({ "system": system });
    if let Some(version) = entry.get("version").and_then(Value::as_str) {
        include["version"] = json!(version);
    }
    let filters: Vec<Value> = entry
        .get("filter")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter(|f| {
                    f.get("property")
                        .and_then(Value::as_str)
                        .is_some_and(is_property_code)
                })
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    if !filters.is_empty() {
        include["filter"] = Value::Array(filters);
    }
    Some(include)
}

fn append_all(resource: &mut Value, field: &str, values: Vec<Value>) {
    match resource.get_mut(field).and_then(Value::as_array_mut) {
        Some(existing) => existing.extend(values),
        None => resource[field] = Value::Array(values),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_purpose_and_copyright_verbatim() {
        let overlay = ExtrasOverlay::parse(Some(r#"{"purpose":"P","copyright":"C"}"#));
        let mut resource = json!({ "resourceType": "CodeSystem" });
        overlay.apply_code_system(&mut resource);
        assert_eq!(resource["purpose"], "P");
        assert_eq!(resource["copyright"], "C");
    }

    #[test]
    fn test_unrecognized_operator_leaves_list_empty() {
        let overlay = ExtrasOverlay::parse(Some(
            r#"{"filters":[{"code":"conceptclass","operator":"equals","value":"Diagnosis"}]}"#,
        ));
        let mut resource = json!({ "resourceType": "CodeSystem" });
        overlay.apply_code_system(&mut resource);
        let filter = &resource["filter"][0];
        assert_eq!(filter["code"], "conceptclass");
        assert_eq!(filter["operator"].as_array().unwrap().len(), 0);
        assert_eq!(filter["value"], "Diagnosis");
    }

    #[test]
    fn test_recognized_operator_kept() {
        let overlay = ExtrasOverlay::parse(Some(
            r#"{"filters":[{"code":"datatype","operator":"is-a","value":"Numeric"}]}"#,
        ));
        let mut resource = json!({});
        overlay.apply_code_system(&mut resource);
        assert_eq!(resource["filter"][0]["operator"][0], "is-a");
    }

    #[test]
    fn test_unknown_filter_code_skipped() {
        let overlay = ExtrasOverlay::parse(Some(
            r#"{"filters":[{"code":"unknown","operator":"is-a","value":"x"}]}"#,
        ));
        let mut resource = json!({});
        overlay.apply_code_system(&mut resource);
        assert!(resource.get("filter").is_none());
    }

    #[test]
    fn test_identifier_requires_system_and_value() {
        let overlay = ExtrasOverlay::parse(Some(
            r#"{"identifiers":[
                {"system":"urn:s","value":"v","use":"official"},
                {"system":"urn:s2"},
                {"system":"urn:s3","value":"v3","use":"bogus"}
            ]}"#,
        ));
        let mut resource = json!({});
        overlay.apply_concept_map(&mut resource);
        let identifiers = resource["identifier"].as_array().unwrap();
        assert_eq!(identifiers.len(), 2);
        assert_eq!(identifiers[0]["use"], "official");
        assert!(identifiers[1].get("use").is_none());
    }

    #[test]
    fn test_identifiers_append_to_base() {
        let overlay = ExtrasOverlay::parse(Some(r#"{"identifiers":[{"system":"s","value":"v"}]}"#));
        let mut resource = json!({ "identifier": [{ "system": "base", "value": "b" }] });
        overlay.apply_concept_map(&mut resource);
        assert_eq!(resource["identifier"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_compose_overlay() {
        let overlay = ExtrasOverlay::parse(Some(
            r#"{"compose":{"inactive":true,"include":[
                {"system":"https://cs.example","version":"v1.0",
                 "filter":[{"property":"conceptclass","op":"=","value":"Diagnosis"},
                           {"property":"other","op":"=","value":"x"}]}
            ]}}"#,
        ));
        let mut resource = json!({ "compose": { "include": [] } });
        overlay.apply_value_set(&mut resource);
        assert_eq!(resource["compose"]["inactive"], true);
        let include = &resource["compose"]["include"][0];
        assert_eq!(include["system"], "https://cs.example");
        assert_eq!(include["filter"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_malformed_blob_is_absent() {
        let overlay = ExtrasOverlay::parse(Some("{not json"));
        let mut resource = json!({});
        overlay.apply_code_system(&mut resource);
        assert_eq!(resource, json!({}));
    }
}
