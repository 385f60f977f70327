//! Fixed vocabularies and sentinel values used across the engine.

/// Sentinel version denoting the unversioned working copy of a repository.
/// Never a valid target for a released-only query.
pub const HEAD: &str = "HEAD";

/// Wildcard version token requesting every version row.
pub const VERSION_ALL: &str = "*";

/// Owner token prefixes.
pub const ORG_PREFIX: &str = "org:";
pub const USER_PREFIX: &str = "user:";

/// Accession path segments.
pub const ORGS: &str = "orgs";
pub const USERS: &str = "users";
pub const SOURCES: &str = "sources";
pub const COLLECTIONS: &str = "collections";
pub const CONCEPTS: &str = "concepts";

/// The two repository-level concept property codes.
pub const CONCEPT_CLASS: &str = "conceptclass";
pub const DATATYPE: &str = "datatype";
pub const INACTIVE: &str = "inactive";

/// Fixed property declaration systems and descriptions.
pub const SYSTEM_CC: &str = "https://api.openconceptlab.org/orgs/OCL/sources/Classes/concepts";
pub const DESC_CC: &str = "Standard list of concept classes.";
pub const SYSTEM_DT: &str = "https://api.openconceptlab.org/orgs/OCL/sources/Datatypes/concepts";
pub const DESC_DT: &str = "Standard list of concept datatypes.";
pub const SYSTEM_HL7_CONCEPT_PROP: &str = "http://hl7.org/fhir/concept-properties";
pub const DESC_HL7_CONCEPT_PROP: &str = "True if the concept is not considered active.";

/// Accession identifier type coding.
pub const ACSN_SYSTEM: &str = "http://hl7.org/fhir/v2/0203";
pub const ACSN: &str = "ACSN";

/// Extension carrying a map type outside the fixed equivalence vocabulary.
pub const EQUIVALENCE_EXTENSION_URL: &str =
    "http://fhir.openconceptlab.org/ConceptMap/equivalence";

/// Localized-text type marking a definition rather than a display name.
pub const DEFINITION: &str = "definition";

/// The FHIR R4 concept-map-equivalence vocabulary.
pub const EQUIVALENCE_CODES: &[&str] = &[
    "relatedto",
    "equivalent",
    "equal",
    "wider",
    "subsumes",
    "narrower",
    "specializes",
    "inexact",
    "unmatched",
    "disjoint",
];

/// The FHIR identifier-use vocabulary.
pub const IDENTIFIER_USE_CODES: &[&str] = &["usual", "official", "temp", "secondary", "old"];

/// Filter operator codes accepted from the extras side-channel. Anything else
/// is silently dropped, leaving the filter's operator list empty.
pub const FILTER_OPERATORS: &[&str] = &["is-a", "is-not-a", "in", "not-in"];

/// Returns true when the token is the "all versions" wildcard.
pub fn is_version_all(version: Option<&str>) -> bool {
    version == Some(VERSION_ALL)
}

/// Returns true when the stored map type is part of the fixed equivalence
/// vocabulary.
pub fn is_known_equivalence(code: &str) -> bool {
    EQUIVALENCE_CODES.contains(&code)
}
