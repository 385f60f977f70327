//! OCLFHIR terminology engine.
//!
//! Maps caller-supplied identifiers (owner token, repository id, version,
//! canonical URL, wildcard) onto exactly one versioned repository record,
//! converts that record into a FHIR terminology resource, and runs the four
//! terminology operations on top: `$lookup`, `$validate-code`, `$expand`,
//! `$translate`.
//!
//! The engine is transport-free: inputs are already-parsed parameter values,
//! outputs are `serde_json::Value` resource trees and typed errors. HTTP
//! routing and wire encoding live outside this crate.

pub mod accession;
pub mod convert;
pub mod error;
pub mod extras;
pub mod operations;
pub mod paginate;
pub mod resolve;

pub use error::OperationError;
pub use operations::{
    ExpandParams, LookupParams, TerminologyEngine, TranslateParams, ValidateCodeParams,
};
pub use resolve::Resolver;
