//! Typed errors for record building, extraction and fetching.
//!
//! A value that fails to normalize is not an error: normalizers return `None`
//! for it. Errors here are either programmer mistakes (type contract, unknown
//! fields, broken selectors) or per-record and per-request failures.

use thiserror::Error;

use crate::fields::{RecordKind, SemanticType};

/// Errors raised by the typed record engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ItemError {
    /// A value could not be coerced to the declared type, even after the
    /// field's converter ran.
    #[error("field <{field}> requires type {expected} but found type {actual}")]
    TypeContractViolation {
        field: &'static str,
        expected: SemanticType,
        actual: &'static str,
    },

    /// A required field is still unset after finalization.
    #[error("{kind} record is missing required field <{field}>")]
    MissingRequiredField { kind: RecordKind, field: &'static str },

    /// The field is not declared for this record kind.
    #[error("{kind} record has no field <{field}>")]
    UnknownField { kind: RecordKind, field: String },
}

/// Errors raised while registering queries against a document.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// CSS selector did not parse
    #[error("invalid selector `{selector}`: {reason}")]
    InvalidSelector { selector: String, reason: String },

    /// JSON path expression did not parse
    #[error("invalid JSON path `{path}`")]
    InvalidPath { path: String },

    #[error(transparent)]
    Item(#[from] ItemError),
}

/// Errors raised by a fetcher for a single request.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport-level failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    /// URL could not be parsed
    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },
}

/// Result type alias for record operations.
pub type ItemResult<T> = std::result::Result<T, ItemError>;

/// Result type alias for extraction operations.
pub type ExtractResult<T> = std::result::Result<T, ExtractError>;

/// Result type alias for fetch operations.
pub type FetchResult<T> = std::result::Result<T, FetchError>;
